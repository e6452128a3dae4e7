mod helpers;

// all black-box tests live in a single binary (tests/api/*), which keeps the
// sequential linking phase short.
//
// the app is spawned on a random port, with its secrets file in a random temp
// path and its SMTP transport pointed at an in-process fake server (see
// `helpers`). nothing outside the test process is needed.
