mod contact_email;
mod status;
mod submission;
// allow external `use` statements to skip `contact_email` etc
pub use contact_email::ContactEmail;
pub use status::Status;
pub use submission::Submission;
