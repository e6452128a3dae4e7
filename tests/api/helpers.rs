use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use base64::engine::general_purpose;
use base64::Engine;
use contact_relay::configuration::get_configuration;
use contact_relay::configuration::SmtpTls;
use contact_relay::startup::Application;
use contact_relay::startup::CONTACT_PATH;
use contact_relay::telemetry::get_subscriber;
use contact_relay::telemetry::init_subscriber;
use once_cell::sync::Lazy;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use uuid::Uuid;

/// Init a static subscriber once for the whole test binary.
///
/// To opt in to verbose logging, use the env var `TEST_LOG`:
///
/// ```sh
///      TEST_LOG=true cargo test [test_name] | bunyan
/// ```
static TRACING: Lazy<()> = Lazy::new(|| {
    // two different closure types can't share a variable, hence the match arms
    match std::env::var("TEST_LOG") {
        Ok(_) => {
            let subscriber = get_subscriber("test", "debug", std::io::stdout);
            init_subscriber(subscriber).expect("init subscriber");
        }
        Err(_) => {
            let subscriber = get_subscriber("test", "debug", std::io::sink);
            init_subscriber(subscriber).expect("init subscriber");
        }
    };
});

/// Address the contact form is delivered to
pub const DESTINATION: &str = "owner@site.com";

/// A message as seen by the fake SMTP server
#[derive(Clone, Debug, Default)]
pub struct ReceivedMail {
    pub mail_from: String,
    pub rcpt_to: Vec<String>,
    /// Everything between `DATA` and the final `.`, lines joined with CRLF
    pub data: String,
}

impl ReceivedMail {
    pub fn header(
        &self,
        name: &str,
    ) -> Option<&str> {
        let prefix = format!("{name}: ");
        self.data
            .split("\r\n")
            .take_while(|l| !l.is_empty())
            .find_map(|l| l.strip_prefix(prefix.as_str()))
    }

    pub fn body(&self) -> &str {
        self.data
            .split_once("\r\n\r\n")
            .map(|(_, body)| body)
            .unwrap_or_default()
    }
}

/// Minimal SMTP server, standing in for the real relay. Accepts any
/// credentials; with `accept` unset, every message is refused at the end of
/// `DATA`.
pub struct FakeSmtpServer {
    port: u16,
    received: Arc<Mutex<Vec<ReceivedMail>>>,
}

impl FakeSmtpServer {
    pub async fn start() -> Self { Self::start_with(true).await }

    pub async fn start_rejecting() -> Self { Self::start_with(false).await }

    async fn start_with(accept: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(vec![]));

        let store = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let store = store.clone();
                tokio::spawn(async move {
                    // a broken connection only affects the test that caused it
                    let _ = serve(stream, accept, store).await;
                });
            }
        });

        Self { port, received }
    }

    pub fn port(&self) -> u16 { self.port }

    pub fn received(&self) -> Vec<ReceivedMail> { self.received.lock().unwrap().clone() }
}

async fn serve(
    stream: TcpStream,
    accept: bool,
    store: Arc<Mutex<Vec<ReceivedMail>>>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut mail = ReceivedMail::default();

    writer.write_all(b"220 localhost ESMTP fake\r\n").await?;

    while let Some(line) = lines.next_line().await? {
        let command = line.to_ascii_uppercase();
        let reply: &str = if command.starts_with("EHLO") {
            "250-localhost\r\n250-8BITMIME\r\n250 AUTH PLAIN LOGIN\r\n"
        } else if command.starts_with("HELO") {
            "250 localhost\r\n"
        } else if command == "AUTH PLAIN" {
            // no initial response: ask for it
            writer.write_all(b"334 \r\n").await?;
            lines.next_line().await?;
            "235 2.7.0 Authentication successful\r\n"
        } else if command.starts_with("AUTH PLAIN ") {
            "235 2.7.0 Authentication successful\r\n"
        } else if command.starts_with("AUTH LOGIN") {
            writer.write_all(b"334 VXNlcm5hbWU6\r\n").await?;
            lines.next_line().await?;
            writer.write_all(b"334 UGFzc3dvcmQ6\r\n").await?;
            lines.next_line().await?;
            "235 2.7.0 Authentication successful\r\n"
        } else if command.starts_with("MAIL FROM:") {
            mail.mail_from = line["MAIL FROM:".len()..].to_string();
            "250 2.1.0 Ok\r\n"
        } else if command.starts_with("RCPT TO:") {
            mail.rcpt_to.push(line["RCPT TO:".len()..].to_string());
            "250 2.1.5 Ok\r\n"
        } else if command == "DATA" {
            writer.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n").await?;
            let mut data = vec![];
            while let Some(line) = lines.next_line().await? {
                if line == "." {
                    break;
                }
                // undo dot-stuffing
                let line = match line.strip_prefix('.') {
                    Some(rest) => rest.to_string(),
                    None => line,
                };
                data.push(line);
            }
            mail.data = data.join("\r\n");
            let done = std::mem::take(&mut mail);
            match accept {
                true => {
                    store.lock().unwrap().push(done);
                    "250 2.0.0 Ok: queued\r\n"
                }
                false => "554 5.7.1 Message rejected\r\n",
            }
        } else if command == "RSET" {
            mail = ReceivedMail::default();
            "250 2.0.0 Ok\r\n"
        } else if command == "QUIT" {
            writer.write_all(b"221 2.0.0 Bye\r\n").await?;
            break;
        } else {
            "250 2.0.0 Ok\r\n"
        };
        writer.write_all(reply.as_bytes()).await?;
    }
    Ok(())
}

pub struct TestApp {
    pub addr: String,
    pub port: u16,
    pub smtp_server: FakeSmtpServer,
    pub secrets_path: PathBuf,
    pub api_client: reqwest::Client,
}

impl TestApp {
    /// The page the form lives on, i.e. the `Referer` of a genuine submission
    pub fn contact_page(&self) -> String { format!("{}/about/contact/", self.addr) }

    /// `POST /contact` with a form body, as sent by the form guard
    pub async fn post_contact(
        &self,
        body: String,
        referer: Option<&str>,
    ) -> reqwest::Response {
        self.post_contact_as("application/x-www-form-urlencoded", body, referer)
            .await
    }

    /// `POST /contact` with an arbitrary `Content-Type`
    pub async fn post_contact_as(
        &self,
        content_type: &str,
        body: String,
        referer: Option<&str>,
    ) -> reqwest::Response {
        let mut req = self
            .api_client
            .post(format!("{}{CONTACT_PATH}", self.addr))
            .header("Content-Type", content_type)
            .body(body);
        if let Some(referer) = referer {
            req = req.header("Referer", referer);
        }
        req.send().await.expect("execute request")
    }

    /// Replace the secrets file with these (plain text) lines, base64-encoded
    pub fn write_secrets(
        &self,
        lines: &[&str],
    ) {
        let contents = lines
            .iter()
            .map(|l| general_purpose::STANDARD.encode(l))
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(&self.secrets_path, contents + "\n").expect("write secrets file");
    }

    pub fn remove_secrets(&self) { std::fs::remove_file(&self.secrets_path).expect("remove secrets file"); }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        // already gone if the test removed it
        let _ = std::fs::remove_file(&self.secrets_path);
    }
}

/// `Location` header of a redirect
pub fn location(resp: &reqwest::Response) -> &str {
    resp.headers()
        .get("Location")
        .expect("no Location header")
        .to_str()
        .unwrap()
}

/// A body that passes every check
pub fn valid_body() -> String {
    "name=John&email=john%40foo.com&url=&subject=Hello&message=Hi%20there".to_string()
}

pub async fn spawn_app() -> TestApp { spawn_app_with(FakeSmtpServer::start().await).await }

/// Spawn the app on a random port, talking to `smtp_server`, with a valid
/// secrets file in a random temp path.
pub async fn spawn_app_with(smtp_server: FakeSmtpServer) -> TestApp {
    // init the tracing subscriber once only
    Lazy::force(&TRACING);

    let secrets_path = std::env::temp_dir().join(format!("contact-relay-{}.txt", Uuid::new_v4()));

    let cfg = {
        let mut c = get_configuration().expect("read configuration");
        c.application.host = "127.0.0.1".to_string();
        // port 0: the OS picks a free port, retrieved via `get_port`
        c.application.port = 0;
        // compare referers with the `Host` header
        c.application.server_name = None;
        c.secrets.path = secrets_path.clone();
        c.email_client.smtp_port = smtp_server.port();
        c.email_client.tls = SmtpTls::None;
        c.email_client.timeout_milliseconds = 2000;
        c
    };

    let app = Application::build(cfg).await.expect("build app");
    let port = app.get_port();
    let addr = format!("http://localhost:{port}");
    tokio::spawn(app.run_until_stopped());

    let api_client = reqwest::Client::builder()
        // the handler answers with redirects; we want to see them
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let app = TestApp {
        addr,
        port,
        smtp_server,
        secrets_path,
        api_client,
    };
    app.write_secrets(&[DESTINATION, "127.0.0.1", "user", "hunter2"]);
    app
}
