use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::web;
use actix_web::web::Data;
use actix_web::App;
use actix_web::HttpServer;
use tracing_actix_web::TracingLogger;

use crate::configuration::Settings;
use crate::routes::contact;
use crate::routes::health_check;

/// Path the form guard posts to
pub const CONTACT_PATH: &str = "/contact";

/// Wrapper for actix's `Server` with access to the bound port. Not to be
/// confused with actix's `App`!
pub struct Application {
    /// Left private; use `get_port` to access
    port: u16,
    server: Server,
}

impl Application {
    /// Bind the configured address and build the `Server`. Port 0 picks a
    /// random free port; see `get_port`.
    pub async fn build(cfg: Settings) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", cfg.application.host, cfg.application.port);
        let listener = TcpListener::bind(addr)?;
        let port = listener.local_addr()?.port();

        let server = run(listener, cfg)?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 { self.port }

    /// Because this consumes `self`, this should be the final function call (or
    /// passed to `tokio::spawn`)
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

/// Wrapper for the expected `Referer` host (because raw `Option<String>`s may
/// conflict with one another when passed around by `Data`)
pub struct ServerName(pub Option<String>);

/// The server is not responsible for binding to an address, it only listens to
/// an already bound address.
///
/// Declares all API endpoints.
pub fn run(
    listener: TcpListener,
    cfg: Settings,
) -> Result<Server, anyhow::Error> {
    // `Data` is externally an `Arc` (for sharing/cloning), internally a `HashMap`
    // (for wrapping arbitrary types)
    let email_client = Data::new(cfg.email_client.client());
    let email_cfg = Data::new(cfg.email_client);
    let secrets_cfg = Data::new(cfg.secrets);
    let server_name = Data::new(ServerName(cfg.application.server_name));

    // one copy of `App` per worker, hence the closure and the clones
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            // any method: a non-POST request is answered by the handler itself
            .route(CONTACT_PATH, web::route().to(contact))
            .app_data(email_client.clone())
            .app_data(email_cfg.clone())
            .app_data(secrets_cfg.clone())
            .app_data(server_name.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
