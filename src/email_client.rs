use std::fmt::Debug;
use std::time::Duration;

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::Address;
use lettre::AsyncSmtpTransport;
use lettre::AsyncTransport;
use lettre::Tokio1Executor;
use secrecy::ExposeSecret;

use crate::configuration::SmtpTls;
use crate::domain::ContactEmail;
use crate::message::OutgoingEmail;
use crate::routes::error_chain_fmt;
use crate::secrets::Secrets;

/// Authenticated SMTP submission.
///
/// Only the connection shape (port, TLS, timeout) is fixed at startup; host
/// and credentials come from the secrets snapshot of each request, so the
/// transport itself is built per send and dropped afterwards.
#[derive(Clone, Debug)]
pub struct EmailClient {
    port: u16,
    tls: SmtpTls,
    timeout: Duration,
}

#[derive(thiserror::Error)]
pub enum EmailError {
    #[error("Invalid envelope address")]
    Address(#[from] lettre::address::AddressError),
    #[error("Could not build envelope")]
    Envelope(#[from] lettre::error::Error),
    #[error("SMTP transport failed")]
    Transport(#[from] lettre::transport::smtp::Error),
}

impl Debug for EmailError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)?;
        Ok(())
    }
}

impl EmailClient {
    pub fn new(
        port: u16,
        tls: SmtpTls,
        timeout: Duration,
    ) -> Self {
        Self { port, tls, timeout }
    }

    fn transport(
        &self,
        secrets: &Secrets,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let host = secrets.host.trim();
        let builder = match self.tls {
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
            SmtpTls::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?,
            SmtpTls::Wrapper => AsyncSmtpTransport::<Tokio1Executor>::relay(host)?,
        };
        let creds = Credentials::new(
            secrets.username.clone(),
            secrets.password.expose_secret().clone(),
        );
        Ok(builder
            .port(self.port)
            .timeout(Some(self.timeout))
            .credentials(creds)
            .build())
    }

    /// Deliver `email` to `destination`, which is also the envelope sender
    /// (keeps SPF happy on the receiving side).
    #[tracing::instrument(
        name = "Sending email over SMTP",
        skip_all,
        fields(smtp_host = %secrets.host, port = self.port, tls = ?self.tls)
    )]
    pub async fn send_email(
        &self,
        secrets: &Secrets,
        destination: &ContactEmail,
        email: &OutgoingEmail,
    ) -> Result<(), EmailError> {
        let address: Address = destination.as_ref().parse()?;
        let envelope = Envelope::new(Some(address.clone()), vec![address])?;
        let transport = self.transport(secrets)?;
        transport.send_raw(&envelope, &email.to_wire()).await?;
        Ok(())
    }
}
