use std::fmt::Debug;

use actix_web::http::header::REFERER;
use actix_web::http::Method;
use actix_web::web;
use actix_web::HttpMessage;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use futures::StreamExt;
use url::Url;

use super::error_chain_fmt;
use crate::configuration::EmailClientSettings;
use crate::configuration::SecretsSettings;
use crate::domain::ContactEmail;
use crate::domain::Status;
use crate::domain::Submission;
use crate::email_client::EmailClient;
use crate::email_client::EmailError;
use crate::message::Letterhead;
use crate::message::OutgoingEmail;
use crate::secrets::Secrets;
use crate::secrets::SecretsError;
use crate::startup::ServerName;
use crate::utils::plain_text;
use crate::utils::redirect;

/// Body of the response to a request that did not come from our own pages
pub const DIRECT_ACCESS: &str = "Direct access not permitted";

/// Form bodies larger than this are refused as malformed
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Reasons a submission ends in `?error`. All of them look the same to the
/// browser; they only differ in the server log.
#[derive(thiserror::Error)]
pub enum Rejection {
    #[error("Secrets could not be loaded")]
    Secrets(#[from] SecretsError),
    #[error("Destination address is invalid")]
    Destination(#[source] anyhow::Error),
    #[error("Not a POST request with a form body")]
    RequestShape,
    #[error("Honeypot field was filled in")]
    Honeypot,
    #[error("Submitter email is invalid")]
    InvalidEmail(#[source] anyhow::Error),
    #[error("Email could not be sent")]
    Transport(#[from] EmailError),
}

impl Debug for Rejection {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)?;
        Ok(())
    }
}

/// Host the request was addressed to: the configured server name if any,
/// otherwise the `Host` header without its port.
fn serving_host(
    req: &HttpRequest,
    server_name: &ServerName,
) -> Option<String> {
    if let Some(name) = &server_name.0 {
        return Some(name.to_lowercase());
    }
    let conn = req.connection_info();
    // let `url` deal with ports and ipv6 brackets
    Url::parse(&format!("http://{}", conn.host()))
        .ok()?
        .host_str()
        .map(str::to_lowercase)
}

/// The `Referer` header, if present and pointing at the serving host.
fn local_referer(
    req: &HttpRequest,
    server_name: &ServerName,
) -> Option<String> {
    let referer = req.headers().get(REFERER)?.to_str().ok()?;
    let referer_host = Url::parse(referer).ok()?.host_str()?.to_lowercase();
    match serving_host(req, server_name)? == referer_host {
        true => Some(referer.to_string()),
        false => None,
    }
}

/// The whole request body, or `None` if it is larger than `MAX_BODY_BYTES`
/// or the stream broke. An oversized body is still read to the end, so that
/// the client gets to see the redirect.
async fn read_body(mut payload: web::Payload) -> Option<web::Bytes> {
    let mut body = web::BytesMut::new();
    let mut oversized = false;
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.ok()?;
        if oversized || body.len() + chunk.len() > MAX_BODY_BYTES {
            oversized = true;
            continue;
        }
        body.extend_from_slice(&chunk);
    }
    (!oversized).then(|| body.freeze())
}

/// `POST /contact`
///
/// Validates a contact form submission and relays it by email, then redirects
/// back to the referring page with `?submitted` or `?error`.
///
/// Every check below runs, even after an earlier one failed; only the
/// collected rejections decide whether an email is sent. The referer check is
/// the exception: a foreign or missing referer ends the request with a plain
/// text response, because there is no page of ours to redirect to.
#[tracing::instrument(
    name = "Relaying contact form submission",
    skip_all,
    fields(
        method = %req.method(),
        status = tracing::field::Empty,
    )
)]
pub async fn contact(
    req: HttpRequest,
    payload: web::Payload,
    email_client: web::Data<EmailClient>,
    email_cfg: web::Data<EmailClientSettings>,
    secrets_cfg: web::Data<SecretsSettings>,
    server_name: web::Data<ServerName>,
) -> HttpResponse {
    let mut rejections: Vec<Rejection> = vec![];

    let secrets = Secrets::load(&secrets_cfg.path)
        .await
        .map_err(|e| rejections.push(e.into()))
        .ok();

    let destination = match &secrets {
        Some(s) => ContactEmail::parse(&s.address)
            .map_err(|e| rejections.push(Rejection::Destination(anyhow::anyhow!(e))))
            .ok(),
        None => None,
    };

    let Some(referer) = local_referer(&req, &server_name) else {
        tracing::warn!("rejecting request without a local referer");
        return plain_text(DIRECT_ACCESS);
    };

    let form_body = req.method() == Method::POST
        && req.content_type() == "application/x-www-form-urlencoded";
    let body = read_body(payload).await;
    let submission = match (form_body, body) {
        (true, Some(body)) => Submission::from_body(&body),
        _ => None,
    }
    .unwrap_or_else(|| {
        rejections.push(Rejection::RequestShape);
        Submission::default()
    });

    if submission.is_spam() {
        rejections.push(Rejection::Honeypot);
    }

    let reply_to = ContactEmail::parse(&submission.email)
        .map_err(|e| rejections.push(Rejection::InvalidEmail(anyhow::anyhow!(e))))
        .ok();

    let status = match (secrets, destination, reply_to) {
        (Some(secrets), Some(destination), Some(reply_to)) if rejections.is_empty() => {
            let letterhead = Letterhead {
                destination: &destination,
                from_name: &email_cfg.from_name,
                subject_prefix: &email_cfg.subject_prefix,
                x_mailer: &email_cfg.x_mailer,
            };
            let email = OutgoingEmail::compose(
                &letterhead,
                &submission.name,
                &reply_to,
                &submission.subject,
                &submission.message,
            );
            match email_client
                .send_email(&secrets, &destination, &email)
                .await
            {
                Ok(()) => Status::Submitted,
                Err(e) => {
                    rejections.push(e.into());
                    Status::Error
                }
            }
        }
        _ => Status::Error,
    };

    for r in &rejections {
        tracing::warn!(
            error.cause_chain=?r,
            error.message=%r,
            "submission rejected"
        );
    }
    tracing::Span::current().record("status", tracing::field::display(status));

    // drop the old status (and any other query) from the referring page
    let base = referer.split('?').next().unwrap_or_default();
    redirect(&format!("{base}?{status}"))
}
