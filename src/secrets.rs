use std::fmt::Debug;
use std::path::Path;

use base64::engine::general_purpose;
use base64::Engine;
use secrecy::Secret;

use crate::routes::error_chain_fmt;

/// Snapshot of the secrets file: destination address and SMTP credentials.
///
/// The file holds four base64-encoded lines, in this order: destination
/// address, SMTP host, SMTP username, SMTP password. Missing lines decode to
/// empty strings; nothing is validated here.
#[derive(Debug)]
pub struct Secrets {
    pub address: String,
    pub host: String,
    pub username: String,
    pub password: Secret<String>,
}

#[derive(thiserror::Error)]
pub enum SecretsError {
    #[error("Secrets file could not be read")]
    Missing(#[source] std::io::Error),
    #[error("Line {line} of the secrets file is not valid base64 text")]
    Decode {
        line: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl Debug for SecretsError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)?;
        Ok(())
    }
}

impl Secrets {
    /// Read and decode the secrets file. Called once per request; the result
    /// is dropped with the request.
    #[tracing::instrument(name = "Loading secrets", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SecretsError> {
        let contents = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(SecretsError::Missing)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, SecretsError> {
        let mut lines = contents.lines().map(str::trim);
        // `lines` is lazy, so each field is decoded in order; an absent line is ""
        let mut next = |line: usize| decode_line(line, lines.next().unwrap_or_default());

        Ok(Self {
            address: next(1)?,
            host: next(2)?,
            username: next(3)?,
            password: Secret::new(next(4)?),
        })
    }
}

fn decode_line(
    line: usize,
    encoded: &str,
) -> Result<String, SecretsError> {
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| SecretsError::Decode {
            line,
            source: e.into(),
        })?;
    String::from_utf8(decoded).map_err(|e| SecretsError::Decode {
        line,
        source: e.into(),
    })
}
