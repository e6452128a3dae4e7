use std::env;
use std::env::current_dir;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::email_client::EmailClient;

/// Global configuration, loaded from `configuration/*.yaml`. See
/// `get_configuration`.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub secrets: SecretsSettings,
    pub email_client: EmailClientSettings,
}

/// Server configuration
#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    /// Should be localhost on dev machine, 0.0.0.0 on prod
    pub host: String,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,

    /// Host name that the `Referer` of a submission must carry. When unset,
    /// the host of the incoming request (`Host` header, port dropped) is used
    /// instead.
    pub server_name: Option<String>,
}

/// Location of the secrets file. The file itself is read on every request,
/// never at startup.
#[derive(Deserialize, Clone)]
pub struct SecretsSettings {
    pub path: PathBuf,
}

/// How the SMTP connection is secured.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// Plain connection; only sensible against a local relay (or in tests)
    None,
    /// Upgrade with STARTTLS (usually port 587)
    Starttls,
    /// Implicit TLS from the first byte (usually port 465)
    Wrapper,
}

/// Everything about outgoing mail that is not secret. Host and credentials
/// live in the secrets file.
#[derive(Deserialize, Clone)]
pub struct EmailClientSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub smtp_port: u16,
    pub tls: SmtpTls,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,

    /// Display name of the `From` header
    pub from_name: String,

    /// Tag put in brackets in front of every subject
    pub subject_prefix: String,
    pub x_mailer: String,
}

impl EmailClientSettings {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_milliseconds) }

    pub fn client(&self) -> EmailClient {
        EmailClient::new(self.smtp_port, self.tls, self.timeout())
    }
}

#[derive(Debug)]
pub enum Environment {
    Local,
    Production,
}

impl Display for Environment {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Environment::Local => "local",
                Environment::Production => "production",
            }
        )?;
        Ok(())
    }
}

impl TryFrom<String> for Environment {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            e => Err(format!("Invalid: {e}")),
        }
    }
}

/// Load yaml configuration files at `<project_root>/configuration`.
///
/// `base.yaml` is read first, then the file named after `APP_ENVIRONMENT`
/// (`local` by default), then `APP_`-prefixed env vars, e.g.
/// `APP_APPLICATION__PORT=5001` -> `Settings.application.port`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let cfg_dir = current_dir()
        .map_err(|e| ConfigError::Message(format!("could not get current dir: {e}")))?
        .join("configuration");

    let env: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or("local".to_string())
        .try_into()
        .map_err(ConfigError::Message)?;

    tracing::info!("loading config for {env} env");

    let settings = Config::builder()
        .add_source(config::File::from(cfg_dir.join("base.yaml")))
        .add_source(config::File::from(cfg_dir.join(format!("{env}.yaml"))))
        .add_source(
            // env vars are -always- parsed as String, hence `serde-aux` for ports etc
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
