pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod form_guard;
pub mod message;
pub mod routes;
pub mod secrets;
pub mod startup;
pub mod telemetry;
pub mod utils;
