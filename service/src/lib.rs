//! Dot publishing service: configuration, the publish pipeline and the
//! command-line front end used by the `dot-push` binary.

pub mod cli;
pub mod config;
pub mod pipeline;

pub use config::AppConfig;
pub use pipeline::{PublishError, Publisher};
