use std::time::Duration;

use thiserror::Error;

use spectriq_plugin_sdk::{FieldError, PluginKey};

use crate::validate::ValidationError;

/// Errors surfaced by the plugin engine.
///
/// Loader and validator failures appear at select time, connect failures at
/// connect time, and session failures whenever a response is applied. A
/// failure never leaves a worker thread behind, and never prevents a later
/// select or connect of another plugin.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to load plugin `{key}`: {reason}")]
    Load { key: PluginKey, reason: String },
    #[error("invalid plugin configuration: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("plugin failed to connect: {0}")]
    Connect(String),
    #[error("dependency `{0}` was not satisfied")]
    DependencyUnsatisfied(String),
    #[error("plugin session failed: {0}")]
    Processing(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("no action field named `{0}` is declared")]
    UnknownAction(String),
    #[error("operation not valid while {0}")]
    InvalidState(&'static str),
}
