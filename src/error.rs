use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("identity provider unreachable: {0}")]
    ProviderUnreachable(String),
    /// Refresh failed and the follow-up full login failed too; the old session is gone.
    #[error("re-authentication required: {source}")]
    ReauthRequired {
        #[source]
        source: Box<AuthError>,
    },
}

#[derive(Error, Debug)]
pub enum SrpError {
    #[error("illegal {0} in password verifier challenge")]
    IllegalParameter(&'static str),
    #[error("secret block is not base64: {0}")]
    SecretBlock(#[from] base64::DecodeError),
}

#[derive(Error, Debug)]
pub enum FetchError {
    /// The credential exchange rejected the identity token.
    #[error("identity token not authorized: {0}")]
    NotAuthorized(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transport(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("response is not JSON: {0}")]
    NotJson(#[from] serde_json::Error),
    #[error("response contains no devices")]
    EmptyList,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("device entry has no serial number")]
    MissingIdentifier,
}

#[derive(Error, Debug)]
#[error("broker request failed: {0}")]
pub struct BrokerError(pub String);

impl From<rumqttc::ClientError> for BrokerError {
    fn from(e: rumqttc::ClientError) -> Self {
        BrokerError(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to render template {}: {source}", path.display())]
    Render {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to publish autoconfig {topic}: {source}")]
    Publish {
        topic: String,
        #[source]
        source: BrokerError,
    },
}

/// Outcome of a failed poll cycle. None of these terminate the process.
#[derive(Error, Debug)]
pub enum PollError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
