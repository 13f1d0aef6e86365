use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::FetchError;
use crate::types::{Session, TemporaryCredentials};

/// Mints temporary signing credentials from a user-pool id token.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn credentials_for_identity(&self, id_token: &str) -> Result<TemporaryCredentials, FetchError>;
}

/// Issues the signed device-list request and returns the raw body.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn fetch_devices(&self, credentials: &TemporaryCredentials) -> Result<Vec<u8>, FetchError>;
}

pub struct DeviceFetcher {
    exchange: Arc<dyn CredentialExchange>,
    api: Arc<dyn DeviceApi>,
}

impl DeviceFetcher {
    pub fn new(exchange: Arc<dyn CredentialExchange>, api: Arc<dyn DeviceApi>) -> Self {
        DeviceFetcher { exchange, api }
    }

    /// Credentials are minted fresh for every call and dropped afterwards.
    pub async fn fetch_snapshot(&self, session: &Session) -> Result<Vec<u8>, FetchError> {
        let credentials = self.exchange.credentials_for_identity(&session.id_token).await?;
        debug!(access_key_id = %credentials.access_key_id, "Obtained temporary credentials");
        let body = self.api.fetch_devices(&credentials).await?;
        debug!(bytes = body.len(), "Fetched device snapshot");
        Ok(body)
    }
}
