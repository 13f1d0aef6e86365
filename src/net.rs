use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::FetchError;
use crate::fetch::DeviceApi;
use crate::sigv4::Signer;
use crate::types::TemporaryCredentials;

const SERVICE: &str = "execute-api";

/// Device-list endpoint behind API Gateway IAM auth.
pub struct SignedDeviceApi {
    client: Client,
    url: Url,
    region: String,
}

impl SignedDeviceApi {
    pub fn new(api_url: &str, region: &str) -> anyhow::Result<Self> {
        Ok(SignedDeviceApi {
            client: Client::new(),
            url: Url::parse(api_url)?,
            region: region.to_string(),
        })
    }
}

#[async_trait]
impl DeviceApi for SignedDeviceApi {
    async fn fetch_devices(&self, credentials: &TemporaryCredentials) -> Result<Vec<u8>, FetchError> {
        let signer = Signer {
            access_key_id: &credentials.access_key_id,
            secret_key: &credentials.secret_key,
            session_token: Some(&credentials.session_token),
            region: &self.region,
            service: SERVICE,
        };
        let signed = signer.sign("GET", &self.url, Utc::now());

        let mut request = self.client.get(self.url.clone());
        for (name, value) in signed.iter() {
            request = request.header(name, value);
        }

        let response = request.send().await?.error_for_status()?;
        let bytes = response.bytes().await?.to_vec();
        debug!(bytes = bytes.len(), "Device list fetched");
        Ok(bytes)
    }
}
