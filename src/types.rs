use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Upstream account credentials, fixed for the lifetime of the process.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Token triple for an authenticated user-pool principal.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Short-lived signing keys minted for a single fetch. Never cached.
#[derive(Clone, Deserialize)]
pub struct TemporaryCredentials {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SecretKey")]
    pub secret_key: String,
    #[serde(rename = "SessionToken")]
    pub session_token: String,
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// A single device entry taken from the upstream list.
pub type DeviceDoc = Map<String, Value>;

/// Device identity extracted for autoconfig rendering: SERIAL, MODEL, SWVER, BRAND.
pub type Metadata = BTreeMap<String, String>;

/// Device state with internal fields removed, ready to publish.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct NormalizedRecord(pub DeviceDoc);

impl NormalizedRecord {
    #[cfg(test)]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Online,
    Offline,
}

impl Availability {
    pub fn as_str(self) -> &'static str {
        match self {
            Availability::Online => "online",
            Availability::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntityKind {
    BinarySensor,
    Sensor,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::BinarySensor => "binary_sensor",
            EntityKind::Sensor => "sensor",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "binary_sensor" => Some(EntityKind::BinarySensor),
            "sensor" => Some(EntityKind::Sensor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoconfigTemplate {
    pub kind: EntityKind,
    pub name: String,
    pub body: String,
}

/// Intents raised outside the control loop and consumed by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeSignal {
    Connected,
    PollNow,
    ForceReauth,
}
