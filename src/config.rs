use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::types::Credentials;

// Values extracted from the vendor mobile app.
const DEFAULT_REGION: &str = "eu-west-1";
const DEFAULT_POOL_ID: &str = "eu-west-1_gtX9aUXzh";
const DEFAULT_CLIENT_ID: &str = "67c9dtgnbjid8l9dh5juih2iq4";
const DEFAULT_IDENTITY_ID: &str = "eu-west-1:30070db9-1478-46b4-ae5a-7d38053cd66c";
const DEFAULT_API_URL: &str =
    "https://y7xyrocicl.execute-api.eu-west-1.amazonaws.com/prod/v1/softeners/all";

#[derive(Debug, Clone)]
pub struct Config {
    pub account: Credentials,
    pub upstream: UpstreamConfig,
    pub mqtt: MqttConfig,
    pub template_dir: PathBuf,
    pub poll_interval_secs: u64,
    pub poll_tick_secs: u64,
    pub json_logs: bool,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub region: String,
    pub pool_id: String,
    pub client_id: String,
    pub identity_id: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<Credentials>,
    pub last_will: bool,
    pub base_topic: String,
    pub discovery_topic: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let username = lookup("HARVEYUSER").context("HARVEYUSER must be set")?;
        let password = lookup("HARVEYPASS").context("HARVEYPASS must be set")?;

        let port = var("MQTTPORT", "1883");
        let port: u16 = port
            .parse()
            .with_context(|| format!("MQTTPORT is not a valid port: {port}"))?;

        let credentials = match (non_empty("MQTTUSER"), non_empty("MQTTPASS")) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };

        let host_id = lookup("HOSTNAME").unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Config {
            account: Credentials { username, password },
            upstream: UpstreamConfig {
                region: var("HARVEY_REGION", DEFAULT_REGION),
                pool_id: var("HARVEY_POOL_ID", DEFAULT_POOL_ID),
                client_id: var("HARVEY_CLIENT_ID", DEFAULT_CLIENT_ID),
                identity_id: var("HARVEY_IDENTITY_ID", DEFAULT_IDENTITY_ID),
                api_url: var("HARVEY_API_URL", DEFAULT_API_URL),
            },
            mqtt: MqttConfig {
                host: var("MQTTHOST", "localhost"),
                port,
                client_id: format!("h2m-{host_id}"),
                credentials,
                last_will: flag(lookup("MQTTLWT")),
                base_topic: var("MQTT_BASE_TOPIC", "harvey2mqtt"),
                discovery_topic: var("MQTT_DISCOVERY_TOPIC", "homeassistant"),
            },
            template_dir: PathBuf::from(var("TEMPLATE_DIR", "./json")),
            poll_interval_secs: number(lookup("POLL_INTERVAL_MINUTES"), 45) * 60,
            poll_tick_secs: number(lookup("POLL_TICK_SECS"), 60).max(1),
            json_logs: lookup("LOG_FORMAT").is_some_and(|v| v == "json"),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_tick(&self) -> Duration {
        Duration::from_secs(self.poll_tick_secs)
    }
}

impl UpstreamConfig {
    pub fn user_pool_endpoint(&self) -> String {
        format!("https://cognito-idp.{}.amazonaws.com/", self.region)
    }

    pub fn identity_endpoint(&self) -> String {
        format!("https://cognito-identity.{}.amazonaws.com/", self.region)
    }

    /// Key under which the user-pool id token is presented to the identity pool.
    pub fn login_provider(&self) -> String {
        format!("cognito-idp.{}.amazonaws.com/{}", self.region, self.pool_id)
    }
}

fn flag(value: Option<String>) -> bool {
    value.is_some_and(|v| !matches!(v.to_ascii_lowercase().as_str(), "" | "0" | "false" | "no"))
}

fn number(value: Option<String>, default: u64) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_provider_combines_region_and_pool() {
        let upstream = UpstreamConfig {
            region: "eu-west-1".to_string(),
            pool_id: "eu-west-1_abc".to_string(),
            client_id: "client".to_string(),
            identity_id: "eu-west-1:id".to_string(),
            api_url: "https://example.invalid/all".to_string(),
        };
        assert_eq!(upstream.login_provider(), "cognito-idp.eu-west-1.amazonaws.com/eu-west-1_abc");
        assert_eq!(upstream.user_pool_endpoint(), "https://cognito-idp.eu-west-1.amazonaws.com/");
    }

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    const ACCOUNT: [(&str, &str); 2] = [("HARVEYUSER", "owner@example.com"), ("HARVEYPASS", "secret")];

    #[test]
    fn defaults_apply_when_only_account_is_set() {
        let mut vars = ACCOUNT.to_vec();
        vars.push(("HOSTNAME", "nas"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.account.username, "owner@example.com");
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.client_id, "h2m-nas");
        assert!(config.mqtt.credentials.is_none());
        assert!(!config.mqtt.last_will);
        assert_eq!(config.mqtt.base_topic, "harvey2mqtt");
        assert_eq!(config.mqtt.discovery_topic, "homeassistant");
        assert_eq!(config.template_dir, PathBuf::from("./json"));
        assert_eq!(config.poll_interval(), Duration::from_secs(45 * 60));
        assert_eq!(config.poll_tick(), Duration::from_secs(60));
        assert!(!config.json_logs);
        assert_eq!(config.upstream.pool_id, DEFAULT_POOL_ID);
        assert_eq!(config.upstream.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn client_id_falls_back_to_random_host_id() {
        let config = Config::from_lookup(lookup(&ACCOUNT)).unwrap();
        let host_id = config.mqtt.client_id.strip_prefix("h2m-").unwrap();
        assert!(Uuid::parse_str(host_id).is_ok());
    }

    #[test]
    fn account_is_required() {
        let err = Config::from_lookup(lookup(&[("HARVEYUSER", "owner@example.com")])).unwrap_err();
        assert!(err.to_string().contains("HARVEYPASS"));
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut vars = ACCOUNT.to_vec();
        vars.push(("MQTTPORT", "70000"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains("MQTTPORT"));
    }

    #[test]
    fn broker_credentials_need_both_values() {
        let mut vars = ACCOUNT.to_vec();
        vars.push(("MQTTUSER", "bridge"));
        assert!(Config::from_lookup(lookup(&vars)).unwrap().mqtt.credentials.is_none());

        vars.push(("MQTTPASS", ""));
        assert!(Config::from_lookup(lookup(&vars)).unwrap().mqtt.credentials.is_none());

        vars.pop();
        vars.push(("MQTTPASS", "pw"));
        let credentials = Config::from_lookup(lookup(&vars)).unwrap().mqtt.credentials.unwrap();
        assert_eq!((credentials.username.as_str(), credentials.password.as_str()), ("bridge", "pw"));
    }

    #[test]
    fn overrides_are_applied() {
        let mut vars = ACCOUNT.to_vec();
        vars.extend([
            ("MQTTHOST", "broker.lan"),
            ("MQTTPORT", "8883"),
            ("MQTTLWT", "yes"),
            ("MQTT_BASE_TOPIC", "softener"),
            ("POLL_INTERVAL_MINUTES", "10"),
            ("POLL_TICK_SECS", "0"),
            ("LOG_FORMAT", "json"),
            ("HARVEY_POOL_ID", "eu-west-1_other"),
        ]);
        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!((config.mqtt.host.as_str(), config.mqtt.port), ("broker.lan", 8883));
        assert!(config.mqtt.last_will);
        assert_eq!(config.mqtt.base_topic, "softener");
        assert_eq!(config.poll_interval(), Duration::from_secs(600));
        assert_eq!(config.poll_tick(), Duration::from_secs(1));
        assert!(config.json_logs);
        assert_eq!(config.upstream.login_provider(), "cognito-idp.eu-west-1.amazonaws.com/eu-west-1_other");
    }

    #[test]
    fn flag_values() {
        for off in [None, Some(""), Some("0"), Some("false"), Some("No")] {
            assert!(!flag(off.map(str::to_string)), "{off:?}");
        }
        for on in ["1", "true", "yes", "on"] {
            assert!(flag(Some(on.to_string())), "{on}");
        }
        assert_eq!(number(Some("abc".to_string()), 45), 45);
    }
}
