use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod broker;
mod cognito;
mod config;
mod controller;
mod error;
mod fetch;
mod net;
mod session;
mod signal;
mod sigv4;
mod srp;
mod template;
#[cfg(test)]
mod testing;
mod transform;
mod types;

use broker::{MqttBroker, Topics};
use cognito::CognitoClient;
use config::Config;
use controller::BridgeController;
use fetch::DeviceFetcher;
use net::SignedDeviceApi;
use session::SessionManager;
use signal::Signals;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(config.json_logs);
    info!(config = ?config, "harvey2mqtt starting");

    match template::discover_templates(&config.template_dir) {
        Ok(files) => {
            for file in files {
                info!(template = %file.path.display(), "Will send autoconfig");
            }
        }
        Err(e) => warn!(dir = %config.template_dir.display(), error = %e, "No autoconfig templates"),
    }

    let topics = Topics::new(&config.mqtt.base_topic, &config.mqtt.discovery_topic);
    let (mqtt, eventloop) = MqttBroker::new(&config.mqtt, &topics);

    let signals = Arc::new(Signals::default());
    let broker_addr = format!("{}:{}", config.mqtt.host, config.mqtt.port);
    let mqtt_task = broker::spawn_event_loop(eventloop, broker_addr, signals.clone());

    let cognito = Arc::new(CognitoClient::new(&config.upstream));
    let api = Arc::new(SignedDeviceApi::new(&config.upstream.api_url, &config.upstream.region)?);

    let controller = BridgeController::new(
        SessionManager::new(cognito.clone(), config.account.clone()),
        DeviceFetcher::new(cognito, api),
        Arc::new(mqtt),
        topics,
        config.template_dir.clone(),
        config.poll_interval(),
    );

    controller.run(signals, config.poll_tick()).await;
    mqtt_task.abort();
    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
