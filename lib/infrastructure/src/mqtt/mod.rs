mod client;
mod receiver;

pub use client::Mqtt;
pub use receiver::{MqttInMessage, MqttSubscription};

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_client_id")]
    client_id: String,
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "state-export".to_owned()
}

impl MqttConfig {
    pub fn new_client(&self) -> Mqtt {
        tracing::info!("Connecting to MQTT broker {}:{} as {}", self.host, self.port, self.client_id);
        Mqtt::connect(&self.host, self.port, &self.client_id)
    }
}
