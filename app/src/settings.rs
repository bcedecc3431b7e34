use config::{Config, ConfigError, Environment, File};
use infrastructure::{MonitoringConfig, MqttConfig};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub monitoring: MonitoringConfig,
    pub mqtt: MqttConfig,
    pub homeassistant: crate::adapter::homeassistant::HomeAssistant,
    pub influxdb: crate::adapter::influxdb::InfluxDbConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_source(File::with_name("config.toml"))
    }

    fn from_source(source: impl config::Source + Send + Sync + 'static) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(source)
            .add_source(Environment::default().separator("_").list_separator(","));

        let s = builder.build()?;
        s.try_deserialize()
    }
}
