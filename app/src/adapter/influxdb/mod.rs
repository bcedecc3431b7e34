mod client;
mod line_protocol;

use std::collections::{BTreeMap, HashSet};

use infrastructure::{EventListener, HttpClientConfig};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::core::time::Duration;
use crate::entity::{EntityId, StateChangedEvent};
use crate::export::{EntityFilter, ExportError, ExportRunner, ExportSettings, PointTransformer};
use crate::t;

pub use client::InfluxDbClient;

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxDbConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub include: EntitySelection,
    #[serde(default)]
    pub exclude: EntitySelection,
    pub default_measurement: Option<String>,
    pub override_measurement: Option<String>,
    /// Seconds, 0 disables re-emitting.
    #[serde(default)]
    pub max_emit_interval: i64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EntitySelection {
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
}

fn default_host() -> String {
    "localhost".to_owned()
}

fn default_port() -> u16 {
    8086
}

fn default_verify_ssl() -> bool {
    true
}

fn default_database() -> String {
    "home_assistant".to_owned()
}

impl InfluxDbConfig {
    /// Validates the configuration, connects and probes the database. The
    /// returned runner is ready to consume `events`.
    pub async fn new_exporter(
        &self,
        events: EventListener<StateChangedEvent>,
        stopping: CancellationToken,
    ) -> Result<ExportRunner<InfluxDbClient>, ExportError> {
        let settings = self.export_settings()?;
        let client = self.new_client()?;

        tracing::info!(
            "Exporting state changes to InfluxDB at {} (database {})",
            self.base_url(),
            self.database
        );

        ExportRunner::start(client, settings, events, stopping).await
    }

    pub fn export_settings(&self) -> Result<ExportSettings, ExportError> {
        if self.database.trim().is_empty() {
            return Err(ExportError::Configuration("database must not be empty".to_owned()));
        }

        if self.max_emit_interval < 0 {
            return Err(ExportError::Configuration(format!(
                "max_emit_interval must not be negative, got {}",
                self.max_emit_interval
            )));
        }

        self.credentials()?;

        let filter = EntityFilter {
            entity_allow: parse_entity_ids(&self.include.entities)?,
            domain_allow: self.include.domains.iter().cloned().collect(),
            entity_deny: parse_entity_ids(&self.exclude.entities)?,
            domain_deny: self.exclude.domains.iter().cloned().collect(),
        };

        let transformer = PointTransformer {
            override_measurement: non_empty(&self.override_measurement),
            default_measurement: non_empty(&self.default_measurement),
            tags: self.tags.clone(),
        };

        let max_emit_interval = match self.max_emit_interval {
            0 => None,
            secs => Some(Duration::try_seconds(secs).ok_or_else(|| {
                ExportError::Configuration(format!("max_emit_interval {secs} is out of range"))
            })?),
        };

        Ok(ExportSettings {
            filter,
            transformer,
            max_emit_interval,
        })
    }

    pub fn new_client(&self) -> Result<InfluxDbClient, ExportError> {
        let http = HttpClientConfig::new()
            .with_timeout(t!(5 seconds).into())
            .with_accept_invalid_certs(!self.verify_ssl)
            .new_tracing_client()
            .map_err(|e| ExportError::Configuration(format!("Error creating HTTP client: {e}")))?;

        Ok(InfluxDbClient::new(
            http,
            self.base_url(),
            self.database.clone(),
            self.credentials()?,
        ))
    }

    fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    fn credentials(&self) -> Result<Option<(String, String)>, ExportError> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Some((username.clone(), password.clone()))),
            (None, None) => Ok(None),
            _ => Err(ExportError::Configuration(
                "username and password must be configured together".to_owned(),
            )),
        }
    }
}

fn parse_entity_ids(ids: &[String]) -> Result<HashSet<EntityId>, ExportError> {
    ids.iter()
        .map(|id| {
            id.parse::<EntityId>()
                .map_err(|e| ExportError::Configuration(e.to_string()))
        })
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> InfluxDbConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = config("");

        assert_eq!(config.base_url(), "http://localhost:8086");
        assert_eq!(config.database, "home_assistant");
        assert!(config.verify_ssl);

        let settings = config.export_settings().unwrap();
        assert!(settings.max_emit_interval.is_none());
        assert!(settings.filter.entity_allow.is_empty());
        assert!(settings.transformer.tags.is_empty());
    }

    #[test]
    fn full_config_is_converted() {
        let config = config(
            r#"
            host = "influx.local"
            port = 8087
            ssl = true
            username = "user"
            password = "secret"
            database = "states"
            default_measurement = "state"
            override_measurement = ""
            max_emit_interval = 60

            [tags]
            instance = "home"

            [include]
            domains = ["sensor"]
            entities = ["switch.pump"]

            [exclude]
            entities = ["sensor.noisy"]
            "#,
        );

        assert_eq!(config.base_url(), "https://influx.local:8087");

        let settings = config.export_settings().unwrap();
        assert_eq!(settings.max_emit_interval, Some(t!(60 seconds)));
        assert!(settings.filter.domain_allow.contains("sensor"));
        assert!(settings.filter.entity_allow.contains(&"switch.pump".parse().unwrap()));
        assert!(settings.filter.entity_deny.contains(&"sensor.noisy".parse().unwrap()));
        assert_eq!(settings.transformer.default_measurement.as_deref(), Some("state"));
        assert_eq!(settings.transformer.override_measurement, None);
        assert_eq!(settings.transformer.tags.get("instance").map(String::as_str), Some("home"));
    }

    #[test]
    fn username_requires_password() {
        let config = config(r#"username = "user""#);

        assert!(matches!(config.export_settings(), Err(ExportError::Configuration(_))));
    }

    #[test]
    fn invalid_entity_id_is_rejected() {
        let config = config(
            r#"
            [exclude]
            entities = ["not-an-entity"]
            "#,
        );

        assert!(matches!(config.export_settings(), Err(ExportError::Configuration(_))));
    }

    #[test]
    fn negative_interval_is_rejected() {
        let config = config("max_emit_interval = -5");

        assert!(matches!(config.export_settings(), Err(ExportError::Configuration(_))));
    }

    #[test]
    fn out_of_range_interval_is_rejected() {
        let config = config("max_emit_interval = 9300000000000000");

        assert!(matches!(config.export_settings(), Err(ExportError::Configuration(_))));
    }

    #[tokio::test]
    async fn unreachable_database_fails_exporter_start() {
        let config = config(
            r#"
            host = "127.0.0.1"
            port = 1
            "#,
        );
        let bus = infrastructure::EventBus::<StateChangedEvent>::new(4);

        let result = config.new_exporter(bus.subscribe(), CancellationToken::new()).await;

        assert!(matches!(result, Err(ExportError::Connectivity(_))));
    }
}
