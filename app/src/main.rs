use infrastructure::EventBus;
use settings::Settings;
use tokio_util::sync::CancellationToken;

use crate::entity::StateChangedEvent;

mod adapter;
mod core;
mod entity;
mod export;
mod settings;

const STATE_CHANGED_BUFFER_SIZE: usize = 1024;

#[tokio::main(flavor = "multi_thread")]
pub async fn main() {
    let settings = Settings::new().expect("Error reading configuration");
    settings.monitoring.init().expect("Error initializing monitoring");

    let state_changed_bus = EventBus::<StateChangedEvent>::new(STATE_CHANGED_BUFFER_SIZE);
    let stopping = CancellationToken::new();

    let mut mqtt_client = settings.mqtt.new_client();

    let ha_event_source = settings
        .homeassistant
        .new_event_source(&mut mqtt_client, state_changed_bus.emitter())
        .await
        .expect("Error subscribing to Home Assistant events");

    let exporter = match settings
        .influxdb
        .new_exporter(state_changed_bus.subscribe(), stopping.clone())
        .await
    {
        Ok(exporter) => Some(exporter),
        Err(e) => {
            tracing::error!(
                "State export disabled: {}. Please check the influxdb section of the configuration and that the \
                 database exists and is READ/WRITE.",
                e
            );
            None
        }
    };

    let export_exec = {
        let stopping = stopping.clone();

        async move {
            match exporter {
                Some(exporter) => exporter.run().await,
                None => stopping.cancelled().await,
            }
        }
    };

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                stopping.cancel();
            }
            Err(e) => tracing::error!("Error listening for shutdown signal: {}", e),
        }
    });

    tracing::info!("Starting main loop");

    tokio::select!(
        _ = mqtt_client.run() => {},
        _ = ha_event_source.run() => {},
        _ = export_exec => {},
    );

    tracing::info!("Stopped");
}
