use std::collections::BTreeMap;

use anyhow::Context;
use infrastructure::{EventEmitter, Mqtt, MqttSubscription};
use serde::Deserialize;
use serde_json::Value;

use crate::core::time::DateTime;
use crate::entity::{EntityId, EntityState, StateChangedEvent};
use crate::t;

const EVENT_STATE_CHANGED: &str = "state_changed";

#[derive(Debug, Deserialize, Clone)]
pub struct HomeAssistant {
    pub topic_event: String,
}

impl HomeAssistant {
    pub async fn new_event_source(
        &self,
        mqtt: &mut Mqtt,
        emitter: EventEmitter<StateChangedEvent>,
    ) -> anyhow::Result<HaEventSource> {
        let subscription = mqtt
            .subscribe(self.topic_event.clone())
            .await
            .with_context(|| format!("Error subscribing to Home Assistant events on {}", self.topic_event))?;
        Ok(HaEventSource { subscription, emitter })
    }
}

/// Forwards the hub's event stream to the process event bus.
pub struct HaEventSource {
    subscription: MqttSubscription,
    emitter: EventEmitter<StateChangedEvent>,
}

impl HaEventSource {
    pub async fn run(mut self) {
        while let Some(msg) = self.subscription.recv().await {
            match decode(&msg.payload) {
                Ok(Some(event)) => self.emitter.send(event),
                Ok(None) => tracing::trace!("Received unsupported event on {}: {:?}", msg.topic, msg.payload),
                Err(e) => tracing::error!("Error parsing MQTT message on {}: {:#}", msg.topic, e),
            }
        }

        tracing::error!("Home Assistant event subscription closed");
    }
}

#[derive(Debug, Deserialize)]
struct HaEvent {
    event_type: String,
    #[serde(default)]
    event_data: Value,
    time_fired: Option<DateTime>,
}

#[derive(Debug, Deserialize)]
struct HaStateChanged {
    entity_id: EntityId,
    new_state: Option<HaState>,
}

#[derive(Debug, Deserialize)]
struct HaState {
    state: String,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
    last_updated: Option<DateTime>,
}

fn decode(payload: &str) -> anyhow::Result<Option<StateChangedEvent>> {
    let event: HaEvent = serde_json::from_str(payload).context("Payload is not a Home Assistant event")?;

    if event.event_type != EVENT_STATE_CHANGED {
        return Ok(None);
    }

    let data: HaStateChanged =
        serde_json::from_value(event.event_data).context("Invalid state_changed event data")?;
    let time_fired = event.time_fired.unwrap_or_else(|| t!(now));

    let new_state = data.new_state.map(|state| EntityState {
        entity_id: data.entity_id.clone(),
        state: state.state,
        attributes: state.attributes,
        last_updated: state.last_updated,
    });

    Ok(Some(StateChangedEvent {
        entity_id: data.entity_id,
        new_state,
        time_fired,
    }))
}
