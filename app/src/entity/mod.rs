use std::collections::BTreeMap;
use std::str::FromStr;

use derive_more::derive::{Display, Error};
use serde_json::Value;

use crate::core::time::DateTime;

pub const UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";

const STATE_UNKNOWN: &str = "unknown";
const STATE_UNAVAILABLE: &str = "unavailable";

/// Address of an entity in the form `domain.object_id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, serde::Deserialize, serde::Serialize)]
#[display("{domain}.{object_id}")]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Invalid entity id {_0:?}, expected <domain>.<object_id>")]
pub struct InvalidEntityId(#[error(not(source))] pub String);

impl EntityId {
    pub fn new(domain: impl Into<String>, object_id: impl Into<String>) -> Result<Self, InvalidEntityId> {
        let domain = domain.into();
        let object_id = object_id.into();

        if domain.is_empty() || object_id.is_empty() || domain.contains('.') || object_id.contains('.') {
            return Err(InvalidEntityId(format!("{domain}.{object_id}")));
        }

        Ok(Self { domain, object_id })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

impl FromStr for EntityId {
    type Err = InvalidEntityId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) => {
                EntityId::new(domain, object_id).map_err(|_| InvalidEntityId(s.to_owned()))
            }
            None => Err(InvalidEntityId(s.to_owned())),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = InvalidEntityId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityId> for String {
    fn from(value: EntityId) -> Self {
        value.to_string()
    }
}

/// Snapshot of an entity as reported by the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub entity_id: EntityId,
    pub state: String,
    pub attributes: BTreeMap<String, Value>,
    pub last_updated: Option<DateTime>,
}

impl EntityState {
    pub fn new(entity_id: EntityId, state: impl Into<String>) -> Self {
        Self {
            entity_id,
            state: state.into(),
            attributes: BTreeMap::new(),
            last_updated: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn domain(&self) -> &str {
        self.entity_id.domain()
    }

    pub fn object_id(&self) -> &str {
        self.entity_id.object_id()
    }

    /// `false` for the sentinel states `unknown`, `unavailable` and the empty string.
    pub fn is_valid(&self) -> bool {
        !matches!(self.state.as_str(), STATE_UNKNOWN | STATE_UNAVAILABLE | "")
    }

    pub fn unit_of_measurement(&self) -> Option<String> {
        match self.attributes.get(UNIT_OF_MEASUREMENT)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateChangedEvent {
    pub entity_id: EntityId,
    pub new_state: Option<EntityState>,
    pub time_fired: DateTime,
}

impl StateChangedEvent {
    pub fn new(new_state: EntityState, time_fired: DateTime) -> Self {
        Self {
            entity_id: new_state.entity_id.clone(),
            new_state: Some(new_state),
            time_fired,
        }
    }

    pub fn removed(entity_id: EntityId, time_fired: DateTime) -> Self {
        Self {
            entity_id,
            new_state: None,
            time_fired,
        }
    }
}
