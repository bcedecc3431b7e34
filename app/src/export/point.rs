use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::core::time::DateTime;
use crate::entity::{EntityState, UNIT_OF_MEASUREMENT};

const TAG_DOMAIN: &str = "domain";
const TAG_ENTITY_ID: &str = "entity_id";

const FIELD_NUMERIC_STATE: &str = "value";
const FIELD_TEXT_STATE: &str = "state";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Text(String),
}

/// One row for the time-series sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub time: DateTime,
}

impl ExportPoint {
    pub fn at(&self, time: DateTime) -> ExportPoint {
        ExportPoint {
            time,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PointTransformer {
    pub override_measurement: Option<String>,
    pub default_measurement: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl PointTransformer {
    pub fn to_point(&self, state: &EntityState, time: DateTime) -> ExportPoint {
        let mut fields = BTreeMap::new();

        match parse_float(&state.state) {
            Some(number) => fields.insert(FIELD_NUMERIC_STATE.to_owned(), FieldValue::Float(number)),
            None => fields.insert(FIELD_TEXT_STATE.to_owned(), FieldValue::Text(state.state.clone())),
        };

        for (key, value) in state.attributes.iter() {
            if key == UNIT_OF_MEASUREMENT {
                continue;
            }

            let key = if fields.contains_key(key) {
                format!("{key}_")
            } else {
                key.clone()
            };

            match coerce_float(value) {
                Some(number) => fields.insert(key, FieldValue::Float(number)),
                None => fields.insert(format!("{key}_str"), FieldValue::Text(display_value(value))),
            };
        }

        let mut tags = BTreeMap::from([
            (TAG_DOMAIN.to_owned(), state.domain().to_owned()),
            (TAG_ENTITY_ID.to_owned(), state.object_id().to_owned()),
        ]);
        //configured tags take precedence
        tags.extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));

        ExportPoint {
            measurement: self.measurement(state),
            tags,
            fields,
            time,
        }
    }

    fn measurement(&self, state: &EntityState) -> String {
        if let Some(measurement) = &self.override_measurement {
            return measurement.clone();
        }

        state
            .unit_of_measurement()
            .or_else(|| self.default_measurement.clone())
            .unwrap_or_else(|| state.entity_id.to_string())
    }
}

/// Locale independent, surrounding whitespace is ignored. Values that cannot be
/// stored as a float field (NaN, infinity) are treated as text.
fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => parse_float(s),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    fn ts() -> DateTime {
        DateTime::from_iso("2024-05-01T12:00:00Z").unwrap()
    }

    fn state(entity_id: &str, value: &str) -> EntityState {
        EntityState::new(entity_id.parse().unwrap(), value)
    }

    fn fields(entries: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn tags(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn numeric_state_with_unit() {
        let state = state("sensor.temp1", "21.5").with_attribute(UNIT_OF_MEASUREMENT, "°C");

        let point = PointTransformer::default().to_point(&state, ts());

        assert_eq!(point.measurement, "°C");
        assert_eq!(point.tags, tags(&[("domain", "sensor"), ("entity_id", "temp1")]));
        assert_eq!(point.fields, fields(&[("value", FieldValue::Float(21.5))]));
        assert_eq!(point.time, ts());
    }

    #[test]
    fn text_state_without_unit_uses_entity_id() {
        let point = PointTransformer::default().to_point(&state("binary_sensor.door", "on"), ts());

        assert_eq!(point.measurement, "binary_sensor.door");
        assert_eq!(point.fields, fields(&[("state", FieldValue::Text("on".to_owned()))]));
    }

    #[test]
    fn boolean_like_states_are_not_coerced() {
        for raw in ["on", "off", "true", "home"] {
            let point = PointTransformer::default().to_point(&state("switch.fan", raw), ts());

            assert_eq!(point.fields.get("state"), Some(&FieldValue::Text(raw.to_owned())));
        }
    }

    #[test]
    fn numeric_parsing_accepts_exponents_and_whitespace_but_not_nan() {
        let transformer = PointTransformer::default();

        assert_eq!(
            transformer.to_point(&state("sensor.a", "1e3"), ts()).fields.get("value"),
            Some(&FieldValue::Float(1000.0))
        );
        assert_eq!(
            transformer.to_point(&state("sensor.a", " -4 "), ts()).fields.get("value"),
            Some(&FieldValue::Float(-4.0))
        );
        assert_eq!(
            transformer.to_point(&state("sensor.a", "nan"), ts()).fields.get("state"),
            Some(&FieldValue::Text("nan".to_owned()))
        );
        assert_eq!(
            transformer.to_point(&state("sensor.a", "21,5"), ts()).fields.get("state"),
            Some(&FieldValue::Text("21,5".to_owned()))
        );
    }

    #[test]
    fn measurement_resolution_order() {
        let with_unit = state("sensor.power", "5").with_attribute(UNIT_OF_MEASUREMENT, "W");
        let without_unit = state("sensor.power", "5");

        let overriding = PointTransformer {
            override_measurement: Some("home".to_owned()),
            default_measurement: Some("fallback".to_owned()),
            ..Default::default()
        };
        let defaulting = PointTransformer {
            default_measurement: Some("fallback".to_owned()),
            ..Default::default()
        };

        assert_eq!(overriding.to_point(&with_unit, ts()).measurement, "home");
        assert_eq!(defaulting.to_point(&with_unit, ts()).measurement, "W");
        assert_eq!(defaulting.to_point(&without_unit, ts()).measurement, "fallback");
        assert_eq!(
            PointTransformer::default().to_point(&without_unit, ts()).measurement,
            "sensor.power"
        );
    }

    #[test]
    fn empty_unit_falls_through_to_default() {
        let state = state("sensor.power", "5").with_attribute(UNIT_OF_MEASUREMENT, "");
        let transformer = PointTransformer {
            default_measurement: Some("fallback".to_owned()),
            ..Default::default()
        };

        assert_eq!(transformer.to_point(&state, ts()).measurement, "fallback");
    }

    #[test]
    fn configured_tags_override_entity_tags() {
        let transformer = PointTransformer {
            tags: tags(&[("instance", "prod"), ("domain", "custom")]),
            ..Default::default()
        };

        let point = transformer.to_point(&state("sensor.temp1", "1"), ts());

        assert_eq!(
            point.tags,
            tags(&[("domain", "custom"), ("entity_id", "temp1"), ("instance", "prod")])
        );
    }

    #[test]
    fn attributes_are_flattened_with_type_suffixes() {
        let state = state("climate.living_room", "heat")
            .with_attribute("mode", "friendly")
            .with_attribute("level", "3")
            .with_attribute("current_temperature", 20.5)
            .with_attribute("hvac_action", Value::Null)
            .with_attribute("preset_modes", json!(["eco", "comfort"]))
            .with_attribute("child_lock", true)
            .with_attribute(UNIT_OF_MEASUREMENT, "°C");

        let point = PointTransformer::default().to_point(&state, ts());

        assert_eq!(
            point.fields,
            fields(&[
                ("state", FieldValue::Text("heat".to_owned())),
                ("mode_str", FieldValue::Text("friendly".to_owned())),
                ("level", FieldValue::Float(3.0)),
                ("current_temperature", FieldValue::Float(20.5)),
                ("hvac_action_str", FieldValue::Text("null".to_owned())),
                ("preset_modes_str", FieldValue::Text(r#"["eco","comfort"]"#.to_owned())),
                ("child_lock", FieldValue::Float(1.0)),
            ])
        );
    }

    #[test]
    fn attribute_colliding_with_state_field_gets_underscore() {
        let numeric = state("sensor.meter", "7").with_attribute("value", "8");
        let text = state("sensor.meter", "idle").with_attribute("state", "busy");

        let numeric_point = PointTransformer::default().to_point(&numeric, ts());
        let text_point = PointTransformer::default().to_point(&text, ts());

        assert_eq!(
            numeric_point.fields,
            fields(&[("value", FieldValue::Float(7.0)), ("value_", FieldValue::Float(8.0))])
        );
        assert_eq!(
            text_point.fields,
            fields(&[
                ("state", FieldValue::Text("idle".to_owned())),
                ("state__str", FieldValue::Text("busy".to_owned())),
            ])
        );
    }

    #[test]
    fn transformation_is_repeatable() {
        let state = state("sensor.temp1", "21.5")
            .with_attribute("friendly_name", "Temperature")
            .with_attribute("battery", 87);
        let transformer = PointTransformer::default();

        assert_eq!(transformer.to_point(&state, ts()), transformer.to_point(&state, ts()));
    }

    #[test]
    fn restamping_keeps_everything_but_time() {
        let point = PointTransformer::default().to_point(&state("sensor.temp1", "1"), ts());
        let later = DateTime::from_iso("2024-05-01T12:01:00Z").unwrap();

        let restamped = point.at(later);

        assert_eq!(restamped.time, later);
        assert_eq!(restamped.fields, point.fields);
        assert_eq!(restamped.measurement, point.measurement);
    }

    #[test]
    fn serializes_for_diagnostics() {
        let state = state("sensor.temp1", "21.5").with_attribute("mode", "eco");

        let point = PointTransformer::default().to_point(&state, ts());

        assert_json_eq!(
            serde_json::to_value(&point).unwrap(),
            json!({
                "measurement": "sensor.temp1",
                "tags": { "domain": "sensor", "entity_id": "temp1" },
                "fields": { "value": 21.5, "mode_str": "eco" },
                "time": "2024-05-01T12:00:00Z"
            })
        );
    }
}
