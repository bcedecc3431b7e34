//! InfluxDB line protocol encoding.
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=1.5,field2="text" 1714564800000000000
//! ```

use crate::export::{ExportPoint, FieldValue};

/// One line per point, each terminated by a newline.
pub fn encode(points: &[ExportPoint]) -> String {
    let mut body = String::new();

    for point in points {
        encode_point(point, &mut body);
        body.push('\n');
    }

    body
}

fn encode_point(point: &ExportPoint, line: &mut String) {
    line.push_str(&escape_measurement(&point.measurement));

    //empty tag values are rejected by InfluxDB
    for (key, value) in point.tags.iter().filter(|(_, v)| !v.is_empty()) {
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');

    for (i, (key, value)) in point.fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&field_value(value));
    }

    if let Some(nanos) = point.time.timestamp_nanos() {
        line.push(' ');
        line.push_str(&nanos.to_string());
    }
}

fn field_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => v.to_string(),
        FieldValue::Text(v) => format!(
            "\"{}\"",
            v.replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\n', "\\n")
        ),
    }
}

fn escape_measurement(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(' ', "\\ ")
        .replace('\n', "\\n")
}

/// Tag keys, tag values and field keys share the same rules.
fn escape_key(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::core::time::DateTime;

    fn point(measurement: &str, tags: &[(&str, &str)], fields: &[(&str, FieldValue)]) -> ExportPoint {
        ExportPoint {
            measurement: measurement.to_owned(),
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            time: DateTime::from_iso("2024-05-01T12:00:00Z").unwrap(),
        }
    }

    #[test]
    fn encodes_numeric_point() {
        let point = point(
            "°C",
            &[("domain", "sensor"), ("entity_id", "temp1")],
            &[("value", FieldValue::Float(21.5))],
        );

        assert_eq!(
            encode(&[point]),
            "°C,domain=sensor,entity_id=temp1 value=21.5 1714564800000000000\n"
        );
    }

    #[test]
    fn encodes_text_fields_quoted() {
        let point = point(
            "binary_sensor.door",
            &[("domain", "binary_sensor"), ("entity_id", "door")],
            &[
                ("state", FieldValue::Text("on".to_owned())),
                ("friendly_name_str", FieldValue::Text("Front \"Door\" \\ 1".to_owned())),
            ],
        );

        assert_eq!(
            encode(&[point]),
            "binary_sensor.door,domain=binary_sensor,entity_id=door \
             friendly_name_str=\"Front \\\"Door\\\" \\\\ 1\",state=\"on\" 1714564800000000000\n"
        );
    }

    #[test]
    fn whole_numbers_have_no_fraction() {
        let point = point("W", &[], &[("value", FieldValue::Float(3.0))]);

        assert_eq!(encode(&[point]), "W value=3 1714564800000000000\n");
    }

    #[test]
    fn escapes_special_characters() {
        let point = point(
            "living room,main",
            &[("room name", "a=b,c")],
            &[("max temp", FieldValue::Float(1.0))],
        );

        assert_eq!(
            encode(&[point]),
            "living\\ room\\,main,room\\ name=a\\=b\\,c max\\ temp=1 1714564800000000000\n"
        );
    }

    #[test]
    fn newlines_never_split_a_point() {
        let point = point(
            "media_player.tv",
            &[("room\nname", "living\\room")],
            &[("media_title_str", FieldValue::Text("Line one\nLine two".to_owned()))],
        );

        let body = encode(&[point]);

        assert_eq!(body.lines().count(), 1);
        assert_eq!(
            body,
            "media_player.tv,room\\nname=living\\\\room media_title_str=\"Line one\\nLine two\" 1714564800000000000\n"
        );
    }

    #[test]
    fn omits_empty_tag_values() {
        let point = point("W", &[("domain", "sensor"), ("site", "")], &[("value", FieldValue::Float(1.5))]);

        assert_eq!(encode(&[point]), "W,domain=sensor value=1.5 1714564800000000000\n");
    }

    #[test]
    fn encodes_one_line_per_point() {
        let mut second = point("W", &[], &[("value", FieldValue::Float(2.0))]);
        second.time = DateTime::from_iso("2024-05-01T12:00:01Z").unwrap();
        let points = vec![point("W", &[], &[("value", FieldValue::Float(1.0))]), second];

        assert_eq!(
            encode(&points),
            "W value=1 1714564800000000000\nW value=2 1714564801000000000\n"
        );
    }

    #[test]
    fn fields_are_written_in_key_order() {
        let fields = BTreeMap::from([
            ("value".to_owned(), FieldValue::Float(1.0)),
            ("battery".to_owned(), FieldValue::Float(90.0)),
        ]);
        let point = ExportPoint {
            fields,
            ..point("W", &[], &[])
        };

        assert_eq!(encode(&[point]), "W battery=90,value=1 1714564800000000000\n");
    }
}
