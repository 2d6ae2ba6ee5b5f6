//! Inbound wire codec for station JSON frames
//!
//! The station firmware speaks several frame shapes over the same channel:
//! multi-node reports (children as an array or as an id-keyed map), the
//! legacy single- and dual-node forms, calibration results, and a handful of
//! kiosk housekeeping frames. Decoding dispatches on which keys are present,
//! mirroring how the firmware builds them. A frame that parses as JSON but
//! matches no known shape is a decode failure: the caller drops and logs it
//! without touching any state.

use serde_json::Value;

use crate::session::types::SampleValue;

/// Reporting role announced by the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationMode {
    Parent,
    Child,
}

/// One node's reading inside a multi-node report.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeReading {
    pub id: String,
    pub value: SampleValue,
    pub name: Option<String>,
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Multi-node report: `{mode, children: [...] | {...}}`
    NodeReport {
        mode: Option<StationMode>,
        readings: Vec<NodeReading>,
    },
    /// Single-node form: `{weight: number|null}`
    SingleReading { value: SampleValue },
    /// Dual-node form: `{weight1, weight2}`
    DualReading {
        value1: SampleValue,
        value2: SampleValue,
    },
    /// Calibration outcome for one node: `{calibrate: number|null, scale: id}`
    CalibrationResult { id: String, value: Option<f64> },
    /// Countdown update: `{timerValue: number}`
    TimerUpdate { seconds: i64 },
    /// Announcement text: `{customMessageBefore, customMessageAfter}`
    AnnouncementConfig { before: String, after: String },
    /// Roster list: `{teamNames: [...]}`
    RosterNames { names: Vec<String> },
}

#[derive(Debug)]
pub enum DecodeError {
    Json(serde_json::Error),
    /// Parsed as JSON but matches no known frame shape
    UnknownShape,
    /// A weight field held something other than a number or null
    BadReading(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Json(e) => write!(f, "invalid JSON: {}", e),
            DecodeError::UnknownShape => write!(f, "unrecognized frame shape"),
            DecodeError::BadReading(field) => write!(f, "non-numeric reading in '{}'", field),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Json(e)
    }
}

/// Decode one text frame from the station.
pub fn decode(frame: &str) -> Result<InboundMessage, DecodeError> {
    let value: Value = serde_json::from_str(frame)?;
    let obj = value.as_object().ok_or(DecodeError::UnknownShape)?;

    if obj.contains_key("children") {
        let mode = match obj.get("mode").and_then(Value::as_str) {
            Some("parent") => Some(StationMode::Parent),
            Some("child") => Some(StationMode::Child),
            _ => None,
        };
        let readings = decode_children(&obj["children"])?;
        return Ok(InboundMessage::NodeReport { mode, readings });
    }

    if obj.contains_key("weight1") || obj.contains_key("weight2") {
        return Ok(InboundMessage::DualReading {
            value1: decode_weight(obj.get("weight1"), "weight1")?,
            value2: decode_weight(obj.get("weight2"), "weight2")?,
        });
    }

    if obj.contains_key("weight") {
        return Ok(InboundMessage::SingleReading {
            value: decode_weight(obj.get("weight"), "weight")?,
        });
    }

    if obj.contains_key("calibrate") {
        let id = match obj.get("scale") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => return Err(DecodeError::UnknownShape),
        };
        let value = match &obj["calibrate"] {
            Value::Number(n) => n.as_f64(),
            Value::Null => None,
            _ => return Err(DecodeError::BadReading("calibrate".to_string())),
        };
        return Ok(InboundMessage::CalibrationResult { id, value });
    }

    if let Some(timer) = obj.get("timerValue") {
        let seconds = timer.as_i64().ok_or_else(|| {
            DecodeError::BadReading("timerValue".to_string())
        })?;
        return Ok(InboundMessage::TimerUpdate { seconds });
    }

    if obj.contains_key("customMessageBefore") || obj.contains_key("customMessageAfter") {
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        return Ok(InboundMessage::AnnouncementConfig {
            before: text("customMessageBefore"),
            after: text("customMessageAfter"),
        });
    }

    if let Some(names) = obj.get("teamNames") {
        let names = names
            .as_array()
            .ok_or(DecodeError::UnknownShape)?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        return Ok(InboundMessage::RosterNames { names });
    }

    Err(DecodeError::UnknownShape)
}

/// The firmware has sent children both as an array of `{id, weight, name?}`
/// objects and as an id-keyed map of bare weights or `{weight, name?}`.
fn decode_children(children: &Value) -> Result<Vec<NodeReading>, DecodeError> {
    let mut readings = Vec::new();

    match children {
        Value::Array(entries) => {
            for entry in entries {
                let obj = entry.as_object().ok_or(DecodeError::UnknownShape)?;
                let id = match obj.get("id") {
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::String(s)) => s.clone(),
                    _ => return Err(DecodeError::UnknownShape),
                };
                readings.push(NodeReading {
                    id,
                    value: decode_weight(obj.get("weight"), "weight")?,
                    name: obj.get("name").and_then(Value::as_str).map(str::to_string),
                });
            }
        }
        Value::Object(map) => {
            for (id, entry) in map {
                let (value, name) = match entry {
                    Value::Object(inner) => (
                        decode_weight(inner.get("weight"), "weight")?,
                        inner.get("name").and_then(Value::as_str).map(str::to_string),
                    ),
                    other => (decode_weight(Some(other), id)?, None),
                };
                readings.push(NodeReading {
                    id: id.clone(),
                    value,
                    name,
                });
            }
        }
        _ => return Err(DecodeError::UnknownShape),
    }

    Ok(readings)
}

fn decode_weight(value: Option<&Value>, field: &str) -> Result<SampleValue, DecodeError> {
    match value {
        None | Some(Value::Null) => Ok(SampleValue::Missing),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v.is_finite() => Ok(SampleValue::Present(v)),
            _ => Err(DecodeError::BadReading(field.to_string())),
        },
        Some(_) => Err(DecodeError::BadReading(field.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_children_array_form() {
        let msg = decode(
            r#"{"mode":"parent","children":[{"id":1,"weight":552.5,"name":"left"},{"id":2,"weight":null}]}"#,
        )
        .unwrap();

        match msg {
            InboundMessage::NodeReport { mode, readings } => {
                assert_eq!(mode, Some(StationMode::Parent));
                assert_eq!(readings.len(), 2);
                assert_eq!(readings[0].id, "1");
                assert_eq!(readings[0].value, SampleValue::Present(552.5));
                assert_eq!(readings[0].name.as_deref(), Some("left"));
                assert_eq!(readings[1].value, SampleValue::Missing);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_children_map_form() {
        let msg =
            decode(r#"{"children":{"3":541.0,"4":{"weight":560.2,"name":"rear"}}}"#).unwrap();

        match msg {
            InboundMessage::NodeReport { mode, readings } => {
                assert_eq!(mode, None);
                let rear = readings.iter().find(|r| r.id == "4").unwrap();
                assert_eq!(rear.value, SampleValue::Present(560.2));
                assert_eq!(rear.name.as_deref(), Some("rear"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_single_and_dual_forms() {
        assert_eq!(
            decode(r#"{"weight":null}"#).unwrap(),
            InboundMessage::SingleReading {
                value: SampleValue::Missing
            }
        );
        assert_eq!(
            decode(r#"{"weight1":12.5,"weight2":null}"#).unwrap(),
            InboundMessage::DualReading {
                value1: SampleValue::Present(12.5),
                value2: SampleValue::Missing,
            }
        );
    }

    #[test]
    fn test_decode_calibration_and_housekeeping() {
        assert_eq!(
            decode(r#"{"calibrate":212.42,"scale":2}"#).unwrap(),
            InboundMessage::CalibrationResult {
                id: "2".to_string(),
                value: Some(212.42),
            }
        );
        assert_eq!(
            decode(r#"{"calibrate":null,"scale":1}"#).unwrap(),
            InboundMessage::CalibrationResult {
                id: "1".to_string(),
                value: None,
            }
        );
        assert_eq!(
            decode(r#"{"timerValue":45}"#).unwrap(),
            InboundMessage::TimerUpdate { seconds: 45 }
        );
        assert_eq!(
            decode(r#"{"teamNames":["red","blue"]}"#).unwrap(),
            InboundMessage::RosterNames {
                names: vec!["red".to_string(), "blue".to_string()],
            }
        );
    }

    #[test]
    fn test_decode_failures_are_typed() {
        assert!(matches!(decode("not json"), Err(DecodeError::Json(_))));
        assert!(matches!(
            decode(r#"{"unrelated":true}"#),
            Err(DecodeError::UnknownShape)
        ));
        assert!(matches!(decode(r#"[1,2,3]"#), Err(DecodeError::UnknownShape)));
        // A reading must be a number or null, never a string
        assert!(matches!(
            decode(r#"{"weight":"heavy"}"#),
            Err(DecodeError::BadReading(_))
        ));
    }
}
