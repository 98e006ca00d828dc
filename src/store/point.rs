//! Points: the unit written to the time-series store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::DeviceEvent;

/// Series name for device readings.
pub const DEVICE_MEASUREMENT: &str = "device_data";

/// Tag key carrying the event's source id.
pub const DEVICE_TAG: &str = "device";

/// Reasons a point can not be built or encoded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PointError {
    #[error("Measurement name is empty")]
    EmptyMeasurement,

    #[error("Tag key is empty")]
    EmptyTagKey,

    #[error("Tag {key} has an empty value")]
    EmptyTagValue { key: String },

    #[error("Point has no fields")]
    NoFields,

    #[error("Field key is empty")]
    EmptyFieldKey,

    #[error("Field {key} is not a finite number: {value}")]
    NonFiniteField { key: String, value: f64 },

    #[error("Line break in {0}")]
    LineBreak(String),

    #[error("Timestamp {0} is outside the nanosecond range")]
    TimestampOutOfRange(DateTime<Utc>),
}

/// A validated, timestamped, tagged record.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, f64>,
    timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(
        measurement: impl Into<String>,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, PointError> {
        let measurement = measurement.into();
        if measurement.is_empty() {
            return Err(PointError::EmptyMeasurement);
        }
        reject_line_break(&measurement)?;

        for (key, value) in &tags {
            if key.is_empty() {
                return Err(PointError::EmptyTagKey);
            }
            if value.is_empty() {
                return Err(PointError::EmptyTagValue { key: key.clone() });
            }
            reject_line_break(key)?;
            reject_line_break(value)?;
        }

        if fields.is_empty() {
            return Err(PointError::NoFields);
        }
        for (key, value) in &fields {
            if key.is_empty() {
                return Err(PointError::EmptyFieldKey);
            }
            reject_line_break(key)?;
            if !value.is_finite() {
                return Err(PointError::NonFiniteField {
                    key: key.clone(),
                    value: *value,
                });
            }
        }

        Ok(Self {
            measurement,
            tags,
            fields,
            timestamp,
        })
    }

    /// `device_data,device=<source_id> <readings...> <timestamp>`
    pub fn from_event(event: &DeviceEvent, timestamp: DateTime<Utc>) -> Result<Self, PointError> {
        let tags = BTreeMap::from([(DEVICE_TAG.to_string(), event.source_id().to_string())]);
        Self::new(DEVICE_MEASUREMENT, tags, event.readings().clone(), timestamp)
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, f64> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

fn reject_line_break(s: &str) -> Result<(), PointError> {
    if s.contains(['\n', '\r']) {
        return Err(PointError::LineBreak(s.escape_default().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_from_event_tags_device_and_copies_fields() {
        let event = DeviceEvent::from_pairs("A1", [("temp", 23.5)]);
        let point = Point::from_event(&event, ts()).unwrap();
        assert_eq!(point.measurement(), DEVICE_MEASUREMENT);
        assert_eq!(point.tag(DEVICE_TAG), Some("A1"));
        assert_eq!(point.field("temp"), Some(23.5));
        assert_eq!(point.timestamp(), ts());
    }

    #[test]
    fn test_event_without_readings_is_rejected() {
        let event = DeviceEvent::from_pairs("A1", Vec::<(&str, f64)>::new());
        assert_eq!(Point::from_event(&event, ts()), Err(PointError::NoFields));
    }

    #[test]
    fn test_non_finite_field_is_rejected() {
        let event = DeviceEvent::from_pairs("A1", [("temp", f64::NAN)]);
        assert!(matches!(
            Point::from_event(&event, ts()),
            Err(PointError::NonFiniteField { .. })
        ));

        let event = DeviceEvent::from_pairs("A1", [("temp", f64::INFINITY)]);
        assert!(Point::from_event(&event, ts()).is_err());
    }

    #[test]
    fn test_empty_source_id_is_rejected() {
        let event = DeviceEvent::from_pairs("", [("temp", 1.0)]);
        assert_eq!(
            Point::from_event(&event, ts()),
            Err(PointError::EmptyTagValue {
                key: DEVICE_TAG.to_string()
            })
        );
    }

    #[test]
    fn test_line_break_is_rejected() {
        let event = DeviceEvent::from_pairs("A1\nB2", [("temp", 1.0)]);
        assert!(matches!(
            Point::from_event(&event, ts()),
            Err(PointError::LineBreak(_))
        ));
    }

    #[test]
    fn test_empty_keys_rejected() {
        let fields = BTreeMap::from([(String::new(), 1.0)]);
        assert_eq!(
            Point::new("m", BTreeMap::new(), fields, ts()),
            Err(PointError::EmptyFieldKey)
        );
        let tags = BTreeMap::from([(String::new(), "v".to_string())]);
        let fields = BTreeMap::from([("f".to_string(), 1.0)]);
        assert_eq!(Point::new("m", tags, fields.clone(), ts()), Err(PointError::EmptyTagKey));
        assert_eq!(
            Point::new("", BTreeMap::new(), fields, ts()),
            Err(PointError::EmptyMeasurement)
        );
    }
}
