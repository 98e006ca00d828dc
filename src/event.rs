//! Device observation events carried on the bus.

use std::collections::BTreeMap;

use serde::Serialize;

/// Measurement name to value. Sorted so that encoded points are stable.
pub type Readings = BTreeMap<String, f64>;

/// One observation from a device.
///
/// Immutable once built. The bus shares a single instance among all
/// subscribers. There is no timestamp here; points are stamped when they
/// are persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEvent {
    source_id: String,
    readings: Readings,
}

impl DeviceEvent {
    pub fn new(source_id: impl Into<String>, readings: Readings) -> Self {
        Self {
            source_id: source_id.into(),
            readings,
        }
    }

    /// Build an event from `(name, value)` pairs.
    pub fn from_pairs<K, I>(source_id: impl Into<String>, pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        let readings = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::new(source_id, readings)
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    pub fn reading(&self, name: &str) -> Option<f64> {
        self.readings.get(name).copied()
    }
}
