//! InfluxDB line protocol encoding.
//!
//! `measurement[,tag=value...] field=value[,field=value...] timestamp`
//!
//! Tags and fields are emitted in sorted key order. Float fields use the
//! shortest representation that round-trips.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use super::point::{Point, PointError};

/// Timestamp resolution of written points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Precision {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown precision {0:?} (expected ns, u, ms, s, m or h)")]
pub struct ParsePrecisionError(String);

impl Precision {
    /// Value of the `precision` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "u",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
        }
    }
}

impl FromStr for Precision {
    type Err = ParsePrecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ns" | "n" => Ok(Self::Nanoseconds),
            "u" | "us" | "µs" => Ok(Self::Microseconds),
            "ms" => Ok(Self::Milliseconds),
            "s" => Ok(Self::Seconds),
            "m" => Ok(Self::Minutes),
            "h" => Ok(Self::Hours),
            other => Err(ParsePrecisionError(other.to_string())),
        }
    }
}

/// Render one point as a single line (no trailing newline).
pub fn encode(point: &Point, precision: Precision) -> Result<String, PointError> {
    let mut line = String::with_capacity(64);
    escape_into(&mut line, point.measurement(), &[',', ' ']);

    for (key, value) in point.tags() {
        line.push(',');
        escape_into(&mut line, key, &[',', '=', ' ']);
        line.push('=');
        escape_into(&mut line, value, &[',', '=', ' ']);
    }

    let mut separator = ' ';
    for (key, value) in point.fields() {
        line.push(separator);
        separator = ',';
        escape_into(&mut line, key, &[',', '=', ' ']);
        // Writing to a String can not fail.
        let _ = write!(line, "={value}");
    }

    let _ = write!(line, " {}", timestamp(point, precision)?);
    Ok(line)
}

fn timestamp(point: &Point, precision: Precision) -> Result<i64, PointError> {
    let ts = point.timestamp();
    let value = match precision {
        Precision::Nanoseconds => ts
            .timestamp_nanos_opt()
            .ok_or(PointError::TimestampOutOfRange(ts))?,
        Precision::Microseconds => ts.timestamp_micros(),
        Precision::Milliseconds => ts.timestamp_millis(),
        Precision::Seconds => ts.timestamp(),
        Precision::Minutes => ts.timestamp() / 60,
        Precision::Hours => ts.timestamp() / 3600,
    };
    Ok(value)
}

fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}
