//! Heart-rate frame decoding
//!
//! Pulsoid pushes JSON text frames shaped like
//! `{"measured_at": 1700000000000, "data": {"heart_rate": 72}}`.
//! Anything else on the socket is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::HeartRate;

/// A decoded heart-rate frame
#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateFrame {
    /// Reading in beats per minute
    pub heart_rate: HeartRate,

    /// Measurement time reported by the service, if any
    pub measured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    measured_at: Option<serde_json::Value>,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    heart_rate: HeartRate,
}

/// Decode one frame
///
/// Returns `Ok(None)` for well-formed JSON that carries no heart-rate
/// reading, and `Err` when the payload is not JSON at all.
pub fn parse_frame(payload: &[u8]) -> Result<Option<HeartRateFrame>> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| Error::ProtocolMalformed {
            message: e.to_string(),
        })?;

    let raw: RawFrame = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(_) => return Ok(None),
    };

    let measured_at = raw
        .measured_at
        .as_ref()
        .and_then(serde_json::Value::as_i64)
        .and_then(DateTime::<Utc>::from_timestamp_millis);

    Ok(Some(HeartRateFrame {
        heart_rate: raw.data.heart_rate,
        measured_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_frame() {
        let frame = parse_frame(br#"{"measured_at":1700000000000,"data":{"heart_rate":72}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame.heart_rate, 72);
        assert_eq!(frame.measured_at.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_frame_without_timestamp() {
        let frame = parse_frame(br#"{"data":{"heart_rate":75}}"#).unwrap().unwrap();
        assert_eq!(frame.heart_rate, 75);
        assert!(frame.measured_at.is_none());
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let frame = parse_frame(br#"{"data":{"heart_rate":0,"battery":80},"extra":true}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame.heart_rate, 0);
    }

    #[test]
    fn test_unexpected_timestamp_type_is_tolerated() {
        let frame = parse_frame(br#"{"measured_at":"yesterday","data":{"heart_rate":60}}"#)
            .unwrap()
            .unwrap();
        assert!(frame.measured_at.is_none());
    }

    #[test]
    fn test_other_shapes_are_not_readings() {
        assert_eq!(parse_frame(br#"{"data":{}}"#).unwrap(), None);
        assert_eq!(parse_frame(br#"{"measured_at":1}"#).unwrap(), None);
        assert_eq!(parse_frame(br#"{"data":{"heart_rate":"72"}}"#).unwrap(), None);
        assert_eq!(parse_frame(br#"{"data":{"heart_rate":-4}}"#).unwrap(), None);
        assert_eq!(parse_frame(br#"{"data":{"heart_rate":72.5}}"#).unwrap(), None);
        assert_eq!(parse_frame(br#"[1,2,3]"#).unwrap(), None);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let err = parse_frame(b"not json {").unwrap_err();
        assert!(matches!(err, Error::ProtocolMalformed { .. }));
    }
}
