//! Avatar parameter encodings for a heart-rate reading
//!
//! Different avatars read the same reading under different names and
//! ranges, so every reading is fanned out into the whole table below.

use rosc::OscType;

use crate::types::HeartRate;

/// A single OSC argument value
#[derive(Debug, Clone, PartialEq)]
pub enum OscValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    String(String),
}

impl From<OscValue> for OscType {
    fn from(value: OscValue) -> Self {
        match value {
            OscValue::Float(f) => OscType::Float(f),
            OscValue::Int(i) => OscType::Int(i),
            OscValue::Bool(b) => OscType::Bool(b),
            OscValue::String(s) => OscType::String(s),
        }
    }
}

impl From<f32> for OscValue {
    fn from(value: f32) -> Self {
        OscValue::Float(value)
    }
}

impl From<i32> for OscValue {
    fn from(value: i32) -> Self {
        OscValue::Int(value)
    }
}

impl From<bool> for OscValue {
    fn from(value: bool) -> Self {
        OscValue::Bool(value)
    }
}

impl From<&str> for OscValue {
    fn from(value: &str) -> Self {
        OscValue::String(value.to_string())
    }
}

/// How a parameter derives its value from the reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// `reading / 127 - 1`
    Centered,
    /// `reading / 255`
    Unit,
    /// The reading itself as an integer
    Raw,
    /// Alternating boolean, one flip per reading
    Toggle,
}

/// One row of the heart-rate parameter table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartRateParam {
    pub name: &'static str,
    pub encoding: Encoding,
}

/// Emission order is fixed
pub const HEART_RATE_PARAMS: [HeartRateParam; 7] = [
    HeartRateParam { name: "Heartrate", encoding: Encoding::Centered },
    HeartRateParam { name: "HeartRateFloat", encoding: Encoding::Centered },
    HeartRateParam { name: "Heartrate2", encoding: Encoding::Unit },
    HeartRateParam { name: "HeartRateFloat01", encoding: Encoding::Unit },
    HeartRateParam { name: "Heartrate3", encoding: Encoding::Raw },
    HeartRateParam { name: "HeartRateInt", encoding: Encoding::Raw },
    HeartRateParam { name: "HeartBeatToggle", encoding: Encoding::Toggle },
];

impl HeartRateParam {
    /// Value of this parameter for `reading`, given the current toggle
    pub fn value(&self, reading: HeartRate, toggle: bool) -> OscValue {
        let bpm = f64::from(reading);
        match self.encoding {
            Encoding::Centered => OscValue::Float((bpm / 127.0 - 1.0) as f32),
            Encoding::Unit => OscValue::Float((bpm / 255.0) as f32),
            Encoding::Raw => OscValue::Int(i32::try_from(reading).unwrap_or(i32::MAX)),
            Encoding::Toggle => OscValue::Bool(toggle),
        }
    }
}
