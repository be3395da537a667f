use crate::prelude::*;

use async_trait::async_trait;
use std::collections::HashMap;

pub mod mppsolar;
pub mod scripted;
pub mod serial;

pub use mppsolar::MppSolarTool;
pub use scripted::Scripted;
pub use serial::SerialPi30;

// Value {{{
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Value::Flag(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            },
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    fn from_json(json: &serde_json::Value) -> Option<Value> {
        use serde_json::Value as J;

        match json {
            J::Number(n) => n.as_f64().map(Value::Number),
            J::String(s) => Some(Value::Text(s.clone())),
            J::Bool(b) => Some(Value::Flag(*b)),
            // mpp-solar sometimes reports [value, unit]
            J::Array(items) => items.first().and_then(Value::from_json),
            _ => None,
        }
    }
} // }}}

// Reading {{{
/// One decoded response: field name to value. Lives for a single poll cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reading {
    fields: HashMap<String, Value>,
    error: Option<String>,
}

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_owned());
        self
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_owned(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_flag)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// The connection-error indicator carried by the payload, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds a reading from a flat JSON object. An `error` key (any case)
    /// becomes the error indicator rather than a field.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| anyhow!("expected a JSON object, got {}", json))?;

        let mut r = Reading::new();
        for (key, value) in object {
            if key.eq_ignore_ascii_case("error") {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                r.error = Some(text);
                continue;
            }
            if let Some(v) = Value::from_json(value) {
                r.insert(key, v);
            }
        }

        Ok(r)
    }
} // }}}

/// The reading query interface: send one command string to the device and
/// get its decoded response, or fail.
#[async_trait]
pub trait Protocol: Send {
    async fn execute(&mut self, command: &str) -> Result<Reading>;
}
