//! Capability result types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Results of the capabilities executed so far in one request, keyed by
/// capability name.
pub type PriorResults = BTreeMap<String, CapabilityResult>;

/// Error text used when a capability exceeds its time budget
pub const TIMEOUT_ERROR: &str = "timeout";

/// Outcome of one capability invocation.
///
/// A failed result carries no trust-bearing payload: the only fields allowed
/// in `payload` when `success` is false are diagnostics added through
/// [`CapabilityResult::with_diagnostic`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResult {
    pub capability: String,
    pub success: bool,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CapabilityResult {
    /// Create a successful result with a structured payload
    pub fn success(capability: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            capability: capability.into(),
            success: true,
            payload,
            error: None,
        }
    }

    /// Create a successful result from any JSON value.
    ///
    /// Objects become the payload directly; anything else is wrapped under
    /// the `value` key.
    pub fn from_json(capability: impl Into<String>, value: Value) -> Self {
        let payload = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self::success(capability, payload)
    }

    /// Create a successful result carrying a single text answer
    pub fn text(capability: impl Into<String>, text: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("text".to_string(), Value::String(text.into()));
        Self::success(capability, payload)
    }

    /// Create a declared failure
    pub fn failure(capability: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            success: false,
            payload: Map::new(),
            error: Some(error.into()),
        }
    }

    /// Create the failure recorded when a capability runs out of time
    pub fn timeout(capability: impl Into<String>) -> Self {
        Self::failure(capability, TIMEOUT_ERROR)
    }

    /// Attach a diagnostic field (e.g. the query that failed)
    pub fn with_diagnostic(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// True when this result is the timeout marker
    pub fn is_timeout(&self) -> bool {
        !self.success && self.error.as_deref() == Some(TIMEOUT_ERROR)
    }

    /// Get a string field from a successful payload
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.payload.get(key).and_then(|v| v.as_str())
    }

    /// Get a numeric field from a successful payload.
    ///
    /// Numeric strings are accepted as well since geocoders commonly return
    /// coordinates as text.
    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        if !self.success {
            return None;
        }
        match self.payload.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
