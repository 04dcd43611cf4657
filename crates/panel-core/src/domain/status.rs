//! Status cache mirrored from the device.
//!
//! The device reports its state as a flat JSON object of key/value pairs.  It
//! is the source of truth; [`StatusMap`] is only the client's copy.  Values
//! are kept as JSON values so that a bulk update posted back to `/update`
//! carries numbers as numbers and strings as strings, exactly as received.
//!
//! Booleans are normalised to `0`/`1` on ingest because the device (and the
//! checkbox controls bound to these keys) only understand numeric flags.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Marker key carried by every JSON push to say which config group it
/// belongs to.
pub const CFG_GROUP_KEY: &str = "cfgGroup";

/// Value of [`CFG_GROUP_KEY`] that identifies a plain status push.
pub const STATUS_GROUP: &str = "-1";

/// Key appended to the body of a bulk `/update` post.
pub const ACTION_KEY: &str = "action";

/// Ordered mapping from field key to value.
///
/// Insertion order follows the order of the JSON the device sent.  The
/// config table format depends on it (see [`crate::domain::table`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusMap(Map<String, Value>);

impl StatusMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if `text` is not a JSON object.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let object: Map<String, Value> = serde_json::from_str(text)?;
        Ok(Self::from_object(object))
    }

    /// Wraps an already-parsed JSON object, normalising booleans to 0/1.
    pub fn from_object(object: Map<String, Value>) -> Self {
        let normalised = object
            .into_iter()
            .map(|(key, value)| (key, normalise(value)))
            .collect();
        Self(normalised)
    }

    /// Inserts or replaces a value.  An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), normalise(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the value rendered the way a UI control would display it.
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.0.get(key).map(value_to_text)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Removes the [`CFG_GROUP_KEY`] marker and returns it as text.
    pub fn take_group(&mut self) -> Option<String> {
        self.remove(CFG_GROUP_KEY).map(|v| value_to_text(&v))
    }

    /// Copies every entry of `other` into `self`, replacing existing values.
    pub fn merge(&mut self, other: &StatusMap) {
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Builds the JSON body of a bulk `/update` post: every cached entry plus
    /// an `action` field naming what the device should do with them.
    ///
    /// # Example
    ///
    /// ```rust
    /// use panel_core::StatusMap;
    ///
    /// let mut status = StatusMap::new();
    /// status.insert("a", 1);
    /// status.insert("b", "x");
    /// let body = status.to_update_body("save");
    /// assert_eq!(body.to_string(), r#"{"a":1,"b":"x","action":"save"}"#);
    /// ```
    pub fn to_update_body(&self, action: &str) -> Value {
        let mut body = self.0.clone();
        body.insert(ACTION_KEY.to_string(), Value::String(action.to_string()));
        Value::Object(body)
    }
}

impl FromIterator<(String, Value)> for StatusMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::from_object(iter.into_iter().collect())
    }
}

/// Renders a JSON value as the string a control shows.
///
/// Strings are unquoted, numbers keep their JSON spelling, booleans become
/// `1`/`0` and null becomes the empty string.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => flag(*b).to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn normalise(value: Value) -> Value {
    match value {
        Value::Bool(b) => Value::from(flag(b)),
        other => other,
    }
}

fn flag(b: bool) -> u8 {
    u8::from(b)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
