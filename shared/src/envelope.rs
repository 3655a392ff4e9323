//! Request/response envelope for lobby and persistence traffic
//!
//! Requests are `{collection, action, data}`. Responses are `{ok, ...}` with
//! `error` present when `ok` is false; any other fields are carried through
//! untouched so older peers tolerate newer responses.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub collection: String,
    pub action: String,
    #[serde(default = "empty_object")]
    pub data: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Request {
    pub fn new(collection: &str, action: &str, data: Value) -> Self {
        Self {
            collection: collection.to_string(),
            action: action.to_string(),
            data,
        }
    }

    /// Deserializes the `data` object into a typed payload
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
            fields: Map::new(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
            fields: Map::new(),
        }
    }

    /// Adds a field to the response body
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(Value::as_u64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// The failure reason, or a placeholder when the peer didn't give one
    pub fn reason(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}
