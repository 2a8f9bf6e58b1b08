//! Call parameters and their wire encoding.
//!
//! A parameter is either absent (never sent), an explicit `null`, or a value.
//! Absent parameters let domain methods list every field the server knows
//! about while only sending the ones the caller actually specified.

use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::io::Write;

use crate::{config::PayloadConfig, Error, Result};

/// A single call parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Param {
    /// Not specified; omitted from the request body.
    #[default]
    Absent,
    /// Sent as an explicit JSON `null`.
    Null,
    Value(Value),
}

impl Param {
    pub fn is_absent(&self) -> bool {
        matches!(self, Param::Absent)
    }

    fn into_json(self) -> Option<Value> {
        match self {
            Param::Absent => None,
            Param::Null => Some(Value::Null),
            Param::Value(v) => Some(v),
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Param::Value(v.into()),
            None => Param::Absent,
        }
    }
}

/// Ordered parameters of a remote call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(IndexMap<String, Param>);

impl Params {
    pub fn new() -> Params {
        Params::default()
    }

    /// Sets `name` to `value`. `Value::Null` is sent as an explicit null.
    pub fn insert(mut self, name: impl Into<String>, value: impl Into<Value>) -> Params {
        let value = match value.into() {
            Value::Null => Param::Null,
            v => Param::Value(v),
        };
        self.0.insert(name.into(), value);
        self
    }

    /// Sets `name` only when `value` is `Some`.
    pub fn insert_opt<T: Into<Value>>(mut self, name: impl Into<String>, value: Option<T>) -> Params {
        self.0.insert(name.into(), Param::from(value));
        self
    }

    pub fn insert_param(mut self, name: impl Into<String>, param: Param) -> Params {
        self.0.insert(name.into(), param);
        self
    }

    /// Marks `name` as absent, so it is never sent.
    pub fn remove(mut self, name: &str) -> Params {
        if let Some(param) = self.0.get_mut(name) {
            *param = Param::Absent;
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.0.get(name)
    }

    pub fn is_specified(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(|p| !p.is_absent())
    }

    /// JSON object of every parameter that is not absent.
    pub fn to_json(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter_map(|(name, param)| param.clone().into_json().map(|v| (name.clone(), v)))
            .collect()
    }

    /// Rough in-memory footprint of the parameters, absent ones included.
    pub fn estimated_size(&self) -> usize {
        self.0
            .iter()
            .map(|(name, param)| {
                name.len()
                    + match param {
                        Param::Value(v) => estimated_size(v),
                        Param::Absent | Param::Null => 0,
                    }
            })
            .sum()
    }

    /// Encodes the parameters as a request body, compressing large payloads.
    pub fn encode(&self, limits: &PayloadConfig) -> Result<Payload> {
        let size = self.estimated_size();
        if size > limits.max_uncompressed_size {
            return Err(Error::PayloadTooLarge {
                size,
                limit: limits.max_uncompressed_size,
            });
        }

        let text = serde_json::to_string(&self.to_json())?;
        let (body, compressed) = if text.len() > limits.compress_threshold {
            (gzip(text.as_bytes())?, true)
        } else {
            (text.into_bytes(), false)
        };

        if body.len() > limits.max_compressed_size {
            return Err(Error::PayloadTooLarge {
                size: body.len(),
                limit: limits.max_compressed_size,
            });
        }

        Ok(Payload {
            body: Bytes::from(body),
            compressed,
        })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Params::new(), |params, (k, v)| params.insert(k, v))
    }
}

/// An encoded request body.
#[derive(Debug, Clone)]
pub struct Payload {
    pub body: Bytes,
    /// Whether `body` is gzip-compressed.
    pub compressed: bool,
}

fn estimated_size(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 8,
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().map(estimated_size).sum(),
        Value::Object(map) => map.iter().map(|(k, v)| k.len() + estimated_size(v)).sum(),
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
