//! Typed access to request parameters.
//!
//! Values arrive either as JSON (typed) or from query strings and forms
//! (always strings), so every reader accepts both shapes.

use std::str::FromStr;

use serde_json::{Map, Value};

use crate::router::RouterError;
use community_core::profile::NewOption;
use community_core::CommunityError;

/// Representation detail requested through `context`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestContext {
    #[default]
    View,
    Edit,
}

impl RestContext {
    pub fn as_str(self) -> &'static str {
        match self {
            RestContext::View => "view",
            RestContext::Edit => "edit",
        }
    }
}

fn invalid(param: &str, message: impl Into<String>) -> RouterError {
    RouterError::InvalidParam {
        param: param.to_string(),
        message: message.into(),
    }
}

/// Borrowing reader over a parameter map.
#[derive(Debug, Clone, Copy)]
pub struct ParamReader<'a> {
    params: &'a Map<String, Value>,
}

impl<'a> ParamReader<'a> {
    pub fn new(params: &'a Map<String, Value>) -> Self {
        Self { params }
    }

    /// Raw value of a parameter. `null` counts as absent.
    pub fn raw(&self, key: &str) -> Option<&'a Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    pub fn string(&self, key: &str) -> Result<Option<String>, RouterError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(invalid(key, "must be a string")),
        }
    }

    pub fn u64(&self, key: &str) -> Result<Option<u64>, RouterError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| invalid(key, "must be a non-negative integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| invalid(key, "must be a non-negative integer")),
            Some(_) => Err(invalid(key, "must be a non-negative integer")),
        }
    }

    pub fn u32(&self, key: &str) -> Result<Option<u32>, RouterError> {
        match self.u64(key)? {
            None => Ok(None),
            Some(v) => u32::try_from(v)
                .map(Some)
                .map_err(|_| invalid(key, "is out of range")),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>, RouterError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::Number(n)) => match n.as_u64() {
                Some(0) => Ok(Some(false)),
                Some(1) => Ok(Some(true)),
                _ => Err(invalid(key, "must be a boolean")),
            },
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" | "" => Ok(Some(false)),
                _ => Err(invalid(key, "must be a boolean")),
            },
            Some(_) => Err(invalid(key, "must be a boolean")),
        }
    }

    /// List of ids given as an array, a comma-separated string or a single
    /// number. An empty list reads as absent.
    pub fn ids(&self, key: &str) -> Result<Option<Vec<u64>>, RouterError> {
        let parse_one = |v: &Value| -> Result<Vec<u64>, RouterError> {
            match v {
                Value::Number(n) => n
                    .as_u64()
                    .map(|id| vec![id])
                    .ok_or_else(|| invalid(key, "must be a list of ids")),
                Value::String(s) => s
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| {
                        part.parse::<u64>()
                            .map_err(|_| invalid(key, "must be a list of ids"))
                    })
                    .collect(),
                _ => Err(invalid(key, "must be a list of ids")),
            }
        };

        let ids = match self.raw(key) {
            None => return Ok(None),
            Some(Value::Array(items)) => {
                let mut ids = Vec::new();
                for item in items {
                    ids.extend(parse_one(item)?);
                }
                ids
            }
            Some(v) => parse_one(v)?,
        };
        Ok(if ids.is_empty() { None } else { Some(ids) })
    }

    /// Parses a string-valued enum through its `FromStr`.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, RouterError>
    where
        T: FromStr<Err = CommunityError>,
    {
        match self.string(key)? {
            None => Ok(None),
            Some(s) => s
                .parse::<T>()
                .map(Some)
                .map_err(|e| invalid(key, e.to_string())),
        }
    }

    /// `context`, or `default` when absent.
    pub fn context(&self, default: RestContext) -> Result<RestContext, RouterError> {
        match self.string("context")?.as_deref() {
            None | Some("") => Ok(default),
            Some("view") => Ok(RestContext::View),
            Some("edit") => Ok(RestContext::Edit),
            Some(other) => Err(invalid(
                "context",
                format!("'{}' is not one of view, edit", other),
            )),
        }
    }

    /// Choice options given as names or `{name, is_default_option}` objects.
    pub fn options(&self, key: &str) -> Result<Option<Vec<NewOption>>, RouterError> {
        let items = match self.raw(key) {
            None => return Ok(None),
            Some(Value::Array(items)) => items.clone(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
            Some(_) => return Err(invalid(key, "must be a list of options")),
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok(NewOption::new(name)),
                Value::Object(_) => serde_json::from_value::<NewOption>(item)
                    .map_err(|e| invalid(key, e.to_string())),
                _ => Err(invalid(key, "must be a list of options")),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}
