//! Request utilities for HTTP endpoints.

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, CONTENT_TYPE};
use hyper::{Method, Response};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time;

use crate::context::RequestContext;
use crate::router::RouterError;
use community_core::CommunityError;

use super::params::ParamReader;
use super::response::success_response;

/// Type alias for matchit parameters with explicit lifetimes
pub type MatchitParams<'a, 'b> = matchit::Params<'a, 'b>;

/// A routed request with its body collected and its caller resolved.
#[derive(Debug)]
pub struct RestRequest {
    pub method: Method,
    pub headers: HeaderMap,
    /// Decoded query string
    pub query: Map<String, Value>,
    pub body: Bytes,
    pub context: RequestContext,
}

impl RestRequest {
    /// Reader over the query string only.
    pub fn query(&self) -> ParamReader<'_> {
        ParamReader::new(&self.query)
    }

    /// Media type of the body without parameters, lower-cased.
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
            })
    }

    /// Query parameters with body parameters layered on top.
    ///
    /// JSON and `application/x-www-form-urlencoded` bodies are decoded;
    /// other media types contribute nothing.
    pub fn params(&self) -> Result<Map<String, Value>, RouterError> {
        let mut merged = self.query.clone();
        if self.body.is_empty() {
            return Ok(merged);
        }

        let body = match self.content_type().as_deref() {
            Some("application/json") | None => parse_json_body(&self.body)?,
            Some("application/x-www-form-urlencoded") => {
                let text = std::str::from_utf8(&self.body).map_err(|e| {
                    RouterError::BadRequest(format!("Form body is not UTF-8: {}", e))
                })?;
                parse_query_params(Some(text))
            }
            Some(_) => Map::new(),
        };
        merged.extend(body);
        Ok(merged)
    }
}

fn parse_json_body(body: &[u8]) -> Result<Map<String, Value>, RouterError> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RouterError::BadRequest(
            "Request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(RouterError::BadRequest(format!(
            "Failed to parse request: {}",
            e
        ))),
    }
}

/// Helper function to read request body with timeout and a size cap
pub async fn read_request_body_with_timeout<B>(
    body: B,
    timeout_ms: u64,
    limit: usize,
) -> Result<Bytes, RouterError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let timeout_duration = time::Duration::from_millis(timeout_ms);
    let body = time::timeout(timeout_duration, Limited::new(body, limit).collect())
        .await
        .map_err(|_| RouterError::Timeout)?
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                RouterError::PayloadTooLarge { limit }
            } else {
                RouterError::InternalError(format!("Failed to read request body: {}", e))
            }
        })?;
    Ok(body.to_bytes())
}

/// Map CommunityError to appropriate RouterError
pub fn map_core_error_to_router_error(e: CommunityError) -> RouterError {
    match e {
        CommunityError::MemberNotFound { .. } => RouterError::InvalidMember,
        CommunityError::FieldNotFound { .. } => RouterError::InvalidId,
        CommunityError::FieldGroupNotFound { .. } => RouterError::InvalidParam {
            param: "group_id".to_string(),
            message: e.to_string(),
        },
        CommunityError::InvalidFieldType { .. } => RouterError::InvalidParam {
            param: "type".to_string(),
            message: e.to_string(),
        },
        CommunityError::InvalidValue { param, message } => {
            RouterError::InvalidParam { param, message }
        }
        CommunityError::FieldNotDeletable { .. } => RouterError::CannotDelete,
        CommunityError::MissingAvatarFile => RouterError::MissingFile,
        CommunityError::AvatarTooLarge { .. } | CommunityError::UnsupportedImageType { .. } => {
            RouterError::UploadFailed(e.to_string())
        }
        CommunityError::NoUploadedAvatar { .. } => RouterError::NoUploadedAvatar,
        CommunityError::FieldChanged { .. } => RouterError::Conflict(e.to_string()),
        _ => {
            tracing::error!("Community store failure: {}", e);
            RouterError::InternalError(e.to_string())
        }
    }
}

/// Helper to build HTTP response with proper error handling
pub fn build_response(status: u16, json: Vec<u8>) -> Result<Response<Bytes>, RouterError> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Bytes::from(json))
        .map_err(|e| RouterError::InternalError(format!("Failed to build response: {}", e)))
}

/// Wraps `data` in the success envelope and builds the response.
pub fn json_response<T: Serialize>(status: u16, data: T) -> Result<Response<Bytes>, RouterError> {
    let json = serde_json::to_vec(&success_response(data))
        .map_err(|e| RouterError::InternalError(format!("Failed to serialize response: {}", e)))?;
    build_response(status, json)
}

/// Numeric path parameter. A malformed id resolves nothing, so it is
/// reported with `not_found`.
pub fn path_id(
    params: &MatchitParams<'_, '_>,
    name: &str,
    not_found: RouterError,
) -> Result<u64, RouterError> {
    params
        .get(name)
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or(not_found)
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Parse query parameters from URL query string.
///
/// `key[]=a&key[]=b` collects into an array; otherwise the last occurrence
/// of a key wins.
pub fn parse_query_params(query_str: Option<&str>) -> Map<String, Value> {
    let mut params = Map::new();
    let Some(query_str) = query_str else {
        return params;
    };

    for pair in query_str.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(raw_key);
        let value = Value::String(decode_component(raw_value));

        if let Some(base) = key.strip_suffix("[]") {
            let entry = params
                .entry(base.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(items) => items.push(value),
                other => *other = Value::Array(vec![value]),
            }
        } else {
            params.insert(key, value);
        }
    }
    params
}
