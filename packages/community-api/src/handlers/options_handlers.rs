//! OPTIONS handler describing a route's endpoints and resource schema.

use hyper::body::Bytes;
use hyper::Response;
use serde::Serialize;
use serde_json::Value;

use crate::router::{AppState, RouteHandler, RouterError};
use crate::schema;

use super::request_utils::{json_response, map_core_error_to_router_error};

/// One method group of a route.
#[derive(Debug, Serialize)]
pub struct EndpointDescription {
    pub methods: Vec<String>,
    pub args: Value,
}

/// Route description returned on OPTIONS.
#[derive(Debug, Serialize)]
pub struct RouteDescription {
    pub namespace: String,
    pub methods: Vec<String>,
    pub endpoints: Vec<EndpointDescription>,
    pub schema: Value,
}

/// Describes a route.
///
/// # Response
/// - **200 OK**:
/// ```json
/// {
///   "namespace": "buddypress/v1",
///   "methods": ["GET", "POST"],
///   "endpoints": [{"methods": ["GET"], "args": {"context": {"default": "view"}}}],
///   "schema": {"properties": {}}
/// }
/// ```
pub fn options(route: RouteHandler, state: &AppState) -> Result<Response<Bytes>, RouterError> {
    let endpoints: Vec<EndpointDescription> = route
        .endpoints()
        .into_iter()
        .map(|methods| EndpointDescription {
            args: schema::endpoint_args(route, &methods),
            methods: methods.iter().map(|m| m.to_string()).collect(),
        })
        .collect();
    let methods = endpoints
        .iter()
        .flat_map(|e| e.methods.iter().cloned())
        .collect();

    let schema = match route {
        RouteHandler::MemberAvatar => schema::avatar_schema(),
        RouteHandler::FieldCollection | RouteHandler::FieldItem => {
            schema::field_schema(&state.extensions).map_err(map_core_error_to_router_error)?
        }
    };

    json_response(
        200,
        RouteDescription {
            namespace: format!("{}/{}", state.config.namespace, state.config.version),
            methods,
            endpoints,
            schema,
        },
    )
}
