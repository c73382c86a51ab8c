//! Matchit routing configuration.

use std::sync::Arc;

use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response};
use matchit::Router as MatchitRouter;

use crate::context::RequestContext;
use crate::handlers;
use crate::handlers::request_utils::{parse_query_params, read_request_body_with_timeout, RestRequest};
use community_core::avatar::AvatarStore;
use community_core::config::SiteConfig;
use community_core::extension::ExtensionRegistry;
use community_core::Community;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Members, groups, fields
    pub community: Arc<Community>,
    /// Uploaded avatars
    pub avatars: Arc<AvatarStore>,
    /// Extension attributes of the profile field resource
    pub extensions: Arc<ExtensionRegistry>,
    /// Service configuration, including the site feature toggles
    pub config: Arc<SiteConfig>,
}

impl AppState {
    /// Creates state with an avatar store and an empty extension registry
    /// derived from `config`.
    pub fn new(community: Arc<Community>, config: SiteConfig) -> Self {
        Self {
            community,
            avatars: Arc::new(AvatarStore::new(&config)),
            extensions: Arc::new(ExtensionRegistry::new()),
            config: Arc::new(config),
        }
    }
}

/// HTTP request router.
pub struct Router {
    inner: MatchitRouter<RouteHandler>,
    routes: Vec<(String, RouteHandler)>,
    state: AppState,
}

impl Router {
    /// Creates a router with the avatar and profile field routes mounted
    /// under the configured namespace and version.
    pub fn new(state: AppState) -> Self {
        let prefix = state.config.route_prefix();
        let component = &state.config.profile_component;
        let routes = vec![
            (
                format!("{}/members/{{user_id}}/avatar", prefix),
                RouteHandler::MemberAvatar,
            ),
            (
                format!("{}/{}/fields", prefix, component),
                RouteHandler::FieldCollection,
            ),
            (
                format!("{}/{}/fields/{{id}}", prefix, component),
                RouteHandler::FieldItem,
            ),
        ];

        let mut router = MatchitRouter::new();
        for (path, handler) in &routes {
            router
                .insert(path.clone(), *handler)
                .unwrap_or_else(|e| panic!("Failed to insert {} route: {}", path, e));
        }

        Self {
            inner: router,
            routes,
            state,
        }
    }

    /// Shared state handed to every handler.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Registered route templates and their handlers.
    pub fn routes(&self) -> &[(String, RouteHandler)] {
        &self.routes
    }

    /// Routes an incoming request to the appropriate handler.
    ///
    /// # Arguments
    /// * `req` - HTTP request with any body type
    ///
    /// # Returns
    /// `Result<Response<Bytes>, RouterError>` containing the response or an error.
    pub async fn route<B>(&self, req: Request<B>) -> Result<Response<Bytes>, RouterError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = req.uri().path().to_string();

        let matched = self
            .inner
            .at(&path)
            .map_err(|_| RouterError::NotFound(format!("No route found for {}", path)))?;
        let handler = *matched.value;

        let (parts, body) = req.into_parts();
        tracing::debug!("{} {} -> {:?}", parts.method, path, handler);

        let limit = handler.body_limit(&parts.method, &self.state.config);
        let body =
            read_request_body_with_timeout(body, self.state.config.request_timeout_ms, limit)
                .await?;
        let query = parse_query_params(parts.uri.query());
        let context = RequestContext::resolve(
            &parts.headers,
            &self.state.community,
            self.state.config.settings,
        )?;

        let request = RestRequest {
            method: parts.method,
            headers: parts.headers,
            query,
            body,
            context,
        };

        handler
            .handle(request, matched.params, self.state.clone())
            .await
    }
}

/// Resource a route serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteHandler {
    MemberAvatar,
    FieldCollection,
    FieldItem,
}

impl RouteHandler {
    /// Method groups registered on the route, one entry per endpoint.
    pub fn endpoints(self) -> Vec<Vec<Method>> {
        match self {
            RouteHandler::MemberAvatar => {
                vec![vec![Method::GET], vec![Method::POST], vec![Method::DELETE]]
            }
            RouteHandler::FieldCollection => vec![vec![Method::GET], vec![Method::POST]],
            RouteHandler::FieldItem => vec![
                vec![Method::GET],
                vec![Method::POST, Method::PUT, Method::PATCH],
                vec![Method::DELETE],
            ],
        }
    }

    /// Largest body accepted for `method` on this route.
    pub fn body_limit(self, method: &Method, config: &SiteConfig) -> usize {
        match (self, method) {
            (RouteHandler::MemberAvatar, &Method::POST) => config.max_upload_body_size(),
            _ => config.max_body_size,
        }
    }

    /// Handles a request with the given route parameters.
    async fn handle(
        &self,
        req: RestRequest,
        params: matchit::Params<'_, '_>,
        state: AppState,
    ) -> Result<Response<Bytes>, RouterError> {
        if req.method == Method::OPTIONS {
            return handlers::options(*self, &state);
        }

        let method = req.method.clone();
        match self {
            RouteHandler::MemberAvatar => match method {
                Method::GET => handlers::get_avatar(req, params, state).await,
                Method::POST => handlers::create_avatar(req, params, state).await,
                Method::DELETE => handlers::delete_avatar(req, params, state).await,
                _ => Err(RouterError::MethodNotAllowed),
            },
            RouteHandler::FieldCollection => match method {
                Method::GET => handlers::list_fields(req, params, state).await,
                Method::POST => handlers::create_field(req, params, state).await,
                _ => Err(RouterError::MethodNotAllowed),
            },
            RouteHandler::FieldItem => match method {
                Method::GET => handlers::get_field(req, params, state).await,
                Method::POST | Method::PUT | Method::PATCH => {
                    handlers::update_field(req, params, state).await
                }
                Method::DELETE => handlers::delete_field(req, params, state).await,
                _ => Err(RouterError::MethodNotAllowed),
            },
        }
    }
}

/// Router error type.
///
/// Each variant maps to a machine-readable code and an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    MethodNotAllowed,
    InternalError(String),
    Timeout,
    BadRequest(String),
    NotFound(String),
    /// Caller is anonymous (401) or lacks the capability (403)
    AuthorizationRequired { authenticated: bool },
    /// Member id does not resolve to a member
    InvalidMember,
    /// Resource id does not resolve to a resource
    InvalidId,
    /// A request parameter failed validation
    InvalidParam { param: String, message: String },
    /// Avatar uploads are administratively disabled
    UploadDisabled,
    /// Avatar upload carried no image
    MissingFile,
    /// Avatar upload was rejected
    UploadFailed(String),
    /// Member has no uploaded avatar to delete
    NoUploadedAvatar,
    /// Field is flagged non-deletable
    CannotDelete,
    /// Request body exceeds the route's size cap
    PayloadTooLarge { limit: usize },
    /// Field kept changing under a delete
    Conflict(String),
}

impl RouterError {
    /// HTTP status code.
    pub fn status(&self) -> u16 {
        match self {
            RouterError::MethodNotAllowed => 405,
            RouterError::InternalError(_) => 500,
            RouterError::Timeout => 408,
            RouterError::BadRequest(_) => 400,
            RouterError::NotFound(_) => 404,
            RouterError::AuthorizationRequired { authenticated } => {
                if *authenticated {
                    403
                } else {
                    401
                }
            }
            RouterError::InvalidMember => 404,
            RouterError::InvalidId => 404,
            RouterError::InvalidParam { .. } => 400,
            RouterError::UploadDisabled => 500,
            RouterError::MissingFile => 500,
            RouterError::UploadFailed(_) => 500,
            RouterError::NoUploadedAvatar => 404,
            RouterError::CannotDelete => 403,
            RouterError::PayloadTooLarge { .. } => 413,
            RouterError::Conflict(_) => 409,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::MethodNotAllowed => "rest_method_not_allowed",
            RouterError::InternalError(_) => "rest_internal_error",
            RouterError::Timeout => "rest_timeout",
            RouterError::BadRequest(_) => "rest_invalid_body",
            RouterError::NotFound(_) => "rest_no_route",
            RouterError::AuthorizationRequired { .. } => "rest_authorization_required",
            RouterError::InvalidMember => "rest_member_invalid_id",
            RouterError::InvalidId => "rest_invalid_id",
            RouterError::InvalidParam { .. } => "rest_invalid_param",
            RouterError::UploadDisabled => "rest_member_avatar_disabled",
            RouterError::MissingFile => "rest_member_avatar_no_image_file",
            RouterError::UploadFailed(_) => "rest_member_avatar_upload_error",
            RouterError::NoUploadedAvatar => "rest_member_avatar_no_uploaded_avatar",
            RouterError::CannotDelete => "rest_field_cannot_delete",
            RouterError::PayloadTooLarge { .. } => "rest_payload_too_large",
            RouterError::Conflict(_) => "rest_conflict",
        }
    }
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterError::MethodNotAllowed => write!(f, "Method Not Allowed"),
            RouterError::InternalError(msg) => write!(f, "Internal Error: {}", msg),
            RouterError::Timeout => write!(f, "Request Timeout"),
            RouterError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            RouterError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            RouterError::AuthorizationRequired { authenticated: false } => {
                write!(f, "Sorry, you need to be logged in to perform this action.")
            }
            RouterError::AuthorizationRequired { authenticated: true } => {
                write!(f, "Sorry, you are not allowed to perform this action.")
            }
            RouterError::InvalidMember => write!(f, "Invalid member ID."),
            RouterError::InvalidId => write!(f, "Invalid ID."),
            RouterError::InvalidParam { param, message } => {
                write!(f, "Invalid parameter '{}': {}", param, message)
            }
            RouterError::UploadDisabled => {
                write!(f, "Upload of member avatars is disabled.")
            }
            RouterError::MissingFile => write!(f, "Sorry, you need an image file to upload."),
            RouterError::UploadFailed(msg) => write!(f, "Upload failed: {}", msg),
            RouterError::NoUploadedAvatar => {
                write!(f, "Sorry, there are no uploaded avatars for this member.")
            }
            RouterError::CannotDelete => write!(f, "This profile field cannot be deleted."),
            RouterError::PayloadTooLarge { limit } => {
                write!(f, "Request body exceeds the limit of {} bytes.", limit)
            }
            RouterError::Conflict(msg) => write!(f, "Conflict: {}", msg),
        }
    }
}

impl std::error::Error for RouterError {}

impl From<RouterError> for Response<Bytes> {
    fn from(err: RouterError) -> Self {
        let status = err.status();
        let details = match &err {
            RouterError::InvalidParam { param, .. } => Some(param.clone()),
            _ => None,
        };
        let error_response =
            handlers::error_response(status, err.code(), err.to_string(), details);
        let body = serde_json::to_vec(&error_response)
            .unwrap_or_else(|e| format!("{{\"success\":false,\"error\":{{\"code\":\"rest_internal_error\",\"message\":\"Failed to serialize error: {}\",\"status\":500}}}}", e).into_bytes());

        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Bytes::from(body))
            .unwrap_or_else(|_| {
                let mut fallback = Response::new(Bytes::from("Internal Server Error"));
                *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            })
    }
}
