//! Shared helpers for the endpoint integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, Response};
use serde_json::Value;
use tempfile::TempDir;

use community_api::router::{AppState, Router};
use community_core::config::{SiteConfig, SiteSettings};
use community_core::member::{Member, Role};
use community_core::profile::{FieldGroup, NewFieldGroup};
use community_core::Community;

pub const PREFIX: &str = "/buddypress/v1";

/// A router over a fresh community with one member per interesting role.
pub struct TestSite {
    pub router: Router,
    pub admin: Member,
    pub subscriber: Member,
    pub other: Member,
    pub group: FieldGroup,
    _data_dir: TempDir,
}

impl TestSite {
    pub fn new() -> Self {
        Self::with_settings(SiteSettings::default())
    }

    pub fn with_settings(settings: SiteSettings) -> Self {
        Self::with_config(SiteConfig {
            settings,
            ..Default::default()
        })
    }

    /// A site over `config`, with its data directory swapped for a temporary one.
    pub fn with_config(config: SiteConfig) -> Self {
        let data_dir = tempfile::tempdir().unwrap();
        let config = SiteConfig {
            data_dir: data_dir.path().to_path_buf(),
            ..config
        };

        let community = Arc::new(Community::new());
        let admin = community
            .add_member("Admin", Role::Administrator, Some("admin-token".to_string()))
            .unwrap();
        let subscriber = community
            .add_member("Sub", Role::Subscriber, Some("sub-token".to_string()))
            .unwrap();
        let other = community
            .add_member("Other", Role::Subscriber, Some("other-token".to_string()))
            .unwrap();
        let group = community
            .create_group(NewFieldGroup::named("Base"))
            .unwrap();

        Self {
            router: Router::new(AppState::new(community, config)),
            admin,
            subscriber,
            other,
            group,
            _data_dir: data_dir,
        }
    }

    pub fn state(&self) -> &AppState {
        self.router.state()
    }

    /// Routes a request, turning routing errors into their JSON response.
    pub async fn send(&self, req: Request<Full<Bytes>>) -> (u16, Value) {
        let response: Response<Bytes> = match self.router.route(req).await {
            Ok(response) => response,
            Err(err) => err.into(),
        };
        let status = response.status().as_u16();
        let body = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn json(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Bytes::from(serde_json::to_vec(&body).unwrap())
            }
            None => Bytes::new(),
        };
        self.send(builder.body(Full::new(body)).unwrap()).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (u16, Value) {
        self.json(Method::GET, path, token, None).await
    }
}

/// A multipart body with one file part named `file`.
pub fn multipart_file(file_name: &str, content_type: &str, bytes: &[u8]) -> (String, Bytes) {
    let boundary = "----community-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    (
        format!("multipart/form-data; boundary={}", boundary),
        Bytes::from(body),
    )
}

/// Error code of an error envelope.
pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}
