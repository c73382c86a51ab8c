//! Per-request authentication and site settings.

use hyper::header::{HeaderMap, AUTHORIZATION};

use crate::router::RouterError;
use community_core::config::SiteSettings;
use community_core::member::Member;
use community_core::Community;

/// Who is calling and which site toggles apply to this request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Authenticated member, `None` for anonymous requests
    pub viewer: Option<Member>,
    /// Site feature toggles
    pub settings: SiteSettings,
}

impl RequestContext {
    /// Context of an anonymous request.
    pub fn anonymous(settings: SiteSettings) -> Self {
        Self {
            viewer: None,
            settings,
        }
    }

    /// Resolves the viewer from an `Authorization: Bearer <token>` header.
    ///
    /// A missing header yields an anonymous context. A malformed header or
    /// an unknown token is rejected.
    pub fn resolve(
        headers: &HeaderMap,
        community: &Community,
        settings: SiteSettings,
    ) -> Result<Self, RouterError> {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Ok(Self::anonymous(settings));
        };

        let unauthenticated = RouterError::AuthorizationRequired {
            authenticated: false,
        };
        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| unauthenticated.clone())?;

        let viewer = community
            .member_by_token(token)
            .map_err(|e| RouterError::InternalError(e.to_string()))?;
        match viewer {
            Some(member) => Ok(Self {
                viewer: Some(member),
                settings,
            }),
            None => {
                tracing::warn!("Rejected request with unknown API token");
                Err(unauthenticated)
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.viewer.is_some()
    }

    /// Authorization failure for this caller: 401 when anonymous, 403 otherwise.
    pub fn denied(&self) -> RouterError {
        RouterError::AuthorizationRequired {
            authenticated: self.is_authenticated(),
        }
    }

    /// Requires an authenticated caller.
    pub fn require_login(&self) -> Result<&Member, RouterError> {
        self.viewer.as_ref().ok_or_else(|| self.denied())
    }

    /// Requires a caller holding the moderation capability.
    pub fn require_moderator(&self) -> Result<&Member, RouterError> {
        let viewer = self.require_login()?;
        if viewer.can_moderate() {
            Ok(viewer)
        } else {
            Err(self.denied())
        }
    }

    /// Rejects anonymous reads while the community is private.
    pub fn check_community_visibility(&self) -> Result<(), RouterError> {
        if self.settings.community_visibility_private && !self.is_authenticated() {
            return Err(self.denied());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use community_core::member::Role;
    use hyper::header::HeaderValue;

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_resolve_viewer() {
        let community = Community::new();
        let member = community
            .add_member("Sub", Role::Subscriber, Some("sub-token".to_string()))
            .unwrap();
        let settings = SiteSettings::default();

        let anonymous = RequestContext::resolve(&HeaderMap::new(), &community, settings).unwrap();
        assert!(!anonymous.is_authenticated());

        let ctx = RequestContext::resolve(&headers_with("sub-token"), &community, settings).unwrap();
        assert_eq!(ctx.viewer.as_ref().map(|m| m.id), Some(member.id));
        assert_eq!(
            ctx.require_moderator().unwrap_err(),
            RouterError::AuthorizationRequired {
                authenticated: true
            }
        );

        let err = RequestContext::resolve(&headers_with("nope"), &community, settings).unwrap_err();
        assert_eq!(err.status(), 401);
    }

    #[test]
    fn test_private_community_rejects_anonymous() {
        let settings = SiteSettings {
            community_visibility_private: true,
            ..Default::default()
        };
        let ctx = RequestContext::anonymous(settings);
        assert_eq!(ctx.check_community_visibility().unwrap_err().status(), 401);
        assert!(RequestContext::anonymous(SiteSettings::default())
            .check_community_visibility()
            .is_ok());
    }
}
