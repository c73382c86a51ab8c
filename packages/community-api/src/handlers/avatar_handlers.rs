//! Member avatar handlers.

use futures_util::future::ready;
use futures_util::stream::once;
use hyper::body::Bytes;
use hyper::Response;
use serde::Serialize;

use crate::router::{AppState, RouterError};
use community_core::avatar::{AvatarUpload, AvatarUrls};
use community_core::member::Member;

use super::request_utils::{
    json_response, map_core_error_to_router_error, path_id, MatchitParams, RestRequest,
};

/// Name of the multipart part carrying the image.
const FILE_PART: &str = "file";

/// Response of an avatar deletion.
#[derive(Debug, Serialize)]
pub struct DeletedAvatar {
    pub deleted: bool,
    pub previous: AvatarUrls,
}

fn alt_text(member: &Member) -> String {
    format!("Profile picture of {}", member.name)
}

/// Resolves the `{user_id}` path parameter to a member.
fn target_member(params: &MatchitParams<'_, '_>, state: &AppState) -> Result<Member, RouterError> {
    let member_id = path_id(params, "user_id", RouterError::InvalidMember)?;
    state
        .community
        .member(member_id)
        .map_err(map_core_error_to_router_error)
}

/// Checks the caller may change `member`'s avatar.
fn require_avatar_editor(req: &RestRequest, member: &Member) -> Result<(), RouterError> {
    let viewer = req.context.require_login()?;
    if !viewer.can_edit_member(member.id) {
        tracing::warn!(
            "Member {} may not edit the avatar of member {}",
            viewer.id,
            member.id
        );
        return Err(req.context.denied());
    }
    Ok(())
}

/// Converts the avatar to `<img>` fragments when `html` is set.
fn present(
    req: &RestRequest,
    state: &AppState,
    member: &Member,
    urls: AvatarUrls,
) -> Result<AvatarUrls, RouterError> {
    if req.query().bool("html")?.unwrap_or(false) {
        Ok(state.avatars.to_html(&urls, member.id, &alt_text(member)))
    } else {
        Ok(urls)
    }
}

/// Fetches a member's avatar.
///
/// # Endpoint
/// `GET /{namespace}/{version}/members/{user_id}/avatar`
///
/// # Query Parameters
/// - `context`: `view` (default) or `edit`
/// - `html`: return `<img>` fragments instead of URLs
///
/// # Response
/// - **200 OK**: `[{"full": "...", "thumb": "..."}]`
///
/// # Errors
/// - **401 Unauthorized**: Community is private and the caller is anonymous
/// - **404 Not Found**: Unknown member
pub async fn get_avatar(
    req: RestRequest,
    params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    req.context.check_community_visibility()?;
    req.query().context(Default::default())?;
    let member = target_member(&params, &state)?;

    let urls = state
        .avatars
        .fetch(member.id)
        .map_err(map_core_error_to_router_error)?;
    let urls = present(&req, &state, &member, urls)?;

    json_response(200, vec![urls])
}

/// Uploads a member's avatar, replacing any previous one.
///
/// # Endpoint
/// `POST /{namespace}/{version}/members/{user_id}/avatar`
///
/// # Request Body
/// `multipart/form-data` with the image in a part named `file`.
///
/// # Response
/// - **200 OK**: `[{"full": "...", "thumb": "..."}]`
///
/// # Errors
/// - **401 Unauthorized**: Anonymous caller
/// - **403 Forbidden**: Caller is neither the member nor a moderator
/// - **404 Not Found**: Unknown member
/// - **500 Internal Server Error**: Uploads disabled, no file, or the file was rejected
///
/// # Example
/// ```bash
/// curl -X POST http://localhost:8080/buddypress/v1/members/1/avatar \
///   -H "Authorization: Bearer <token>" \
///   -F "file=@avatar.png"
/// ```
pub async fn create_avatar(
    req: RestRequest,
    params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    let member = target_member(&params, &state)?;
    require_avatar_editor(&req, &member)?;

    if req.context.settings.avatar_uploads_disabled {
        return Err(RouterError::UploadDisabled);
    }

    let upload = read_upload(&req).await?.ok_or(RouterError::MissingFile)?;
    let urls = state
        .avatars
        .store(member.id, &upload)
        .map_err(map_core_error_to_router_error)?;
    let urls = present(&req, &state, &member, urls)?;

    json_response(200, vec![urls])
}

/// Deletes a member's uploaded avatar.
///
/// # Endpoint
/// `DELETE /{namespace}/{version}/members/{user_id}/avatar`
///
/// # Response
/// - **200 OK**: `{"deleted": true, "previous": {"full": "...", "thumb": "..."}}`
///
/// # Errors
/// - **401 Unauthorized**: Anonymous caller
/// - **403 Forbidden**: Caller is neither the member nor a moderator
/// - **404 Not Found**: Unknown member, or no uploaded avatar
pub async fn delete_avatar(
    req: RestRequest,
    params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    let member = target_member(&params, &state)?;
    require_avatar_editor(&req, &member)?;

    let previous = state
        .avatars
        .delete(member.id)
        .map_err(map_core_error_to_router_error)?;
    let previous = present(&req, &state, &member, previous)?;

    json_response(
        200,
        DeletedAvatar {
            deleted: true,
            previous,
        },
    )
}

/// Extracts the `file` part of a multipart body.
///
/// Returns `None` when the body is not multipart or has no such part.
async fn read_upload(req: &RestRequest) -> Result<Option<AvatarUpload>, RouterError> {
    let Some(content_type) = req
        .headers
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(None);
    };
    let Ok(boundary) = multer::parse_boundary(content_type) else {
        return Ok(None);
    };

    let stream = once(ready(Ok::<_, std::io::Error>(req.body.clone())));
    let mut multipart = multer::Multipart::new(stream, boundary);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RouterError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some(FILE_PART) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(|m| m.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| RouterError::BadRequest(format!("Failed to read uploaded file: {}", e)))?;
        tracing::debug!("Received avatar upload '{}' ({} bytes)", file_name, bytes.len());
        return Ok(Some(AvatarUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}
