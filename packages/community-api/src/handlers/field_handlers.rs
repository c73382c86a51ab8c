//! Profile field handlers.

use hyper::body::Bytes;
use hyper::Response;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::router::{AppState, RouterError};
use community_core::profile::{FieldChanges, FieldQuery, NewField, ProfileField};
use community_core::render::{render_paragraphs, render_values};
use community_core::CommunityError;

use super::params::{ParamReader, RestContext};
use super::request_utils::{
    json_response, map_core_error_to_router_error, path_id, MatchitParams, RestRequest,
};

/// Times a delete re-reads a field that changed under it.
const DELETE_ATTEMPTS: usize = 3;

/// Response of a field deletion.
#[derive(Debug, Serialize)]
pub struct DeletedField {
    pub deleted: bool,
    pub previous: Value,
}

/// Member whose values fill the `data` property.
#[derive(Debug, Clone, Copy)]
struct DataRequest {
    member_id: u64,
    fetch: bool,
}

/// Builds the JSON representation of a field.
///
/// Core attributes come first; registered extension attributes are added
/// without overriding them.
fn prepare_field(
    req: &RestRequest,
    state: &AppState,
    field: &ProfileField,
    context: RestContext,
    data: Option<DataRequest>,
) -> Result<Value, RouterError> {
    let description = match context {
        RestContext::View => json!({ "rendered": render_paragraphs(&field.description) }),
        RestContext::Edit => json!({
            "raw": field.description,
            "rendered": render_paragraphs(&field.description),
        }),
    };

    let options = if field.field_type.is_choice() {
        state
            .community
            .field_options(field.id)
            .map_err(map_core_error_to_router_error)?
            .iter()
            .map(|option| prepare_field(req, state, option, context, None))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        Vec::new()
    };

    let data = match data {
        Some(request) if request.fetch => field_value(req, state, field, request.member_id)?
            .map(|values| {
                json!({
                    "value": {
                        "raw": values.join(", "),
                        "unserialized": values,
                        "rendered": render_values(&values),
                    }
                })
            })
            .unwrap_or_else(|| json!({})),
        _ => json!({}),
    };

    let mut object = Map::new();
    object.insert("id".into(), json!(field.id));
    object.insert("group_id".into(), json!(field.group_id));
    object.insert("parent_id".into(), json!(field.parent_id));
    object.insert("type".into(), json!(field.field_type));
    object.insert("name".into(), json!(field.name));
    object.insert("description".into(), description);
    object.insert("is_required".into(), json!(field.is_required));
    object.insert("can_delete".into(), json!(field.can_delete));
    object.insert("field_order".into(), json!(field.field_order));
    object.insert("option_order".into(), json!(field.option_order));
    object.insert("order_by".into(), json!(field.order_by));
    object.insert("options".into(), Value::Array(options));
    object.insert("is_default_option".into(), json!(field.is_default_option));
    object.insert("visibility_level".into(), json!(field.visibility_level));
    object.insert("data".into(), data);

    let extensions = state
        .extensions
        .values_for(&state.community, field, context.as_str())
        .map_err(map_core_error_to_router_error)?;
    for (key, value) in extensions {
        object.entry(key).or_insert(value);
    }

    Ok(Value::Object(object))
}

/// A member's values for a field, if the caller may see them.
fn field_value(
    req: &RestRequest,
    state: &AppState,
    field: &ProfileField,
    member_id: u64,
) -> Result<Option<Vec<String>>, RouterError> {
    if !field
        .visibility_level
        .permits(req.context.viewer.as_ref(), Some(member_id))
    {
        return Ok(None);
    }
    state
        .community
        .field_data(field.id, member_id)
        .map_err(map_core_error_to_router_error)
}

/// Reads `context`, requiring the moderation capability for `edit`.
fn read_context(
    req: &RestRequest,
    reader: &ParamReader<'_>,
    default: RestContext,
) -> Result<RestContext, RouterError> {
    let context = reader.context(default)?;
    if context == RestContext::Edit {
        req.context.require_moderator()?;
    }
    Ok(context)
}

/// Reads `member_id`/`fetch_field_data`, checking the member exists.
fn read_data_request(
    reader: &ParamReader<'_>,
    state: &AppState,
) -> Result<Option<DataRequest>, RouterError> {
    let Some(member_id) = reader.u64("member_id")? else {
        return Ok(None);
    };
    state
        .community
        .member(member_id)
        .map_err(map_core_error_to_router_error)?;
    Ok(Some(DataRequest {
        member_id,
        fetch: reader.bool("fetch_field_data")?.unwrap_or(false),
    }))
}

/// Reads every supplied field attribute.
fn read_changes(reader: &ParamReader<'_>) -> Result<FieldChanges, RouterError> {
    Ok(FieldChanges {
        group_id: reader.u64("group_id")?,
        parent_id: reader.u64("parent_id")?,
        field_type: reader.parse("type")?,
        name: reader.string("name")?,
        description: reader.string("description")?,
        is_required: reader.bool("is_required")?,
        can_delete: reader.bool("can_delete")?,
        field_order: reader.u32("field_order")?,
        option_order: reader.u32("option_order")?,
        order_by: reader.parse("order_by")?,
        is_default_option: reader.bool("is_default_option")?,
        visibility_level: reader.parse("visibility_level")?,
        options: reader.options("options")?,
    })
}

fn required(param: &str) -> RouterError {
    RouterError::InvalidParam {
        param: param.to_string(),
        message: "is required".to_string(),
    }
}

/// Resolves the `{id}` path parameter to a field.
fn target_field(params: &MatchitParams<'_, '_>, state: &AppState) -> Result<ProfileField, RouterError> {
    let id = path_id(params, "id", RouterError::InvalidId)?;
    state
        .community
        .field(id)
        .map_err(map_core_error_to_router_error)
}

/// Lists profile fields.
///
/// # Endpoint
/// `GET /{namespace}/{version}/{component}/fields`
///
/// # Query Parameters
/// - `context`: `view` (default) or `edit`
/// - `include_groups`, `exclude_groups`, `exclude_fields`: id lists
/// - `profile_group_id`: only fields of this group
/// - `member_id`, `fetch_field_data`: fill `data` with the member's values
/// - `hide_empty_fields`: with `member_id`, drop fields the member left empty
///
/// # Response
/// - **200 OK**: Array of fields ordered by group order, then field order
///
/// # Errors
/// - **400 Bad Request**: Malformed parameter
/// - **401 Unauthorized**: Community is private and the caller is anonymous
/// - **404 Not Found**: Unknown `member_id`
pub async fn list_fields(
    req: RestRequest,
    _params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    req.context.check_community_visibility()?;
    let reader = req.query();
    let context = read_context(&req, &reader, RestContext::View)?;

    let query = FieldQuery {
        include_groups: reader.ids("include_groups")?,
        exclude_groups: reader.ids("exclude_groups")?.unwrap_or_default(),
        exclude_fields: reader.ids("exclude_fields")?.unwrap_or_default(),
        profile_group_id: reader.u64("profile_group_id")?,
    };
    let data = read_data_request(&reader, &state)?;
    let hide_empty = reader.bool("hide_empty_fields")?.unwrap_or(false);
    let owner = data.map(|d| d.member_id);

    let fields = state
        .community
        .fields(&query)
        .map_err(map_core_error_to_router_error)?;

    let mut prepared = Vec::with_capacity(fields.len());
    for field in &fields {
        if !field
            .visibility_level
            .permits(req.context.viewer.as_ref(), owner)
        {
            continue;
        }
        if let (true, Some(member_id)) = (hide_empty, owner) {
            if field_value(&req, &state, field, member_id)?.is_none() {
                continue;
            }
        }
        prepared.push(prepare_field(&req, &state, field, context, data)?);
    }

    tracing::debug!("Listing {} of {} profile fields", prepared.len(), fields.len());
    json_response(200, prepared)
}

/// Fetches one profile field.
///
/// # Endpoint
/// `GET /{namespace}/{version}/{component}/fields/{id}`
///
/// # Response
/// - **200 OK**: `[field]`
///
/// # Errors
/// - **401 Unauthorized** / **403 Forbidden**: Field not visible to the caller
/// - **404 Not Found**: Unknown field
pub async fn get_field(
    req: RestRequest,
    params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    req.context.check_community_visibility()?;
    let field = target_field(&params, &state)?;
    let reader = req.query();

    let data = read_data_request(&reader, &state)?;
    let owner = data.map(|d| d.member_id);
    if !field
        .visibility_level
        .permits(req.context.viewer.as_ref(), owner)
    {
        return Err(req.context.denied());
    }
    let context = read_context(&req, &reader, RestContext::View)?;

    let prepared = prepare_field(&req, &state, &field, context, data)?;
    json_response(200, vec![prepared])
}

/// Creates a profile field.
///
/// # Endpoint
/// `POST /{namespace}/{version}/{component}/fields`
///
/// # Request Body
/// ```json
/// {
///   "group_id": 1,
///   "type": "selectbox",
///   "name": "Favourite colour",
///   "options": ["Red", "Blue"]
/// }
/// ```
///
/// # Response
/// - **200 OK**: `[field]` in `edit` context
///
/// # Errors
/// - **400 Bad Request**: Missing or invalid `type`, `name` or `group_id`, or a malformed attribute
/// - **401 Unauthorized**: Anonymous caller
/// - **403 Forbidden**: Caller cannot moderate
///
/// # Example
/// ```bash
/// curl -X POST http://localhost:8080/buddypress/v1/xprofile/fields \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"group_id": 1, "type": "textbox", "name": "Nickname"}'
/// ```
pub async fn create_field(
    req: RestRequest,
    _params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    req.context.require_moderator()?;
    let params = req.params()?;
    let reader = ParamReader::new(&params);
    let context = read_context(&req, &reader, RestContext::Edit)?;

    let changes = read_changes(&reader)?;
    let field_type = changes.field_type.ok_or_else(|| required("type"))?;
    let name = changes.name.clone().ok_or_else(|| required("name"))?;
    let group_id = changes.group_id.ok_or_else(|| required("group_id"))?;

    let mut new_field = NewField::new(group_id, field_type, name);
    new_field.parent_id = changes.parent_id.unwrap_or(0);
    new_field.description = changes.description.unwrap_or_default();
    new_field.is_required = changes.is_required.unwrap_or(false);
    new_field.can_delete = changes.can_delete.unwrap_or(true);
    new_field.field_order = changes.field_order.unwrap_or(0);
    new_field.option_order = changes.option_order.unwrap_or(0);
    new_field.order_by = changes.order_by.unwrap_or_default();
    new_field.is_default_option = changes.is_default_option.unwrap_or(false);
    new_field.visibility_level = changes.visibility_level.unwrap_or_default();
    new_field.options = changes.options.unwrap_or_default();

    let field = state
        .community
        .create_field(new_field)
        .map_err(map_core_error_to_router_error)?;
    if let Err(e) = state
        .extensions
        .apply_updates(&state.community, &field, &params)
    {
        tracing::warn!("Discarding field {} after failed extension update: {}", field.id, e);
        state
            .community
            .discard_field(field.id)
            .map_err(map_core_error_to_router_error)?;
        return Err(map_core_error_to_router_error(e));
    }

    let prepared = prepare_field(&req, &state, &field, context, None)?;
    json_response(200, vec![prepared])
}

/// Updates a profile field. Omitted attributes keep their stored values.
///
/// # Endpoint
/// `PUT /{namespace}/{version}/{component}/fields/{id}` (also `POST`, `PATCH`)
///
/// # Response
/// - **200 OK**: `[field]` in `edit` context
///
/// # Errors
/// - **400 Bad Request**: Invalid attribute
/// - **401 Unauthorized**: Anonymous caller
/// - **403 Forbidden**: Caller cannot moderate
/// - **404 Not Found**: Unknown field
pub async fn update_field(
    req: RestRequest,
    params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    req.context.require_moderator()?;
    let id = path_id(&params, "id", RouterError::InvalidId)?;
    let snapshot = state
        .community
        .snapshot_field(id)
        .map_err(map_core_error_to_router_error)?;
    let body = req.params()?;
    let reader = ParamReader::new(&body);
    let context = read_context(&req, &reader, RestContext::Edit)?;

    let changes = read_changes(&reader)?;
    let field = state
        .community
        .update_field(id, changes)
        .map_err(map_core_error_to_router_error)?;
    if let Err(e) = state
        .extensions
        .apply_updates(&state.community, &field, &body)
    {
        tracing::warn!("Restoring field {} after failed extension update: {}", id, e);
        state
            .community
            .restore_field(snapshot)
            .map_err(map_core_error_to_router_error)?;
        return Err(map_core_error_to_router_error(e));
    }

    let prepared = prepare_field(&req, &state, &field, context, None)?;
    json_response(200, vec![prepared])
}

/// Deletes a profile field with its options, meta and member data.
///
/// # Endpoint
/// `DELETE /{namespace}/{version}/{component}/fields/{id}`
///
/// # Response
/// - **200 OK**: `{"deleted": true, "previous": field}`
///
/// # Errors
/// - **401 Unauthorized**: Anonymous caller
/// - **403 Forbidden**: Caller cannot moderate, or the field cannot be deleted
/// - **404 Not Found**: Unknown field
/// - **409 Conflict**: Field kept changing while `previous` was rendered
pub async fn delete_field(
    req: RestRequest,
    params: MatchitParams<'_, '_>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    req.context.require_moderator()?;
    let id = path_id(&params, "id", RouterError::InvalidId)?;
    let reader = req.query();
    let context = read_context(&req, &reader, RestContext::Edit)?;

    // `previous` is rendered outside the store lock, so the delete only
    // goes through if nothing it was rendered from has changed since.
    let mut attempt = 1;
    loop {
        let snapshot = state
            .community
            .snapshot_field(id)
            .map_err(map_core_error_to_router_error)?;
        let previous = prepare_field(&req, &state, &snapshot.field, context, None)?;
        match state.community.delete_field_unchanged(&snapshot) {
            Ok(_) => {
                return json_response(
                    200,
                    DeletedField {
                        deleted: true,
                        previous,
                    },
                )
            }
            Err(CommunityError::FieldChanged { .. }) if attempt < DELETE_ATTEMPTS => {
                tracing::debug!("Field {} changed during delete, retrying", id);
                attempt += 1;
            }
            Err(e) => return Err(map_core_error_to_router_error(e)),
        }
    }
}
