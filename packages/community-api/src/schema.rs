//! Resource schemas and endpoint argument descriptions served on OPTIONS.

use hyper::Method;
use serde_json::{json, Map, Value};

use crate::router::RouteHandler;
use community_core::extension::ExtensionRegistry;
use community_core::profile::{FieldType, OrderBy, VisibilityLevel};
use community_core::CommunityError;

/// `context` argument shared by every endpoint.
pub fn context_arg() -> Value {
    json!({
        "description": "Scope under which the request is made; determines fields present in response.",
        "type": "string",
        "default": "view",
        "enum": ["view", "edit"],
    })
}

/// Schema of the member avatar resource.
pub fn avatar_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-04/schema#",
        "title": "member_avatar",
        "type": "object",
        "properties": {
            "full": {
                "context": ["view", "edit"],
                "description": "Full size of the image file.",
                "type": "string",
                "readonly": true,
            },
            "thumb": {
                "context": ["view", "edit"],
                "description": "Thumb size of the image file.",
                "type": "string",
                "readonly": true,
            },
        },
    })
}

/// Schema of the profile field resource, including registered extensions.
pub fn field_schema(extensions: &ExtensionRegistry) -> Result<Value, CommunityError> {
    let both = json!(["view", "edit"]);
    let mut properties = Map::new();
    let mut add = |name: &str, value: Value| {
        properties.insert(name.to_string(), value);
    };

    add("id", json!({
        "context": both, "description": "A unique numeric ID for the profile field.",
        "type": "integer", "readonly": true,
    }));
    add("group_id", json!({
        "context": both, "description": "The ID of the group the field is part of.",
        "type": "integer",
    }));
    add("parent_id", json!({
        "context": both, "description": "The ID of the parent field.",
        "type": "integer",
    }));
    add("type", json!({
        "context": both, "description": "The type for the profile field.",
        "type": "string", "enum": FieldType::creatable_names(),
    }));
    add("name", json!({
        "context": both, "description": "The name of the profile field.",
        "type": "string",
    }));
    add("description", json!({
        "context": both, "description": "The description of the profile field.",
        "type": "object",
        "properties": {
            "raw": {"description": "Content for the profile field, as it exists in the database.", "type": "string", "context": ["edit"]},
            "rendered": {"description": "HTML content for the profile field, transformed for display.", "type": "string", "context": both, "readonly": true},
        },
    }));
    add("is_required", json!({
        "context": both, "description": "Whether the profile field must have a value.",
        "type": "boolean",
    }));
    add("can_delete", json!({
        "context": both, "description": "Whether the profile field can be deleted.",
        "type": "boolean", "default": true,
    }));
    add("field_order", json!({
        "context": both, "description": "The order of the profile field into the group of fields.",
        "type": "integer",
    }));
    add("option_order", json!({
        "context": both, "description": "The order of the option into the profile field list of options.",
        "type": "integer",
    }));
    add("order_by", json!({
        "context": both, "description": "The way profile field's options are ordered.",
        "type": "string", "default": OrderBy::Asc.as_str(),
        "enum": [OrderBy::Asc.as_str(), OrderBy::Desc.as_str()],
    }));
    add("options", json!({
        "context": both, "description": "Options of the profile field.",
        "type": "array", "readonly": true,
    }));
    add("is_default_option", json!({
        "context": both, "description": "Whether the option is the default one for the field.",
        "type": "boolean",
    }));
    add("visibility_level", json!({
        "context": both, "description": "Who may see the saved value for this profile field.",
        "type": "string", "default": "public",
        "enum": VisibilityLevel::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
    }));
    add("data", json!({
        "context": both, "description": "The saved value for this profile field.",
        "type": "object", "readonly": true,
    }));

    for (name, extension) in extensions.entries()? {
        if !properties.contains_key(&name) {
            let schema = serde_json::to_value(&extension.schema).unwrap_or(Value::Null);
            properties.insert(name, schema);
        }
    }

    Ok(json!({
        "$schema": "http://json-schema.org/draft-04/schema#",
        "title": "xprofile_field",
        "type": "object",
        "properties": properties,
    }))
}

/// Arguments accepted by one endpoint of a route.
pub fn endpoint_args(route: RouteHandler, methods: &[Method]) -> Value {
    let mut args = Map::new();
    args.insert("context".to_string(), context_arg());

    let id_list = |description: &str| {
        json!({"description": description, "type": "array", "items": {"type": "integer"}})
    };

    let first = methods.first().cloned().unwrap_or_default();
    match route {
        RouteHandler::MemberAvatar if first == Method::GET => {
            args.insert(
                "html".to_string(),
                json!({"description": "Whether to return an <img> HTML element, vs a raw URL to an avatar.", "type": "boolean", "default": false}),
            );
        }
        RouteHandler::FieldCollection if first == Method::GET => {
            args.insert("include_groups".to_string(), id_list("Ensure result set includes fields of specific groups."));
            args.insert("exclude_groups".to_string(), id_list("Ensure result set excludes fields of specific groups."));
            args.insert("exclude_fields".to_string(), id_list("Ensure result set excludes specific fields."));
            args.insert(
                "profile_group_id".to_string(),
                json!({"description": "ID of the field group that fields must belong to.", "type": "integer"}),
            );
            args.insert(
                "member_id".to_string(),
                json!({"description": "Required if you want to load a specific member's data.", "type": "integer"}),
            );
            args.insert(
                "fetch_field_data".to_string(),
                json!({"description": "Whether to fetch member data for each field.", "type": "boolean", "default": false}),
            );
            args.insert(
                "hide_empty_fields".to_string(),
                json!({"description": "Whether to hide profile fields the member left empty.", "type": "boolean", "default": false}),
            );
        }
        RouteHandler::FieldCollection if first == Method::POST => {
            args.insert(
                "group_id".to_string(),
                json!({"description": "The ID of the group the field is part of.", "type": "integer", "required": true}),
            );
            args.insert(
                "type".to_string(),
                json!({"description": "The type for the profile field.", "type": "string", "required": true, "enum": FieldType::creatable_names()}),
            );
            args.insert(
                "name".to_string(),
                json!({"description": "The name of the profile field.", "type": "string", "required": true}),
            );
        }
        RouteHandler::FieldItem if first == Method::GET => {
            args.insert(
                "member_id".to_string(),
                json!({"description": "Required if you want to load a specific member's data.", "type": "integer"}),
            );
            args.insert(
                "fetch_field_data".to_string(),
                json!({"description": "Whether to fetch member data for the field.", "type": "boolean", "default": false}),
            );
        }
        _ => {}
    }

    Value::Object(args)
}
