//! Profile field endpoint tests.

mod common;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request};
use serde_json::{json, Value};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{error_code, TestSite, PREFIX};
use community_core::config::{SiteConfig, SiteSettings};
use community_core::extension::{ExtensionField, ExtensionSchema};
use community_core::profile::{
    FieldChanges, FieldType, NewField, NewFieldGroup, NewOption, VisibilityLevel,
};
use community_core::CommunityError;

fn fields_path() -> String {
    format!("{}/xprofile/fields", PREFIX)
}

fn field_path(id: u64) -> String {
    format!("{}/xprofile/fields/{}", PREFIX, id)
}

fn create_textbox(site: &TestSite, name: &str) -> u64 {
    site.state()
        .community
        .create_field(NewField::new(site.group.id, FieldType::Textbox, name))
        .unwrap()
        .id
}

/// Registers `foo_field` (meta-backed) and `strict`, whose updater always fails.
fn register_strict_extension(site: &TestSite) {
    let extensions = &site.state().extensions;
    extensions
        .register(
            "foo_field",
            ExtensionField::meta_backed(ExtensionSchema::string("Foo")),
        )
        .unwrap();
    extensions
        .register(
            "strict",
            ExtensionField::new(ExtensionSchema::string("Strict")).with_updater(|_, _, _, _| {
                Err(CommunityError::InvalidValue {
                    param: "strict".to_string(),
                    message: "rejected".to_string(),
                })
            }),
        )
        .unwrap();
}

fn names(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_routes_register_expected_methods() {
    let site = TestSite::new();
    let (status, body) = site.json(Method::OPTIONS, &fields_path(), None, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["endpoints"].as_array().unwrap().len(), 2);

    let (status, body) = site.json(Method::OPTIONS, &field_path(1), None, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["endpoints"].as_array().unwrap().len(), 3);
    assert_eq!(
        body["data"]["schema"]["properties"].as_object().unwrap().len(),
        15
    );
}

#[tokio::test]
async fn test_list_fields_in_order() {
    let site = TestSite::new();
    let community = &site.state().community;
    let second_group = community
        .create_group(NewFieldGroup {
            group_order: 5,
            ..NewFieldGroup::named("Later")
        })
        .unwrap();
    let mut late = NewField::new(second_group.id, FieldType::Textbox, "Late");
    late.field_order = 0;
    community.create_field(late).unwrap();
    let mut b = NewField::new(site.group.id, FieldType::Textbox, "B");
    b.field_order = 2;
    community.create_field(b).unwrap();
    let mut a = NewField::new(site.group.id, FieldType::Textbox, "A");
    a.field_order = 1;
    community.create_field(a).unwrap();

    let (status, body) = site.get(&fields_path(), None).await;
    assert_eq!(status, 200);
    assert_eq!(names(&body), vec!["A", "B", "Late"]);

    let path = format!("{}?include_groups={}", fields_path(), second_group.id);
    let (_, body) = site.get(&path, None).await;
    assert_eq!(names(&body), vec!["Late"]);

    let path = format!("{}?exclude_groups[]={}", fields_path(), second_group.id);
    let (_, body) = site.get(&path, None).await;
    assert_eq!(names(&body), vec!["A", "B"]);
}

#[tokio::test]
async fn test_empty_id_filters_are_ignored() {
    let site = TestSite::new();
    create_textbox(&site, "A");
    create_textbox(&site, "B");

    let path = format!("{}?include_groups=&exclude_fields=", fields_path());
    let (status, body) = site.get(&path, None).await;
    assert_eq!(status, 200);
    assert_eq!(names(&body), vec!["A", "B"]);
}

#[tokio::test]
async fn test_list_fields_private_community() {
    let site = TestSite::with_settings(SiteSettings {
        community_visibility_private: true,
        ..Default::default()
    });
    create_textbox(&site, "Name");
    let (status, body) = site.get(&fields_path(), None).await;
    assert_eq!(status, 401);
    assert_eq!(error_code(&body), "rest_authorization_required");

    let (status, _) = site.get(&fields_path(), Some("sub-token")).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_list_hides_fields_by_visibility() {
    let site = TestSite::new();
    let community = &site.state().community;
    create_textbox(&site, "Public");
    let mut members = NewField::new(site.group.id, FieldType::Textbox, "Members");
    members.visibility_level = VisibilityLevel::LoggedIn;
    community.create_field(members).unwrap();
    let mut admins = NewField::new(site.group.id, FieldType::Textbox, "Admins");
    admins.visibility_level = VisibilityLevel::AdminsOnly;
    community.create_field(admins).unwrap();

    let (_, body) = site.get(&fields_path(), None).await;
    assert_eq!(names(&body), vec!["Public"]);
    let (_, body) = site.get(&fields_path(), Some("sub-token")).await;
    assert_eq!(names(&body), vec!["Public", "Members"]);
    let (_, body) = site.get(&fields_path(), Some("admin-token")).await;
    assert_eq!(names(&body).len(), 3);
}

#[tokio::test]
async fn test_list_with_member_data() {
    let site = TestSite::new();
    let community = &site.state().community;
    let filled = create_textbox(&site, "Filled");
    create_textbox(&site, "Empty");
    community
        .set_field_data(filled, site.subscriber.id, vec!["Hello <b>".to_string()])
        .unwrap();

    let path = format!(
        "{}?member_id={}&fetch_field_data=true&hide_empty_fields=1",
        fields_path(),
        site.subscriber.id
    );
    let (status, body) = site.get(&path, None).await;
    assert_eq!(status, 200);
    assert_eq!(names(&body), vec!["Filled"]);
    let value = &body["data"][0]["data"]["value"];
    assert_eq!(value["raw"], "Hello <b>");
    assert_eq!(value["unserialized"], json!(["Hello <b>"]));
    assert_eq!(value["rendered"], "Hello &lt;b&gt;");

    let path = format!("{}?member_id=9999", fields_path());
    let (status, body) = site.get(&path, None).await;
    assert_eq!(status, 404);
    assert_eq!(error_code(&body), "rest_member_invalid_id");
}

#[tokio::test]
async fn test_get_field() {
    let site = TestSite::new();
    let community = &site.state().community;
    let mut field = NewField::new(site.group.id, FieldType::Selectbox, "Colour");
    field.description = "Pick one.".to_string();
    field.options = vec![NewOption::new("Red"), NewOption::new("Blue")];
    let field = community.create_field(field).unwrap();

    let (status, body) = site.get(&field_path(field.id), None).await;
    assert_eq!(status, 200);
    let item = &body["data"][0];
    assert_eq!(item["id"], field.id);
    assert_eq!(item["type"], "selectbox");
    assert_eq!(item["order_by"], "ASC");
    assert_eq!(item["description"]["rendered"], "<p>Pick one.</p>\n");
    assert!(item["description"].get("raw").is_none());
    assert_eq!(item["options"].as_array().unwrap().len(), 2);
    assert_eq!(item["options"][0]["name"], "Red");
    assert_eq!(item["options"][0]["type"], "option");
    assert_eq!(item["data"], json!({}));
}

#[tokio::test]
async fn test_get_field_edit_context() {
    let site = TestSite::new();
    let id = create_textbox(&site, "Name");
    let path = format!("{}?context=edit", field_path(id));

    let (status, body) = site.get(&path, Some("admin-token")).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["description"]["raw"], "");

    let (status, _) = site.get(&path, Some("sub-token")).await;
    assert_eq!(status, 403);
    let (status, _) = site.get(&path, None).await;
    assert_eq!(status, 401);

    let path = format!("{}?context=bogus", field_path(id));
    let (status, body) = site.get(&path, None).await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "rest_invalid_param");
}

#[tokio::test]
async fn test_get_field_invalid_id() {
    let site = TestSite::new();
    let (status, body) = site.get(&field_path(9999), None).await;
    assert_eq!(status, 404);
    assert_eq!(error_code(&body), "rest_invalid_id");
}

#[tokio::test]
async fn test_get_field_hidden_by_visibility() {
    let site = TestSite::new();
    let mut field = NewField::new(site.group.id, FieldType::Textbox, "Secret");
    field.visibility_level = VisibilityLevel::AdminsOnly;
    let field = site.state().community.create_field(field).unwrap();

    let (status, _) = site.get(&field_path(field.id), None).await;
    assert_eq!(status, 401);
    let (status, _) = site.get(&field_path(field.id), Some("sub-token")).await;
    assert_eq!(status, 403);
    let (status, _) = site.get(&field_path(field.id), Some("admin-token")).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_create_then_fetch() {
    let site = TestSite::new();
    let (status, body) = site
        .json(
            Method::POST,
            &fields_path(),
            Some("admin-token"),
            Some(json!({
                "group_id": site.group.id,
                "type": "checkbox",
                "name": "  Hobbies ",
                "description": "What you like",
                "is_required": true,
                "order_by": "desc",
                "visibility_level": "loggedin",
                "options": ["Chess", {"name": "Golf", "is_default_option": true}],
            })),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    let created = body["data"][0].clone();
    assert_eq!(created["name"], "Hobbies");
    assert_eq!(created["type"], "checkbox");
    assert_eq!(created["is_required"], true);
    assert_eq!(created["order_by"], "DESC");
    assert_eq!(created["visibility_level"], "loggedin");
    assert_eq!(created["description"]["raw"], "What you like");
    assert_eq!(created["options"][0]["name"], "Golf");
    assert_eq!(created["options"][0]["is_default_option"], true);

    let id = created["id"].as_u64().unwrap();
    let path = format!("{}?context=edit", field_path(id));
    let (status, body) = site.get(&path, Some("admin-token")).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0], created);
}

#[tokio::test]
async fn test_create_from_form_body() {
    let site = TestSite::new();
    let req = Request::builder()
        .method(Method::POST)
        .uri(fields_path())
        .header(AUTHORIZATION, "Bearer admin-token")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Full::new(Bytes::from(format!(
            "group_id={}&type=textarea&name=About+me",
            site.group.id
        ))))
        .unwrap();
    let (status, body) = site.send(req).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"][0]["name"], "About me");
    assert_eq!(body["data"][0]["type"], "textarea");
}

#[tokio::test]
async fn test_create_with_invalid_type() {
    let site = TestSite::new();
    for field_type in [json!(""), json!("bogus"), json!("option")] {
        let (status, body) = site
            .json(
                Method::POST,
                &fields_path(),
                Some("admin-token"),
                Some(json!({"group_id": site.group.id, "type": field_type, "name": "X"})),
            )
            .await;
        assert_eq!(status, 400, "type {}", field_type);
        assert_eq!(error_code(&body), "rest_invalid_param");
        assert_eq!(body["error"]["details"], "type");
    }
}

#[tokio::test]
async fn test_create_validation() {
    let site = TestSite::new();
    let cases = [
        (json!({"type": "textbox", "name": "X"}), "group_id"),
        (json!({"group_id": site.group.id, "name": "X"}), "type"),
        (json!({"group_id": site.group.id, "type": "textbox"}), "name"),
        (json!({"group_id": site.group.id, "type": "textbox", "name": "  "}), "name"),
        (json!({"group_id": 9999, "type": "textbox", "name": "X"}), "group_id"),
        (
            json!({"group_id": site.group.id, "type": "textbox", "name": "X", "options": ["A"]}),
            "options",
        ),
        (
            json!({"group_id": site.group.id, "type": "textbox", "name": "X", "order_by": "up"}),
            "order_by",
        ),
        (
            json!({"group_id": site.group.id, "type": "textbox", "name": "X", "is_required": "maybe"}),
            "is_required",
        ),
    ];
    for (body, param) in cases {
        let (status, response) = site
            .json(Method::POST, &fields_path(), Some("admin-token"), Some(body))
            .await;
        assert_eq!(status, 400, "{}", param);
        assert_eq!(response["error"]["details"], param);
    }
}

#[tokio::test]
async fn test_create_permissions() {
    let site = TestSite::new();
    let body = json!({"group_id": site.group.id, "type": "textbox", "name": "X"});
    let (status, response) = site
        .json(Method::POST, &fields_path(), None, Some(body.clone()))
        .await;
    assert_eq!(status, 401);
    assert_eq!(error_code(&response), "rest_authorization_required");

    let (status, response) = site
        .json(Method::POST, &fields_path(), Some("sub-token"), Some(body))
        .await;
    assert_eq!(status, 403);
    assert_eq!(error_code(&response), "rest_authorization_required");
}

#[tokio::test]
async fn test_malformed_json_body() {
    let site = TestSite::new();
    let req = Request::builder()
        .method(Method::POST)
        .uri(fields_path())
        .header(AUTHORIZATION, "Bearer admin-token")
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from("{oops")))
        .unwrap();
    let (status, body) = site.send(req).await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "rest_invalid_body");
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let site = TestSite::with_config(SiteConfig {
        max_body_size: 256,
        ..Default::default()
    });
    let req = Request::builder()
        .method(Method::GET)
        .uri(fields_path())
        .body(Full::new(Bytes::from(vec![b'x'; 1024])))
        .unwrap();
    let (status, body) = site.send(req).await;
    assert_eq!(status, 413);
    assert_eq!(error_code(&body), "rest_payload_too_large");

    let (status, _) = site
        .json(
            Method::POST,
            &fields_path(),
            Some("admin-token"),
            Some(json!({"group_id": site.group.id, "type": "textbox", "name": "Small"})),
        )
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_failed_extension_update_discards_created_field() {
    let site = TestSite::new();
    register_strict_extension(&site);

    let (status, body) = site
        .json(
            Method::POST,
            &fields_path(),
            Some("admin-token"),
            Some(json!({
                "group_id": site.group.id,
                "type": "textbox",
                "name": "Half made",
                "can_delete": false,
                "foo_field": "bar",
                "strict": "anything",
            })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["details"], "strict");

    let (_, body) = site.get(&fields_path(), None).await;
    assert!(names(&body).is_empty());
}

#[tokio::test]
async fn test_failed_extension_update_restores_field() {
    let site = TestSite::new();
    register_strict_extension(&site);
    let id = create_textbox(&site, "Original");

    let (status, _) = site
        .json(
            Method::PUT,
            &field_path(id),
            Some("admin-token"),
            Some(json!({"name": "Changed", "foo_field": "bar", "strict": "anything"})),
        )
        .await;
    assert_eq!(status, 400);

    let (_, body) = site.get(&field_path(id), None).await;
    assert_eq!(body["data"][0]["name"], "Original");
    assert_eq!(body["data"][0]["foo_field"], "");
}

#[tokio::test]
async fn test_update_is_partial() {
    let site = TestSite::new();
    let id = create_textbox(&site, "Original");

    let (status, body) = site
        .json(
            Method::PUT,
            &field_path(id),
            Some("admin-token"),
            Some(json!({"description": "Now described", "field_order": 4})),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    let updated = &body["data"][0];
    assert_eq!(updated["name"], "Original");
    assert_eq!(updated["group_id"], site.group.id);
    assert_eq!(updated["description"]["raw"], "Now described");
    assert_eq!(updated["field_order"], 4);

    let (status, body) = site
        .json(
            Method::PATCH,
            &field_path(id),
            Some("admin-token"),
            Some(json!({"type": "selectbox", "options": ["One", "Two"]})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["options"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_update_errors() {
    let site = TestSite::new();
    let id = create_textbox(&site, "Name");
    let body = Some(json!({"name": "New"}));

    let (status, _) = site.json(Method::PUT, &field_path(id), None, body.clone()).await;
    assert_eq!(status, 401);
    let (status, _) = site
        .json(Method::PUT, &field_path(id), Some("sub-token"), body.clone())
        .await;
    assert_eq!(status, 403);
    let (status, response) = site
        .json(Method::PUT, &field_path(9999), Some("admin-token"), body)
        .await;
    assert_eq!(status, 404);
    assert_eq!(error_code(&response), "rest_invalid_id");

    let (status, response) = site
        .json(
            Method::PUT,
            &field_path(id),
            Some("admin-token"),
            Some(json!({"type": "bogus"})),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(response["error"]["details"], "type");
}

#[tokio::test]
async fn test_delete_returns_previous() {
    let site = TestSite::new();
    let id = create_textbox(&site, "Doomed");
    let (_, before) = site
        .get(&format!("{}?context=edit", field_path(id)), Some("admin-token"))
        .await;

    let (status, body) = site
        .json(Method::DELETE, &field_path(id), Some("admin-token"), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["deleted"], true);
    assert_eq!(body["data"]["previous"], before["data"][0]);

    let (status, _) = site.get(&field_path(id), None).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_delete_previous_reflects_concurrent_change() {
    let site = TestSite::new();
    let id = create_textbox(&site, "Before");

    // The first render renames the field, as a concurrent PUT would.
    let renamed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&renamed);
    site.state()
        .extensions
        .register(
            "side_effect",
            ExtensionField::new(ExtensionSchema::string("Renames once")).with_getter(
                move |community, field, _| {
                    if !flag.swap(true, Ordering::SeqCst) {
                        community.update_field(
                            field.id,
                            FieldChanges {
                                name: Some("After".to_string()),
                                ..Default::default()
                            },
                        )?;
                    }
                    Ok(json!(""))
                },
            ),
        )
        .unwrap();

    let (status, body) = site
        .json(Method::DELETE, &field_path(id), Some("admin-token"), None)
        .await;
    assert_eq!(status, 200, "{}", body);
    assert!(renamed.load(Ordering::SeqCst));
    assert_eq!(body["data"]["previous"]["name"], "After");

    let (status, _) = site.get(&field_path(id), None).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_delete_errors() {
    let site = TestSite::new();
    let id = create_textbox(&site, "Name");
    let (status, _) = site.json(Method::DELETE, &field_path(id), None, None).await;
    assert_eq!(status, 401);
    let (status, _) = site
        .json(Method::DELETE, &field_path(id), Some("sub-token"), None)
        .await;
    assert_eq!(status, 403);
    let (status, _) = site
        .json(Method::DELETE, &field_path(9999), Some("admin-token"), None)
        .await;
    assert_eq!(status, 404);

    let mut locked = NewField::new(site.group.id, FieldType::Textbox, "Locked");
    locked.can_delete = false;
    let locked = site.state().community.create_field(locked).unwrap();
    let (status, body) = site
        .json(Method::DELETE, &field_path(locked.id), Some("admin-token"), None)
        .await;
    assert_eq!(status, 403);
    assert_eq!(error_code(&body), "rest_field_cannot_delete");
}

#[tokio::test]
async fn test_extension_field_round_trip() {
    let site = TestSite::new();
    site.state()
        .extensions
        .register(
            "foo_field",
            ExtensionField::meta_backed(ExtensionSchema::string("Foo")),
        )
        .unwrap();

    let (status, body) = site
        .json(
            Method::POST,
            &fields_path(),
            Some("admin-token"),
            Some(json!({
                "group_id": site.group.id,
                "type": "textbox",
                "name": "With extras",
                "foo_field": "bar",
            })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["foo_field"], "bar");
    let id = body["data"][0]["id"].as_u64().unwrap();

    let (_, body) = site.get(&field_path(id), None).await;
    assert_eq!(body["data"][0]["foo_field"], "bar");

    let (status, body) = site
        .json(
            Method::PUT,
            &field_path(id),
            Some("admin-token"),
            Some(json!({"foo_field": "baz"})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["foo_field"], "baz");

    let (_, body) = site.json(Method::OPTIONS, &fields_path(), None, None).await;
    assert_eq!(body["data"]["schema"]["properties"]["foo_field"]["type"], "string");
}

#[tokio::test]
async fn test_unknown_route() {
    let site = TestSite::new();
    let (status, body) = site.get(&format!("{}/nothing", PREFIX), None).await;
    assert_eq!(status, 404);
    assert_eq!(error_code(&body), "rest_no_route");
}
