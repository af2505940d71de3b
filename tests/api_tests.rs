//! End-to-end tests against the full router with the default seeded settings
//!
//! The embedded settings provide two accounts (peter@abv.bg / john@abv.bg,
//! password `123456`) and a `recipes` collection owned by Peter.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use mockbase::config::Settings;
use mockbase::server::{build_router, AppState};
use serde_json::{json, Value};

const PETER_ID: &str = "35c62d76-8152-4626-8712-eeb96381bea8";
const LASAGNA_ID: &str = "3987279d-0ad4-4afb-8ca9-5b256ae3b298";

fn test_server() -> TestServer {
    let settings = Settings::default_settings();
    let state = AppState::from_settings(&settings).expect("state from default settings");
    TestServer::new(build_router(state))
}

fn auth_header(token: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-authorization"),
        HeaderValue::from_str(token).expect("header value"),
    )
}

fn admin_header() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-admin"),
        HeaderValue::from_static("true"),
    )
}

async fn login(server: &TestServer, email: &str) -> String {
    let response = server
        .post("/users/login")
        .json(&json!({"email": email, "password": "123456"}))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["accessToken"]
        .as_str()
        .expect("access token")
        .to_string()
}

// ── Accounts ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_returns_profile_and_conflicts_on_repeat() {
    let server = test_server();

    let response = server
        .post("/users/register")
        .json(&json!({"email": "new@user.bg", "password": "secret"}))
        .await;
    response.assert_status_ok();
    let profile = response.json::<Value>();
    assert!(profile["_id"].is_string());
    assert!(profile["accessToken"].is_string());
    assert!(profile.get("hashedPassword").is_none());

    let repeat = server
        .post("/users/register")
        .json(&json!({"email": "new@user.bg", "password": "other"}))
        .await;
    repeat.assert_status(StatusCode::CONFLICT);
    let body = repeat.json::<Value>();
    assert_eq!(body["code"], 409);
    assert_eq!(body["message"], "A user with the same email already exists");
}

#[tokio::test]
async fn register_rejects_missing_fields() {
    let server = test_server();
    let response = server
        .post("/users/register")
        .json(&json!({"email": "   ", "password": "secret"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Missing fields");
}

#[tokio::test]
async fn login_wrong_password_is_403() {
    let server = test_server();
    let response = server
        .post("/users/login")
        .json(&json!({"email": "peter@abv.bg", "password": "nope"}))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(
        response.json::<Value>()["message"],
        "Login or password don't match"
    );
}

#[tokio::test]
async fn token_round_trip_via_users_me() {
    let server = test_server();
    let token = login(&server, "peter@abv.bg").await;

    let (name, value) = auth_header(&token);
    let response = server.get("/users/me").add_header(name, value).await;
    response.assert_status_ok();
    let me = response.json::<Value>();
    assert_eq!(me["email"], "peter@abv.bg");
    assert_eq!(me["_id"], PETER_ID);
    assert!(me.get("hashedPassword").is_none());
}

#[tokio::test]
async fn me_without_token_is_401() {
    let server = test_server();
    let response = server.get("/users/me").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let server = test_server();
    let token = login(&server, "peter@abv.bg").await;

    let (name, value) = auth_header(&token);
    let response = server.get("/users/logout").add_header(name, value).await;
    response.assert_status(StatusCode::NO_CONTENT);
    assert!(response.text().is_empty());

    let (name, value) = auth_header(&token);
    let after = server.get("/users/me").add_header(name, value).await;
    after.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_token_fails_before_the_handler() {
    let server = test_server();
    let (name, value) = auth_header("bogus-token");
    let response = server.get("/data/recipes").add_header(name, value).await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["message"], "Invalid access token");
}

// ── Data service ─────────────────────────────────────────────────────────

#[tokio::test]
async fn guests_can_read_collections() {
    let server = test_server();

    let names = server.get("/data").await;
    names.assert_status_ok();
    assert_eq!(names.json::<Value>(), json!(["recipes"]));

    let recipes = server.get("/data/recipes").await;
    recipes.assert_status_ok();
    assert_eq!(recipes.json::<Value>().as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn guests_cannot_create_records() {
    let server = test_server();
    let response = server
        .post("/data/recipes")
        .json(&json!({"name": "Pie"}))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_stamps_the_requester_as_owner() {
    let server = test_server();
    let token = login(&server, "john@abv.bg").await;

    let (name, value) = auth_header(&token);
    let response = server
        .post("/data/recipes")
        .add_header(name, value)
        .json(&json!({"name": "Shopska Salad", "_ownerId": "forged"}))
        .await;
    response.assert_status_ok();
    let created = response.json::<Value>();
    assert_eq!(created["name"], "Shopska Salad");
    assert_eq!(created["_ownerId"], "847ec027-f659-4086-8032-5173e2f9c93a");
    assert!(created["_createdOn"].is_number());
}

#[tokio::test]
async fn updates_are_gated_to_the_owner() {
    let server = test_server();
    let john = login(&server, "john@abv.bg").await;

    let (name, value) = auth_header(&john);
    let denied = server
        .put(&format!("/data/recipes/{LASAGNA_ID}"))
        .add_header(name, value)
        .json(&json!({"name": "Stolen Lasagna"}))
        .await;
    denied.assert_status(StatusCode::FORBIDDEN);

    let peter = login(&server, "peter@abv.bg").await;
    let (name, value) = auth_header(&peter);
    let allowed = server
        .put(&format!("/data/recipes/{LASAGNA_ID}"))
        .add_header(name, value)
        .json(&json!({"name": "Better Lasagna"}))
        .await;
    allowed.assert_status_ok();
    let updated = allowed.json::<Value>();
    assert_eq!(updated["name"], "Better Lasagna");
    assert_eq!(updated["_ownerId"], PETER_ID);
    assert!(updated["_updatedOn"].is_number());
}

#[tokio::test]
async fn patch_merges_and_delete_returns_a_marker() {
    let server = test_server();
    let peter = login(&server, "peter@abv.bg").await;

    let (name, value) = auth_header(&peter);
    let patched = server
        .patch(&format!("/data/recipes/{LASAGNA_ID}"))
        .add_header(name, value)
        .json(&json!({"likes": 3}))
        .await;
    patched.assert_status_ok();
    let body = patched.json::<Value>();
    assert_eq!(body["likes"], 3);
    assert_eq!(body["name"], "Easy Lasagna");

    let (name, value) = auth_header(&peter);
    let deleted = server
        .delete(&format!("/data/recipes/{LASAGNA_ID}"))
        .add_header(name, value)
        .await;
    deleted.assert_status_ok();
    assert!(deleted.json::<Value>()["_deletedOn"].is_number());

    let gone = server.get(&format!("/data/recipes/{LASAGNA_ID}")).await;
    gone.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(gone.json::<Value>()["message"], "Resource not found");
}

#[tokio::test]
async fn admin_header_overrides_ownership() {
    let server = test_server();
    let (name, value) = admin_header();
    let response = server
        .delete(&format!("/data/recipes/{LASAGNA_ID}"))
        .add_header(name, value)
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn unknown_record_is_a_generic_404() {
    let server = test_server();
    let response = server.get("/data/recipes/no-such-id").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body = response.json::<Value>();
    assert_eq!(body["code"], 404);
    assert_eq!(body["message"], "Resource not found");
}

// ── Query parameters ─────────────────────────────────────────────────────

#[tokio::test]
async fn count_returns_a_number() {
    let server = test_server();
    let response = server
        .get("/data/recipes")
        .add_query_param("count", "true")
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!(2));
}

#[tokio::test]
async fn where_filters_records() {
    let server = test_server();
    let response = server
        .get("/data/recipes")
        .add_query_param("where", r#"name like "lasagna""#)
        .await;
    response.assert_status_ok();
    let hits = response.json::<Value>();
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["name"], "Easy Lasagna");
}

#[tokio::test]
async fn malformed_where_is_a_400() {
    let server = test_server();
    let response = server
        .get("/data/recipes")
        .add_query_param("where", "nonsense")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["message"],
        "Could not parse WHERE clause, check your syntax."
    );
}

#[tokio::test]
async fn sort_and_page_size_shape_the_result() {
    let server = test_server();
    let response = server
        .get("/data/recipes")
        .add_query_param("sortBy", "_createdOn desc")
        .add_query_param("pageSize", "1")
        .await;
    response.assert_status_ok();
    let records = response.json::<Value>();
    assert_eq!(records.as_array().unwrap().len(), 1);
    assert_eq!(records[0]["name"], "Grilled Duck Fillet");
}

#[tokio::test]
async fn select_projects_fields() {
    let server = test_server();
    let response = server
        .get(&format!("/data/recipes/{LASAGNA_ID}"))
        .add_query_param("select", "name")
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!({"name": "Easy Lasagna"}));
}

// ── Jsonstore service ────────────────────────────────────────────────────

#[tokio::test]
async fn jsonstore_crud_without_authentication() {
    let server = test_server();

    let created = server
        .post("/jsonstore/notes")
        .json(&json!({"text": "remember"}))
        .await;
    created.assert_status_ok();
    let entry = created.json::<Value>();
    let id = entry["_id"].as_str().expect("generated id").to_string();

    let fetched = server.get(&format!("/jsonstore/notes/{id}")).await;
    fetched.assert_status_ok();
    assert_eq!(fetched.json::<Value>()["text"], "remember");

    let patched = server
        .patch(&format!("/jsonstore/notes/{id}"))
        .json(&json!({"done": true}))
        .await;
    patched.assert_status_ok();
    assert_eq!(patched.json::<Value>()["done"], true);

    let removed = server.delete(&format!("/jsonstore/notes/{id}")).await;
    removed.assert_status_ok();
    assert_eq!(removed.json::<Value>()["text"], "remember");

    let missing = server.get(&format!("/jsonstore/notes/{id}")).await;
    missing.assert_status(StatusCode::NO_CONTENT);
}

// ── Dispatcher ───────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_service_is_a_400_envelope() {
    let server = test_server();
    let response = server.get("/nothing/here").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "Service \"nothing\" is not supported");
}

#[tokio::test]
async fn admin_path_redirects_with_302() {
    let server = test_server();
    let response = server.get("/admin").await;
    response.assert_status(StatusCode::FOUND);
    assert_eq!(response.header("location"), "/admin/");
}

#[tokio::test]
async fn util_flags_read_and_write() {
    let server = test_server();

    let unset = server.get("/util/throttle").await;
    unset.assert_status(StatusCode::NO_CONTENT);

    let set = server.post("/util").json(&json!({"throttle": false})).await;
    set.assert_status(StatusCode::NO_CONTENT);

    let read = server.get("/util/throttle").await;
    read.assert_status_ok();
    assert_eq!(read.json::<Value>(), json!(false));
}
