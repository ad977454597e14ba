mod common;

use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_create_trip_makes_creator_admin_and_participant() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();

    let (status, body) = common::post_json(
        &app.router,
        "/trip/create",
        &cookie_a,
        json!({
            "name": "Summer in Rome",
            "location": "Rome",
            "start_date": "2025-06-01",
            "end_date": "2025-06-10",
            "visibility": "private"
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Trip created");

    let code = body["trip"]["trip_code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);
    assert_eq!(body["trip"]["name"], "Summer in Rome");

    let (status, trip) = common::get_json(&app.router, &format!("/trip/{}", code), &cookie_a)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trip["members"]["admins"][0]["username"], "alice");
    assert_eq!(trip["members"]["participants"][0]["username"], "alice");
}

#[tokio::test]
async fn test_create_trip_defaults_name_to_location() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();

    let (status, body) = common::post_json(
        &app.router,
        "/trip/create",
        &cookie_a,
        json!({ "location": "Lisbon", "start_date": "2025-06-01" }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["trip"]["name"], "Lisbon trip");
    assert_eq!(body["trip"]["visibility"], "private");
    assert!(body["trip"]["end_date"].is_null());
}

#[tokio::test]
async fn test_create_trip_rejects_bad_input() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();

    let cases = [
        json!({ "location": "", "start_date": "2025-06-01" }),
        json!({ "location": "Rome", "start_date": "not-a-date" }),
        json!({ "location": "Rome", "start_date": "2025-06-10", "end_date": "2025-06-01" }),
        json!({ "location": "Rome", "start_date": "2025-06-01", "visibility": "public" }),
    ];
    for payload in cases {
        let (status, _) = common::post_json(&app.router, "/trip/create", &cookie_a, payload.clone())
            .await
            .unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload: {}", payload);
    }
}

#[tokio::test]
async fn test_trip_codes_are_unique_per_trip() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();

    let mut codes = std::collections::HashSet::new();
    for _ in 0..5 {
        let code =
            common::create_test_trip(&app.router, &cookie_a, "Rome", "2025-06-01", None, "private")
                .await
                .unwrap();
        assert!(codes.insert(code), "trip code collision");
    }

    let (_, body) = common::get_json(&app.router, "/trip", &cookie_a).await.unwrap();
    assert_eq!(body["trips"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_get_trip_requires_participation() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();
    let (_b, cookie_b) = common::register_and_login(&app, "bob").await.unwrap();

    let code =
        common::create_test_trip(&app.router, &cookie_a, "Rome", "2025-06-01", None, "private")
            .await
            .unwrap();

    let (status, _) = common::get_json(&app.router, &format!("/trip/{}", code), &cookie_b)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = common::get_json(&app.router, "/trip/ZZZZZZ", &cookie_a)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_patches_only_supplied_fields() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();

    let code = common::create_test_trip(
        &app.router,
        &cookie_a,
        "Rome",
        "2025-06-01",
        Some("2025-06-10"),
        "private",
    )
    .await
    .unwrap();

    let (status, body) = common::post_json(
        &app.router,
        &format!("/trip/update/{}", code),
        &cookie_a,
        json!({ "name": "Roman Holiday", "visibility": "friends" }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trip"]["name"], "Roman Holiday");
    assert_eq!(body["trip"]["visibility"], "friends");
    assert_eq!(body["trip"]["location"], "Rome");
    assert_eq!(body["trip"]["start_date"], "2025-06-01");
    assert_eq!(body["trip"]["end_date"], "2025-06-10");

    // Empty end date clears it
    let (status, body) = common::post_json(
        &app.router,
        &format!("/trip/update/{}", code),
        &cookie_a,
        json!({ "end_date": "" }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body["trip"]["end_date"].is_null());
}

#[tokio::test]
async fn test_update_rejects_invalid_date_order() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();

    let code = common::create_test_trip(
        &app.router,
        &cookie_a,
        "Rome",
        "2025-06-01",
        Some("2025-06-10"),
        "private",
    )
    .await
    .unwrap();

    let (status, _) = common::post_json(
        &app.router,
        &format!("/trip/update/{}", code),
        &cookie_a,
        json!({ "start_date": "2025-07-01" }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_requires_admin() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();
    let (_b, cookie_b) = common::register_and_login(&app, "bob").await.unwrap();

    common::befriend(&app.router, &cookie_a, "bob", &cookie_b, "alice")
        .await
        .unwrap();
    let code =
        common::create_test_trip(&app.router, &cookie_a, "Rome", "2025-06-01", None, "friends")
            .await
            .unwrap();

    // Bob joins as a plain participant via the friends-visibility path
    let (status, _) = common::post_json(
        &app.router,
        "/trip/join",
        &cookie_b,
        json!({ "trip_code": code }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);

    let (status, _) = common::post_json(
        &app.router,
        &format!("/trip/update/{}", code),
        &cookie_b,
        json!({ "name": "Bob's trip now" }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::FORBIDDEN);
}
