mod common;

use axum::http::StatusCode;

#[tokio::test]
async fn test_favorite_toggle_is_idempotent() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();

    let code =
        common::create_test_trip(&app.router, &cookie_a, "Rome", "2025-06-01", None, "private")
            .await
            .unwrap();

    // Setting true twice leaves exactly one favorite reference
    for _ in 0..2 {
        let (status, body) = common::get_json(
            &app.router,
            &format!("/trip/favorite/{}/true", code),
            &cookie_a,
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["favorited"], true);
    }

    let (_, body) = common::get_json(&app.router, "/trip", &cookie_a).await.unwrap();
    let trips = body["trips"].as_array().unwrap();
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0]["favorited"], true);

    let conn = app.state.db.read().await;
    let mut rows = conn
        .query("SELECT COUNT(*) FROM trip_favorites", ())
        .await
        .unwrap();
    let row = rows.next().await.unwrap().unwrap();
    let count: i64 = row.get(0).unwrap();
    assert_eq!(count, 1, "expected exactly one favorite row");
}

#[tokio::test]
async fn test_unfavorite_clears_flag() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();

    let code =
        common::create_test_trip(&app.router, &cookie_a, "Rome", "2025-06-01", None, "private")
            .await
            .unwrap();

    common::get_json(
        &app.router,
        &format!("/trip/favorite/{}/true", code),
        &cookie_a,
    )
    .await
    .unwrap();

    let (status, body) = common::get_json(
        &app.router,
        &format!("/trip/favorite/{}/false", code),
        &cookie_a,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["favorited"], false);

    let (_, body) = common::get_json(&app.router, "/trip", &cookie_a).await.unwrap();
    assert_eq!(body["trips"][0]["favorited"], false);
}

#[tokio::test]
async fn test_favorite_requires_participation() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();
    let (_b, cookie_b) = common::register_and_login(&app, "bob").await.unwrap();

    let code =
        common::create_test_trip(&app.router, &cookie_a, "Rome", "2025-06-01", None, "private")
            .await
            .unwrap();

    let (status, _) = common::get_json(
        &app.router,
        &format!("/trip/favorite/{}/true", code),
        &cookie_b,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_favorite_rejects_bad_value() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();

    let code =
        common::create_test_trip(&app.router, &cookie_a, "Rome", "2025-06-01", None, "private")
            .await
            .unwrap();

    let (status, _) = common::get_json(
        &app.router,
        &format!("/trip/favorite/{}/maybe", code),
        &cookie_a,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
