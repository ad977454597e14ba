mod common;

use axum::http::StatusCode;
use serde_json::json;

/// Two friends on one trip with two expenses:
///   100 paid by alice, split [alice, bob]
///   30 paid by alice, split [bob]
async fn seed_trip(app: &common::TestApp) -> anyhow::Result<(String, String, String)> {
    let (_a, cookie_a) = common::register_and_login(app, "alice").await?;
    let (_b, cookie_b) = common::register_and_login(app, "bob").await?;

    common::befriend(&app.router, &cookie_a, "bob", &cookie_b, "alice").await?;
    let code = common::create_test_trip(
        &app.router,
        &cookie_a,
        "Rome",
        "2025-05-01",
        Some("2025-05-10"),
        "friends",
    )
    .await?;
    common::post_json(
        &app.router,
        "/trip/join",
        &cookie_b,
        json!({ "trip_code": code }),
    )
    .await?;

    for (amount, split) in [(100.0, vec!["alice", "bob"]), (30.0, vec!["bob"])] {
        let (status, _) = common::post_json(
            &app.router,
            &format!("/trip/expense/add/{}", code),
            &cookie_a,
            json!({
                "paid_by": "alice",
                "split_between": split,
                "amount": amount,
                "date": "2025-05-02"
            }),
        )
        .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "expense add failed");
    }

    Ok((code, cookie_a, cookie_b))
}

#[tokio::test]
async fn test_trip_totals_sum_own_shares_not_raw_amounts() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (code, cookie_a, cookie_b) = seed_trip(&app).await.unwrap();

    // Alice is only in the 100 split: her share is 50
    let (status, body) = common::get_json(&app.router, "/metrics/all-trips/expense/total", &cookie_a)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    let totals = body["trip_expenses"].as_array().unwrap();
    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0]["trip_code"], code.as_str());
    assert_eq!(totals[0]["total"], 50.0);

    // Bob: 50 from the shared dinner plus the full 30 fronted for him
    let (_, body) = common::get_json(&app.router, "/metrics/all-trips/expense/total", &cookie_b)
        .await
        .unwrap();
    assert_eq!(body["trip_expenses"][0]["total"], 80.0);
}

#[tokio::test]
async fn test_payer_split_sums_raw_amounts() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (code, cookie_a, _cookie_b) = seed_trip(&app).await.unwrap();

    let (status, body) = common::get_json(
        &app.router,
        &format!("/metrics/expense/split/{}", code),
        &cookie_a,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trip_code"], code.as_str());

    // Raw amounts by payer, not per-share attribution
    let split = body["expense_split"].as_array().unwrap();
    assert_eq!(split.len(), 1);
    assert_eq!(split[0]["username"], "alice");
    assert_eq!(split[0]["amount"], 130.0);
}

#[tokio::test]
async fn test_split_all_trips_groups_by_trip_code() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (code, cookie_a, _cookie_b) = seed_trip(&app).await.unwrap();

    // A second trip with its own expense
    let code2 =
        common::create_test_trip(&app.router, &cookie_a, "Lisbon", "2025-07-01", None, "private")
            .await
            .unwrap();
    common::post_json(
        &app.router,
        &format!("/trip/expense/add/{}", code2),
        &cookie_a,
        json!({
            "paid_by": "alice",
            "split_between": ["alice"],
            "amount": 42.0,
            "date": "2025-07-02"
        }),
    )
    .await
    .unwrap();

    let (status, body) = common::get_json(&app.router, "/metrics/all-trips/expense/split", &cookie_a)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let splits = body["splits"].as_object().unwrap();
    assert_eq!(splits.len(), 2);
    assert_eq!(splits[&code]["expense_split"][0]["amount"], 130.0);
    assert_eq!(splits[&code2]["trip_name"], "Lisbon trip");
    assert_eq!(splits[&code2]["expense_split"][0]["amount"], 42.0);
}

#[tokio::test]
async fn test_trip_durations_sorted_longest_first() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();

    let short = common::create_test_trip(
        &app.router,
        &cookie_a,
        "Rome",
        "2025-05-01",
        Some("2025-05-04"),
        "private",
    )
    .await
    .unwrap();
    let long = common::create_test_trip(
        &app.router,
        &cookie_a,
        "Lisbon",
        "2025-06-01",
        Some("2025-06-15"),
        "private",
    )
    .await
    .unwrap();

    let (status, body) = common::get_json(&app.router, "/metrics/all-trips/duration", &cookie_a)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let trips = body["trips"].as_array().unwrap();
    assert_eq!(trips.len(), 2);
    assert_eq!(trips[0]["trip_code"], long.as_str());
    assert_eq!(trips[0]["duration_days"], 14);
    assert_eq!(trips[1]["trip_code"], short.as_str());
    assert_eq!(trips[1]["duration_days"], 3);
}

#[tokio::test]
async fn test_ongoing_trip_duration_counts_to_today() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (_a, cookie_a) = common::register_and_login(&app, "alice").await.unwrap();

    // Started long ago, never ended
    common::create_test_trip(&app.router, &cookie_a, "Rome", "2020-01-01", None, "private")
        .await
        .unwrap();

    let (_, body) = common::get_json(&app.router, "/metrics/all-trips/duration", &cookie_a)
        .await
        .unwrap();
    let days = body["trips"][0]["duration_days"].as_i64().unwrap();
    assert!(days > 365 * 4, "ongoing trip should span years, got {}", days);
}

#[tokio::test]
async fn test_metrics_require_session() {
    let app = common::setup_test_app().await.expect("setup failed");

    for uri in [
        "/metrics/expense/balances",
        "/metrics/all-trips/expense/total",
        "/metrics/all-trips/expense/split",
        "/metrics/all-trips/duration",
    ] {
        let request = axum::http::Request::builder()
            .method("GET")
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap();
        let response = tower::util::ServiceExt::oneshot(app.router.clone(), request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "uri: {}", uri);
    }
}
