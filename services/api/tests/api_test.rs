//! End-to-end tests driving the full router against the in-memory store.

use api_lib::adapters::MemoryAdapter;
use api_lib::config::Config;
use api_lib::web::{build_router, state::AppState};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

fn app() -> Router {
    let state = Arc::new(AppState::new(
        Arc::new(MemoryAdapter::new()),
        Arc::new(Config::in_memory()),
    ));
    build_router(state).unwrap()
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send_raw(app, method, uri, cookie, body.map(|b| b.to_string())).await
}

async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<String>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Registers `username` and returns its session cookie and id.
async fn signup(app: &Router, username: &str) -> (String, Uuid) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": username, "password": "correct-horse" }).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let user_id = body["user_id"].as_str().unwrap().parse().unwrap();
    (cookie, user_id)
}

async fn create_lesson(app: &Router, cookie: &str, title: &str, duration: i64) -> Uuid {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/lessons/",
        Some(cookie),
        Some(json!({
            "title": title,
            "video_link": format!("https://videos.example.com/{}.mp4", title),
            "duration": duration,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn create_product(
    app: &Router,
    cookie: &str,
    title: &str,
    students: &[Uuid],
    lessons: &[Uuid],
) -> Uuid {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/products/",
        Some(cookie),
        Some(json!({
            "title": title,
            "users_with_access": students,
            "lessons": lessons,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().parse().unwrap()
}

fn ids(items: &Value) -> Vec<String> {
    items
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_requests_without_session_are_rejected() {
    let app = app();
    for uri in [
        "/api/products/",
        "/api/lessons/",
        "/api/user_lesson_views/",
        "/api/accessible_lessons/",
        "/api/accessible_products/",
        "/api/product-statistics/",
    ] {
        let (status, body) = send(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["code"], "UNAUTHENTICATED");
    }

    let (status, _) = send(&app, Method::GET, "/api/products/", Some("session=bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_login_and_logout() {
    let app = app();
    let (_, user_id) = signup(&app, "alice").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": "alice", "password": "correct-horse" }).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string();

    let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], user_id.to_string());
    assert_eq!(me["username"], "alice");

    let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signup_rejects_taken_username_and_short_password() {
    let app = app();
    signup(&app, "alice").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({ "username": "alice", "password": "another-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({ "username": "bob", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_first_access_creates_progress_and_threshold_applies() {
    let app = app();
    let (owner, _) = signup(&app, "owner").await;
    let (student, student_id) = signup(&app, "student").await;

    let l1 = create_lesson(&app, &owner, "L1", 600).await;
    let l2 = create_lesson(&app, &owner, "L2", 1200).await;
    let math = create_product(&app, &owner, "Math", &[student_id], &[l1, l2]).await;

    let uri = format!("/api/products/{}/lessons/", math);
    let (status, listing) = send(&app, Method::GET, &uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::OK, "{}", listing);
    assert_eq!(listing["product_title"], "Math");
    let lessons = listing["lessons"].as_array().unwrap();
    assert_eq!(lessons.len(), 2);
    for lesson in lessons {
        assert_eq!(lesson["viewed_duration"], 0);
        assert_eq!(lesson["is_viewed"], false);
    }

    // The listing created exactly one record per lesson.
    let (_, views) = send(&app, Method::GET, "/api/user_lesson_views/", Some(&student), None).await;
    let views = views.as_array().unwrap();
    assert_eq!(views.len(), 2);
    let l1_view = views
        .iter()
        .find(|v| v["lesson"]["id"] == l1.to_string())
        .unwrap();
    assert_eq!(l1_view["user"]["id"], student_id.to_string());
    let view_uri = format!("/api/user_lesson_views/{}/", l1_view["id"].as_str().unwrap());

    // 0.8 * 600 = 480, so 500 counts as viewed.
    let (status, updated) = send(
        &app,
        Method::PATCH,
        &view_uri,
        Some(&student),
        Some(json!({ "viewed_duration": 500 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["is_viewed"], true);

    // Exactly on the boundary is viewed; one second short is not.
    let (_, updated) = send(
        &app,
        Method::PUT,
        &view_uri,
        Some(&student),
        Some(json!({ "viewed_duration": 480 })),
    )
    .await;
    assert_eq!(updated["is_viewed"], true);
    let (_, updated) = send(
        &app,
        Method::PATCH,
        &view_uri,
        Some(&student),
        Some(json!({ "viewed_duration": 479, "is_viewed": true })),
    )
    .await;
    assert_eq!(updated["is_viewed"], false);
    assert_eq!(updated["viewed_duration"], 479);

    // A second listing reuses the same records.
    let (_, listing) = send(&app, Method::GET, &uri, Some(&student), None).await;
    let l1_row = listing["lessons"]
        .as_array()
        .unwrap()
        .iter()
        .find(|l| l["lesson_id"] == l1.to_string())
        .unwrap();
    assert_eq!(l1_row["viewed_duration"], 479);
    let (_, views) = send(&app, Method::GET, "/api/user_lesson_views/", Some(&student), None).await;
    assert_eq!(views.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_product_lessons_hides_existence_from_outsiders() {
    let app = app();
    let (owner, _) = signup(&app, "owner").await;
    let (outsider, _) = signup(&app, "outsider").await;
    let lesson = create_lesson(&app, &owner, "L1", 600).await;
    let math = create_product(&app, &owner, "Math", &[], &[lesson]).await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/products/{}/lessons/", math),
        Some(&outsider),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/products/{}/lessons/", Uuid::new_v4()),
        Some(&outsider),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    // The owner is not implicitly a student either.
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/products/{}/lessons/", math),
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Nothing was recorded for the rejected callers.
    let (_, views) = send(&app, Method::GET, "/api/user_lesson_views/", Some(&owner), None).await;
    assert!(views.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_only_owner_may_modify_product() {
    let app = app();
    let (owner, owner_id) = signup(&app, "owner").await;
    let (other, other_id) = signup(&app, "other").await;
    let math = create_product(&app, &owner, "Math", &[other_id], &[]).await;
    let uri = format!("/api/products/{}/", math);

    let (status, body) = send(&app, Method::DELETE, &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
    let (status, _) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&other),
        Some(json!({ "title": "Hijacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Reads stay open to everyone authenticated.
    let (status, product) = send(&app, Method::GET, &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["title"], "Math");
    assert_eq!(product["owner"]["id"], owner_id.to_string());
    assert_eq!(product["users_with_access"][0]["username"], "other");

    let (status, product) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&owner),
        Some(json!({ "title": "Algebra" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["title"], "Algebra");
    assert_eq!(product["users_with_access"].as_array().unwrap().len(), 1);

    let (status, product) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&owner),
        Some(json!({ "title": "Geometry" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(product["users_with_access"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/products/{}/", Uuid::new_v4()),
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_accessible_listings() {
    let app = app();
    let (owner, _) = signup(&app, "owner").await;
    let (student, student_id) = signup(&app, "student").await;

    let shared = create_lesson(&app, &owner, "Shared", 600).await;
    let algebra = create_lesson(&app, &owner, "Algebra", 600).await;
    let optics = create_lesson(&app, &owner, "Optics", 600).await;
    let hidden = create_lesson(&app, &owner, "Hidden", 600).await;

    let math = create_product(&app, &owner, "Math", &[student_id], &[algebra, shared]).await;
    let physics = create_product(&app, &owner, "Physics", &[student_id], &[shared, optics]).await;
    create_product(&app, &owner, "Private", &[], &[hidden]).await;

    let (status, products) =
        send(&app, Method::GET, "/api/accessible_products/", Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&products), vec![math.to_string(), physics.to_string()]);

    let (status, lessons) =
        send(&app, Method::GET, "/api/accessible_lessons/", Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        ids(&lessons),
        vec![algebra.to_string(), optics.to_string(), shared.to_string()]
    );
    let shared_row = lessons
        .as_array()
        .unwrap()
        .iter()
        .find(|l| l["id"] == shared.to_string())
        .unwrap();
    assert_eq!(shared_row["included_in_products"].as_array().unwrap().len(), 2);

    // The owner of all three has access to none of them.
    let (_, products) = send(&app, Method::GET, "/api/accessible_products/", Some(&owner), None).await;
    assert!(products.as_array().unwrap().is_empty());
    let (_, lessons) = send(&app, Method::GET, "/api/accessible_lessons/", Some(&owner), None).await;
    assert!(lessons.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_statistics_rollup() {
    let app = app();
    let (owner, _) = signup(&app, "owner").await;
    let (alice, alice_id) = signup(&app, "alice").await;
    let (bob, bob_id) = signup(&app, "bob").await;
    signup(&app, "carol").await;

    let l1 = create_lesson(&app, &owner, "L1", 600).await;
    let l2 = create_lesson(&app, &owner, "L2", 1200).await;
    let math = create_product(&app, &owner, "Math", &[alice_id, bob_id], &[l1, l2]).await;
    let empty = create_product(&app, &owner, "Empty", &[], &[]).await;

    for (cookie, viewed) in [(&alice, 600), (&bob, 500)] {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/user_lesson_views/",
            Some(cookie),
            Some(json!({ "lesson_id": l1, "viewed_duration": viewed })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/user_lesson_views/",
        Some(&alice),
        Some(json!({ "lesson_id": l2, "viewed_duration": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, stats) =
        send(&app, Method::GET, "/api/product-statistics/", Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    let stats = stats.as_array().unwrap();
    assert_eq!(stats.len(), 2);

    let math_stats = stats
        .iter()
        .find(|s| s["product_id"] == math.to_string())
        .unwrap();
    assert_eq!(math_stats["product"], "Math");
    assert_eq!(math_stats["watched_lessons_count"], 2);
    assert_eq!(math_stats["total_viewed_time"], 1200);
    assert_eq!(math_stats["students_count"], 2);
    assert_eq!(math_stats["acquisition_percentage"].as_f64().unwrap(), 50.0);

    let empty_stats = stats
        .iter()
        .find(|s| s["product_id"] == empty.to_string())
        .unwrap();
    assert_eq!(empty_stats["watched_lessons_count"], 0);
    assert_eq!(empty_stats["total_viewed_time"], 0);
    assert_eq!(empty_stats["students_count"], 0);
    assert_eq!(empty_stats["acquisition_percentage"].as_f64().unwrap(), 0.0);
}

#[tokio::test]
async fn test_deleting_shared_lesson_cascades_views_only() {
    let app = app();
    let (owner, _) = signup(&app, "owner").await;
    let (student, student_id) = signup(&app, "student").await;

    let shared = create_lesson(&app, &owner, "Shared", 600).await;
    let math = create_product(&app, &owner, "Math", &[student_id], &[shared]).await;
    let physics = create_product(&app, &owner, "Physics", &[student_id], &[shared]).await;

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/products/{}/lessons/", math),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/lessons/{}/", shared),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, views) = send(&app, Method::GET, "/api/user_lesson_views/", Some(&student), None).await;
    assert!(views.as_array().unwrap().is_empty());
    for product in [math, physics] {
        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/products/{}/", product),
            Some(&owner),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["lessons"].as_array().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_lesson_validation() {
    let app = app();
    let (cookie, _) = signup(&app, "author").await;

    for payload in [
        json!({ "title": "L1", "video_link": "https://videos.example.com/l1", "duration": 0 }),
        json!({ "title": "L1", "video_link": "https://videos.example.com/l1", "duration": -10 }),
        json!({ "title": "L1", "video_link": "not-a-url", "duration": 600 }),
        json!({ "title": "   ", "video_link": "https://videos.example.com/l1", "duration": 600 }),
    ] {
        let (status, body) =
            send(&app, Method::POST, "/api/lessons/", Some(&cookie), Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    let lesson = create_lesson(&app, &cookie, "L1", 600).await;
    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/lessons/{}/", lesson),
        Some(&cookie),
        Some(json!({ "duration": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_view_record_rules() {
    let app = app();
    let (cookie, _) = signup(&app, "student").await;
    let lesson = create_lesson(&app, &cookie, "L1", 600).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/user_lesson_views/",
        Some(&cookie),
        Some(json!({ "lesson_id": lesson, "viewed_duration": -1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/user_lesson_views/",
        Some(&cookie),
        Some(json!({ "lesson_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // An explicit is_viewed is overwritten by the derived value.
    let (status, view) = send(
        &app,
        Method::POST,
        "/api/user_lesson_views/",
        Some(&cookie),
        Some(json!({ "lesson_id": lesson, "viewed_duration": 10, "is_viewed": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(view["is_viewed"], false);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/user_lesson_views/",
        Some(&cookie),
        Some(json!({ "lesson_id": lesson, "viewed_duration": 20 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let view_uri = format!("/api/user_lesson_views/{}/", view["id"].as_str().unwrap());
    let (status, _) = send(&app, Method::PUT, &view_uri, Some(&cookie), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::DELETE, &view_uri, Some(&cookie), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &view_uri, Some(&cookie), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duration_change_reevaluates_views() {
    let app = app();
    let (cookie, _) = signup(&app, "student").await;
    let lesson = create_lesson(&app, &cookie, "L1", 600).await;

    let (_, view) = send(
        &app,
        Method::POST,
        "/api/user_lesson_views/",
        Some(&cookie),
        Some(json!({ "lesson_id": lesson, "viewed_duration": 500 })),
    )
    .await;
    assert_eq!(view["is_viewed"], true);
    let view_uri = format!("/api/user_lesson_views/{}/", view["id"].as_str().unwrap());

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/lessons/{}/", lesson),
        Some(&cookie),
        Some(json!({ "duration": 1200 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, view) = send(&app, Method::GET, &view_uri, Some(&cookie), None).await;
    assert_eq!(view["is_viewed"], false);
    assert_eq!(view["lesson"]["duration"], 1200);

    let (_, _) = send(
        &app,
        Method::PUT,
        &format!("/api/lessons/{}/", lesson),
        Some(&cookie),
        Some(json!({
            "title": "L1",
            "video_link": "https://videos.example.com/L1.mp4",
            "duration": 625,
        })),
    )
    .await;
    let (_, view) = send(&app, Method::GET, &view_uri, Some(&cookie), None).await;
    assert_eq!(view["is_viewed"], true);
}

#[tokio::test]
async fn test_malformed_bodies_use_the_error_format() {
    let app = app();
    let (cookie, _) = signup(&app, "author").await;

    let cases = [
        r#"{"title":"L1","video_link":"https://videos.example.com/l1","duration":"ten"}"#,
        r#"{"title":"L1","video_link":"https://videos.example.com/l1""#,
        r#"{"title":"L1"}"#,
    ];
    for raw in cases {
        let (status, body) = send_raw(
            &app,
            Method::POST,
            "/api/lessons/",
            Some(&cookie),
            Some(raw.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", raw);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["error"].is_string());
    }

    let (status, body) = send_raw(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some("not json".to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_malformed_ids_are_not_found() {
    let app = app();
    let (cookie, _) = signup(&app, "student").await;

    for uri in [
        "/api/products/not-a-uuid/lessons/",
        "/api/products/not-a-uuid/",
        "/api/lessons/123/",
        "/api/user_lesson_views/xyz/",
    ] {
        let (status, body) = send(&app, Method::GET, uri, Some(&cookie), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn test_viewed_duration_is_bounded_and_statistics_stay_finite() {
    let app = app();
    let (owner, _) = signup(&app, "owner").await;
    let (alice, alice_id) = signup(&app, "alice").await;
    let (bob, bob_id) = signup(&app, "bob").await;
    let lesson = create_lesson(&app, &owner, "L1", 600).await;
    let math = create_product(&app, &owner, "Math", &[alice_id, bob_id], &[lesson]).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/user_lesson_views/",
        Some(&alice),
        Some(json!({ "lesson_id": lesson, "viewed_duration": i64::MAX })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    for cookie in [&alice, &bob] {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/user_lesson_views/",
            Some(cookie),
            Some(json!({ "lesson_id": lesson, "viewed_duration": 1_000_000_000 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, stats) =
        send(&app, Method::GET, "/api/product-statistics/", Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    let math_stats = stats
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["product_id"] == math.to_string())
        .unwrap();
    assert_eq!(math_stats["total_viewed_time"], 2_000_000_000_i64);
    assert_eq!(math_stats["watched_lessons_count"], 2);
}

#[tokio::test]
async fn test_concurrent_first_listing_creates_one_record_per_lesson() {
    let app = app();
    let (owner, _) = signup(&app, "owner").await;
    let (student, student_id) = signup(&app, "student").await;
    let l1 = create_lesson(&app, &owner, "L1", 600).await;
    let l2 = create_lesson(&app, &owner, "L2", 1200).await;
    let math = create_product(&app, &owner, "Math", &[student_id], &[l1, l2]).await;

    let uri = format!("/api/products/{}/lessons/", math);
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let app = app.clone();
        let uri = uri.clone();
        let student = student.clone();
        tasks.spawn(async move { send(&app, Method::GET, &uri, Some(&student), None).await.0 });
    }
    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }

    let (_, views) = send(&app, Method::GET, "/api/user_lesson_views/", Some(&student), None).await;
    assert_eq!(views.as_array().unwrap().len(), 2);
}
