//! HTTP/SSE surface tests
//!
//! Requests go through the full router (auth middleware included) with
//! `oneshot`; the service underneath runs on the in-memory store.

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use helpers::{Harness, Participants};
use proctor_common::events::Principal;
use proctor_rt::api::{build_router, AppContext};
use serde_json::{json, Value};
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

fn setup_app(h: &Harness) -> Router {
    build_router(AppContext::new(h.service.clone()))
}

fn request(method: &str, uri: &str, principal: Option<&Principal>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(principal) = principal {
        builder = builder.header("authorization", format!("Bearer {}", Harness::token(principal)));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn schedule_body(p: &Participants, starts_in_minutes: i64) -> Value {
    json!({
        "candidate_id": p.candidate.user_id,
        "interviewer_id": p.interviewer.user_id,
        "scheduled_at": Utc::now() + ChronoDuration::minutes(starts_in_minutes),
        "duration_minutes": 60
    })
}

async fn schedule(app: &Router, p: &Participants, starts_in_minutes: i64) -> Uuid {
    let response = app
        .clone()
        .oneshot(request("POST", "/sessions", Some(&p.interviewer), Some(schedule_body(p, starts_in_minutes))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "scheduled");
    assert_eq!(body["integrity_score"], 100.0);
    body["id"].as_str().unwrap().parse().unwrap()
}

// =============================================================================
// Health and authentication
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let h = Harness::new();
    let app = setup_app(&h);

    let response = app.oneshot(request("GET", "/health", None, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "proctor-rt");
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let h = Harness::new();
    let app = setup_app(&h);
    let uri = format!("/sessions/{}", Uuid::new_v4());

    let response = app.clone().oneshot(request("GET", &uri, None, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "authentication");

    let forged = Request::builder()
        .uri(&uri)
        .header("authorization", "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(forged).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_accepted_from_query() {
    let h = Harness::new();
    let app = setup_app(&h);
    let p = Participants::new();
    let session_id = schedule(&app, &p, 0).await;

    let uri = format!("/sessions/{}?token={}", session_id, Harness::token(&p.interviewer));
    let response = app.oneshot(request("GET", &uri, None, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Scheduling and reads
// =============================================================================

#[tokio::test]
async fn test_schedule_rules() {
    let h = Harness::new();
    let app = setup_app(&h);
    let p = Participants::new();

    // Candidates cannot schedule
    let response = app
        .clone()
        .oneshot(request("POST", "/sessions", Some(&p.candidate), Some(schedule_body(&p, 10))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Duration outside 5..=180
    let mut body = schedule_body(&p, 10);
    body["duration_minutes"] = json!(3);
    let response = app
        .clone()
        .oneshot(request("POST", "/sessions", Some(&p.interviewer), Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    schedule(&app, &p, 10).await;
}

#[tokio::test]
async fn test_stranger_cannot_read_session() {
    let h = Harness::new();
    let app = setup_app(&h);
    let p = Participants::new();
    let session_id = schedule(&app, &p, 0).await;
    let stranger = Participants::new().candidate;

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/sessions/{}", session_id), Some(&stranger), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(request("GET", &format!("/sessions/{}", Uuid::new_v4()), Some(&p.interviewer), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_access_decision_endpoint() {
    let h = Harness::new();
    let app = setup_app(&h);
    let p = Participants::new();
    let session_id = schedule(&app, &p, 30).await;

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/sessions/{}/access", session_id), Some(&p.candidate), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        extract_json(response.into_body()).await,
        json!({"decision": "deny", "reason": "not_started"})
    );

    // Interviewers are not bound by the window
    let response = app
        .clone()
        .oneshot(request("GET", &format!("/sessions/{}/access", session_id), Some(&p.interviewer), None))
        .await
        .unwrap();
    assert_eq!(extract_json(response.into_body()).await, json!({"decision": "allow"}));

    // Evaluated at an explicit instant after the window
    let late = (Utc::now() + ChronoDuration::hours(3)).format("%Y-%m-%dT%H:%M:%SZ");
    let uri = format!("/sessions/{}/access?at={}", session_id, late);
    let response = app.oneshot(request("GET", &uri, Some(&p.candidate), None)).await.unwrap();
    assert_eq!(
        extract_json(response.into_body()).await,
        json!({"decision": "deny", "reason": "expired"})
    );
}

// =============================================================================
// Stream, detections and leave
// =============================================================================

#[tokio::test]
async fn test_stream_refused_before_window() {
    let h = Harness::new();
    let app = setup_app(&h);
    let p = Participants::new();
    let session_id = schedule(&app, &p, 30).await;

    let response = app
        .oneshot(request("GET", &format!("/sessions/{}/stream", session_id), Some(&p.candidate), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "access_window");
    assert_eq!(body["reason"], "not_started");
}

#[tokio::test]
async fn test_stream_detection_flow() {
    let h = Harness::new();
    let app = setup_app(&h);
    let p = Participants::new();
    let session_id = schedule(&app, &p, -1).await;

    let stream = app
        .clone()
        .oneshot(request("GET", &format!("/sessions/{}/stream", session_id), Some(&p.candidate), None))
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);
    let connection_id = stream
        .headers()
        .get("x-connection-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let detection_uri = format!("/sessions/{}/detections", session_id);
    let detection = |principal: &Principal, conn: Option<&str>, body: Value| {
        let mut req = request("POST", &detection_uri, Some(principal), Some(body));
        if let Some(conn) = conn {
            req.headers_mut().insert("x-connection-id", conn.parse().unwrap());
        }
        req
    };
    let phone = json!({"kind": "phone-detected", "confidence": 0.85});

    // Not started yet
    let response = app
        .clone()
        .oneshot(detection(&p.candidate, Some(&connection_id), phone.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(extract_json(response.into_body()).await["error"], "invalid_state");

    let response = app
        .clone()
        .oneshot(request("POST", &format!("/sessions/{}/start", session_id), Some(&p.interviewer), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await["status"], "in_progress");

    let response = app
        .clone()
        .oneshot(detection(&p.candidate, Some(&connection_id), phone.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["deduction"], 12.0);
    assert_eq!(body["resulting_score"], 88.0);
    assert_eq!(body["event"]["severity"], "high");

    // Missing connection header
    let response = app
        .clone()
        .oneshot(detection(&p.candidate, None, phone.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Someone else's connection
    let response = app
        .clone()
        .oneshot(detection(&p.interviewer, Some(&connection_id), phone.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(detection(
            &p.candidate,
            Some(&connection_id),
            json!({"kind": "gaze-drift", "confidence": 0.5}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/sessions/{}/events", session_id), Some(&p.interviewer), None))
        .await
        .unwrap();
    let log = extract_json(response.into_body()).await;
    assert_eq!(log.as_array().unwrap().len(), 1);

    drop(stream);
}

#[tokio::test]
async fn test_dropping_stream_leaves_room() {
    let h = Harness::new();
    let app = setup_app(&h);
    let p = Participants::new();
    let session_id = schedule(&app, &p, -1).await;

    let stream = app
        .clone()
        .oneshot(request("GET", &format!("/sessions/{}/stream", session_id), Some(&p.candidate), None))
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);
    assert_eq!(h.service.registry().connection_count().await, 1);

    drop(stream);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.service.registry().connection_count().await, 0);
    // Scheduled is not terminal, so the session stays loaded
    assert!(h.service.registry().is_loaded(session_id).await);
}

#[tokio::test]
async fn test_explicit_leave() {
    let h = Harness::new();
    let app = setup_app(&h);
    let p = Participants::new();
    let session_id = schedule(&app, &p, -1).await;

    let stream = app
        .clone()
        .oneshot(request("GET", &format!("/sessions/{}/stream", session_id), Some(&p.interviewer), None))
        .await
        .unwrap();
    let connection_id = stream.headers().get("x-connection-id").unwrap().clone();

    let mut leave = request("POST", "/connections/leave", Some(&p.interviewer), None);
    leave.headers_mut().insert("x-connection-id", connection_id.clone());
    let response = app.clone().oneshot(leave).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        extract_json(response.into_body()).await,
        json!({"left": session_id})
    );

    // Second leave is a no-op
    let mut leave = request("POST", "/connections/leave", Some(&p.interviewer), None);
    leave.headers_mut().insert("x-connection-id", connection_id);
    let response = app.oneshot(leave).await.unwrap();
    assert_eq!(extract_json(response.into_body()).await, json!({"left": null}));

    drop(stream);
}
