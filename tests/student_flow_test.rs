use std::env;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::{get, post, put},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

use assessment_backend::dto::manage_dto::{CreateQuestion, CreateTestPayload};
use assessment_backend::middleware::auth::Claims;
use assessment_backend::models::question::{AnswerValue, OptionLetter};
use assessment_backend::models::session_report::ViolationKind;
use assessment_backend::models::user::Role;
use assessment_backend::services::attempt_service::{AttemptService, BlockedReason, Resolution};
use assessment_backend::services::proctoring_service::{self, ProctoringEvent};
use assessment_backend::utils::clock::FixedClock;

fn bearer_for(user_id: Uuid, role: Role) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        role,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret("test_secret_key".as_bytes()),
    )
    .expect("sign token");
    format!("Bearer {}", token)
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
async fn student_flow_end_to_end() {
    dotenvy::dotenv().ok();
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    env::set_var("JWT_SECRET", "test_secret_key");

    assessment_backend::config::init_config().expect("init config");
    let pool = assessment_backend::database::pool::create_pool()
        .await
        .expect("pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    let faculty = Uuid::new_v4();
    let student = Uuid::new_v4();

    let test_service =
        assessment_backend::services::test_service::TestService::new(pool.clone());
    let now = Utc::now();
    let (test, questions) = test_service
        .create_test(
            CreateTestPayload {
                title: "Flow Test".into(),
                start_time: now - Duration::minutes(5),
                end_time: now + Duration::hours(1),
                max_attempts: 1,
                duration_minutes: Some(30),
                proctored: true,
                questions: vec![
                    CreateQuestion {
                        prompt: "2 + 2?".into(),
                        marks: 4,
                        negative_marks: 1,
                        options: Some(vec!["1".into(), "2".into(), "3".into(), "4".into()]),
                        answer_key: AnswerValue::SingleChoice(OptionLetter::D),
                    },
                    CreateQuestion {
                        prompt: "Capital of France?".into(),
                        marks: 3,
                        negative_marks: 0,
                        options: None,
                        answer_key: AnswerValue::FreeText("Paris".into()),
                    },
                ],
            },
            faculty,
        )
        .await
        .expect("create test");
    test_service.publish_test(test.id).await.expect("publish");

    let (events, mut event_rx) = proctoring_service::event_channel(64);
    let app_state = assessment_backend::AppState::new(pool.clone(), events);

    let app = Router::new()
        .route(
            "/api/student/tests/:test_id/start-or-resume",
            post(assessment_backend::routes::student::start_or_resume),
        )
        .route(
            "/api/student/attempts/:attempt_id/answers/:question_id",
            put(assessment_backend::routes::student::save_answer),
        )
        .route(
            "/api/student/attempts/:attempt_id/events",
            post(assessment_backend::routes::student::report_event),
        )
        .route(
            "/api/student/attempts/:attempt_id/submit",
            post(assessment_backend::routes::student::submit_test),
        )
        .route(
            "/api/student/attempts/:attempt_id/result",
            get(assessment_backend::routes::student::get_result),
        )
        .route(
            "/api/student/attempts/:attempt_id/session",
            get(assessment_backend::routes::student::get_session),
        )
        .layer(axum::middleware::from_fn(
            assessment_backend::middleware::auth::require_take_tests,
        ))
        .layer(axum::middleware::from_fn(
            assessment_backend::middleware::auth::authenticate,
        ))
        .with_state(app_state.clone());

    let auth = bearer_for(student, Role::Student);

    // start
    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/student/tests/{}/start-or-resume", test.id))
        .header("authorization", &auth)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "STARTED");
    let attempt_id = body["attempt"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["questions"].as_array().unwrap().len(), 2);
    // no key material in the student view
    assert!(body["questions"][0].get("answer_key").is_none());

    // answer both questions, changing the first once
    for (question, answer) in [
        (&questions[0], json!({"kind": "single_choice", "value": "A"})),
        (&questions[0], json!({"kind": "single_choice", "value": "D"})),
        (&questions[1], json!({"kind": "free_text", "value": " p-a_r i s "})),
    ] {
        let req = Request::builder()
            .method("PUT")
            .uri(format!(
                "/api/student/attempts/{}/answers/{}",
                attempt_id, question.id
            ))
            .header("authorization", &auth)
            .header("content-type", "application/json")
            .body(Body::from(json!({ "answer": answer }).to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // wrong shape is rejected
    let req = Request::builder()
        .method("PUT")
        .uri(format!(
            "/api/student/attempts/{}/answers/{}",
            attempt_id, questions[0].id
        ))
        .header("authorization", &auth)
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "answer": {"kind": "free_text", "value": "4"} }).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // the event endpoint accepts known kinds and rejects unknown ones
    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/student/attempts/{}/events", attempt_id))
        .header("authorization", &auth)
        .header("content-type", "application/json")
        .body(Body::from(json!({"type": "tab_switch"}).to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let queued = event_rx.recv().await.expect("queued event");
    assert!(matches!(queued.kind, ViolationKind::TabSwitch));

    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/student/attempts/{}/events", attempt_id))
        .header("authorization", &auth)
        .header("content-type", "application/json")
        .body(Body::from(json!({"type": "mind_reading"}).to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // drive the aggregator directly so the verdict is deterministic
    let attempt_uuid: Uuid = attempt_id.parse().unwrap();
    app_state
        .proctoring_service
        .record_event(&ProctoringEvent {
            attempt_id: attempt_uuid,
            kind: ViolationKind::TabSwitch,
            count: 1,
        })
        .await
        .expect("record event");

    // submit, then submit again to confirm the idempotent terminal state
    for _ in 0..2 {
        let req = Request::builder()
            .method("POST")
            .uri(format!("/api/student/attempts/{}/submit", attempt_id))
            .header("authorization", &auth)
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["score"].as_i64(), Some(7));
        assert_eq!(body["is_valid_test"], json!(true));
    }

    // answers are frozen after submission
    let req = Request::builder()
        .method("PUT")
        .uri(format!(
            "/api/student/attempts/{}/answers/{}",
            attempt_id, questions[0].id
        ))
        .header("authorization", &auth)
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "answer": {"kind": "single_choice", "value": "A"} }).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // a finalized session report with one tab switch stays valid
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/student/attempts/{}/session", attempt_id))
        .header("authorization", &auth)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["proctored"], json!(true));
    assert_eq!(body["report"]["tab_switches"].as_i64(), Some(1));
    assert_eq!(body["report"]["finalized"], json!(true));

    // the single allowed attempt is used up
    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/student/tests/{}/start-or-resume", test.id))
        .header("authorization", &auth)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "BLOCKED");
    assert_eq!(body["blocked"]["kind"], "max_attempts_reached");

    // with a clock pinned past the window, a fresh student is time-gated
    let late_ledger = AttemptService::with_clock(
        pool.clone(),
        std::sync::Arc::new(FixedClock(test.end_time + Duration::hours(1))),
    );
    match late_ledger
        .resolve_for_student(&test, Uuid::new_v4())
        .await
        .expect("resolve")
    {
        Resolution::Blocked(BlockedReason::WindowClosed { closed_at }) => {
            assert_eq!(closed_at, test.end_time)
        }
        other => panic!("expected WindowClosed, got {:?}", other),
    }

    // another student cannot see this attempt
    let other = bearer_for(Uuid::new_v4(), Role::Student);
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/student/attempts/{}/result", attempt_id))
        .header("authorization", &other)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
