use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::manage_dto::{CreateTestPayload, TestWithQuestions};
use crate::middleware::auth::SessionContext;
use crate::AppState;

#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Json(payload): Json<CreateTestPayload>,
) -> crate::error::Result<Response> {
    payload.validate()?;
    let (test, questions) = state
        .test_service
        .create_test(payload, session.user_id)
        .await?;
    tracing::info!(test_id = %test.id, questions = questions.len(), "test created");

    Ok((
        StatusCode::CREATED,
        Json(TestWithQuestions { test, questions }),
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/api/manage/tests/{id}/publish",
    params(
        ("id" = String, Path, description = "Test ID")
    ),
    responses(
        (status = 200, description = "Test published"),
        (status = 404, description = "Test not found"),
    ),
)]
pub async fn publish_test(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let test = state.test_service.publish_test(test_id).await?;
    Ok(Json(test).into_response())
}

#[utoipa::path(
    get,
    path = "/api/manage/tests/{id}",
    params(
        ("id" = String, Path, description = "Test ID")
    ),
    responses(
        (status = 200, description = "Test with its questions, keys included"),
        (status = 404, description = "Test not found"),
    ),
)]
pub async fn get_test(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let test = state.test_service.get_test_by_id(test_id).await?;
    let questions = state.test_service.get_questions(test_id).await?;
    Ok(Json(TestWithQuestions { test, questions }).into_response())
}

#[axum::debug_handler]
pub async fn get_attempt_result(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let result = state
        .result_service
        .fetch_result(
            attempt_id,
            None,
            &state.test_service,
            &state.proctoring_service,
        )
        .await?;
    Ok(Json(result).into_response())
}
