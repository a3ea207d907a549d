use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;

use crate::dto::student_dto::{
    AnswerEcho, ProctoringEventRequest, ProctoringEventResponse, QuestionView, ResolutionStatus,
    SaveAnswerRequest, SaveAnswerResponse, SessionResponse, StartOrResumeResponse,
    SubmitTestResponse,
};
use crate::error::Error;
use crate::middleware::auth::SessionContext;
use crate::models::attempt::Attempt;
use crate::models::session_report::ViolationKind;
use crate::models::test::Test;
use crate::services::attempt_service::Resolution;
use crate::services::proctoring_service::{ProctoringEvent, SessionView};
use crate::AppState;

#[axum::debug_handler]
pub async fn start_or_resume(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(test_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let test = state.test_service.get_published_test(test_id).await?;

    let response = match state
        .attempt_service
        .resolve_for_student(&test, session.user_id)
        .await?
    {
        Resolution::Resume(attempt) => {
            opened(&state, &test, attempt, ResolutionStatus::Resumed).await?
        }
        Resolution::StartNew => {
            match state
                .attempt_service
                .create_attempt(&test, session.user_id)
                .await
            {
                Ok(attempt) => opened(&state, &test, attempt, ResolutionStatus::Started).await?,
                Err(Error::Conflict(_)) => {
                    // a parallel tab won the create race; its attempt resumes
                    tracing::info!(test_id = %test.id, student_id = %session.user_id,
                        "attempt creation raced, re-resolving");
                    match state
                        .attempt_service
                        .resolve_for_student(&test, session.user_id)
                        .await?
                    {
                        Resolution::Resume(attempt) => {
                            opened(&state, &test, attempt, ResolutionStatus::Resumed).await?
                        }
                        _ => {
                            return Err(Error::Conflict(
                                "Attempt creation raced; please retry".to_string(),
                            ))
                        }
                    }
                }
                Err(other) => return Err(other),
            }
        }
        Resolution::Blocked(reason) => StartOrResumeResponse {
            status: ResolutionStatus::Blocked,
            attempt: None,
            questions: Vec::new(),
            answers: Vec::new(),
            message: Some(reason.message()),
            blocked: Some(reason),
        },
    };

    Ok(Json(response).into_response())
}

async fn opened(
    state: &AppState,
    test: &Test,
    attempt: Attempt,
    status: ResolutionStatus,
) -> crate::error::Result<StartOrResumeResponse> {
    let questions = state.test_service.get_questions(test.id).await?;
    let answers = if status == ResolutionStatus::Resumed {
        state.answer_service.list_answers(attempt.id).await?
    } else {
        Vec::new()
    };

    Ok(StartOrResumeResponse {
        status,
        attempt: Some(attempt),
        questions: questions.iter().map(QuestionView::from).collect(),
        answers: answers.iter().map(AnswerEcho::from).collect(),
        blocked: None,
        message: None,
    })
}

#[axum::debug_handler]
pub async fn save_answer(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path((attempt_id, question_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SaveAnswerRequest>,
) -> crate::error::Result<Response> {
    let attempt = state
        .attempt_service
        .get_attempt_for_student(attempt_id, session.user_id)
        .await?;
    let answer = state
        .answer_service
        .save_answer(&attempt, question_id, req.answer)
        .await?;

    Ok(Json(SaveAnswerResponse {
        saved: true,
        question_id: answer.question_id,
        answered_at: answer.answered_at,
    })
    .into_response())
}

/// Validates and enqueues one detection event. Aggregation happens on
/// the worker, so a burst of events cannot slow answer saving.
#[axum::debug_handler]
pub async fn report_event(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<ProctoringEventRequest>,
) -> crate::error::Result<Response> {
    let kind: ViolationKind = req
        .kind
        .parse()
        .map_err(|_| Error::Validation(format!("Unknown proctoring event type: {}", req.kind)))?;
    let count = req.count.unwrap_or(1);
    if count < 1 {
        return Err(Error::Validation(
            "Event count must be at least 1".to_string(),
        ));
    }

    let attempt = state
        .attempt_service
        .get_attempt_for_student(attempt_id, session.user_id)
        .await?;
    if attempt.completed {
        return Err(Error::InvalidState(
            "The session has ended; events are no longer accepted".to_string(),
        ));
    }
    state.events.push(ProctoringEvent {
        attempt_id: attempt.id,
        kind,
        count,
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ProctoringEventResponse { accepted: true }),
    )
        .into_response())
}

#[axum::debug_handler]
pub async fn submit_test(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let attempt = state
        .attempt_service
        .submit(
            attempt_id,
            session.user_id,
            &state.test_service,
            &state.answer_service,
            &state.proctoring_service,
        )
        .await?;

    let result = state
        .result_service
        .fetch_result(
            attempt.id,
            Some(session.user_id),
            &state.test_service,
            &state.proctoring_service,
        )
        .await?;

    tracing::info!(attempt_id = %attempt.id, score = result.score, "test submitted");

    Ok(Json(SubmitTestResponse {
        result,
        message: "Test submitted successfully".to_string(),
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn get_result(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let result = state
        .result_service
        .fetch_result(
            attempt_id,
            Some(session.user_id),
            &state.test_service,
            &state.proctoring_service,
        )
        .await?;
    Ok(Json(result).into_response())
}

#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let attempt = state
        .attempt_service
        .get_attempt_for_student(attempt_id, session.user_id)
        .await?;
    let test = state.test_service.get_test_by_id(attempt.test_id).await?;

    let response = match state
        .proctoring_service
        .get_session_view(attempt.id, attempt.completed, test.proctored)
        .await?
    {
        SessionView::NotProctored => SessionResponse {
            proctored: false,
            report: None,
        },
        SessionView::Report(report) => SessionResponse {
            proctored: true,
            report: Some(report),
        },
    };

    Ok(Json(response).into_response())
}
