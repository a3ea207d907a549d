pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::services::{
    answer_service::AnswerService,
    attempt_service::AttemptService,
    proctoring_service::{EventSink, ProctoringService, ValidityPolicy},
    result_service::ResultService,
    test_service::TestService,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub test_service: TestService,
    pub attempt_service: AttemptService,
    pub answer_service: AnswerService,
    pub proctoring_service: ProctoringService,
    pub result_service: ResultService,
    pub events: EventSink,
}

impl AppState {
    pub fn new(pool: PgPool, events: EventSink) -> Self {
        let config = crate::config::get_config();
        let policy = ValidityPolicy {
            tab_switch_limit: config.tab_switch_limit,
            window_switch_limit: config.window_switch_limit,
            face_visibility_limit: config.face_visibility_limit,
        };

        let test_service = TestService::new(pool.clone());
        let attempt_service = AttemptService::new(pool.clone());
        let answer_service = AnswerService::new(pool.clone());
        let proctoring_service = ProctoringService::new(pool.clone(), policy);
        let result_service = ResultService::new(pool.clone());

        Self {
            pool,
            test_service,
            attempt_service,
            answer_service,
            proctoring_service,
            result_service,
            events,
        }
    }
}
