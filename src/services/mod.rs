pub mod answer_service;
pub mod attempt_service;
pub mod grading_service;
pub mod proctoring_service;
pub mod result_service;
pub mod test_service;
