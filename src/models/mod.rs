pub mod answer;
pub mod attempt;
pub mod question;
pub mod result;
pub mod session_report;
pub mod user;
