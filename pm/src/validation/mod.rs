//! Validation: findings, reports and the five-phase validator

mod finding;
mod validator;

pub use finding::{Category, Finding, Severity, ValidationReport};
pub use validator::Validator;
