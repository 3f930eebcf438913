pub mod auth;

pub use auth::{AuthenticatedOperator, OperatorKeys, operator_auth};
