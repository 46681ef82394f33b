//! Built-in application handlers.
//!
//! - `GET /rest/health`: liveness probe, instrumented
//! - `GET /rest/kill`: load-test kill switch, mounted only in SLT mode

pub mod health;
pub mod kill;
