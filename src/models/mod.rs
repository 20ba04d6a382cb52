//! Core data models for the upload verification service.
//!
//! Persistent entities map to SQLite rows via `sqlx::FromRow`; transient ones
//! (attempts, verdicts, code status) only travel as JSON via `serde`.

pub mod decision;
pub mod fingerprint;
pub mod history;
pub mod ownership;
pub mod review;
pub mod staged_object;
pub mod upload;
