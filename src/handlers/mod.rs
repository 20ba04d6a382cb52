pub mod auth;
pub mod health_handlers;
pub mod history_handlers;
pub mod recording_handlers;
pub mod review_handlers;
pub mod staging_handlers;
pub mod upload_handlers;
