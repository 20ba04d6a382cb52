pub mod artist_match;
pub mod debounce;
pub mod fingerprint_client;
pub mod fingerprint_service;
pub mod history_service;
pub mod metadata_screen;
pub mod ownership_verifier;
pub mod registry_client;
pub mod review_queue;
pub mod risk_gate;
pub mod staging_service;
pub mod upload_validator;
pub mod workflow;
