pub mod api_client;
pub mod chunker;
pub mod error;
pub mod orchestrator;
pub mod paginator;
pub mod rate_limit;
pub mod retry;
pub mod source;
