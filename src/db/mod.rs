pub mod models;
pub mod pg;
pub mod store;

/// In-memory store used by integration tests and local development without a
/// database.
pub mod mem;
