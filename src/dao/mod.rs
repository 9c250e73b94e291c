/// Persisted entity definitions.
pub mod models;
/// Round store abstraction and its backends.
pub mod round_store;
/// Storage error types shared by every backend.
pub mod storage;
