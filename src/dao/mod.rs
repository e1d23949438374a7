/// Durable key/value backends shared by every context of an origin.
pub mod key_value;
/// Storage error types.
pub mod storage;
