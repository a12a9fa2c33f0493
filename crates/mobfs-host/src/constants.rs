//! Host configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

/// Default TCP port for the file service.
pub const DEFAULT_PORT: u16 = 7654;

/// Maximum bytes returned by a single ReadFile call (1 MiB).
pub const MAX_READ_SIZE: i64 = 1 << 20;

/// Per-subscriber change-event buffer. A subscriber that falls this far
/// behind starts losing events.
pub const SUBSCRIBER_BUFFER: usize = 64;
