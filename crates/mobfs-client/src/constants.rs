//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default host port, appended when the connect target carries none.
pub const DEFAULT_PORT: u16 = 7654;

/// Per-operation RPC deadline.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Kernel attribute cache lifetime. Content is never cached; this only
/// bounds how long stat results may lag the host.
pub const ATTR_TTL: Duration = Duration::from_secs(1);
