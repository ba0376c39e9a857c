//! Realtime delivery configuration.

use std::time::Duration;

/// Default time a lobby may sit with no open connections before it is closed
pub const DEFAULT_IDLE_CLOSE_AFTER: Duration = Duration::from_secs(15 * 60);

/// Default number of pushes buffered per connection
pub const DEFAULT_CONNECTION_BUFFER: usize = 32;

/// Connection hub configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Idle period after the last connection leaves
    pub idle_close_after: Duration,

    /// Outbound queue length per connection; a full queue drops the connection
    pub connection_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            idle_close_after: DEFAULT_IDLE_CLOSE_AFTER,
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
        }
    }
}
