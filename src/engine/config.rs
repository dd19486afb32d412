//! Engine-level knobs. Exchange parameters live in `ExchangeConfig`.

use crate::types::Timestamp;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Published events kept in the in-memory log; older ones are dropped first.
    pub max_events: usize,
    /// Mirror every published event to `tracing::debug!`.
    pub log_events: bool,
    /// Initial value of the engine clock.
    pub start_time: Timestamp,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            log_events: false,
            start_time: Timestamp::from_secs(0),
        }
    }
}
