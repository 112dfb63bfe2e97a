// src/watch/handler.rs

use std::path::Path;

use crate::types::ChangeType;

/// Receives the changes reported by the event consumer.
///
/// Only the consumer task calls into a handler, so implementations never see
/// concurrent calls.
pub trait ChangeHandler: Send {
    fn handle_change(&mut self, change: ChangeType, path: &Path);

    /// Any cached state may be stale.
    fn handle_lost_state(&mut self);
}
