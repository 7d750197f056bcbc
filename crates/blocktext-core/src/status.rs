//! Outgoing sync status, published to the UI.

use smol_str::SmolStr;

/// State of the outgoing update pipeline for one block.
///
/// UI can use this to show saving/saved/error indicators. A `Failed` state
/// is a warning only: local content is never rolled back, and the next edit
/// schedules a fresh send.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SyncStatus {
    /// Nothing sent yet and nothing waiting.
    #[default]
    Idle,
    /// An update is waiting for the quiescence window to elapse.
    Pending,
    /// An update has been handed to the persistence bridge.
    Sending,
    /// The last update was accepted.
    Synced,
    /// The last update was rejected.
    Failed(SmolStr),
}

impl SyncStatus {
    /// Returns true if the last write failed.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns true if an update is waiting or in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Pending | Self::Sending)
    }

    /// Returns the error message if the last write failed.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed(msg) => Some(msg.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_default() {
        assert_eq!(SyncStatus::default(), SyncStatus::Idle);
    }

    #[test]
    fn test_status_is_error() {
        assert!(!SyncStatus::Synced.is_error());
        assert!(SyncStatus::Failed("offline".into()).is_error());
        assert_eq!(
            SyncStatus::Failed("offline".into()).error_message(),
            Some("offline")
        );
    }

    #[test]
    fn test_status_is_busy() {
        assert!(SyncStatus::Pending.is_busy());
        assert!(SyncStatus::Sending.is_busy());
        assert!(!SyncStatus::Idle.is_busy());
    }
}
