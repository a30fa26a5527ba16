// Communication channels for script automation
use super::types::SessionEvent;
use tokio::sync::mpsc;

/// Helper function to create the session event channel
pub fn create_session_channels() -> (mpsc::Sender<SessionEvent>, mpsc::Receiver<SessionEvent>) {
    mpsc::channel(32)
}
