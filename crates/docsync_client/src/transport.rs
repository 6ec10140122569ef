//! Transport layer abstraction for sync operations.

use crate::error::{ClientError, ClientResult};
use docsync_protocol::{FetchResponse, PullRequest, PullResponse, PushRequest, PushResponse};

/// A sync transport handles network communication with the sync server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, WebSocket, mock for testing, etc.).
pub trait SyncTransport: Send + Sync {
    /// Pushes pending commits to the server.
    fn push(&self, request: &PushRequest) -> ClientResult<PushResponse>;

    /// Pulls diffs since a known version from the server.
    fn pull(&self, request: &PullRequest) -> ClientResult<PullResponse>;

    /// Fetches the full entity, for when diffs are unrecoverable.
    fn fetch(&self, entity_name: &str, id: &str) -> ClientResult<FetchResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// A mock transport for testing.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: std::sync::atomic::AtomicBool,
    push_response: std::sync::Mutex<Option<PushResponse>>,
    pull_response: std::sync::Mutex<Option<PullResponse>>,
    fetch_response: std::sync::Mutex<Option<FetchResponse>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: std::sync::atomic::AtomicBool::new(true),
            push_response: std::sync::Mutex::new(None),
            pull_response: std::sync::Mutex::new(None),
            fetch_response: std::sync::Mutex::new(None),
        }
    }

    /// Sets the push response.
    pub fn set_push_response(&self, response: PushResponse) {
        *self.push_response.lock().unwrap() = Some(response);
    }

    /// Sets the pull response.
    pub fn set_pull_response(&self, response: PullResponse) {
        *self.pull_response.lock().unwrap() = Some(response);
    }

    /// Sets the fetch response.
    pub fn set_fetch_response(&self, response: FetchResponse) {
        *self.fetch_response.lock().unwrap() = Some(response);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected
            .store(connected, std::sync::atomic::Ordering::SeqCst);
    }
}

impl SyncTransport for MockTransport {
    fn push(&self, _request: &PushRequest) -> ClientResult<PushResponse> {
        if !self.is_connected() {
            return Err(ClientError::network("not connected"));
        }
        self.push_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::Server("no mock push response set".into()))
    }

    fn pull(&self, _request: &PullRequest) -> ClientResult<PullResponse> {
        if !self.is_connected() {
            return Err(ClientError::network("not connected"));
        }
        self.pull_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::Server("no mock pull response set".into()))
    }

    fn fetch(&self, _entity_name: &str, _id: &str) -> ClientResult<FetchResponse> {
        if !self.is_connected() {
            return Err(ClientError::network("not connected"));
        }
        self.fetch_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::Server("no mock fetch response set".into()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_protocol::VersionId;

    #[test]
    fn mock_transport_connection() {
        let transport = MockTransport::new();
        assert!(transport.is_connected());

        transport.set_connected(false);
        assert!(!transport.is_connected());
    }

    #[test]
    fn mock_transport_disconnected_is_a_network_error() {
        let transport = MockTransport::new();
        transport.set_connected(false);

        let request = PushRequest::new("users", "u1", VersionId::new(), vec![]);
        let err = transport.push(&request).unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn mock_transport_returns_set_response() {
        let transport = MockTransport::new();
        let version = VersionId::new();
        transport.set_pull_response(PullResponse::new(
            docsync_protocol::DiffResult::UpToDate { version },
        ));

        let request = PullRequest::new("users", "u1", version);
        let response = transport.pull(&request).unwrap();
        assert!(response.result.is_up_to_date());
    }
}
