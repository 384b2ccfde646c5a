use thiserror::Error;

/// We (the local caller) misused the API: sent an event that is illegal in
/// the current state, supplied conflicting framing headers, and so on.
///
/// Once raised, both parties are in [`State::Error`](crate::State::Error)
/// and the connection object is dead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LocalProtocolError {
    pub message: String,
    /// Suggested HTTP status for a last-gasp error response (400, 431, 501,
    /// 505). Mostly useful after this error has been re-raised as a
    /// [`RemoteProtocolError`] on the receive path.
    pub error_status_hint: u16,
}

impl LocalProtocolError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self::with_hint(message, 400)
    }

    pub(crate) fn with_hint(message: impl Into<String>, error_status_hint: u16) -> Self {
        LocalProtocolError {
            message: message.into(),
            error_status_hint,
        }
    }

    // The distinction between local and remote errors is all about who
    // committed the violation, not what the violation was. Parsing code
    // reports LocalProtocolError, and the receive path flips it: the same
    // malformed message is "local" when our caller built it and "remote"
    // when it arrived off the wire.
    pub(crate) fn into_remote(self) -> RemoteProtocolError {
        RemoteProtocolError {
            message: self.message,
            error_status_hint: self.error_status_hint,
        }
    }
}

/// The remote peer violated HTTP: malformed bytes, impossible framing,
/// oversize header block, EOF in the middle of a known-length message.
///
/// Fatal to the connection, like [`LocalProtocolError`]. The
/// `error_status_hint` is the status a server caller may want to write
/// before closing the socket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteProtocolError {
    pub message: String,
    pub error_status_hint: u16,
}

impl RemoteProtocolError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        RemoteProtocolError {
            message: message.into(),
            error_status_hint: 400,
        }
    }
}

/// Either kind of fatal protocol error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Local(#[from] LocalProtocolError),
    #[error(transparent)]
    Remote(#[from] RemoteProtocolError),
}

impl ProtocolError {
    pub fn error_status_hint(&self) -> u16 {
        match self {
            ProtocolError::Local(e) => e.error_status_hint,
            ProtocolError::Remote(e) => e.error_status_hint,
        }
    }
}
