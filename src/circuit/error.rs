// ABOUTME: Request-API fault taxonomy for circuit operations
// ABOUTME: Socket-level failures never surface here; they become the Disconnected state

use thiserror::Error;

/// Faults a request API can report to its caller.
///
/// These are precondition failures decided before anything is queued; once a
/// message is committed to the send queue its delivery is the circuit's
/// problem, and delivery failure surfaces as the `Disconnected` state, not
/// as an error return.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// The channel this request targets is not connected
    #[error("channel not connected")]
    NotConnected,

    /// The server's protocol revision predates this operation
    #[error("operation unsupported by the connected service")]
    UnsupportedByService,

    /// The transfer type code does not name a defined DBR type
    #[error("invalid transfer type")]
    BadType,

    /// Element count or payload size exceeds what the request may carry
    #[error("request exceeds valid bounds")]
    OutOfBounds,

    /// The expected response would not fit the receive body cache
    #[error("response would exceed the message body cache")]
    MsgBodyCacheTooSmall,
}

/// Result alias for request APIs.
pub type RequestResult<T> = Result<T, RequestError>;
