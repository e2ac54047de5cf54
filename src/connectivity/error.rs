//! Error definitions for the connectivity module.
//!
//! Every variant here is transient: the scheduler keeps its dirty flag set
//! and retries on the next tick, so nothing below ever escalates.

use thiserror::Error;

/// Failure while bringing the radio and broker session up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The radio did not associate within the allotted wait.
    #[error("radio link not established within the timeout")]
    LinkTimeout,

    /// The broker handshake failed, was refused, or timed out.
    #[error("broker rejected or failed the session handshake")]
    SessionRejected,
}

/// Failure while publishing a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Publish attempted without a live broker session.
    #[error("no live broker session")]
    NotConnected,

    /// Transport-level send failure despite a live session.
    #[error("message could not be delivered to the broker")]
    SendFailed,
}
