//! Connectivity lifecycle: radio power, network link, and broker session.

pub mod error;
pub mod radio;
pub mod session;

use std::time::Duration;

pub use error::{ConnectError, PublishError};
pub use radio::{GpioRadio, Radio};
pub use session::SessionManager;

/// Lifecycle state of the radio/broker pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Radio unpowered. Initial and normal resting state.
    #[default]
    RadioOff,
    /// Radio powered, network link not yet established.
    RadioOn,
    /// Network link up, no broker session.
    LinkUp,
    /// Broker session established; publishing is valid.
    SessionLive,
}

/// Connection surface the scheduler drives.
///
/// Implemented by [`SessionManager`]; tests substitute scripted fakes.
#[allow(async_fn_in_trait)]
pub trait Connectivity {
    /// Brings the radio and broker session up with bounded effort.
    /// No-op when the session is already live. Failures are transient;
    /// the caller retries on a later tick.
    async fn ensure_connected(&mut self, timeout: Duration) -> Result<(), ConnectError>;

    /// Broker-handshake-only stage, for reconnecting while the link is
    /// already up. Never touches radio power.
    async fn connect_session(&mut self) -> Result<(), ConnectError>;

    /// Publishes a payload; valid only with a live session.
    async fn publish(
        &mut self,
        topic: &str,
        payload: &str,
        retained: bool,
    ) -> Result<(), PublishError>;

    /// Services the broker event loop (keep-alives, inbound traffic) with a
    /// bounded, non-blocking pass. Asynchronous disconnects detected here
    /// are reflected by `is_session_live` on the next check.
    async fn pump(&mut self);

    /// Drops the session and powers the radio down, from any state.
    /// Idempotent.
    fn teardown(&mut self);

    fn is_session_live(&self) -> bool;

    fn is_link_up(&mut self) -> bool;
}
