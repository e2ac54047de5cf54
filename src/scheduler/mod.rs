//! Publish scheduling and radio power policy.
//!
//! The scheduler is the orchestrator: once per tick it samples the door
//! contact, drives the session manager when a status is pending, and powers
//! the radio down once the post-publish connectivity window has expired with
//! nothing left to send.
//!
//! ```text
//! DebouncedSwitch ──► Scheduler ──► Connectivity (SessionManager)
//! ```
//!
//! Pending work is a single dirty flag, not a queue: the payload is always
//! read fresh from the debounced state at send time, so a rapid double-flip
//! before the first publish completes results in sending only the final
//! state.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{TimingConfig, TopicConfig};
use crate::connectivity::Connectivity;
use crate::sensor::{DebouncedSwitch, SwitchInput};

pub struct Scheduler<I: SwitchInput, C: Connectivity> {
    sensor: DebouncedSwitch<I>,
    conn: C,
    topics: TopicConfig,
    connect_timeout: Duration,
    window: Duration,
    /// An unsent status change is pending. Set on every stable-state
    /// transition, cleared only by a successful publish.
    dirty: bool,
    /// End of the post-publish connectivity window; `None` when no window
    /// is active. Consulted only while nothing is dirty.
    deadline: Option<Instant>,
}

impl<I: SwitchInput, C: Connectivity> Scheduler<I, C> {
    pub fn new(
        sensor: DebouncedSwitch<I>,
        conn: C,
        topics: TopicConfig,
        timing: &TimingConfig,
        publish_on_boot: bool,
    ) -> Self {
        Self {
            sensor,
            conn,
            topics,
            connect_timeout: timing.connect_timeout(),
            window: timing.window(),
            // Boot publish rides the normal dirty path.
            dirty: publish_on_boot,
            deadline: None,
        }
    }

    /// One pass of the control loop.
    pub async fn tick(&mut self, now: Instant) {
        if let Some(state) = self.sensor.sample(now) {
            info!(state = %state, "door state changed");
            self.dirty = true;
        }

        let mut connect_failed = false;
        if self.dirty {
            connect_failed = !self.try_publish(now).await;
        }

        if self.conn.is_session_live() {
            self.conn.pump().await;
        } else if !connect_failed
            && self.conn.is_link_up()
            && self.deadline.is_some_and(|deadline| now < deadline)
        {
            // The link survived but the broker session dropped mid-window;
            // a session-only reconnect is cheap. Outside the window the
            // radio goes back to sleep instead, and a tick whose full
            // connect attempt just failed does not get a second handshake.
            if let Err(e) = self.conn.connect_session().await {
                debug!("session reconnect failed, will retry: {}", e);
            }
        }

        // Power-down is decided on the flag and the clock alone, whether or
        // not a broker session survived to this point; otherwise a session
        // lost near expiry would leave the radio powered indefinitely.
        if !self.dirty && self.deadline.is_some_and(|deadline| now >= deadline) {
            info!("connectivity window expired, powering down");
            self.conn.teardown();
            self.deadline = None;
        }
    }

    /// Returns `false` when the connect stage failed, which ends this
    /// tick's connection work; the dirty flag carries the retry.
    async fn try_publish(&mut self, now: Instant) -> bool {
        if let Err(e) = self.conn.ensure_connected(self.connect_timeout).await {
            // Expected transient.
            debug!("connect failed, will retry: {}", e);
            return false;
        }

        // Payload is read fresh at send time, never a captured copy.
        let payload = self.topics.status_payload(self.sensor.stable()).to_string();
        match self
            .conn
            .publish(&self.topics.status_topic, &payload, true)
            .await
        {
            Ok(()) => {
                info!(topic = %self.topics.status_topic, payload = %payload, "door state published");
                self.dirty = false;
                self.deadline = Some(now + self.window);
            }
            Err(e) => {
                debug!("publish failed, will retry: {}", e);
            }
        }
        true
    }

    /// Clean shutdown: announce unavailability so subscribers are not left
    /// waiting on the broker's LWT, then drop everything.
    pub async fn shutdown(&mut self) {
        if self.conn.is_session_live() {
            if let Err(e) = self
                .conn
                .publish(
                    &self.topics.availability_topic,
                    &self.topics.offline_payload,
                    true,
                )
                .await
            {
                debug!("offline announcement failed: {}", e);
            }
        }
        self.conn.teardown();
    }
}
