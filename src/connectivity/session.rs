//! Radio + broker session lifecycle.
//!
//! The session is a single forced path through four states:
//!
//! ```text
//! RadioOff ──► RadioOn ──► LinkUp ──► SessionLive
//!    ▲            (no link)   (no session)      │
//!    └──────────────── teardown ────────────────┘
//! ```
//!
//! `RadioOff` is both the initial and the normal resting state. Collapsing
//! "radio asleep" and "session absent" into one forced-off state avoids ever
//! leaving the radio powered with no broker path, the dominant battery cost.

use std::time::{Duration, Instant};

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::{MqttConfig, TopicConfig};
use crate::connectivity::radio::Radio;
use crate::connectivity::{ConnectError, Connectivity, PublishError, SessionState};

const LINK_POLL_INTERVAL: Duration = Duration::from_millis(250);
const KEEP_ALIVE: Duration = Duration::from_secs(5);
/// One pump pass services at most this many events before yielding the tick.
const PUMP_BUDGET: usize = 8;
const PUMP_SLICE: Duration = Duration::from_millis(10);

struct BrokerSession {
    client: AsyncClient,
    event_loop: EventLoop,
}

enum AckOutcome {
    Acked,
    Lost,
    TimedOut,
}

/// Owns the radio and the broker connection; sole component allowed to
/// start, use, or tear either down.
pub struct SessionManager<R: Radio> {
    radio: R,
    mqtt: MqttConfig,
    availability_topic: String,
    online_payload: String,
    offline_payload: String,
    session_timeout: Duration,
    state: SessionState,
    session: Option<BrokerSession>,
}

impl<R: Radio> SessionManager<R> {
    pub fn new(radio: R, mqtt: MqttConfig, topics: &TopicConfig, session_timeout: Duration) -> Self {
        Self {
            radio,
            mqtt,
            availability_topic: topics.availability_topic.clone(),
            online_payload: topics.online_payload.clone(),
            offline_payload: topics.offline_payload.clone(),
            session_timeout,
            state: SessionState::RadioOff,
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn session_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.mqtt.client_id, &self.mqtt.host, self.mqtt.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let (Some(user), Some(pass)) = (&self.mqtt.username, &self.mqtt.password) {
            options.set_credentials(user, pass);
        }
        // The broker publishes this retained on any unclean drop, so
        // subscribers see the device go unavailable without our help.
        options.set_last_will(LastWill::new(
            &self.availability_topic,
            self.offline_payload.clone().into_bytes(),
            QoS::AtLeastOnce,
            true,
        ));
        options
    }

    /// Drops the broker session and downgrades to the link-level state the
    /// radio actually reports. Called whenever the event loop errors out.
    fn session_lost(&mut self) {
        self.session = None;
        self.state = if self.radio.link_up() {
            SessionState::LinkUp
        } else {
            SessionState::RadioOn
        };
    }

    async fn wait_for_ack(session: &mut BrokerSession, deadline: Instant) -> AckOutcome {
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return AckOutcome::TimedOut;
            };
            match time::timeout(remaining, session.event_loop.poll()).await {
                Ok(Ok(Event::Incoming(Packet::PubAck(_)))) => return AckOutcome::Acked,
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => {
                    debug!("connection lost while awaiting ack: {}", e);
                    return AckOutcome::Lost;
                }
                Err(_) => return AckOutcome::TimedOut,
            }
        }
    }
}

impl<R: Radio> Connectivity for SessionManager<R> {
    async fn ensure_connected(&mut self, timeout: Duration) -> Result<(), ConnectError> {
        if self.state == SessionState::SessionLive {
            return Ok(());
        }

        if self.state == SessionState::RadioOff {
            info!("waking radio");
            self.radio.power_on();
            self.state = SessionState::RadioOn;
        }

        let deadline = Instant::now() + timeout;
        while !self.radio.link_up() {
            if Instant::now() >= deadline {
                debug!("link not up within {:?}", timeout);
                return Err(ConnectError::LinkTimeout);
            }
            time::sleep(LINK_POLL_INTERVAL).await;
        }
        self.state = SessionState::LinkUp;

        self.connect_session().await
    }

    async fn connect_session(&mut self) -> Result<(), ConnectError> {
        if self.state == SessionState::SessionLive {
            return Ok(());
        }

        debug!(
            host = %self.mqtt.host,
            port = self.mqtt.port,
            "starting broker handshake"
        );
        let (client, mut event_loop) = AsyncClient::new(self.session_options(), 64);

        let deadline = Instant::now() + self.session_timeout;
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                debug!("broker handshake timed out");
                return Err(ConnectError::SessionRejected);
            };
            match time::timeout(remaining, event_loop.poll()).await {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code == ConnectReturnCode::Success {
                        break;
                    }
                    warn!("broker refused session: {:?}", ack.code);
                    return Err(ConnectError::SessionRejected);
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => {
                    debug!("broker handshake failed: {}", e);
                    return Err(ConnectError::SessionRejected);
                }
                Err(_) => {
                    debug!("broker handshake timed out");
                    return Err(ConnectError::SessionRejected);
                }
            }
        }

        self.session = Some(BrokerSession { client, event_loop });
        self.state = SessionState::SessionLive;
        info!(client_id = %self.mqtt.client_id, "broker session established");

        // Birth message: the retained counterpart of the registered will.
        let topic = self.availability_topic.clone();
        let payload = self.online_payload.clone();
        if let Err(e) = self.publish(&topic, &payload, true).await {
            warn!("availability announcement failed: {}", e);
            self.session_lost();
            return Err(ConnectError::SessionRejected);
        }

        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &str,
        retained: bool,
    ) -> Result<(), PublishError> {
        if self.state != SessionState::SessionLive {
            return Err(PublishError::NotConnected);
        }

        let enqueued = {
            let session = self.session.as_mut().ok_or(PublishError::NotConnected)?;
            session
                .client
                .publish(topic, QoS::AtLeastOnce, retained, payload.as_bytes())
                .await
        };
        if let Err(e) = enqueued {
            debug!("publish enqueue failed: {}", e);
            self.session_lost();
            return Err(PublishError::SendFailed);
        }

        // Drive the event loop until the broker acknowledges; an enqueue the
        // broker never acks within the bound counts as a failed send and the
        // caller retries on a later tick.
        let deadline = Instant::now() + self.session_timeout;
        let session = self.session.as_mut().ok_or(PublishError::NotConnected)?;
        match Self::wait_for_ack(session, deadline).await {
            AckOutcome::Acked => {
                debug!(topic, payload, "publish acknowledged");
                Ok(())
            }
            AckOutcome::Lost => {
                self.session_lost();
                Err(PublishError::SendFailed)
            }
            AckOutcome::TimedOut => {
                debug!(topic, "publish not acknowledged in time");
                Err(PublishError::SendFailed)
            }
        }
    }

    async fn pump(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let mut lost = false;
        for _ in 0..PUMP_BUDGET {
            match time::timeout(PUMP_SLICE, session.event_loop.poll()).await {
                Ok(Ok(_event)) => continue,
                Ok(Err(e)) => {
                    warn!("broker session dropped: {}", e);
                    lost = true;
                    break;
                }
                // Nothing pending; keep-alives are up to date.
                Err(_) => break,
            }
        }
        if lost {
            self.session_lost();
        }
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            // Best effort: the retained LWT covers us if this never lands.
            let _ = session.client.try_disconnect();
        }
        if self.state != SessionState::RadioOff {
            info!("powering radio down");
            self.radio.power_off();
            self.state = SessionState::RadioOff;
        }
    }

    fn is_session_live(&self) -> bool {
        self.state == SessionState::SessionLive
    }

    fn is_link_up(&mut self) -> bool {
        match self.state {
            SessionState::RadioOff => false,
            _ => self.radio.link_up(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Radio fake with scripted link behavior.
    struct FakeRadio {
        powered: bool,
        link_when_powered: bool,
        power_cycles: usize,
    }

    impl FakeRadio {
        fn new(link_when_powered: bool) -> Self {
            Self {
                powered: false,
                link_when_powered,
                power_cycles: 0,
            }
        }
    }

    impl Radio for FakeRadio {
        fn power_on(&mut self) {
            if !self.powered {
                self.power_cycles += 1;
            }
            self.powered = true;
        }

        fn power_off(&mut self) {
            self.powered = false;
        }

        fn link_up(&mut self) -> bool {
            self.powered && self.link_when_powered
        }
    }

    fn manager(radio: FakeRadio) -> SessionManager<FakeRadio> {
        let mqtt = MqttConfig {
            host: "127.0.0.1".to_string(),
            // Nothing listens here; handshake attempts fail fast.
            port: 1,
            username: None,
            password: None,
            client_id: "doorlink-test".to_string(),
        };
        SessionManager::new(radio, mqtt, &TopicConfig::default(), Duration::from_millis(500))
    }

    #[tokio::test]
    async fn link_timeout_when_radio_never_associates() {
        let mut mgr = manager(FakeRadio::new(false));

        let result = mgr.ensure_connected(Duration::from_millis(50)).await;
        assert_eq!(result, Err(ConnectError::LinkTimeout));
        // Radio was woken for the attempt and stays in the powered state
        // until the caller decides to tear down.
        assert_eq!(mgr.state(), SessionState::RadioOn);
        assert!(mgr.radio.powered);
    }

    #[tokio::test]
    async fn unreachable_broker_is_session_rejected() {
        let mut mgr = manager(FakeRadio::new(true));

        let result = mgr.ensure_connected(Duration::from_millis(50)).await;
        assert_eq!(result, Err(ConnectError::SessionRejected));
        assert!(!mgr.is_session_live());
        assert_eq!(mgr.state(), SessionState::LinkUp);
    }

    #[tokio::test]
    async fn teardown_is_idempotent_from_any_state() {
        let mut mgr = manager(FakeRadio::new(false));
        assert_eq!(mgr.state(), SessionState::RadioOff);

        mgr.teardown();
        assert_eq!(mgr.state(), SessionState::RadioOff);

        let _ = mgr.ensure_connected(Duration::from_millis(20)).await;
        assert_eq!(mgr.state(), SessionState::RadioOn);

        mgr.teardown();
        mgr.teardown();
        assert_eq!(mgr.state(), SessionState::RadioOff);
        assert!(!mgr.radio.powered);
    }

    #[tokio::test]
    async fn publish_without_session_is_not_connected() {
        let mut mgr = manager(FakeRadio::new(true));

        let result = mgr.publish("door/state", "open", true).await;
        assert_eq!(result, Err(PublishError::NotConnected));
    }

    #[tokio::test]
    async fn link_up_is_false_with_radio_off() {
        let mut mgr = manager(FakeRadio::new(true));
        assert!(!mgr.is_link_up());

        let _ = mgr.ensure_connected(Duration::from_millis(50)).await;
        assert!(mgr.is_link_up());

        mgr.teardown();
        assert!(!mgr.is_link_up());
    }

    #[test]
    fn will_and_birth_payloads_differ() {
        let topics = TopicConfig::default();
        assert_ne!(topics.online_payload, topics.offline_payload);
    }
}
