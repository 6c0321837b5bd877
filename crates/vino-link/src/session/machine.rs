//! Connection state machine.
//!
//! [`SessionMachine`] owns the connection state and retry policy and decides
//! every transition. It performs no I/O: each [`Input`] yields a list of
//! [`Effect`]s that the driver task carries out in order.

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::events::SessionEvent;
use super::retry::{RetryConfig, RetryPolicy};
use super::state::ConnectionState;
use crate::error::LinkError;
use crate::transport::TransportEvent;

/// Something that happened to the client.
#[derive(Debug)]
pub enum Input {
    /// Explicit `connect()` call.
    Connect,
    /// The scheduled reconnect delay elapsed.
    ReconnectTimer,
    /// Explicit `close()` call.
    Close,
    /// Explicit `send()` call with an encoded payload.
    Send(String),
    /// Notification from the transport handle of a given attempt.
    Transport {
        /// Attempt the notification belongs to.
        generation: u64,
        /// What happened.
        event: TransportEvent,
    },
    /// The attempt could not even be started (e.g. no endpoint).
    OpenFailed {
        /// Attempt that failed.
        generation: u64,
        /// Why it failed.
        error: LinkError,
    },
}

/// Work the driver must carry out.
#[derive(Debug)]
pub enum Effect {
    /// Open a new transport handle tagged with `generation`.
    Open {
        /// Attempt number, used to discard stale notifications.
        generation: u64,
    },
    /// Close and drop the live transport handle.
    CloseTransport,
    /// Write a payload to the live transport handle.
    Transmit(String),
    /// Arm the reconnect timer.
    ScheduleReconnect {
        /// How long to wait.
        delay: Duration,
    },
    /// Disarm the reconnect timer.
    CancelReconnect,
    /// Deliver an event to subscribers.
    Emit(SessionEvent),
}

/// Pure connection state machine.
#[derive(Debug)]
pub struct SessionMachine {
    state: ConnectionState,
    retry: RetryPolicy,
    generation: u64,
    intentional_close: bool,
}

impl SessionMachine {
    /// Create a machine in the `Disconnected` state.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry: RetryPolicy::new(config),
            generation: 0,
            intentional_close: false,
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts since the last successful connection.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.retry.attempt()
    }

    /// The retry policy.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Generation of the most recent connection attempt.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply an input and return the effects to carry out.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let mut effects = Vec::new();
        match input {
            Input::Connect => self.on_connect(&mut effects),
            Input::ReconnectTimer => self.on_reconnect_timer(&mut effects),
            Input::Close => self.on_close(&mut effects),
            Input::Send(text) => self.on_send(text, &mut effects),
            Input::Transport { generation, event } => {
                if self.is_stale(generation) {
                    trace!(generation, current = self.generation, "ignoring stale transport event");
                } else {
                    self.on_transport(event, &mut effects);
                }
            }
            Input::OpenFailed { generation, error } => {
                if self.is_stale(generation) {
                    trace!(generation, "ignoring stale open failure");
                } else if !self.intentional_close {
                    warn!(error = %error, "could not start connection attempt");
                    effects.push(Effect::Emit(SessionEvent::error(error)));
                    self.on_lost("connection could not be started".to_string(), &mut effects);
                }
            }
        }
        effects
    }

    const fn is_stale(&self, generation: u64) -> bool {
        generation != self.generation
    }

    fn on_connect(&mut self, effects: &mut Vec<Effect>) {
        if self.state.is_active() {
            debug!(state = %self.state, "connect ignored");
            return;
        }

        if self.state == ConnectionState::Reconnecting {
            effects.push(Effect::CancelReconnect);
        }
        self.intentional_close = false;
        self.retry.reset_attempts();
        self.begin_attempt(effects);
    }

    fn on_reconnect_timer(&mut self, effects: &mut Vec<Effect>) {
        if self.state != ConnectionState::Reconnecting {
            trace!(state = %self.state, "reconnect timer ignored");
            return;
        }
        self.begin_attempt(effects);
    }

    fn begin_attempt(&mut self, effects: &mut Vec<Effect>) {
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        debug!(
            generation = self.generation,
            attempt = self.retry.attempt(),
            "starting connection attempt"
        );
        effects.push(Effect::Open {
            generation: self.generation,
        });
    }

    fn on_close(&mut self, effects: &mut Vec<Effect>) {
        let previous = self.state;
        match previous {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                trace!(state = %previous, "close ignored");
                return;
            }
            ConnectionState::Connecting => {
                effects.push(Effect::CloseTransport);
            }
            ConnectionState::Connected => {
                effects.push(Effect::CloseTransport);
                effects.push(Effect::Emit(SessionEvent::Disconnected {
                    reason: "closed by client".to_string(),
                    intentional: true,
                }));
            }
            ConnectionState::Reconnecting => {
                effects.push(Effect::CancelReconnect);
            }
        }

        self.intentional_close = true;
        self.state = ConnectionState::Disconnected;
        info!(from = %previous, "session closed by client");
    }

    fn on_send(&mut self, text: String, effects: &mut Vec<Effect>) {
        if self.state == ConnectionState::Connected {
            effects.push(Effect::Transmit(text));
        } else {
            warn!(state = %self.state, bytes = text.len(), "dropping send while not connected");
            effects.push(Effect::Emit(SessionEvent::error(
                LinkError::SendWhileDisconnected { state: self.state },
            )));
        }
    }

    fn on_transport(&mut self, event: TransportEvent, effects: &mut Vec<Effect>) {
        if self.intentional_close {
            trace!(?event, "ignoring transport event after close");
            return;
        }

        match event {
            TransportEvent::Opened => {
                if self.state != ConnectionState::Connecting {
                    trace!(state = %self.state, "unexpected open ignored");
                    return;
                }
                self.state = ConnectionState::Connected;
                self.retry.reset();
                info!(generation = self.generation, "session connected");
                effects.push(Effect::Emit(SessionEvent::Connected));
            }
            TransportEvent::Message(text) => {
                if self.state != ConnectionState::Connected {
                    trace!(state = %self.state, "message outside connection ignored");
                    return;
                }
                match serde_json::from_str(&text) {
                    Ok(value) => effects.push(Effect::Emit(SessionEvent::Message(value))),
                    Err(e) => {
                        warn!(error = %e, bytes = text.len(), "failed to decode session message");
                        effects.push(Effect::Emit(SessionEvent::error(
                            LinkError::MessageDecode(e.to_string()),
                        )));
                    }
                }
            }
            TransportEvent::Error(message) => {
                let error = if self.state == ConnectionState::Connecting {
                    LinkError::TransportOpen(message)
                } else {
                    LinkError::Transport(message)
                };
                debug!(error = %error, "transport reported error");
                effects.push(Effect::Emit(SessionEvent::error(error)));
            }
            TransportEvent::Closed { reason } => {
                if self.state.is_active() {
                    self.on_lost(reason, effects);
                } else {
                    trace!(state = %self.state, "duplicate close ignored");
                }
            }
        }
    }

    fn on_lost(&mut self, reason: String, effects: &mut Vec<Effect>) {
        info!(reason = %reason, "session disconnected");
        self.state = ConnectionState::Disconnected;
        effects.push(Effect::Emit(SessionEvent::Disconnected {
            reason,
            intentional: false,
        }));
        self.schedule_retry(effects);
    }

    fn schedule_retry(&mut self, effects: &mut Vec<Effect>) {
        match self.retry.next_delay() {
            Some(delay) => {
                let attempt = self.retry.attempt();
                self.state = ConnectionState::Reconnecting;
                info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                effects.push(Effect::ScheduleReconnect { delay });
                effects.push(Effect::Emit(SessionEvent::Reconnecting { attempt, delay }));
            }
            None => {
                let attempts = self.retry.attempt();
                let error = LinkError::RetryExhausted { attempts };
                self.state = ConnectionState::Failed;
                warn!(error = %error, "session connection failed permanently");
                effects.push(Effect::Emit(SessionEvent::Exhausted { attempts }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn machine() -> SessionMachine {
        SessionMachine::new(RetryConfig::default())
    }

    fn transport(m: &SessionMachine, event: TransportEvent) -> Input {
        Input::Transport {
            generation: m.generation(),
            event,
        }
    }

    fn closed(m: &SessionMachine) -> Input {
        transport(
            m,
            TransportEvent::Closed {
                reason: "connection reset".to_string(),
            },
        )
    }

    fn events(effects: &[Effect]) -> Vec<&SessionEvent> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Emit(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    fn scheduled(effects: &[Effect]) -> Option<Duration> {
        effects.iter().find_map(|e| match e {
            Effect::ScheduleReconnect { delay } => Some(*delay),
            _ => None,
        })
    }

    /// Drive a machine into the given state.
    fn machine_in(state: ConnectionState) -> SessionMachine {
        let mut m = machine();
        match state {
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting => {
                m.handle(Input::Connect);
            }
            ConnectionState::Connected => {
                m.handle(Input::Connect);
                m.handle(transport(&m, TransportEvent::Opened));
            }
            ConnectionState::Reconnecting => {
                m.handle(Input::Connect);
                m.handle(closed(&m));
            }
            ConnectionState::Failed => {
                let mut m = SessionMachine::new(RetryConfig {
                    max_attempts: 0,
                    ..RetryConfig::default()
                });
                m.handle(Input::Connect);
                m.handle(closed(&m));
                return m;
            }
        }
        assert_eq!(m.state(), state);
        m
    }

    #[test]
    fn test_initial_state() {
        let m = machine();
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.attempt(), 0);
        assert_eq!(m.generation(), 0);
    }

    #[test]
    fn test_connect_opens_transport() {
        let mut m = machine();
        let effects = m.handle(Input::Connect);

        assert_eq!(m.state(), ConnectionState::Connecting);
        assert!(matches!(effects.as_slice(), [Effect::Open { generation: 1 }]));
    }

    #[test_case(ConnectionState::Connecting ; "while connecting")]
    #[test_case(ConnectionState::Connected ; "while connected")]
    fn test_connect_is_idempotent(state: ConnectionState) {
        let mut m = machine_in(state);
        let generation = m.generation();

        let effects = m.handle(Input::Connect);

        assert!(effects.is_empty());
        assert_eq!(m.state(), state);
        assert_eq!(m.generation(), generation);
    }

    #[test_case(ConnectionState::Disconnected, false ; "from disconnected")]
    #[test_case(ConnectionState::Reconnecting, true ; "from reconnecting")]
    #[test_case(ConnectionState::Failed, false ; "from failed")]
    fn test_connect_starts_new_attempt(state: ConnectionState, cancels_timer: bool) {
        let mut m = machine_in(state);

        let effects = m.handle(Input::Connect);

        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.attempt(), 0);
        assert_eq!(
            effects.iter().any(|e| matches!(e, Effect::CancelReconnect)),
            cancels_timer
        );
        assert!(matches!(effects.last(), Some(Effect::Open { .. })));
    }

    #[test]
    fn test_open_connects_and_resets_retry() {
        let mut m = machine_in(ConnectionState::Reconnecting);
        assert_eq!(m.attempt(), 1);
        m.handle(Input::ReconnectTimer);

        let effects = m.handle(transport(&m, TransportEvent::Opened));

        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(m.attempt(), 0);
        assert_eq!(m.retry().current_delay(), Duration::from_secs(1));
        assert!(matches!(events(&effects).as_slice(), [SessionEvent::Connected]));
    }

    #[test]
    fn test_message_is_decoded() {
        let mut m = machine_in(ConnectionState::Connected);

        let effects = m.handle(transport(
            &m,
            TransportEvent::Message(r#"{"speaker":"customer","text":"Something dry?"}"#.to_string()),
        ));

        match events(&effects).as_slice() {
            [SessionEvent::Message(value)] => {
                assert_eq!(value, &json!({"speaker": "customer", "text": "Something dry?"}));
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_message_emits_error_and_stays_connected() {
        let mut m = machine_in(ConnectionState::Connected);

        let effects = m.handle(transport(&m, TransportEvent::Message("not json".to_string())));

        assert_eq!(m.state(), ConnectionState::Connected);
        match events(&effects).as_slice() {
            [SessionEvent::Error(err)] => {
                assert!(matches!(**err, LinkError::MessageDecode(_)));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_transport_error_does_not_change_state() {
        let mut m = machine_in(ConnectionState::Connected);

        let effects = m.handle(transport(&m, TransportEvent::Error("broken pipe".to_string())));

        assert_eq!(m.state(), ConnectionState::Connected);
        match events(&effects).as_slice() {
            [SessionEvent::Error(err)] => assert!(matches!(**err, LinkError::Transport(_))),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_while_connecting_is_open_failure() {
        let mut m = machine_in(ConnectionState::Connecting);

        let effects = m.handle(transport(&m, TransportEvent::Error("refused".to_string())));

        assert_eq!(m.state(), ConnectionState::Connecting);
        match events(&effects).as_slice() {
            [SessionEvent::Error(err)] => assert!(matches!(**err, LinkError::TransportOpen(_))),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test_case(ConnectionState::Connecting ; "open failure")]
    #[test_case(ConnectionState::Connected ; "connection lost")]
    fn test_close_schedules_reconnect(state: ConnectionState) {
        let mut m = machine_in(state);

        let effects = m.handle(closed(&m));

        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert_eq!(m.attempt(), 1);
        assert_eq!(scheduled(&effects), Some(Duration::from_secs(1)));
        let emitted = events(&effects);
        assert!(matches!(
            emitted.as_slice(),
            [
                SessionEvent::Disconnected { intentional: false, .. },
                SessionEvent::Reconnecting { attempt: 1, .. }
            ]
        ));
    }

    #[test]
    fn test_backoff_doubles_per_attempt_then_exhausts() {
        let mut m = machine();
        m.handle(Input::Connect);

        let mut delays = Vec::new();
        let mut exhausted = 0;
        for _ in 0..10 {
            let effects = m.handle(closed(&m));
            if let Some(delay) = scheduled(&effects) {
                delays.push(delay);
            }
            exhausted += events(&effects)
                .iter()
                .filter(|e| matches!(e, SessionEvent::Exhausted { .. }))
                .count();
            m.handle(Input::ReconnectTimer);
        }

        assert_eq!(
            delays,
            [1, 2, 4, 8, 16].map(Duration::from_secs).to_vec()
        );
        assert_eq!(exhausted, 1);
        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(m.generation(), 6);
    }

    #[test]
    fn test_success_restarts_backoff_from_base() {
        let mut m = machine();
        m.handle(Input::Connect);
        m.handle(transport(&m, TransportEvent::Opened));

        let first = m.handle(closed(&m));
        assert_eq!(scheduled(&first), Some(Duration::from_secs(1)));
        m.handle(Input::ReconnectTimer);
        let second = m.handle(closed(&m));
        assert_eq!(scheduled(&second), Some(Duration::from_secs(2)));
        m.handle(Input::ReconnectTimer);
        m.handle(transport(&m, TransportEvent::Opened));
        assert_eq!(m.attempt(), 0);

        let after_success = m.handle(closed(&m));
        assert_eq!(scheduled(&after_success), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_exhausted_requires_explicit_connect() {
        let mut m = machine_in(ConnectionState::Failed);

        assert!(m.handle(Input::ReconnectTimer).is_empty());
        assert!(m.handle(closed(&m)).is_empty());
        assert_eq!(m.state(), ConnectionState::Failed);

        m.handle(Input::Connect);
        assert_eq!(m.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_close_while_connected_is_suppressed() {
        let mut m = machine_in(ConnectionState::Connected);

        let effects = m.handle(Input::Close);

        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(matches!(effects.first(), Some(Effect::CloseTransport)));
        assert!(matches!(
            events(&effects).as_slice(),
            [SessionEvent::Disconnected { intentional: true, .. }]
        ));

        // The transport's own close notification arrives afterwards.
        let effects = m.handle(closed(&m));
        assert!(effects.is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.attempt(), 0);
    }

    #[test]
    fn test_close_while_connecting_cancels_attempt() {
        let mut m = machine_in(ConnectionState::Connecting);

        let effects = m.handle(Input::Close);

        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(matches!(effects.as_slice(), [Effect::CloseTransport]));
        assert!(m.handle(transport(&m, TransportEvent::Opened)).is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_close_while_reconnecting_cancels_timer() {
        let mut m = machine_in(ConnectionState::Reconnecting);

        let effects = m.handle(Input::Close);

        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(matches!(effects.as_slice(), [Effect::CancelReconnect]));
        assert!(m.handle(Input::ReconnectTimer).is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test_case(ConnectionState::Disconnected ; "while disconnected")]
    #[test_case(ConnectionState::Failed ; "while failed")]
    fn test_close_is_noop(state: ConnectionState) {
        let mut m = machine_in(state);
        assert!(m.handle(Input::Close).is_empty());
        assert_eq!(m.state(), state);
    }

    #[test]
    fn test_send_while_connected_transmits() {
        let mut m = machine_in(ConnectionState::Connected);

        let effects = m.handle(Input::Send(r#"{"pitch":"Barolo"}"#.to_string()));

        assert!(matches!(effects.as_slice(), [Effect::Transmit(text)] if text.contains("Barolo")));
    }

    #[test_case(ConnectionState::Disconnected ; "while disconnected")]
    #[test_case(ConnectionState::Connecting ; "while connecting")]
    #[test_case(ConnectionState::Reconnecting ; "while reconnecting")]
    #[test_case(ConnectionState::Failed ; "while failed")]
    fn test_send_while_not_connected_is_dropped(state: ConnectionState) {
        let mut m = machine_in(state);

        let effects = m.handle(Input::Send("{}".to_string()));

        assert!(!effects.iter().any(|e| matches!(e, Effect::Transmit(_))));
        match events(&effects).as_slice() {
            [SessionEvent::Error(err)] => assert!(matches!(
                **err,
                LinkError::SendWhileDisconnected { state: s } if s == state
            )),
            other => panic!("expected Error, got {other:?}"),
        }
        assert_eq!(m.state(), state);
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let mut m = machine_in(ConnectionState::Reconnecting);
        let stale = m.generation();
        m.handle(Input::ReconnectTimer);

        let effects = m.handle(Input::Transport {
            generation: stale,
            event: TransportEvent::Closed {
                reason: "late close".to_string(),
            },
        });

        assert!(effects.is_empty());
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.attempt(), 1);
    }

    #[test]
    fn test_open_failure_routes_to_retry() {
        let mut m = machine_in(ConnectionState::Connecting);

        let effects = m.handle(Input::OpenFailed {
            generation: m.generation(),
            error: LinkError::Endpoint("no endpoint configured".to_string()),
        });

        assert_eq!(m.state(), ConnectionState::Reconnecting);
        let emitted = events(&effects);
        assert!(matches!(
            emitted.as_slice(),
            [
                SessionEvent::Error(_),
                SessionEvent::Disconnected { .. },
                SessionEvent::Reconnecting { attempt: 1, .. }
            ]
        ));
    }

    #[test]
    fn test_explicit_connect_after_exhaustion_keeps_grown_delay() {
        let mut m = SessionMachine::new(RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
        });
        m.handle(Input::Connect);
        m.handle(closed(&m));
        m.handle(Input::ReconnectTimer);
        m.handle(closed(&m));
        m.handle(Input::ReconnectTimer);
        m.handle(closed(&m));
        assert_eq!(m.state(), ConnectionState::Failed);

        m.handle(Input::Connect);
        let effects = m.handle(closed(&m));

        assert_eq!(m.attempt(), 1);
        assert_eq!(scheduled(&effects), Some(Duration::from_secs(3)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn consecutive_failures_follow_backoff_law(max_attempts in 1u32..10) {
                let config = RetryConfig {
                    max_attempts,
                    base_delay: Duration::from_millis(1000),
                    max_delay: Duration::from_secs(3600),
                };
                let mut m = SessionMachine::new(config);
                m.handle(Input::Connect);

                let mut exhausted = 0;
                for n in 1..=max_attempts + 3 {
                    let effects = m.handle(closed(&m));
                    match scheduled(&effects) {
                        Some(delay) => {
                            prop_assert!(n <= max_attempts);
                            prop_assert_eq!(delay, Duration::from_millis(1000 << (n - 1)));
                        }
                        None => {
                            exhausted += events(&effects)
                                .iter()
                                .filter(|e| matches!(e, SessionEvent::Exhausted { .. }))
                                .count();
                        }
                    }
                    m.handle(Input::ReconnectTimer);
                }

                prop_assert_eq!(exhausted, 1);
                prop_assert_eq!(m.state(), ConnectionState::Failed);
            }

            #[test]
            fn open_always_resets_retry(failures in 0u32..5) {
                let mut m = machine();
                m.handle(Input::Connect);
                for _ in 0..failures {
                    m.handle(closed(&m));
                    m.handle(Input::ReconnectTimer);
                }

                m.handle(transport(&m, TransportEvent::Opened));

                prop_assert_eq!(m.state(), ConnectionState::Connected);
                prop_assert_eq!(m.attempt(), 0);
                prop_assert_eq!(m.retry().current_delay(), Duration::from_secs(1));
            }
        }
    }
}
