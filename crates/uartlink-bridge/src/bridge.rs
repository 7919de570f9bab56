use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use uartlink_cmd::Dispatcher;
use uartlink_frame::{Framer, FramerEvent};
use uartlink_transport::{McuPins, UartPort};

use crate::classify::classify;
use crate::config::BridgeConfig;
use crate::console::ConsoleBuffer;
use crate::error::{BridgeError, Result};
use crate::pool::SessionPool;
use crate::sequencer::ResetSequencer;
use crate::session::{ConnectionMode, ListenerKind, Session, SessionId};
use crate::telnet::{apply_comport, escape_iac, TelnetEvent};

/// Why the bridge closed a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The output queue stayed full for longer than `overflow_timeout`.
    OverflowTimeout,
    /// The bridge is shutting down.
    Shutdown,
}

/// Work for the I/O layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Write `data` to the session's socket, then report back with
    /// [`Bridge::tcp_sent`].
    Transmit { session: SessionId, data: Bytes },
    /// Close the session's socket. The session is already gone from the pool.
    Close {
        session: SessionId,
        reason: CloseReason,
    },
}

/// Shares one UART between the command dispatcher, the console and the TCP
/// sessions.
pub struct Bridge<U, P> {
    config: BridgeConfig,
    uart: U,
    pins: P,
    framer: Framer,
    dispatcher: Dispatcher,
    pool: SessionPool,
    console: ConsoleBuffer,
    sequencer: ResetSequencer,
    effects: VecDeque<Effect>,
}

impl<U: UartPort, P: McuPins> Bridge<U, P> {
    pub fn new(config: BridgeConfig, uart: U, pins: P, dispatcher: Dispatcher) -> Self {
        Self {
            framer: Framer::new(config.framer()),
            pool: SessionPool::new(config.max_sessions, config.tx_buffer_size),
            sequencer: ResetSequencer::new(config.reset),
            console: ConsoleBuffer::new(),
            effects: VecDeque::new(),
            config,
            uart,
            pins,
            dispatcher,
        }
    }

    /// A bridge whose dispatcher knows the core commands.
    pub fn with_core_commands(config: BridgeConfig, uart: U, pins: P) -> Result<Self> {
        let dispatcher = Dispatcher::with_core_commands()?;
        Ok(Self::new(config, uart, pins, dispatcher))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// A TCP connection arrived on `listener`.
    pub fn accept(&mut self, listener: ListenerKind, now: Instant) -> Result<SessionId> {
        let id = self.pool.allocate(listener, now)?;
        tracing::info!(session = %id, ?listener, "session opened");
        Ok(id)
    }

    /// Bytes arrived from a TCP peer.
    pub fn tcp_received(&mut self, id: SessionId, data: &[u8], now: Instant) -> Result<()> {
        let interlocked = self.is_programming();
        let session = self
            .pool
            .get_mut(id)
            .ok_or(BridgeError::UnknownSession(id))?;

        let previous = session.mode;
        session.mode = match previous {
            ConnectionMode::Init => classify(data),
            ConnectionMode::ProgrammingInit => ConnectionMode::Programming,
            mode => mode,
        };
        let mode = session.mode;
        if mode != previous {
            tracing::info!(session = %id, %mode, "session classified");
        }

        if mode == ConnectionMode::Programming {
            if previous != ConnectionMode::Programming && !interlocked {
                tracing::info!(session = %id, "entering programming mode");
                self.framer.reset();
                self.sequencer.start(&mut self.pins, now);
            }
            if self.sequencer.is_entering() {
                session.held.extend_from_slice(data);
            } else {
                write_uart(&mut self.uart, data);
            }
            return Ok(());
        }

        if interlocked {
            tracing::debug!(session = %id, len = data.len(), "dropped: programming in progress");
            return Ok(());
        }

        match mode {
            ConnectionMode::Telnet => {
                for event in session.telnet.feed(data) {
                    match event {
                        TelnetEvent::Data(bytes) => write_uart(&mut self.uart, &bytes),
                        TelnetEvent::Reply(reply) => {
                            enqueue(&mut self.effects, session, &reply, now);
                        }
                        TelnetEvent::ComPort(request) => {
                            tracing::debug!(session = %id, ?request, "rfc2217 request");
                            let reply = apply_comport(request, &mut self.uart, &mut self.pins);
                            enqueue(&mut self.effects, session, &reply, now);
                        }
                    }
                }
            }
            _ => write_uart(&mut self.uart, data),
        }
        Ok(())
    }

    /// The previous [`Effect::Transmit`] for `id` was written.
    pub fn tcp_sent(&mut self, id: SessionId) {
        if let Some(session) = self.pool.get_mut(id) {
            if let Some(data) = session.queue.on_sent() {
                self.effects.push_back(Effect::Transmit { session: id, data });
            }
        }
    }

    /// The TCP peer went away. Unknown ids are ignored.
    pub fn disconnected(&mut self, id: SessionId, now: Instant) {
        let Some(session) = self.pool.remove(id) else {
            return;
        };
        tracing::info!(session = %id, mode = %session.mode, "session closed");
        if session.mode == ConnectionMode::Programming && !self.is_programming() {
            tracing::info!(session = %id, "leaving programming mode");
            self.sequencer.release(&mut self.pins, now);
            self.framer.reset();
        }
    }

    /// A batch of bytes arrived from the UART.
    pub fn uart_received(&mut self, data: &[u8], now: Instant) {
        if self.is_programming() {
            for session in self
                .pool
                .iter_mut()
                .filter(|s| s.mode == ConnectionMode::Programming)
            {
                enqueue(&mut self.effects, session, data, now);
            }
            return;
        }

        if !self.config.slip_enabled {
            self.fan_out_console(data, now);
            return;
        }

        for event in self.framer.feed_buf(data) {
            match event {
                FramerEvent::PacketReady(packet) => {
                    let outcome = self.dispatcher.dispatch(&packet, &mut self.uart);
                    tracing::trace!(?outcome, "packet dispatched");
                }
                FramerEvent::ConsoleBytes(text) => self.fan_out_console(&text, now),
            }
        }
    }

    /// Run timers: the reset sequence and overflow timeouts.
    pub fn poll(&mut self, now: Instant) {
        if self.sequencer.poll(&mut self.pins, now) {
            for session in self
                .pool
                .iter_mut()
                .filter(|s| s.mode == ConnectionMode::Programming)
            {
                if !session.held.is_empty() {
                    let held = session.held.split();
                    write_uart(&mut self.uart, &held);
                }
            }
        }

        let timeout = self.config.overflow_timeout;
        let expired: Vec<SessionId> = self
            .pool
            .iter()
            .filter(|s| {
                s.queue
                    .overflow_since()
                    .is_some_and(|since| now.saturating_duration_since(since) >= timeout)
            })
            .map(|s| s.id)
            .collect();
        for id in expired {
            tracing::warn!(session = %id, ?timeout, "output overflow timeout, closing session");
            self.close(id, CloseReason::OverflowTimeout, now);
        }
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let timeout = self.config.overflow_timeout;
        self.pool
            .iter()
            .filter_map(|s| s.queue.overflow_since().map(|since| since + timeout))
            .chain(self.sequencer.deadline())
            .min()
    }

    /// Send an unsolicited response to the callback the MCU registered
    /// under `name`. Refused while the MCU is being programmed.
    pub fn notify(&mut self, name: &str, cmd: u16, ret: u32, bodies: &[&[u8]]) -> Result<()> {
        if self.is_programming() {
            return Err(BridgeError::Interlocked);
        }
        self.dispatcher
            .notify_named(name, cmd, ret, bodies, &mut self.uart)?;
        Ok(())
    }

    /// Close every session. Returns once the effects are queued; a pending
    /// release pulse still needs [`poll`](Self::poll).
    pub fn shutdown(&mut self, now: Instant) {
        for id in self.pool.ids() {
            self.close(id, CloseReason::Shutdown, now);
        }
    }

    /// Whether any session holds the programming interlock.
    pub fn is_programming(&self) -> bool {
        self.pool
            .iter()
            .any(|s| s.mode == ConnectionMode::Programming)
    }

    pub fn drain_effects(&mut self) -> Vec<Effect> {
        self.effects.drain(..).collect()
    }

    pub fn console(&self) -> &ConsoleBuffer {
        &self.console
    }

    pub fn reset_console(&mut self) {
        self.console.clear();
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.pool.get(id)
    }

    pub fn sessions(&self) -> &SessionPool {
        &self.pool
    }

    pub fn uart(&self) -> &U {
        &self.uart
    }

    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }

    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    fn close(&mut self, id: SessionId, reason: CloseReason, now: Instant) {
        self.effects.push_back(Effect::Close {
            session: id,
            reason,
        });
        self.disconnected(id, now);
    }

    fn fan_out_console(&mut self, text: &[u8], now: Instant) {
        self.console.write(text);
        let mut escaped = None;
        for session in self.pool.iter_mut().filter(|s| s.mode.receives_console()) {
            if session.mode == ConnectionMode::Telnet {
                let data = escaped.get_or_insert_with(|| escape_iac(text));
                enqueue(&mut self.effects, session, data, now);
            } else {
                enqueue(&mut self.effects, session, text, now);
            }
        }
    }
}

impl<U, P> std::fmt::Debug for Bridge<U, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("sessions", &self.pool.len())
            .field("sequencer", &self.sequencer)
            .finish_non_exhaustive()
    }
}

fn enqueue(effects: &mut VecDeque<Effect>, session: &mut Session, data: &[u8], now: Instant) {
    let was_overflowing = session.queue.overflow_since().is_some();
    if let Some(data) = session.queue.enqueue(data, now) {
        effects.push_back(Effect::Transmit {
            session: session.id,
            data,
        });
    } else if !was_overflowing && session.queue.overflow_since().is_some() {
        tracing::debug!(session = %session.id, "output queue full, dropping bytes");
    }
}

fn write_uart<U: UartPort + ?Sized>(uart: &mut U, data: &[u8]) {
    if let Err(err) = uart.write_all(data) {
        tracing::warn!(error = %err, len = data.len(), "uart write failed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uartlink_cmd::{ids, RequestBuilder, ResponseFrame};
    use uartlink_frame::FramerConfig;
    use uartlink_transport::{CaptureUart, Level, LineSettings, PinEvent, RecordingPins};

    use super::*;
    use crate::telnet::{DO, IAC, OPT_BINARY, OPT_COM_PORT, SB, SE, WILL};

    type TestBridge = Bridge<CaptureUart, RecordingPins>;

    fn bridge_with(config: BridgeConfig) -> TestBridge {
        Bridge::with_core_commands(config, CaptureUart::new(), RecordingPins::new()).unwrap()
    }

    fn bridge() -> TestBridge {
        bridge_with(BridgeConfig::default())
    }

    /// Bytes transmitted to `id`, acknowledging each batch. Effects for
    /// other sessions stay queued.
    fn received(bridge: &mut TestBridge, id: SessionId) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let before = out.len();
            let mut kept = VecDeque::new();
            for effect in bridge.effects.drain(..) {
                match effect {
                    Effect::Transmit { session, data } if session == id => {
                        out.extend_from_slice(&data)
                    }
                    other => kept.push_back(other),
                }
            }
            bridge.effects = kept;
            if out.len() == before {
                return out;
            }
            bridge.tcp_sent(id);
        }
    }

    fn settle(bridge: &mut TestBridge, now: Instant) -> Instant {
        let later = now + Duration::from_millis(10);
        bridge.poll(later);
        later
    }

    #[test]
    fn reset_sequence_runs_once_per_transition() {
        let t0 = Instant::now();
        let mut bridge = bridge();
        let id = bridge.accept(ListenerKind::Bridge, t0).unwrap();

        bridge.tcp_received(id, b"0 ", t0).unwrap();
        assert_eq!(bridge.session(id).unwrap().mode, ConnectionMode::Programming);
        assert_eq!(bridge.pins().events(), &[PinEvent::Reset(Level::Low)]);
        assert!(bridge.uart().written().is_empty(), "bytes held until settle");

        let t1 = settle(&mut bridge, t0);
        assert_eq!(
            bridge.pins().events(),
            &[
                PinEvent::Reset(Level::Low),
                PinEvent::Isp(Level::Low),
                PinEvent::Reset(Level::High),
            ]
        );
        assert_eq!(bridge.uart().written(), b"0 ");

        bridge.tcp_received(id, b"0 ", t1).unwrap();
        settle(&mut bridge, t1);
        assert_eq!(bridge.pins().events().len(), 3);
        assert_eq!(bridge.uart().written(), b"0 0 ");
    }

    #[test]
    fn programming_port_enters_programming_on_first_payload() {
        let t0 = Instant::now();
        let mut bridge = bridge();
        let id = bridge.accept(ListenerKind::Programming, t0).unwrap();
        assert_eq!(
            bridge.session(id).unwrap().mode,
            ConnectionMode::ProgrammingInit
        );

        bridge.tcp_received(id, b"hello", t0).unwrap();
        bridge.tcp_received(id, b"!", t0).unwrap();
        assert!(bridge.is_programming());
        assert!(bridge.uart().written().is_empty());

        settle(&mut bridge, t0);
        assert_eq!(bridge.uart().written(), b"hello!");
    }

    #[test]
    fn interlock_routes_uart_to_programming_only() {
        let t0 = Instant::now();
        let mut bridge = bridge();
        let plain = bridge.accept(ListenerKind::Bridge, t0).unwrap();
        bridge.tcp_received(plain, b"hi", t0).unwrap();
        let prog = bridge.accept(ListenerKind::Programming, t0).unwrap();
        bridge.tcp_received(prog, b"?\n", t0).unwrap();
        let t1 = settle(&mut bridge, t0);
        bridge.uart_mut().take();
        bridge.drain_effects();

        let packet = RequestBuilder::new(ids::NOOP).value(9).to_wire().unwrap();
        bridge.uart_received(&packet, t1);
        bridge.uart_received(b"sync", t1);

        let mut expected = packet.to_vec();
        expected.extend_from_slice(b"sync");
        assert_eq!(received(&mut bridge, prog), expected);
        assert!(received(&mut bridge, plain).is_empty());
        assert!(bridge.console().is_empty());
        assert!(bridge.uart().written().is_empty(), "packet must not be dispatched");

        bridge.tcp_received(plain, b"noise", t1).unwrap();
        assert!(bridge.uart().written().is_empty());

        let err = bridge.notify("mqtt", 10, 0, &[]).unwrap_err();
        assert!(matches!(err, BridgeError::Interlocked));
    }

    #[test]
    fn programming_disconnect_runs_release_pulse() {
        let t0 = Instant::now();
        let mut bridge = bridge();
        let plain = bridge.accept(ListenerKind::Bridge, t0).unwrap();
        let prog = bridge.accept(ListenerKind::Programming, t0).unwrap();
        bridge.tcp_received(prog, b"0 ", t0).unwrap();
        let t1 = settle(&mut bridge, t0);
        bridge.pins_mut().take();

        bridge.disconnected(prog, t1);
        assert!(!bridge.is_programming());
        assert_eq!(
            bridge.pins().events(),
            &[PinEvent::Isp(Level::High), PinEvent::Reset(Level::Low)]
        );
        assert_eq!(bridge.next_deadline(), Some(t1 + Duration::from_millis(1)));
        let t2 = settle(&mut bridge, t1);
        assert_eq!(bridge.pins().events().last(), Some(&PinEvent::Reset(Level::High)));
        assert_eq!(bridge.next_deadline(), None);

        bridge.uart_received(b"booted\r\n", t2);
        assert_eq!(received(&mut bridge, plain), b"booted\r\n");
    }

    #[test]
    fn telnet_baud_query_reports_current_rate() {
        let t0 = Instant::now();
        let uart = CaptureUart::with_line(LineSettings {
            baud: 115_200,
            ..LineSettings::default()
        });
        let mut bridge =
            Bridge::with_core_commands(BridgeConfig::default(), uart, RecordingPins::new()).unwrap();
        let id = bridge.accept(ListenerKind::Bridge, t0).unwrap();

        bridge
            .tcp_received(id, &[IAC, SB, OPT_COM_PORT, 1, 0, 0, 0, 0, IAC, SE], t0)
            .unwrap();
        assert_eq!(bridge.session(id).unwrap().mode, ConnectionMode::Telnet);
        assert_eq!(
            received(&mut bridge, id),
            vec![IAC, SB, OPT_COM_PORT, 101, 0x00, 0x01, 0xC2, 0x00, IAC, SE]
        );
        assert!(bridge.uart().written().is_empty());
    }

    #[test]
    fn telnet_control_drives_pins() {
        let t0 = Instant::now();
        let mut bridge = bridge();
        let id = bridge.accept(ListenerKind::Bridge, t0).unwrap();
        bridge
            .tcp_received(id, &[IAC, SB, OPT_COM_PORT, 5, 8, IAC, SE], t0)
            .unwrap();
        bridge
            .tcp_received(id, &[IAC, SB, OPT_COM_PORT, 5, 9, IAC, SE, b'x'], t0)
            .unwrap();
        assert_eq!(
            bridge.pins().events(),
            &[PinEvent::Reset(Level::Low), PinEvent::Reset(Level::High)]
        );
        assert_eq!(bridge.uart().written(), b"x");
        assert!(!bridge.is_programming());
    }

    #[test]
    fn console_fan_out_doubles_iac_for_telnet() {
        let t0 = Instant::now();
        let mut bridge = bridge();
        let telnet = bridge.accept(ListenerKind::Bridge, t0).unwrap();
        bridge.tcp_received(telnet, &[IAC, DO, OPT_BINARY], t0).unwrap();
        assert_eq!(received(&mut bridge, telnet), vec![IAC, WILL, OPT_BINARY]);
        let raw = bridge.accept(ListenerKind::Bridge, t0).unwrap();
        bridge.tcp_received(raw, b"x", t0).unwrap();

        bridge.uart_received(&[b'a', IAC, b'b'], t0);
        assert_eq!(received(&mut bridge, telnet), vec![b'a', IAC, IAC, b'b']);
        assert_eq!(received(&mut bridge, raw), vec![b'a', IAC, b'b']);
        assert_eq!(bridge.console().read_from(0).bytes.as_ref(), &[b'a', IAC, b'b']);
    }

    #[test]
    fn uart_packets_are_dispatched_not_fanned_out() {
        let t0 = Instant::now();
        let mut bridge = bridge();
        let id = bridge.accept(ListenerKind::Bridge, t0).unwrap();

        bridge.uart_received(&RequestBuilder::new(ids::NOOP).value(0x1234).to_wire().unwrap(), t0);
        assert!(received(&mut bridge, id).is_empty());
        assert!(bridge.console().is_empty());

        let mut framer = Framer::new(FramerConfig::default().with_console_sniff(false));
        let events = framer.feed_buf(bridge.uart().written());
        let [FramerEvent::PacketReady(packet)] = events.as_slice() else {
            panic!("expected one response, got {events:?}");
        };
        let response = ResponseFrame::parse(packet).unwrap();
        assert_eq!(response.callback, 0x1234);
        assert_eq!(response.ret, 1);
    }

    #[test]
    fn slip_disabled_passes_everything_to_console() {
        let t0 = Instant::now();
        let mut config = BridgeConfig::default();
        config.slip_enabled = false;
        let mut bridge = bridge_with(config);
        let id = bridge.accept(ListenerKind::Bridge, t0).unwrap();

        let packet = RequestBuilder::new(ids::NOOP).value(1).to_wire().unwrap();
        bridge.uart_received(&packet, t0);
        assert_eq!(received(&mut bridge, id), packet.to_vec());
        assert!(bridge.uart().written().is_empty());
    }

    #[test]
    fn pool_refuses_extra_sessions() {
        let t0 = Instant::now();
        let mut bridge = bridge_with(BridgeConfig::default().with_max_sessions(2));
        let a = bridge.accept(ListenerKind::Bridge, t0).unwrap();
        let b = bridge.accept(ListenerKind::Programming, t0).unwrap();
        let err = bridge.accept(ListenerKind::Bridge, t0).unwrap_err();
        assert!(matches!(err, BridgeError::PoolFull { capacity: 2 }));
        assert!(bridge.session(a).is_some());
        assert!(bridge.session(b).is_some());
    }

    fn overflowing_bridge(t0: Instant) -> (TestBridge, SessionId) {
        let config = BridgeConfig::default()
            .with_tx_buffer_size(4)
            .with_overflow_timeout(Duration::from_secs(10));
        let mut bridge = bridge_with(config);
        let id = bridge.accept(ListenerKind::Bridge, t0).unwrap();
        bridge.uart_received(b"abcd", t0);
        bridge.uart_received(b"efgh", t0);
        bridge.uart_received(b"i", t0);
        (bridge, id)
    }

    #[test]
    fn overflow_past_timeout_closes_session() {
        let t0 = Instant::now();
        let (mut bridge, id) = overflowing_bridge(t0);
        assert_eq!(
            bridge.session(id).unwrap().queue.overflow_since(),
            Some(t0)
        );
        assert_eq!(bridge.next_deadline(), Some(t0 + Duration::from_secs(10)));
        bridge.drain_effects();

        bridge.poll(t0 + Duration::from_secs(9));
        assert!(bridge.session(id).is_some());

        bridge.poll(t0 + Duration::from_secs(10));
        assert!(bridge.session(id).is_none());
        assert_eq!(
            bridge.drain_effects(),
            vec![Effect::Close {
                session: id,
                reason: CloseReason::OverflowTimeout
            }]
        );
    }

    #[test]
    fn draining_before_timeout_keeps_session() {
        let t0 = Instant::now();
        let (mut bridge, id) = overflowing_bridge(t0);
        bridge.drain_effects();

        bridge.tcp_sent(id);
        assert_eq!(
            bridge.drain_effects(),
            vec![Effect::Transmit {
                session: id,
                data: Bytes::from_static(b"efgh")
            }]
        );
        bridge.poll(t0 + Duration::from_secs(11));
        assert!(bridge.session(id).is_some());
        assert!(bridge.drain_effects().is_empty());
    }

    #[test]
    fn notify_reaches_registered_callback() {
        let t0 = Instant::now();
        let mut bridge = bridge();
        let cb_add = RequestBuilder::new(ids::CB_ADD)
            .value(0x77)
            .arg(Bytes::from_static(b"mqtt"))
            .to_wire()
            .unwrap();
        bridge.uart_received(&cb_add, t0);
        bridge.uart_mut().take();

        bridge.notify("mqtt", 11, 5, &[&b"hello"[..]]).unwrap();
        let mut framer = Framer::new(FramerConfig::default().with_console_sniff(false));
        let events = framer.feed_buf(bridge.uart().written());
        let [FramerEvent::PacketReady(packet)] = events.as_slice() else {
            panic!("expected one response, got {events:?}");
        };
        let response = ResponseFrame::parse(packet).unwrap();
        assert_eq!(response.callback, 0x77);
        assert_eq!(response.ret, 5);

        assert!(bridge.notify("rest", 20, 0, &[]).is_err());
    }

    #[test]
    fn unknown_sessions() {
        let t0 = Instant::now();
        let mut bridge = bridge();
        let id = bridge.accept(ListenerKind::Bridge, t0).unwrap();
        bridge.disconnected(id, t0);
        bridge.disconnected(id, t0);
        let err = bridge.tcp_received(id, b"x", t0).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownSession(_)));
        bridge.tcp_sent(id);
        assert!(bridge.drain_effects().is_empty());
    }

    #[test]
    fn shutdown_closes_everything() {
        let t0 = Instant::now();
        let mut bridge = bridge();
        let a = bridge.accept(ListenerKind::Bridge, t0).unwrap();
        let b = bridge.accept(ListenerKind::Programming, t0).unwrap();
        bridge.tcp_received(b, b"0 ", t0).unwrap();
        let t1 = settle(&mut bridge, t0);

        bridge.shutdown(t1);
        assert!(bridge.sessions().is_empty());
        let closes: Vec<_> = bridge
            .drain_effects()
            .into_iter()
            .filter_map(|e| match e {
                Effect::Close { session, reason } => Some((session, reason)),
                Effect::Transmit { .. } => None,
            })
            .collect();
        assert_eq!(
            closes,
            vec![(a, CloseReason::Shutdown), (b, CloseReason::Shutdown)]
        );
        assert!(bridge.next_deadline().is_some(), "release pulse pending");
    }

    #[test]
    fn console_reset_forgets_history() {
        let t0 = Instant::now();
        let mut bridge = bridge();
        bridge.uart_received(b"log line\n", t0);
        assert_eq!(bridge.console().len(), 9);
        bridge.reset_console();
        assert!(bridge.console().is_empty());
        assert_eq!(bridge.console().position(), 9);
    }
}
