//! Tokio event loop around [`Bridge`].
//!
//! One task owns the bridge. The UART is read on a dedicated blocking
//! thread; every TCP connection gets a reader task and a writer task. All of
//! them talk to the owner through channels, so the bridge itself is never
//! shared.

use std::collections::HashMap;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::thread;
use std::time::Instant;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uartlink_transport::{McuPins, TransportError, UartPort};

use crate::bridge::{Bridge, Effect};
use crate::config::ListenConfig;
use crate::error::{BridgeError, Result};
use crate::session::{ListenerKind, SessionId};

const READ_CHUNK: usize = 1024;
const UART_CHANNEL_DEPTH: usize = 64;

#[derive(Debug)]
enum ConnEvent {
    Received(SessionId, Bytes),
    Sent(SessionId),
    Closed(SessionId),
}

struct ConnHandle {
    /// At most one batch is outstanding per session, so this stays short.
    tx: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
}

/// Bind both listeners from `listen` and run the bridge until `shutdown`.
pub async fn serve<U, P, R>(
    bridge: Bridge<U, P>,
    uart_reader: R,
    listen: &ListenConfig,
    shutdown: CancellationToken,
) -> Result<()>
where
    U: UartPort,
    P: McuPins,
    R: Read + Send + 'static,
{
    let bridge_listener = bind(listen.bridge_addr()).await?;
    let programming_listener = bind(listen.programming_addr()).await?;
    serve_listeners(
        bridge,
        uart_reader,
        bridge_listener,
        programming_listener,
        shutdown,
    )
    .await
}

/// Run the bridge on already bound listeners.
pub async fn serve_listeners<U, P, R>(
    mut bridge: Bridge<U, P>,
    uart_reader: R,
    bridge_listener: TcpListener,
    programming_listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()>
where
    U: UartPort,
    P: McuPins,
    R: Read + Send + 'static,
{
    tracing::info!(
        bridge = ?bridge_listener.local_addr().ok(),
        programming = ?programming_listener.local_addr().ok(),
        "bridge listening"
    );

    let reader_cancel = shutdown.child_token();
    let (uart_tx, mut uart_rx) = mpsc::channel::<Bytes>(UART_CHANNEL_DEPTH);
    spawn_uart_reader(uart_reader, uart_tx, reader_cancel.clone())?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ConnEvent>();
    let mut conns: HashMap<SessionId, ConnHandle> = HashMap::new();

    let result = loop {
        let deadline = bridge.next_deadline();
        tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            accepted = bridge_listener.accept() => {
                on_accept(&mut bridge, &mut conns, &event_tx, &shutdown, ListenerKind::Bridge, accepted);
            }
            accepted = programming_listener.accept() => {
                on_accept(&mut bridge, &mut conns, &event_tx, &shutdown, ListenerKind::Programming, accepted);
            }
            data = uart_rx.recv() => match data {
                Some(data) => bridge.uart_received(&data, Instant::now()),
                None => {
                    tracing::error!("uart reader stopped");
                    break Err(BridgeError::Transport(TransportError::Shutdown));
                }
            },
            Some(event) = event_rx.recv() => on_conn_event(&mut bridge, &mut conns, event),
            _ = sleep_until(deadline) => bridge.poll(Instant::now()),
        }
        apply_effects(&mut bridge, &mut conns);
    };

    tracing::info!(sessions = conns.len(), "bridge shutting down");
    bridge.shutdown(Instant::now());
    apply_effects(&mut bridge, &mut conns);
    // Let a pending release pulse finish so the MCU is not left in reset.
    while let Some(deadline) = bridge.next_deadline() {
        sleep_until(Some(deadline)).await;
        bridge.poll(Instant::now());
    }
    reader_cancel.cancel();
    result
}

async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind { addr, source }.into())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

fn on_accept<U: UartPort, P: McuPins>(
    bridge: &mut Bridge<U, P>,
    conns: &mut HashMap<SessionId, ConnHandle>,
    events: &mpsc::UnboundedSender<ConnEvent>,
    shutdown: &CancellationToken,
    listener: ListenerKind,
    accepted: io::Result<(TcpStream, SocketAddr)>,
) {
    let (stream, peer) = match accepted {
        Ok(accepted) => accepted,
        Err(err) => {
            tracing::warn!(error = %TransportError::Accept(err), ?listener, "accept failed");
            return;
        }
    };
    match bridge.accept(listener, Instant::now()) {
        Ok(id) => {
            if let Err(err) = stream.set_nodelay(true) {
                tracing::debug!(session = %id, error = %err, "set_nodelay failed");
            }
            let cancel = shutdown.child_token();
            let tx = spawn_connection(id, stream, events.clone(), cancel.clone());
            tracing::debug!(session = %id, %peer, "connection attached");
            conns.insert(id, ConnHandle { tx, cancel });
        }
        Err(err) => {
            // Dropping the stream refuses the connection.
            tracing::warn!(%peer, error = %err, "connection refused");
        }
    }
}

fn on_conn_event<U: UartPort, P: McuPins>(
    bridge: &mut Bridge<U, P>,
    conns: &mut HashMap<SessionId, ConnHandle>,
    event: ConnEvent,
) {
    let now = Instant::now();
    match event {
        ConnEvent::Received(id, data) => {
            if let Err(err) = bridge.tcp_received(id, &data, now) {
                tracing::debug!(session = %id, error = %err, "tcp payload ignored");
            }
        }
        ConnEvent::Sent(id) => bridge.tcp_sent(id),
        ConnEvent::Closed(id) => {
            if let Some(handle) = conns.remove(&id) {
                handle.cancel.cancel();
            }
            bridge.disconnected(id, now);
        }
    }
}

fn apply_effects<U: UartPort, P: McuPins>(
    bridge: &mut Bridge<U, P>,
    conns: &mut HashMap<SessionId, ConnHandle>,
) {
    for effect in bridge.drain_effects() {
        match effect {
            Effect::Transmit { session, data } => {
                if let Some(handle) = conns.get(&session) {
                    if handle.tx.send(data).is_err() {
                        tracing::debug!(%session, "writer gone, dropping batch");
                    }
                }
            }
            Effect::Close { session, reason } => {
                if let Some(handle) = conns.remove(&session) {
                    tracing::info!(%session, ?reason, "closing connection");
                    handle.cancel.cancel();
                }
            }
        }
    }
}

fn spawn_connection(
    id: SessionId,
    stream: TcpStream,
    events: mpsc::UnboundedSender<ConnEvent>,
    cancel: CancellationToken,
) -> mpsc::UnboundedSender<Bytes> {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(read_loop(id, read_half, events.clone(), cancel.clone()));
    tokio::spawn(write_loop(id, write_half, rx, events, cancel));
    tx
}

async fn read_loop(
    id: SessionId,
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<ConnEvent>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    let data = Bytes::copy_from_slice(&buf[..n]);
                    if events.send(ConnEvent::Received(id, data)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    tracing::debug!(session = %id, error = %err, "tcp read failed");
                    break;
                }
            },
        }
    }
    let _ = events.send(ConnEvent::Closed(id));
}

async fn write_loop(
    id: SessionId,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    events: mpsc::UnboundedSender<ConnEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            data = rx.recv() => {
                let Some(data) = data else { break };
                if let Err(err) = writer.write_all(&data).await {
                    tracing::debug!(session = %id, error = %err, "tcp write failed");
                    let _ = events.send(ConnEvent::Closed(id));
                    break;
                }
                if events.send(ConnEvent::Sent(id)).is_err() {
                    break;
                }
            }
        }
    }
    let _ = writer.shutdown().await;
}

fn spawn_uart_reader<R: Read + Send + 'static>(
    mut reader: R,
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) -> Result<()> {
    thread::Builder::new()
        .name("uart-reader".into())
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            while !cancel.is_cancelled() {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        tracing::warn!("uart closed");
                        break;
                    }
                    Ok(n) => {
                        if tx.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                            break;
                        }
                    }
                    Err(err)
                        if matches!(
                            err.kind(),
                            io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                        ) => {}
                    Err(err) => {
                        tracing::error!(error = %err, "uart read failed");
                        break;
                    }
                }
            }
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc as std_mpsc, Arc, Mutex};
    use std::time::Duration;

    use uartlink_transport::{LineSettings, RecordingPins};

    use super::*;
    use crate::config::BridgeConfig;

    /// UART whose transmit side the test can inspect while the bridge owns it.
    #[derive(Clone, Default)]
    struct SharedUart(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedUart {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl UartPort for SharedUart {
        fn line(&self) -> LineSettings {
            LineSettings::default()
        }

        fn set_line(&mut self, _line: LineSettings) -> uartlink_transport::Result<()> {
            Ok(())
        }
    }

    /// UART receive side fed from the test; times out like a serial port.
    struct ChannelReader(std_mpsc::Receiver<Vec<u8>>);

    impl Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv_timeout(Duration::from_millis(20)) {
                Ok(data) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Err(std_mpsc::RecvTimeoutError::Timeout) => {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
                }
                Err(std_mpsc::RecvTimeoutError::Disconnected) => Ok(0),
            }
        }
    }

    async fn wait_for(uart: &SharedUart, expected: &[u8]) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if uart.0.lock().unwrap().as_slice() == expected {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "uart never received {expected:?}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn bridges_tcp_and_uart() {
        let uart = SharedUart::default();
        let bridge = Bridge::with_core_commands(
            BridgeConfig::default(),
            uart.clone(),
            RecordingPins::new(),
        )
        .unwrap();
        let (feed, rx) = std_mpsc::channel();
        let bridge_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let programming_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = bridge_listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();

        let server = tokio::spawn(serve_listeners(
            bridge,
            ChannelReader(rx),
            bridge_listener,
            programming_listener,
            shutdown.clone(),
        ));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        wait_for(&uart, b"hello").await;

        feed.send(b"console\n".to_vec()).unwrap();
        let mut buf = [0u8; 8];
        tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"console\n");

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn pool_full_refuses_connection() {
        let uart = SharedUart::default();
        let bridge = Bridge::with_core_commands(
            BridgeConfig::default().with_max_sessions(1),
            uart.clone(),
            RecordingPins::new(),
        )
        .unwrap();
        let (_feed, rx) = std_mpsc::channel();
        let bridge_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let programming_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = bridge_listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve_listeners(
            bridge,
            ChannelReader(rx),
            bridge_listener,
            programming_listener,
            shutdown.clone(),
        ));

        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(b"a").await.unwrap();
        wait_for(&uart, b"a").await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(5), second.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0, "refused connection is closed");

        first.write_all(b"b").await.unwrap();
        wait_for(&uart, b"ab").await;

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}
