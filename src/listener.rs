use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::error::BindError;
use crate::reading::Reading;
use crate::wire::{self, MAX_PAYLOAD_LEN};

/// Upper bound on how long a stop request can go unnoticed.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Created,
    Bound,
    Running,
    StopRequested,
    Stopped,
}

impl ListenerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ListenerState::Created,
            1 => ListenerState::Bound,
            2 => ListenerState::Running,
            3 => ListenerState::StopRequested,
            _ => ListenerState::Stopped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerStats {
    pub received: u64,
    pub forwarded: u64,
    pub rejected: u64,
    pub receive_errors: u64,
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    stop: AtomicBool,
    received: AtomicU64,
    forwarded: AtomicU64,
    rejected: AtomicU64,
    receive_errors: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ListenerState::Created as u8),
            stop: AtomicBool::new(false),
            received: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            receive_errors: AtomicU64::new(0),
        }
    }

    fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ListenerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: ListenerState, to: ListenerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Raises the stop flag and moves a live listener to `StopRequested` in a
    /// single step, so a concurrent `Bound -> Running` cannot undo it.
    /// Returns `false` if a stop was already requested.
    fn request_stop(&self) -> bool {
        if self.stop.swap(true, Ordering::AcqRel) {
            return false;
        }

        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                match ListenerState::from_u8(s) {
                    ListenerState::Bound | ListenerState::Running => {
                        Some(ListenerState::StopRequested as u8)
                    }
                    _ => None,
                }
            });
        true
    }
}

/// UDP listener that decodes datagrams into [`Reading`]s and sends them down
/// a channel.
#[derive(Debug, Clone)]
pub struct Listener {
    addr: String,
    recv_timeout: Duration,
}

impl Listener {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        }
    }

    pub fn recv_timeout(mut self, recv_timeout: Duration) -> Self {
        self.recv_timeout = recv_timeout;
        self
    }

    /// Binds the socket and starts the receive loop on its own thread.
    ///
    /// Bind failures are returned here; the loop is never entered.
    pub fn start(self, readings: UnboundedSender<Reading>) -> Result<ListenerHandle, BindError> {
        let shared = Arc::new(Shared::new());

        let socket = UdpSocket::bind(self.addr.as_str()).map_err(|source| BindError::Bind {
            addr: self.addr.clone(),
            source,
        })?;
        socket
            .set_read_timeout(Some(self.recv_timeout))
            .map_err(BindError::Configure)?;
        let local_addr = socket.local_addr().map_err(BindError::Configure)?;
        shared.set_state(ListenerState::Bound);

        info!(%local_addr, "listening for sensor datagrams");

        let thread = thread::Builder::new()
            .name("udp-listener".to_owned())
            .spawn({
                let shared = Arc::clone(&shared);
                move || receive_loop(socket, readings, &shared)
            })
            .map_err(BindError::Spawn)?;

        Ok(ListenerHandle {
            shared,
            local_addr,
            thread: Some(thread),
        })
    }
}

pub fn start(
    addr: impl Into<String>,
    readings: UnboundedSender<Reading>,
) -> Result<ListenerHandle, BindError> {
    Listener::new(addr).start(readings)
}

fn receive_loop(socket: UdpSocket, readings: UnboundedSender<Reading>, shared: &Shared) {
    shared.transition(ListenerState::Bound, ListenerState::Running);

    // One spare byte so oversized datagrams are seen as such instead of
    // silently truncated to a valid length.
    let mut buf = [0u8; MAX_PAYLOAD_LEN + 1];

    while !shared.stop_requested() {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => {
                shared.receive_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "failed to receive datagram");
                continue;
            }
        };

        if shared.stop_requested() {
            debug!(%peer, "discarding datagram received after stop request");
            break;
        }

        shared.received.fetch_add(1, Ordering::Relaxed);

        match wire::decode(&buf[..len]) {
            Ok(reading) => {
                debug!(%peer, sensor_id = %reading.sensor_id, value = reading.value, "reading received");
                if readings.send(reading).is_err() {
                    info!("reading channel closed, stopping listener");
                    break;
                }
                shared.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                shared.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(%peer, len, error = %e, "dropping undecodable datagram");
            }
        }
    }

    drop(socket);
    shared.set_state(ListenerState::Stopped);
    info!("listener stopped");
}

/// Control handle for a running [`Listener`].
///
/// Dropping a handle that was not joined stops the listener and waits for it.
#[derive(Debug)]
pub struct ListenerHandle {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ListenerState {
        self.shared.state()
    }

    pub fn stats(&self) -> ListenerStats {
        ListenerStats {
            received: self.shared.received.load(Ordering::Relaxed),
            forwarded: self.shared.forwarded.load(Ordering::Relaxed),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
            receive_errors: self.shared.receive_errors.load(Ordering::Relaxed),
        }
    }

    /// Asks the loop to exit. It does so within one receive timeout.
    pub fn stop(&self) {
        if self.shared.request_stop() {
            debug!(local_addr = %self.local_addr, "listener stop requested");
        }
    }

    /// Blocks until the listener thread has exited and its socket is closed.
    pub fn join(mut self) {
        self.join_thread();
    }

    fn join_thread(&mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("listener thread panicked");
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
            self.join_thread();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;

    const VALID: &[u8] =
        br#"{"sensor_id":"temp-01","value":22.5,"unit":"C","ts":"2025-11-03T14:05:09Z"}"#;

    fn start_local(
        recv_timeout: Duration,
    ) -> (ListenerHandle, mpsc::UnboundedReceiver<Reading>, UdpSocket) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Listener::new("127.0.0.1:0")
            .recv_timeout(recv_timeout)
            .start(tx)
            .unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        (handle, rx, client)
    }

    fn wait_until(handle: &ListenerHandle, condition: impl Fn(&ListenerHandle) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition(handle) {
            assert!(Instant::now() < deadline, "listener condition not reached");
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn wait_for(handle: &ListenerHandle, state: ListenerState) {
        wait_until(handle, |h| h.state() == state);
    }

    #[test]
    fn bind_failure_is_reported() {
        let occupied = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap().to_string();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = Listener::new(addr.clone()).start(tx);

        match result {
            Err(BindError::Bind { addr: a, .. }) => assert_eq!(a, addr),
            other => panic!("expected bind error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn forwards_valid_and_drops_malformed() {
        let (handle, mut rx, client) = start_local(Duration::from_millis(50));
        let target = handle.local_addr();

        client.send_to(b"{\"sensor_id\":", target).unwrap();
        client.send_to(&[0xff, 0xfe], target).unwrap();
        client.send_to(VALID, target).unwrap();

        let reading = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reading.sensor_id, "temp-01");
        assert_eq!(reading.value, 22.5);

        wait_until(&handle, |h| h.stats().forwarded == 1);
        let stats = handle.stats();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.forwarded, 1);
        assert_eq!(handle.state(), ListenerState::Running);

        handle.stop();
        handle.join();
    }

    #[test]
    fn stop_then_join_is_bounded_by_timeout() {
        let (handle, _rx, _client) = start_local(Duration::from_millis(100));
        wait_for(&handle, ListenerState::Running);

        let started = Instant::now();
        handle.stop();
        assert!(matches!(
            handle.state(),
            ListenerState::StopRequested | ListenerState::Stopped
        ));
        handle.join();

        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn stop_request_wins_over_loop_startup() {
        let shared = Shared::new();
        shared.set_state(ListenerState::Bound);

        assert!(shared.request_stop());
        assert!(!shared.transition(ListenerState::Bound, ListenerState::Running));
        assert_eq!(shared.state(), ListenerState::StopRequested);

        let shared = Shared::new();
        shared.set_state(ListenerState::Running);
        assert!(shared.request_stop());
        assert_eq!(shared.state(), ListenerState::StopRequested);
        assert!(!shared.request_stop());

        let shared = Shared::new();
        shared.set_state(ListenerState::Stopped);
        shared.request_stop();
        assert_eq!(shared.state(), ListenerState::Stopped);
    }

    #[test]
    fn stop_right_after_start_never_leaves_running() {
        for _ in 0..200 {
            let (handle, _rx, _client) = start_local(Duration::from_millis(10));
            handle.stop();
            assert_ne!(handle.state(), ListenerState::Running);
            wait_for(&handle, ListenerState::Stopped);
            handle.join();
        }
    }

    #[test]
    fn nothing_is_forwarded_after_stop() {
        let (handle, mut rx, client) = start_local(Duration::from_millis(50));
        let target = handle.local_addr();
        wait_for(&handle, ListenerState::Running);

        handle.stop();
        wait_for(&handle, ListenerState::Stopped);
        let stats = handle.stats();
        handle.join();

        // The socket may already be closed, in which case the send can fail.
        let _ = client.send_to(VALID, target);
        thread::sleep(Duration::from_millis(100));

        assert_eq!(stats.received, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_channel_stops_listener() {
        let (handle, rx, client) = start_local(Duration::from_millis(50));
        drop(rx);

        client.send_to(VALID, handle.local_addr()).unwrap();

        wait_for(&handle, ListenerState::Stopped);
        handle.join();
    }

    #[test]
    fn dropping_handle_stops_listener() {
        let (handle, mut rx, _client) = start_local(Duration::from_millis(50));
        drop(handle);

        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
