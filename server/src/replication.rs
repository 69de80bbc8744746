//! Best-effort replication over UDP.
//!
//! Two independent planes: a unicast listener fed by an explicit peer
//! list, and a multicast group. Each plane is a blocking receive loop on
//! its own thread; frames are authenticated, decoded, rate-checked, and
//! applied under the node lock. Rows that arrived from the network are
//! never re-broadcast — only locally originated mutations go out, and the
//! send path is fire-and-forget: no acknowledgment, no retry, no ordering.
//! A lost datagram leaves a peer stale until the next mutation of the key.

use crate::config::ReplicationConfig;
use crate::metrics;
use crate::node::{unix_now, Shared};
use parking_lot::Mutex;
use protocol_mesh::{auth, Command, Row, MAX_FRAME_LEN};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Consecutive receive failures after which a plane declares its socket
/// dead and stops.
const MAX_RECV_FAILURES: u32 = 8;

/// Lifecycle state of one replication plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaneState {
    /// No listener thread.
    Stopped = 0,
    /// Socket bound, thread spawned, loop not yet entered.
    Starting = 1,
    /// Receive loop serving frames.
    Running = 2,
    /// Stop signalled, thread not yet joined.
    Stopping = 3,
}

impl PlaneState {
    fn from_u8(value: u8) -> PlaneState {
        match value {
            1 => PlaneState::Starting,
            2 => PlaneState::Running,
            3 => PlaneState::Stopping,
            _ => PlaneState::Stopped,
        }
    }
}

struct Plane {
    local: SocketAddr,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    handle: JoinHandle<()>,
}

impl Plane {
    fn spawn(
        label: &'static str,
        socket: UdpSocket,
        shared: Arc<Shared>,
    ) -> std::io::Result<Plane> {
        let local = socket.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(PlaneState::Starting as u8));

        let loop_stop = stop.clone();
        let loop_state = state.clone();
        let handle = std::thread::Builder::new()
            .name(format!("mesh-{}", label))
            .spawn(move || recv_loop(label, socket, shared, loop_stop, loop_state))
            .expect("failed to spawn listener thread");

        Ok(Plane {
            local,
            stop,
            state,
            handle,
        })
    }

    fn state(&self) -> PlaneState {
        PlaneState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Signal the loop, wake its blocking read, and join it.
    fn shut_down(self) {
        self.state
            .store(PlaneState::Stopping as u8, Ordering::Release);
        self.stop.store(true, Ordering::SeqCst);

        // A zero-length datagram to the listener's own port unblocks the
        // read; the loop treats empty datagrams as wakeups.
        let wake_ip: IpAddr = if self.local.ip().is_unspecified() {
            Ipv4Addr::LOCALHOST.into()
        } else {
            self.local.ip()
        };
        if let Ok(waker) = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)) {
            let _ = waker.send_to(&[], (wake_ip, self.local.port()));
        }

        let _ = self.handle.join();
        self.state
            .store(PlaneState::Stopped as u8, Ordering::Release);
    }
}

pub(crate) struct Replicator {
    shared: Arc<Shared>,
    send_sock: UdpSocket,
    peers: Vec<SocketAddr>,
    group: Option<SocketAddrV4>,
    listen: Option<SocketAddr>,
    unicast: Mutex<Option<Plane>>,
    multicast: Mutex<Option<Plane>>,
}

impl Replicator {
    pub(crate) fn new(
        shared: Arc<Shared>,
        config: &ReplicationConfig,
    ) -> std::io::Result<Self> {
        let send_sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;

        let group = match config.multicast {
            Some(ref mc) => {
                send_sock.set_multicast_ttl_v4(mc.ttl)?;
                // Our own group traffic must not come back and be re-applied.
                send_sock.set_multicast_loop_v4(false)?;
                Some(SocketAddrV4::new(mc.group, mc.port))
            }
            None => None,
        };

        Ok(Replicator {
            shared,
            send_sock,
            peers: config.peers.clone(),
            group,
            listen: config.listen,
            unicast: Mutex::new(None),
            multicast: Mutex::new(None),
        })
    }

    /// Bind sockets and spawn the receive loop for each configured plane.
    pub(crate) fn start(&self) -> std::io::Result<()> {
        if let Some(addr) = self.listen {
            let mut plane = self.unicast.lock();
            if plane.is_none() {
                let socket = UdpSocket::bind(addr)?;
                let spawned = Plane::spawn("unicast", socket, self.shared.clone())?;
                info!(addr = %spawned.local, "unicast replication listener started");
                *plane = Some(spawned);
            }
        }

        if let Some(group) = self.group {
            let mut plane = self.multicast.lock();
            if plane.is_none() {
                let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, group.port()))?;
                socket.join_multicast_v4(group.ip(), &Ipv4Addr::UNSPECIFIED)?;
                let spawned = Plane::spawn("multicast", socket, self.shared.clone())?;
                info!(group = %group, "multicast replication listener started");
                *plane = Some(spawned);
            }
        }

        Ok(())
    }

    /// Stop and join both planes.
    pub(crate) fn stop(&self) {
        if let Some(plane) = self.unicast.lock().take() {
            plane.shut_down();
        }
        if let Some(plane) = self.multicast.lock().take() {
            plane.shut_down();
        }
    }

    /// Discard thread bookkeeping without joining. For a duplicated
    /// process, whose inherited handles name threads that do not exist.
    pub(crate) fn forget_threads(&self) {
        self.unicast.lock().take();
        self.multicast.lock().take();
    }

    /// Broadcast a locally originated row to every peer and to the group.
    /// Fire-and-forget; transmit failures are logged and swallowed.
    pub(crate) fn send(&self, row: &Row) {
        if self.peers.is_empty() && self.group.is_none() {
            return;
        }

        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = match row.encode(&mut buf) {
            Ok(len) => len,
            Err(e) => {
                warn!(error = %e, "row not broadcast");
                return;
            }
        };
        auth::seal(&mut buf[..len], &self.shared.secret);
        let frame = &buf[..len];

        for peer in &self.peers {
            match self.send_sock.send_to(frame, peer) {
                Ok(_) => {
                    metrics::FRAMES_SENT.increment();
                }
                Err(e) => debug!(%peer, error = %e, "peer send failed"),
            }
        }
        if let Some(group) = self.group {
            match self.send_sock.send_to(frame, group) {
                Ok(_) => {
                    metrics::FRAMES_SENT.increment();
                }
                Err(e) => debug!(%group, error = %e, "group send failed"),
            }
        }
    }

    pub(crate) fn unicast_addr(&self) -> Option<SocketAddr> {
        self.unicast.lock().as_ref().map(|plane| plane.local)
    }

    pub(crate) fn unicast_state(&self) -> PlaneState {
        self.unicast
            .lock()
            .as_ref()
            .map_or(PlaneState::Stopped, Plane::state)
    }

    pub(crate) fn multicast_state(&self) -> PlaneState {
        self.multicast
            .lock()
            .as_ref()
            .map_or(PlaneState::Stopped, Plane::state)
    }
}

fn recv_loop(
    label: &'static str,
    socket: UdpSocket,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
) {
    state.store(PlaneState::Running as u8, Ordering::Release);

    // One extra byte so an oversize datagram reads as an over-length
    // buffer and fails decoding instead of silently truncating.
    let mut buf = [0u8; MAX_FRAME_LEN + 1];
    let mut failures = 0u32;

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        match socket.recv_from(&mut buf) {
            Ok((0, _)) => continue,
            Ok((len, src)) => {
                failures = 0;
                metrics::FRAMES_RECEIVED.increment();
                handle_frame(&buf[..len], src.ip(), &shared);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                failures += 1;
                warn!(plane = label, error = %e, "receive failed");
                if failures >= MAX_RECV_FAILURES {
                    error!(plane = label, "socket failed, stopping plane");
                    break;
                }
            }
        }
    }

    state.store(PlaneState::Stopped as u8, Ordering::Release);
    debug!(plane = label, "receive loop exited");
}

/// Authenticate, decode, and apply one datagram. Bad frames are dropped
/// silently; a forged or corrupted datagram on a best-effort channel must
/// not crash or stall the node.
fn handle_frame(frame: &[u8], src: IpAddr, shared: &Arc<Shared>) {
    if !auth::verify(frame, &shared.secret) {
        metrics::FRAMES_AUTH_DROPPED.increment();
        debug!(%src, "frame failed authentication");
        return;
    }

    let row = match Row::decode(frame) {
        Ok(row) => row,
        Err(e) => {
            metrics::FRAMES_DECODE_DROPPED.increment();
            debug!(%src, error = %e, "malformed frame");
            return;
        }
    };

    if row.command == Command::Other {
        metrics::FRAMES_DECODE_DROPPED.increment();
        debug!(%src, "reserved command, frame dropped");
        return;
    }

    shared.apply_remote(row, src, unix_now());
}
