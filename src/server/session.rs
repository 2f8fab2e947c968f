// ABOUTME: Per-connection session records and the writer task that owns each socket's write half
// ABOUTME: Any task holding a ConnectionHandle can queue frames; writes are serialised per connection

use crate::codec::{Encodable, Pdu, Response};
use crate::datatypes::ProtocolVersion;
use bytes::Bytes;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tracing::{debug, error, warn};

const OUTBOUND_QUEUE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// TCP accepted, no successful Connect yet
    Open,
    Authenticated,
    /// Terminate sent by the gateway, waiting for TerminateResp
    Closing,
}

enum Outbound {
    Frame {
        bytes: Bytes,
        written: Option<oneshot::Sender<bool>>,
    },
    Close,
}

/// Worker jobs that may still write to one connection
#[derive(Debug, Default)]
struct PendingJobs {
    count: AtomicUsize,
    idle: Notify,
}

/// Marks one worker job as pending on its connection until dropped
#[derive(Debug)]
pub struct JobGuard {
    jobs: Arc<PendingJobs>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if self.jobs.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.jobs.idle.notify_waiters();
        }
    }
}

/// Cloneable sender side of one connection
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    peer: SocketAddr,
    tx: mpsc::Sender<Outbound>,
    closed: Arc<watch::Sender<bool>>,
    jobs: Arc<PendingJobs>,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outbound::Frame { bytes, .. } => write!(f, "Frame({} bytes)", bytes.len()),
            Outbound::Close => f.write_str("Close"),
        }
    }
}

impl ConnectionHandle {
    /// Spawn the writer task for `write_half`.
    ///
    /// The returned receiver flips to `true` once the connection is closing,
    /// whether the close was requested or the writer failed.
    pub fn spawn(peer: SocketAddr, write_half: OwnedWriteHalf) -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (closed, closed_rx) = watch::channel(false);
        let closed = Arc::new(closed);

        tokio::spawn(write_loop(peer, write_half, rx, closed.clone()));

        let handle = ConnectionHandle {
            peer,
            tx,
            closed,
            jobs: Arc::default(),
        };
        (handle, closed_rx)
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Register a job that will reply on this connection
    pub fn begin_job(&self) -> JobGuard {
        self.jobs.count.fetch_add(1, Ordering::AcqRel);
        JobGuard {
            jobs: self.jobs.clone(),
        }
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.count.load(Ordering::Acquire)
    }

    /// Wait until every job registered with [`ConnectionHandle::begin_job`] has finished
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.jobs.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.pending_jobs() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Queue an encoded frame; false once the connection is gone
    pub async fn send(&self, bytes: Bytes) -> bool {
        self.tx
            .send(Outbound::Frame {
                bytes,
                written: None,
            })
            .await
            .is_ok()
    }

    /// Queue an encoded frame and wait until it has been flushed to the socket
    pub async fn send_confirmed(&self, bytes: Bytes) -> bool {
        let (written_tx, written_rx) = oneshot::channel();
        let queued = self
            .tx
            .send(Outbound::Frame {
                bytes,
                written: Some(written_tx),
            })
            .await
            .is_ok();

        queued && written_rx.await.unwrap_or(false)
    }

    /// Encode a gateway-originated request in `version` layout and queue it
    pub async fn send_pdu<T: Encodable + Pdu>(&self, pdu: &T, version: ProtocolVersion) -> bool {
        debug!(
            peer = %self.peer,
            command_id = ?pdu.command_id(),
            sequence_id = pdu.sequence_id(),
            ">>>"
        );
        match pdu.to_bytes(version) {
            Ok(bytes) => self.send(bytes).await,
            Err(e) => {
                warn!(peer = %self.peer, "dropping unencodable frame: {}", e);
                false
            }
        }
    }

    /// Queue the response to a peer request
    pub async fn respond(&self, response: impl Into<Response>, version: ProtocolVersion) -> bool {
        match self.encode_response(response.into(), version) {
            Some(bytes) => self.send(bytes).await,
            None => false,
        }
    }

    /// Queue a response and wait until it has reached the socket
    pub async fn respond_confirmed(
        &self,
        response: impl Into<Response>,
        version: ProtocolVersion,
    ) -> bool {
        match self.encode_response(response.into(), version) {
            Some(bytes) => self.send_confirmed(bytes).await,
            None => false,
        }
    }

    fn encode_response(&self, response: Response, version: ProtocolVersion) -> Option<Bytes> {
        debug!(
            peer = %self.peer,
            command_id = ?response.command_id(),
            sequence_id = response.sequence_id(),
            ">>>"
        );
        match response.to_bytes(version) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(peer = %self.peer, "dropping unencodable response: {}", e);
                None
            }
        }
    }

    /// Close after every frame queued so far has been written
    pub async fn close(&self) {
        self.closed.send_replace(true);
        let _ = self.tx.send(Outbound::Close).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

async fn write_loop(
    peer: SocketAddr,
    write_half: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Outbound>,
    closed: Arc<watch::Sender<bool>>,
) {
    let mut stream = BufWriter::new(write_half);

    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Frame { bytes, written } => {
                let result = match stream.write_all(&bytes).await {
                    Ok(()) => stream.flush().await,
                    Err(e) => Err(e),
                };
                if let Some(written) = written {
                    let _ = written.send(result.is_ok());
                }
                if let Err(e) = result {
                    error!(%peer, "write failed: {}", e);
                    break;
                }
            }
            Outbound::Close => break,
        }
    }

    if let Err(e) = stream.shutdown().await {
        debug!(%peer, "socket shutdown: {}", e);
    }
    closed.send_replace(true);
}

#[derive(Debug)]
pub struct Session {
    pub handle: ConnectionHandle,
    pub state: SessionState,
    pub source_addr: String,
    pub version: ProtocolVersion,
    /// Heartbeat ticks since the last inbound frame
    pub missed_heartbeats: u32,
    pub connected_at: Instant,
}

impl Session {
    pub fn new(handle: ConnectionHandle, version: ProtocolVersion) -> Self {
        Self {
            handle,
            state: SessionState::Open,
            source_addr: String::new(),
            version,
            missed_heartbeats: 0,
            connected_at: Instant::now(),
        }
    }
}

/// Live sessions keyed by peer address
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: DashMap<SocketAddr, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) {
        self.sessions.insert(session.handle.peer(), session);
    }

    pub fn remove(&self, peer: &SocketAddr) -> Option<Session> {
        self.sessions.remove(peer).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn peers(&self) -> Vec<SocketAddr> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn state(&self, peer: &SocketAddr) -> Option<SessionState> {
        self.sessions.get(peer).map(|session| session.state)
    }

    pub fn handle(&self, peer: &SocketAddr) -> Option<(ConnectionHandle, ProtocolVersion)> {
        self.sessions
            .get(peer)
            .map(|session| (session.handle.clone(), session.version))
    }

    pub fn set_state(&self, peer: &SocketAddr, state: SessionState) {
        if let Some(mut session) = self.sessions.get_mut(peer) {
            session.state = state;
        }
    }

    pub fn authenticate(&self, peer: &SocketAddr, source_addr: &str, version: ProtocolVersion) {
        if let Some(mut session) = self.sessions.get_mut(peer) {
            session.state = SessionState::Authenticated;
            session.source_addr = source_addr.to_string();
            session.version = version;
        }
    }

    /// Record inbound traffic, resetting the heartbeat counter
    pub fn touch(&self, peer: &SocketAddr) {
        if let Some(mut session) = self.sessions.get_mut(peer) {
            session.missed_heartbeats = 0;
        }
    }

    /// Count one heartbeat tick against every authenticated session.
    ///
    /// Returns the sessions to probe and the sessions that reached
    /// `max_missed` (0 disables the limit).
    pub fn heartbeat_tick(
        &self,
        max_missed: u32,
    ) -> (
        Vec<(ConnectionHandle, ProtocolVersion)>,
        Vec<(ConnectionHandle, u32)>,
    ) {
        let mut probe = Vec::new();
        let mut expired = Vec::new();

        for mut session in self.sessions.iter_mut() {
            if session.state != SessionState::Authenticated {
                continue;
            }
            session.missed_heartbeats += 1;
            if max_missed > 0 && session.missed_heartbeats >= max_missed {
                expired.push((session.handle.clone(), session.missed_heartbeats));
            } else {
                probe.push((session.handle.clone(), session.version));
            }
        }

        (probe, expired)
    }
}
