//! Per-client connection handle shared between its tasks and the server context

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use crate::game::tank::PlayerId;

pub type ConnectionId = u64;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Why an outbound frame was not queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("outbound buffer full")]
    Full,

    #[error("connection closed")]
    Closed,
}

/// Shared view of one client connection
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub peer: String,
    player_id: OnceLock<PlayerId>,
    state: AtomicU8,
    outbound: mpsc::Sender<Bytes>,
    closed: watch::Sender<bool>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end its writer task drains.
    pub fn new(id: ConnectionId, peer: String, buffer: usize) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (outbound, outbound_rx) = mpsc::channel(buffer.max(1));
        let (closed, _) = watch::channel(false);
        let handle = Arc::new(Self {
            id,
            peer,
            player_id: OnceLock::new(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            outbound,
            closed,
        });
        (handle, outbound_rx)
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id.get().copied()
    }

    /// Bind the player id. Fails if one was already assigned.
    pub fn assign_player(&self, player_id: PlayerId) -> bool {
        self.player_id.set(player_id).is_ok()
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// CONNECTING -> ACTIVE. False if the connection already started closing.
    pub fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Claim the close. Exactly one caller ever gets `true`.
    pub fn begin_close(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= ConnectionState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Mark closed and wake the connection's tasks so they release the socket.
    pub fn finish_close(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
        self.closed.send_replace(true);
    }

    /// Resolves once the connection is closed
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Queue a frame without waiting. A full buffer means the client is not
    /// keeping up.
    pub fn try_send(&self, frame: Bytes) -> Result<(), SendError> {
        if self.state() >= ConnectionState::Closing {
            return Err(SendError::Closed);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

impl PartialOrd for ConnectionState {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some((*self as u8).cmp(&(*other as u8)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_moves_forward_only() {
        let (handle, _rx) = ConnectionHandle::new(1, "test".into(), 4);
        assert_eq!(handle.state(), ConnectionState::Connecting);

        assert!(handle.activate());
        assert!(!handle.activate());
        assert!(handle.is_active());

        assert!(handle.begin_close());
        assert_eq!(handle.state(), ConnectionState::Closing);
        assert!(!handle.activate());

        handle.finish_close();
        assert_eq!(handle.state(), ConnectionState::Closed);
        assert!(!handle.begin_close());
    }

    #[test]
    fn player_id_is_assigned_once() {
        let (handle, _rx) = ConnectionHandle::new(1, "test".into(), 4);
        assert_eq!(handle.player_id(), None);
        assert!(handle.assign_player(7));
        assert!(!handle.assign_player(8));
        assert_eq!(handle.player_id(), Some(7));
    }

    #[test]
    fn concurrent_close_has_one_winner() {
        let (handle, _rx) = ConnectionHandle::new(1, "test".into(), 4);
        handle.activate();

        let winners: usize = std::thread::scope(|s| {
            let workers: Vec<_> = (0..8).map(|_| s.spawn(|| handle.begin_close())).collect();
            workers
                .into_iter()
                .map(|w| w.join().unwrap_or(false) as usize)
                .sum()
        });

        assert_eq!(winners, 1);
    }

    #[test]
    fn full_buffer_is_reported() {
        let (handle, mut rx) = ConnectionHandle::new(1, "test".into(), 2);
        handle.activate();

        assert!(handle.try_send(Bytes::from_static(b"a\n")).is_ok());
        assert!(handle.try_send(Bytes::from_static(b"b\n")).is_ok());
        assert_eq!(handle.try_send(Bytes::from_static(b"c\n")), Err(SendError::Full));

        assert_eq!(rx.try_recv().ok(), Some(Bytes::from_static(b"a\n")));
        handle.begin_close();
        assert_eq!(handle.try_send(Bytes::from_static(b"d\n")), Err(SendError::Closed));
    }

    #[tokio::test]
    async fn closed_signal_fires_on_finish() {
        let (handle, _rx) = ConnectionHandle::new(1, "test".into(), 2);
        let mut closed = handle.closed_signal();

        handle.begin_close();
        handle.finish_close();

        assert!(closed.wait_for(|c| *c).await.is_ok());
    }
}
