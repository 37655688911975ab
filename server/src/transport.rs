//! Transport adapter between socket I/O and the synchronous server tick
//!
//! The server never touches sockets directly. Each tick it asks a
//! [`Transport`] to process pending I/O, accepts new links and drains the
//! already-complete event queue of every link. Two implementations exist:
//! - [`TcpTransport`] runs socket reads and writes on tokio tasks and hands
//!   their results over through an unbounded channel
//! - [`LoopbackTransport`] is an in-memory pump driven by tests

use log::{debug, error, info, warn};
use shared::codec::{self, DecodeError};
use shared::Response;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Opaque identity of one client link, assigned by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Events a link yields, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connect,
    /// A complete frame, length prefix included
    Data(Vec<u8>),
    Disconnect,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Non-blocking connection primitives consumed by the server tick.
///
/// A link stays open until its `Disconnect` event has been popped or it is
/// closed locally, so a disconnect is never lost to a sweep.
pub trait Transport {
    /// Moves completed I/O into per-link event queues
    fn update(&mut self);

    /// Returns the next link that connected since the last call
    fn accept(&mut self) -> Option<ConnectionId>;

    fn is_open(&self, id: ConnectionId) -> bool;

    fn pop_event(&mut self, id: ConnectionId) -> Option<TransportEvent>;

    fn send(&mut self, id: ConnectionId, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Drops the link; queued events are discarded
    fn close(&mut self, id: ConnectionId);

    /// Releases the listener and every link
    fn shutdown(&mut self);
}

/// Messages from socket tasks to the tick thread
#[derive(Debug)]
enum Incoming {
    Accepted {
        id: ConnectionId,
        peer: SocketAddr,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        closer: oneshot::Sender<()>,
    },
    Event {
        id: ConnectionId,
        event: TransportEvent,
    },
}

#[derive(Debug)]
struct TcpLink {
    peer: SocketAddr,
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    /// Dropping this stops the read task
    closer: Option<oneshot::Sender<()>>,
    events: VecDeque<TransportEvent>,
    open: bool,
}

impl TcpLink {
    fn release(&mut self) {
        self.open = false;
        self.outbound = None;
        self.closer = None;
    }
}

/// Reliable, ordered transport over TCP
pub struct TcpTransport {
    local_addr: SocketAddr,
    incoming: mpsc::UnboundedReceiver<Incoming>,
    links: HashMap<ConnectionId, TcpLink>,
    pending_accepts: VecDeque<ConnectionId>,
    accept_task: Option<JoinHandle<()>>,
}

impl TcpTransport {
    /// Binds the listener and starts accepting in the background.
    ///
    /// A bind failure is fatal for the caller: no connection is ever accepted.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (incoming_tx, incoming) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(accept_loop(listener, incoming_tx));

        Ok(Self {
            local_addr,
            incoming,
            links: HashMap::new(),
            pending_accepts: VecDeque::new(),
            accept_task: Some(accept_task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self, id: ConnectionId) -> Option<SocketAddr> {
        self.links.get(&id).map(|link| link.peer)
    }
}

impl Transport for TcpTransport {
    fn update(&mut self) {
        // Forget links whose disconnect was popped on a previous tick
        self.links.retain(|_, link| link.open);

        while let Ok(message) = self.incoming.try_recv() {
            match message {
                Incoming::Accepted {
                    id,
                    peer,
                    outbound,
                    closer,
                } => {
                    debug!("Link {} established from {}", id, peer);
                    let mut events = VecDeque::new();
                    events.push_back(TransportEvent::Connect);
                    self.links.insert(
                        id,
                        TcpLink {
                            peer,
                            outbound: Some(outbound),
                            closer: Some(closer),
                            events,
                            open: true,
                        },
                    );
                    self.pending_accepts.push_back(id);
                }
                Incoming::Event { id, event } => match self.links.get_mut(&id) {
                    Some(link) if link.open => link.events.push_back(event),
                    _ => debug!("Dropping event for released link {}", id),
                },
            }
        }
    }

    fn accept(&mut self) -> Option<ConnectionId> {
        self.pending_accepts.pop_front()
    }

    fn is_open(&self, id: ConnectionId) -> bool {
        self.links.get(&id).is_some_and(|link| link.open)
    }

    fn pop_event(&mut self, id: ConnectionId) -> Option<TransportEvent> {
        let link = self.links.get_mut(&id)?;
        if !link.open {
            return None;
        }

        let event = link.events.pop_front()?;
        if event == TransportEvent::Disconnect {
            link.release();
            link.events.clear();
        }
        Some(event)
    }

    fn send(&mut self, id: ConnectionId, frame: Vec<u8>) -> Result<(), TransportError> {
        let outbound = self
            .links
            .get(&id)
            .filter(|link| link.open)
            .and_then(|link| link.outbound.as_ref())
            .ok_or(TransportError::Closed(id))?;

        outbound.send(frame).map_err(|_| TransportError::Closed(id))
    }

    fn close(&mut self, id: ConnectionId) {
        if let Some(mut link) = self.links.remove(&id) {
            debug!("Closing link {} to {}", id, link.peer);
            link.release();
        }
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
            info!("Listener on {} closed", self.local_addr);
        }
        for (_, mut link) in self.links.drain() {
            link.release();
        }
        self.pending_accepts.clear();
        self.incoming.close();
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(listener: TcpListener, incoming: mpsc::UnboundedSender<Incoming>) {
    let mut next_id: u32 = 1;

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let id = ConnectionId(next_id);
                next_id = next_id.wrapping_add(1);

                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                }

                let (read_half, write_half) = stream.into_split();
                let (outbound, outbound_rx) = mpsc::unbounded_channel();
                let (closer, closed) = oneshot::channel();

                // The accept must be queued ahead of any data from this link
                if incoming
                    .send(Incoming::Accepted {
                        id,
                        peer,
                        outbound,
                        closer,
                    })
                    .is_err()
                {
                    break;
                }

                tokio::spawn(read_loop(id, read_half, incoming.clone(), closed));
                tokio::spawn(write_loop(id, write_half, outbound_rx));
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

async fn read_loop(
    id: ConnectionId,
    mut reader: OwnedReadHalf,
    incoming: mpsc::UnboundedSender<Incoming>,
    mut closed: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            // Released locally; nobody is waiting for a disconnect event
            _ = &mut closed => return,
            result = codec::read_frame(&mut reader) => match result {
                Ok(Some(frame)) => {
                    let event = TransportEvent::Data(frame);
                    if incoming.send(Incoming::Event { id, event }).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_recoverable() => warn!("Dropped frame on link {}: {}", id, e),
                Err(e) => {
                    warn!("Read error on link {}: {}", id, e);
                    break;
                }
            },
        }
    }

    let _ = incoming.send(Incoming::Event {
        id,
        event: TransportEvent::Disconnect,
    });
}

async fn write_loop(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = codec::write_frame(&mut writer, &frame).await {
            warn!("Write error on link {}: {}", id, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[derive(Debug, Default)]
struct LoopbackLink {
    open: bool,
    events: VecDeque<TransportEvent>,
    sent: Vec<Vec<u8>>,
}

/// In-memory transport for driving the server tick by hand.
///
/// Links are never forgotten, so frames sent to a link can be inspected
/// after it closed.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    next_id: u32,
    links: HashMap<ConnectionId, LoopbackLink>,
    pending_accepts: VecDeque<ConnectionId>,
    updates: u64,
    shut_down: bool,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new link and queues it for acceptance
    pub fn connect(&mut self) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);

        let mut link = LoopbackLink {
            open: true,
            ..Default::default()
        };
        link.events.push_back(TransportEvent::Connect);
        self.links.insert(id, link);
        self.pending_accepts.push_back(id);
        id
    }

    /// Queues a raw frame as if it arrived from the peer
    pub fn inject(&mut self, id: ConnectionId, frame: Vec<u8>) {
        if let Some(link) = self.links.get_mut(&id).filter(|link| link.open) {
            link.events.push_back(TransportEvent::Data(frame));
        }
    }

    /// Queues an orderly disconnect from the peer
    pub fn disconnect(&mut self, id: ConnectionId) {
        if let Some(link) = self.links.get_mut(&id).filter(|link| link.open) {
            link.events.push_back(TransportEvent::Disconnect);
        }
    }

    /// Invalidates a link without queueing a disconnect event
    pub fn sever(&mut self, id: ConnectionId) {
        if let Some(link) = self.links.get_mut(&id) {
            link.open = false;
            link.events.clear();
        }
    }

    pub fn sent(&self, id: ConnectionId) -> &[Vec<u8>] {
        self.links
            .get(&id)
            .map(|link| link.sent.as_slice())
            .unwrap_or(&[])
    }

    /// Drains and decodes everything sent to `id` so far
    pub fn take_responses(&mut self, id: ConnectionId) -> Result<Vec<Response>, DecodeError> {
        let frames = self
            .links
            .get_mut(&id)
            .map(|link| std::mem::take(&mut link.sent))
            .unwrap_or_default();

        frames
            .iter()
            .map(|frame| codec::decode_response(frame))
            .collect()
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl Transport for LoopbackTransport {
    fn update(&mut self) {
        self.updates += 1;
    }

    fn accept(&mut self) -> Option<ConnectionId> {
        self.pending_accepts.pop_front()
    }

    fn is_open(&self, id: ConnectionId) -> bool {
        self.links.get(&id).is_some_and(|link| link.open)
    }

    fn pop_event(&mut self, id: ConnectionId) -> Option<TransportEvent> {
        let link = self.links.get_mut(&id).filter(|link| link.open)?;
        let event = link.events.pop_front()?;
        if event == TransportEvent::Disconnect {
            link.open = false;
            link.events.clear();
        }
        Some(event)
    }

    fn send(&mut self, id: ConnectionId, frame: Vec<u8>) -> Result<(), TransportError> {
        match self.links.get_mut(&id) {
            Some(link) if link.open => {
                link.sent.push(frame);
                Ok(())
            }
            _ => Err(TransportError::Closed(id)),
        }
    }

    fn close(&mut self, id: ConnectionId) {
        self.sever(id);
    }

    fn shutdown(&mut self) {
        for link in self.links.values_mut() {
            link.open = false;
            link.events.clear();
        }
        self.pending_accepts.clear();
        self.shut_down = true;
    }
}
