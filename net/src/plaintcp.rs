use std::{
    collections::VecDeque, fmt::Debug, hash::Hash, io, marker::PhantomData, net::SocketAddr,
    time::Duration,
};

use bytes::Bytes;
use fnv::FnvHashMap;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    net::{tcp::OwnedWriteHalf, TcpListener, TcpStream},
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    task::JoinHandle,
    time::sleep,
};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::Handler;

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(50);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Write half of an accepted connection, used by handlers to acknowledge
/// frames back to the sender.
pub struct Writer<Ack> {
    frames: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    _ack: PhantomData<Ack>,
}

impl<Ack: Serialize> Writer<Ack> {
    pub async fn send(&mut self, ack: Ack) -> io::Result<()> {
        let bytes = bincode::serialize(&ack)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.frames.send(Bytes::from(bytes)).await
    }
}

/// Listens on an address and feeds every decoded frame of every connection to
/// the given handler. Malformed frames are dropped and logged, never fatal.
pub struct TcpReceiver<Ack, Msg, H> {
    _marker: PhantomData<(Ack, Msg, H)>,
}

impl<Ack, Msg, H> TcpReceiver<Ack, Msg, H>
where
    Ack: Serialize + Send + 'static,
    Msg: DeserializeOwned + Debug + Send + 'static,
    H: Handler<Ack, Msg>,
{
    pub fn spawn(address: SocketAddr, handler: H) -> JoinHandle<()> {
        tokio::spawn(async move {
            let listener = match TcpListener::bind(address).await {
                Ok(listener) => listener,
                Err(e) => {
                    log::error!("Unable to listen on {}: {}", address, e);
                    return;
                }
            };
            log::debug!("Listening on {}", address);
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        log::debug!("Accepted connection from {}", peer);
                        tokio::spawn(Self::serve(stream, peer, handler.clone()));
                    }
                    Err(e) => log::warn!("Failed to accept a connection: {}", e),
                }
            }
        })
    }

    async fn serve(stream: TcpStream, peer: SocketAddr, handler: H) {
        let (read, write) = stream.into_split();
        let mut reader = FramedRead::new(read, LengthDelimitedCodec::new());
        let mut writer = Writer {
            frames: FramedWrite::new(write, LengthDelimitedCodec::new()),
            _ack: PhantomData,
        };
        while let Some(frame) = reader.next().await {
            match frame {
                Ok(bytes) => match bincode::deserialize::<Msg>(&bytes) {
                    Ok(msg) => handler.dispatch(msg, &mut writer).await,
                    Err(e) => log::warn!("Dropping malformed frame from {}: {}", peer, e),
                },
                Err(e) => {
                    log::debug!("Connection from {} closed: {}", peer, e);
                    return;
                }
            }
        }
    }
}

/// Resolves with the acknowledgement of one sent message. Dropping it cancels
/// interest in the receipt but not the transmission itself.
pub struct CancelHandler<Ack> {
    receiver: oneshot::Receiver<Ack>,
}

impl<Ack> CancelHandler<Ack> {
    pub async fn recv(self) -> Option<Ack> {
        self.receiver.await.ok()
    }
}

/// Point-to-point sender that keeps one retrying connection per peer and
/// retransmits every unacknowledged message after a reconnect. This is the
/// primitive best-effort broadcast fans out over: a sender crash mid-loop can
/// leave some peers without the message.
pub struct TcpReliableSender<Id, Msg, Ack> {
    peers: FnvHashMap<Id, UnboundedSender<(Bytes, oneshot::Sender<Ack>)>>,
    _msg: PhantomData<Msg>,
}

impl<Id, Msg, Ack> TcpReliableSender<Id, Msg, Ack>
where
    Id: Eq + Hash + Debug + Clone,
    Msg: Serialize + Debug,
    Ack: DeserializeOwned + Debug + Send + 'static,
{
    pub fn with_peers(addresses: FnvHashMap<Id, SocketAddr>) -> Self {
        let mut peers = FnvHashMap::default();
        for (id, address) in addresses {
            let (tx, rx) = unbounded_channel();
            tokio::spawn(Connection::run(address, rx));
            peers.insert(id, tx);
        }
        Self {
            peers,
            _msg: PhantomData,
        }
    }

    /// Queues a message for a peer. The connection task owns delivery; the
    /// returned handler resolves once the peer acknowledges the frame.
    pub async fn send(&mut self, to: Id, msg: Msg) -> CancelHandler<Ack> {
        let (tx, rx) = oneshot::channel();
        match self.peers.get(&to) {
            Some(channel) => match bincode::serialize(&msg) {
                Ok(bytes) => {
                    if channel.send((Bytes::from(bytes), tx)).is_err() {
                        log::warn!("Connection task for peer {:?} has terminated", to);
                    }
                }
                Err(e) => log::error!("Failed to serialize message for {:?}: {}", to, e),
            },
            None => log::warn!("Peer {:?} is not in the address map, dropping message", to),
        }
        CancelHandler { receiver: rx }
    }
}

/// Per-peer connection task: connects lazily, retries with exponential
/// backoff, and replays the unacknowledged queue after every reconnect.
struct Connection;

impl Connection {
    async fn run<Ack>(
        address: SocketAddr,
        mut rx: UnboundedReceiver<(Bytes, oneshot::Sender<Ack>)>,
    ) where
        Ack: DeserializeOwned + Debug + Send + 'static,
    {
        let mut pending: VecDeque<(Bytes, oneshot::Sender<Ack>)> = VecDeque::new();
        'connect: loop {
            // Nothing to deliver: wait for the first message before dialing
            if pending.is_empty() {
                match rx.recv().await {
                    Some(entry) => pending.push_back(entry),
                    None => return,
                }
            }
            let mut delay = INITIAL_RETRY_DELAY;
            let stream = loop {
                match TcpStream::connect(address).await {
                    Ok(stream) => break stream,
                    Err(e) => {
                        log::debug!("Failed to connect to {}: {}", address, e);
                        sleep(delay).await;
                        delay = std::cmp::min(delay * 2, MAX_RETRY_DELAY);
                    }
                }
            };
            log::debug!("Connected to {}", address);
            let (read, write) = stream.into_split();
            let mut reader = FramedRead::new(read, LengthDelimitedCodec::new());
            let mut writer = FramedWrite::new(write, LengthDelimitedCodec::new());
            for (bytes, _) in pending.iter() {
                if writer.send(bytes.clone()).await.is_err() {
                    continue 'connect;
                }
            }
            loop {
                tokio::select! {
                    queued = rx.recv() => match queued {
                        Some((bytes, ack)) => {
                            pending.push_back((bytes.clone(), ack));
                            if writer.send(bytes).await.is_err() {
                                continue 'connect;
                            }
                        }
                        None => return,
                    },
                    frame = reader.next() => match frame {
                        Some(Ok(bytes)) => {
                            if let Some((_, ack)) = pending.pop_front() {
                                match bincode::deserialize::<Ack>(&bytes) {
                                    // The receipt may race the caller dropping
                                    // its CancelHandler
                                    Ok(receipt) => {
                                        let _ = ack.send(receipt);
                                    }
                                    Err(e) => log::warn!(
                                        "Malformed acknowledgement from {}: {}",
                                        address,
                                        e
                                    ),
                                }
                            }
                        }
                        _ => continue 'connect,
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Acknowledgement, Handler};
    use async_trait::async_trait;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
    struct Probe(u64);

    #[derive(Debug, Clone)]
    struct CaptureHandler {
        tx: UnboundedSender<Probe>,
    }

    #[async_trait]
    impl Handler<Acknowledgement, Probe> for CaptureHandler {
        async fn dispatch(&self, msg: Probe, writer: &mut Writer<Acknowledgement>) {
            let _ = self.tx.send(msg);
            let _ = writer.send(Acknowledgement::Pong).await;
        }
    }

    fn free_address() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn messages_are_delivered_in_order_and_acknowledged() {
        let address = free_address();
        let (tx, mut captured) = unbounded_channel();
        TcpReceiver::<Acknowledgement, Probe, _>::spawn(address, CaptureHandler { tx });

        let mut addresses = FnvHashMap::default();
        addresses.insert(1usize, address);
        let mut sender = TcpReliableSender::<usize, Probe, Acknowledgement>::with_peers(addresses);

        let mut handlers = Vec::new();
        for seq in 0..3u64 {
            handlers.push(sender.send(1, Probe(seq)).await);
        }
        for seq in 0..3u64 {
            let got = tokio::time::timeout(Duration::from_secs(5), captured.recv())
                .await
                .expect("timed out waiting for delivery")
                .expect("capture channel closed");
            assert_eq!(got, Probe(seq));
        }
        for handler in handlers {
            assert_eq!(handler.recv().await, Some(Acknowledgement::Pong));
        }
    }

    #[tokio::test]
    async fn sends_to_unknown_peers_are_dropped() {
        let mut sender =
            TcpReliableSender::<usize, Probe, Acknowledgement>::with_peers(FnvHashMap::default());
        let handler = sender.send(7, Probe(0)).await;
        assert_eq!(handler.recv().await, None);
    }
}
