use {super::*, crate::backoff::Backoff};

pub mod codec;
pub mod frame;
pub mod tx;

pub use {
    codec::{ByteReader, CodecError, write_varint},
    frame::{Frame, FrameError, MAGIC, MAX_PAYLOAD},
    tx::Whale,
};

pub const PROTOCOL_VERSION: i32 = 70016;

const NODE_NETWORK: u64 = 1;
const MSG_TX: u32 = 1;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakePhase {
    SentVersion,
    GotVersion,
    VerackSent,
    Ready,
}

/// Handshake bookkeeping for the one outbound peer. Peers may send their
/// `verack` before their `version`; the flag remembers it.
struct Peer {
    phase: HandshakePhase,
    verack_received: bool,
}

impl Peer {
    fn new() -> Self {
        Self {
            phase: HandshakePhase::SentVersion,
            verack_received: false,
        }
    }

    fn ready(&self) -> bool {
        self.phase == HandshakePhase::Ready
    }

    fn on_version(&mut self) {
        if self.phase == HandshakePhase::SentVersion {
            self.phase = HandshakePhase::GotVersion;
        }
    }

    fn on_verack_sent(&mut self) {
        if self.phase == HandshakePhase::GotVersion {
            self.phase = if self.verack_received {
                HandshakePhase::Ready
            } else {
                HandshakePhase::VerackSent
            };
        }
    }

    fn on_verack(&mut self) {
        self.verack_received = true;
        if self.phase == HandshakePhase::VerackSent {
            self.phase = HandshakePhase::Ready;
        }
    }
}

enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// Passive mainnet peer: performs the version handshake, answers pings,
/// chases `inv` announcements with per-transaction `getdata`, and surfaces
/// whale transactions. Runs until shutdown, reconnecting under backoff.
pub struct Listener {
    pub address: String,
    pub metrics: Arc<Metrics>,
    pub cancel: CancellationToken,
}

impl Listener {
    pub async fn run(self) -> Result {
        let mut backoff = Backoff::new();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            match timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.address)).await {
                Err(_) => warn!("p2p connect to {} timed out", self.address),
                Ok(Err(err)) => warn!("p2p connect to {} failed: {err}", self.address),
                Ok(Ok(stream)) => {
                    info!("connected to node {}", self.address);

                    match self.session(stream, &mut backoff).await {
                        Ok(SessionEnd::Shutdown) => return Ok(()),
                        Ok(SessionEnd::Disconnected) => {}
                        Err(err) => warn!("p2p session failed: {err}"),
                    }
                }
            }

            let delay = backoff.next_delay();
            debug!("p2p reconnecting in {:.1}s", delay.as_secs_f64());

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = sleep(delay) => {}
            }
        }
    }

    async fn session(
        &self,
        stream: TcpStream,
        backoff: &mut Backoff,
    ) -> Result<SessionEnd, FrameError> {
        let (mut reader, mut writer) = stream.into_split();
        let mut peer = Peer::new();

        let nonce = rand::rng().random();
        Frame::new("version", version_payload(nonce))
            .write(&mut writer)
            .await?;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(SessionEnd::Shutdown),

                frame = timeout(READ_TIMEOUT, Frame::read(&mut reader)) => {
                    let frame = match frame {
                        Err(_) => {
                            warn!("node idle for {READ_TIMEOUT:?}, reconnecting");
                            return Ok(SessionEnd::Disconnected);
                        }
                        Ok(Err(FrameError::Io { source })) => {
                            info!("node connection closed: {source}");
                            return Ok(SessionEnd::Disconnected);
                        }
                        // Framing violations (magic, checksum, oversize)
                        // poison the byte stream; drop the connection.
                        Ok(Err(err)) => return Err(err),
                        Ok(Ok(frame)) => frame,
                    };

                    self.handle_frame(frame, &mut peer, &mut writer, backoff).await?;
                }
            }
        }
    }

    async fn handle_frame<W: AsyncWrite + Unpin>(
        &self,
        frame: Frame,
        peer: &mut Peer,
        writer: &mut W,
        backoff: &mut Backoff,
    ) -> Result<(), FrameError> {
        match frame.command.as_str() {
            "version" => {
                match parse_version(&frame.payload) {
                    Ok(version) => debug!("peer version {version}"),
                    Err(err) => {
                        // A garbled version aborts only this message; the
                        // handshake will stall out on the idle timer.
                        warn!("unparseable version payload: {err}");
                        return Ok(());
                    }
                }

                peer.on_version();
                Frame::new("verack", Vec::new()).write(writer).await?;
                peer.on_verack_sent();

                if peer.ready() {
                    self.on_ready(backoff);
                }
            }
            "verack" => {
                peer.on_verack();

                if peer.ready() {
                    self.on_ready(backoff);
                }
            }
            "ping" => {
                let mut reader = ByteReader::new(&frame.payload);
                match reader.read_u64_le() {
                    Ok(nonce) => {
                        Frame::new("pong", nonce.to_le_bytes().to_vec())
                            .write(writer)
                            .await?;
                    }
                    Err(err) => warn!("unparseable ping payload: {err}"),
                }
            }
            "inv" => {
                if !peer.ready() {
                    debug!("inv before handshake completion, ignoring");
                    return Ok(());
                }

                // Parse fully before replying so a corrupt entry aborts
                // only this message, not the connection.
                let hashes = match parse_tx_inventory(&frame.payload) {
                    Ok(hashes) => hashes,
                    Err(err) => {
                        warn!("unparseable inv payload: {err}");
                        return Ok(());
                    }
                };

                for hash in hashes {
                    let mut payload = Vec::with_capacity(37);
                    write_varint(&mut payload, 1);
                    payload.extend_from_slice(&MSG_TX.to_le_bytes());
                    payload.extend_from_slice(&hash);

                    Frame::new("getdata", payload).write(writer).await?;
                }
            }
            "tx" => match tx::evaluate(&frame.payload) {
                Ok(Some(whale)) => {
                    self.metrics.record_whale_event();
                    info!("whale: {whale}");
                }
                Ok(None) => {}
                Err(err) => warn!("unparseable tx payload: {err}"),
            },
            other => debug!("ignoring `{other}`"),
        }

        Ok(())
    }

    fn on_ready(&self, backoff: &mut Backoff) {
        backoff.reset();
        info!("p2p handshake complete with {}", self.address);
    }
}

/// A `version` payload: protocol version, NODE_NETWORK services, current
/// timestamp, zeroed IPv4-mapped address fields, a random nonce, an empty
/// user agent, zero start height, relay on.
fn version_payload(nonce: u64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(86);

    payload.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    payload.extend_from_slice(&NODE_NETWORK.to_le_bytes());

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    payload.extend_from_slice(&timestamp.to_le_bytes());

    network_address(&mut payload);
    network_address(&mut payload);

    payload.extend_from_slice(&nonce.to_le_bytes());
    write_varint(&mut payload, 0);
    payload.extend_from_slice(&0i32.to_le_bytes());
    payload.push(1);

    payload
}

// services ∥ IPv4-mapped IPv6 ∥ port, the port big-endian per convention.
fn network_address(payload: &mut Vec<u8>) {
    payload.extend_from_slice(&NODE_NETWORK.to_le_bytes());
    payload.extend_from_slice(&[0u8; 10]);
    payload.extend_from_slice(&[0xff, 0xff]);
    payload.extend_from_slice(&[0u8; 4]);
    payload.extend_from_slice(&0u16.to_be_bytes());
}

fn parse_version(payload: &[u8]) -> Result<i32, CodecError> {
    let mut reader = ByteReader::new(payload);
    let version = reader.read_u32_le()? as i32;
    reader.read_u64_le()?; // services
    reader.read_i64_le()?; // timestamp
    Ok(version)
}

fn parse_tx_inventory(payload: &[u8]) -> Result<Vec<[u8; 32]>, CodecError> {
    let mut reader = ByteReader::new(payload);
    let count = reader.read_varint()?;

    let mut hashes = Vec::new();

    for _ in 0..count {
        let kind = reader.read_u32_le()?;
        let hash = reader.read_bytes(32)?;

        if kind == MSG_TX {
            hashes.push(hash.try_into().expect("read_bytes returned 32 bytes"));
        }
    }

    Ok(hashes)
}
