use crate::comm::config::CommConfig;
use crate::comm::error::{CommError, CommInitError};
use crate::comm::protocol::{
    HEADER_LEN, decode_header, decode_request_payload, encode_request_ack, encode_response,
};
use crate::comm::types::{MsgType, ResponsePayload, ToolRequest, ToolResponse};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::result::Result as StdResult;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Sequence deduplication entry
#[derive(Debug)]
struct DedupEntry {
    instant: Instant,
    /// Encoded RESPONSE, present once the tool call finished
    cached_response: Option<Vec<u8>>,
}

type DedupTable = Arc<Mutex<HashMap<SocketAddr, HashMap<u32, DedupEntry>>>>;

/// Comm server - receives tool invocations over UDP and returns their output
pub struct Comm {
    socket: Arc<UdpSocket>,
    config: CommConfig,
    /// Forwards ToolRequests to the dispatch loop
    loop_sender: mpsc::Sender<ToolRequest>,
    dedup: DedupTable,
}

impl Comm {
    /// Bind the UDP socket.
    ///
    /// Returns the server and the receiver the dispatch loop reads
    /// [`ToolRequest`]s from.
    pub async fn new(
        config: CommConfig,
    ) -> StdResult<(Comm, mpsc::Receiver<ToolRequest>), CommInitError> {
        let socket = UdpSocket::bind(config.bind_addr())
            .await
            .map_err(|e| CommInitError::BindFailed(e.to_string()))?;

        if let Ok(addr) = socket.local_addr() {
            info!("Comm listening on {}", addr);
        }

        let (tx, rx) = mpsc::channel(1024);

        Ok((
            Self {
                socket: Arc::new(socket),
                config,
                loop_sender: tx,
                dedup: Arc::new(Mutex::new(HashMap::new())),
            },
            rx,
        ))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Run the receive loop until the socket fails
    pub async fn run(self) -> StdResult<(), CommError> {
        let mut buf = vec![0u8; self.config.max_payload_bytes + HEADER_LEN + 1];
        let mut cleanup_interval = tokio::time::interval(Duration::from_secs(30));

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, addr)) => {
                            if let Err(e) = self.handle_packet(&buf[..len], addr).await {
                                warn!("Failed to handle packet from {}: {}", addr, e);
                            }
                        }
                        Err(e) => {
                            error!("Recv error: {}", e);
                            return Err(CommError::RecvError(e.to_string()));
                        }
                    }
                }
                _ = cleanup_interval.tick() => {
                    self.cleanup_dedup().await;
                }
            }
        }
    }

    async fn handle_packet(&self, packet: &[u8], client_addr: SocketAddr) -> StdResult<(), CommError> {
        if packet.len() < HEADER_LEN {
            warn!("Truncated packet from {}: only {} bytes", client_addr, packet.len());
            return Err(CommError::DecodeError("Packet too short".to_string()));
        }

        let payload_len = packet.len() - HEADER_LEN;
        if payload_len > self.config.max_payload_bytes {
            warn!("Payload too large from {}: {} bytes", client_addr, payload_len);
            return Err(CommError::PayloadTooLarge(payload_len));
        }

        let (msg_type, seq) = decode_header(packet)?;
        debug!("Received {:?} from {} seq={}", msg_type, client_addr, seq);

        match msg_type {
            MsgType::Request => {
                self.handle_request(&packet[HEADER_LEN..], seq, client_addr)
                    .await
            }
            other => {
                warn!("Unexpected message type {:?} from {}", other, client_addr);
                Ok(())
            }
        }
    }

    /// Handle an incoming REQUEST.
    ///
    /// The reply is awaited on a separate task so that slow tool calls do
    /// not stall the receive loop.
    async fn handle_request(
        &self,
        payload_bytes: &[u8],
        seq: u32,
        client_addr: SocketAddr,
    ) -> StdResult<(), CommError> {
        let mut dedup = self.dedup.lock().await;
        let client_entries = dedup.entry(client_addr).or_default();

        if client_entries.len() >= self.config.dedup_capacity
            && !client_entries.contains_key(&seq)
        {
            let oldest = client_entries
                .iter()
                .min_by_key(|(_, e)| e.instant)
                .map(|(seq, _)| *seq);
            if let Some(evicted) = oldest {
                client_entries.remove(&evicted);
                debug!("Dedup table at capacity, evicted seq={}", evicted);
            }
        }

        match client_entries.entry(seq) {
            Entry::Occupied(entry) => {
                // Retransmission: resend the cached response, or ACK again while still running
                let reply = match &entry.get().cached_response {
                    Some(cached) => {
                        info!(
                            "Duplicate request seq={} from {}, resending cached response",
                            seq, client_addr
                        );
                        cached.clone()
                    }
                    None => {
                        debug!("Duplicate request seq={} from {} still running", seq, client_addr);
                        encode_request_ack(seq)?
                    }
                };
                drop(dedup);
                self.send(&reply, client_addr).await
            }
            Entry::Vacant(entry) => {
                let request = match decode_request_payload(payload_bytes) {
                    Ok(request) => request,
                    Err(e) => {
                        // Not recorded, a corrected retransmission with the same seq is accepted
                        drop(dedup);
                        let reply = encode_response(
                            seq,
                            &ResponsePayload {
                                content: e.to_string(),
                                is_error: true,
                            },
                        )?;
                        self.send(&reply, client_addr).await?;
                        return Err(e);
                    }
                };
                entry.insert(DedupEntry {
                    instant: Instant::now(),
                    cached_response: None,
                });
                drop(dedup);

                info!(
                    "New request seq={} from {} tool={} arguments_len={}",
                    seq,
                    client_addr,
                    request.tool,
                    request.arguments.len()
                );

                self.send(&encode_request_ack(seq)?, client_addr).await?;

                let (reply_tx, reply_rx) = oneshot::channel::<ToolResponse>();
                let tool_request = ToolRequest {
                    tool: request.tool,
                    arguments: request.arguments,
                    reply: reply_tx,
                    source_addr: client_addr,
                };

                if let Err(e) = self.loop_sender.send(tool_request).await {
                    error!("Failed to forward request to dispatch loop: {}", e);
                    let reply = encode_response(
                        seq,
                        &ResponsePayload {
                            content: "Internal server error".to_string(),
                            is_error: true,
                        },
                    )?;
                    self.send(&reply, client_addr).await?;
                    return Err(CommError::ChannelClosed);
                }

                let responder = Responder {
                    socket: Arc::clone(&self.socket),
                    dedup: Arc::clone(&self.dedup),
                    wait: Duration::from_secs(self.config.response_timeout_secs),
                    max_response_bytes: self.config.max_response_bytes,
                };
                tokio::spawn(async move {
                    if let Err(e) = responder.deliver(seq, client_addr, reply_rx).await {
                        warn!("Failed to deliver response seq={} to {}: {}", seq, client_addr, e);
                    }
                });
                Ok(())
            }
        }
    }

    async fn send(&self, bytes: &[u8], addr: SocketAddr) -> StdResult<(), CommError> {
        self.socket
            .send_to(bytes, addr)
            .await
            .map(|_| ())
            .map_err(|e| CommError::SendError(e.to_string()))
    }

    /// Drop dedup entries older than the TTL
    async fn cleanup_dedup(&self) {
        let mut dedup = self.dedup.lock().await;
        let ttl = Duration::from_secs(self.config.dedup_ttl_secs);
        let now = Instant::now();

        for entries in dedup.values_mut() {
            entries.retain(|_, entry| now.duration_since(entry.instant) < ttl);
        }
        dedup.retain(|_, entries| !entries.is_empty());

        debug!("Dedup table cleaned, {} clients tracked", dedup.len());
    }
}

/// Waits for one dispatch-loop reply and sends it back to the client
struct Responder {
    socket: Arc<UdpSocket>,
    dedup: DedupTable,
    wait: Duration,
    max_response_bytes: usize,
}

impl Responder {
    async fn deliver(
        self,
        seq: u32,
        client_addr: SocketAddr,
        reply_rx: oneshot::Receiver<ToolResponse>,
    ) -> StdResult<(), CommError> {
        let response = match timeout(self.wait, reply_rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                warn!("Channel closed without response for seq={}", seq);
                ToolResponse::error("No response from handler".to_string())
            }
            Err(_) => {
                warn!("Timeout waiting for response for seq={}", seq);
                ToolResponse::error("Response timeout".to_string())
            }
        };

        let bytes = encode_bounded(seq, response, self.max_response_bytes)?;
        self.socket
            .send_to(&bytes, client_addr)
            .await
            .map_err(|e| CommError::SendError(e.to_string()))?;
        debug!("Sent RESPONSE seq={} to {}", seq, client_addr);

        let mut dedup = self.dedup.lock().await;
        if let Some(entry) = dedup
            .get_mut(&client_addr)
            .and_then(|entries| entries.get_mut(&seq))
        {
            entry.instant = Instant::now();
            entry.cached_response = Some(bytes);
        }
        Ok(())
    }
}

/// Encode a RESPONSE, replacing it with an error when it would not fit in
/// one datagram.
pub(crate) fn encode_bounded(
    seq: u32,
    response: ToolResponse,
    max_bytes: usize,
) -> StdResult<Vec<u8>, CommError> {
    let bytes = encode_response(
        seq,
        &ResponsePayload {
            content: response.content,
            is_error: response.is_error,
        },
    )?;
    if bytes.len() <= max_bytes {
        return Ok(bytes);
    }

    let err = CommError::ResponseTooLarge {
        size: bytes.len(),
        limit: max_bytes,
    };
    warn!(seq, "{}", err);
    encode_response(
        seq,
        &ResponsePayload {
            content: err.to_string(),
            is_error: true,
        },
    )
}
