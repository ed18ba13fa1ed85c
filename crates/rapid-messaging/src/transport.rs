//! The abstract `MessagingClient`/`MessagingServer` interfaces (§5: "shared
//! by all components but internally thread-safe... owns its own connection
//! pool with at-most-one connection per peer endpoint") plus one concrete
//! TCP implementation.
//!
//! `TcpMessagingClient` is `Clone + Send + Sync`; the connection pool is a
//! `dashmap` keyed by peer endpoint, so no `Mutex` ever guards the whole
//! client — only the one in-flight frame on a given peer's connection.

use crate::codec::{decode, encode, framing_codec};
use crate::wire::{RapidRequest, RapidResponse};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use rapid_core::{Endpoint, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::codec::Framed;

/// §7: "guaranteed sends retry with per-kind timeouts (join long, probe
/// short, others default)".
pub const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_millis(750);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn timeout_for(request: &RapidRequest, join_timeout: Duration) -> Duration {
    match request {
        RapidRequest::Join(_) => join_timeout,
        RapidRequest::Probe(_) => PROBE_REQUEST_TIMEOUT,
        _ => DEFAULT_REQUEST_TIMEOUT,
    }
}

#[async_trait]
pub trait MessagingClient: Send + Sync + 'static {
    async fn send(&self, endpoint: &Endpoint, request: RapidRequest) -> Result<RapidResponse, TransportError>;
}

/// Handles one decoded request and produces the response to frame back.
/// Implemented by the engine crate's facade/state-machine handle.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: RapidRequest) -> RapidResponse;
}

type Connection = Arc<Mutex<Framed<TcpStream, tokio_util::codec::LengthDelimitedCodec>>>;

pub struct TcpMessagingClient {
    pool: DashMap<Endpoint, Connection>,
    join_timeout: Duration,
}

impl TcpMessagingClient {
    pub fn new(join_timeout: Duration) -> Self {
        Self {
            pool: DashMap::new(),
            join_timeout,
        }
    }

    async fn connection(&self, endpoint: &Endpoint) -> Result<Connection, TransportError> {
        if let Some(existing) = self.pool.get(endpoint) {
            return Ok(existing.clone());
        }
        let addr = endpoint.display();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                endpoint: addr.clone(),
                reason: e.to_string(),
            })?;
        let framed = Framed::new(stream, framing_codec());
        let conn = Arc::new(Mutex::new(framed));
        // Another task may have raced us to insert first; either entry is an
        // equally fresh connection, so either winner is fine to use.
        let conn = self.pool.entry(endpoint.clone()).or_insert(conn).clone();
        Ok(conn)
    }

    async fn send_inner(&self, endpoint: &Endpoint, request: RapidRequest) -> Result<RapidResponse, TransportError> {
        let conn = self.connection(endpoint).await?;
        let bytes = encode(&request)?;
        let mut framed = conn.lock().await;
        framed
            .send(bytes)
            .await
            .map_err(|e| TransportError::SendFailed {
                endpoint: endpoint.display(),
                reason: e.to_string(),
            })?;
        let frame = framed.next().await;
        drop(framed);
        match frame {
            Some(Ok(bytes)) => decode(&bytes),
            Some(Err(e)) => {
                self.pool.remove(endpoint);
                Err(TransportError::Codec(e.to_string()))
            }
            None => {
                self.pool.remove(endpoint);
                Err(TransportError::ConnectionClosed {
                    endpoint: endpoint.display(),
                })
            }
        }
    }
}

#[async_trait]
impl MessagingClient for TcpMessagingClient {
    async fn send(&self, endpoint: &Endpoint, request: RapidRequest) -> Result<RapidResponse, TransportError> {
        let timeout = timeout_for(&request, self.join_timeout);
        match tokio::time::timeout(timeout, self.send_inner(endpoint, request)).await {
            Ok(result) => result,
            Err(_) => {
                self.pool.remove(endpoint);
                Err(TransportError::Timeout {
                    endpoint: endpoint.display(),
                    millis: timeout.as_millis() as u64,
                })
            }
        }
    }
}

pub struct TcpMessagingServer;

impl TcpMessagingServer {
    /// Accepts connections on `listener` forever, decoding one `RapidRequest`
    /// per frame and dispatching it to `handler`. Each connection is served
    /// by its own task so a slow peer cannot stall the others.
    pub async fn serve<H: RequestHandler>(listener: TcpListener, handler: Arc<H>) -> Result<(), TransportError> {
        loop {
            let (stream, peer_addr) = listener.accept().await.map_err(|e| TransportError::ConnectFailed {
                endpoint: "<listener>".to_string(),
                reason: e.to_string(),
            })?;
            let handler = handler.clone();
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, framing_codec());
                while let Some(frame) = framed.next().await {
                    let bytes = match frame {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::debug!(%peer_addr, error = %e, "connection error, closing");
                            break;
                        }
                    };
                    let request: RapidRequest = match decode(&bytes) {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(%peer_addr, error = %e, "dropping malformed frame");
                            continue;
                        }
                    };
                    let response = handler.handle(request).await;
                    if let Ok(out) = encode(&response) {
                        if framed.send(out).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    }
}
