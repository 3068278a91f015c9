//! Data-plane proxy: topic-broadcast fan-out relay.
//!
//! Publishers connect to the ingress listener; every received message is
//! re-emitted, byte for byte, to every subscriber connected to the egress
//! listener.  Topic filtering is performed by the subscribers' socket layer,
//! not here: the proxy is a pure pass-through and never parses headers,
//! payloads, or even frame boundaries.  Bind failure on either socket is
//! fatal at startup.
//!
//! The default data relay listens on 11100/11099; running a second instance
//! on 11098/11097 gives the conventional log relay.

use benchlink_core::wire::MAX_BUNDLE_LEN;
use benchlink_protocol::{DATA_EGRESS_PORT, DATA_INGRESS_PORT};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// A relayed bundle body, shared across subscriber tasks.  Opaque bytes.
type Bundle = Arc<Vec<u8>>;

/// Pending bundles per subscriber before the slowest gets skipped past.
const FANOUT_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_host: String,
    pub ingress_port: u16,
    pub egress_port: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            bind_host: "0.0.0.0".to_owned(),
            ingress_port: DATA_INGRESS_PORT,
            egress_port: DATA_EGRESS_PORT,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind {role} {addr}: {source}")]
    Bind {
        role: &'static str,
        addr: String,
        source: std::io::Error,
    },
    #[error("{0} listener failed")]
    Accept(&'static str),
}

pub struct Proxy {
    ingress: TcpListener,
    egress: TcpListener,
    tx: broadcast::Sender<Bundle>,
}

impl Proxy {
    /// Bind both listeners; failure on either is fatal.
    pub async fn bind(config: ProxyConfig) -> Result<Self, ProxyError> {
        let ingress = bind_listener(&config.bind_host, config.ingress_port, "ingress").await?;
        let egress = bind_listener(&config.bind_host, config.egress_port, "egress").await?;
        let (tx, _) = broadcast::channel(FANOUT_DEPTH);
        Ok(Proxy {
            ingress,
            egress,
            tx,
        })
    }

    pub fn ingress_addr(&self) -> SocketAddr {
        self.ingress.local_addr().expect("local_addr after bind")
    }

    pub fn egress_addr(&self) -> SocketAddr {
        self.egress.local_addr().expect("local_addr after bind")
    }

    /// Run both accept loops; returns only if a listener dies.
    pub async fn run(self) -> Result<(), ProxyError> {
        info!(
            ingress = %self.ingress_addr(),
            egress = %self.egress_addr(),
            "proxy running"
        );
        let Proxy {
            ingress,
            egress,
            tx,
        } = self;

        let publisher_side = {
            let tx = tx.clone();
            async move {
                loop {
                    match ingress.accept().await {
                        Ok((stream, addr)) => {
                            debug!(%addr, "publisher connected");
                            let _ = stream.set_nodelay(true);
                            tokio::spawn(serve_publisher(stream, tx.clone()));
                        }
                        Err(e) => {
                            warn!(error = %e, "ingress accept failed");
                            return ProxyError::Accept("ingress");
                        }
                    }
                }
            }
        };

        let subscriber_side = async move {
            loop {
                match egress.accept().await {
                    Ok((stream, addr)) => {
                        debug!(%addr, "subscriber connected");
                        let _ = stream.set_nodelay(true);
                        tokio::spawn(serve_subscriber(stream, tx.subscribe()));
                    }
                    Err(e) => {
                        warn!(error = %e, "egress accept failed");
                        return ProxyError::Accept("egress");
                    }
                }
            }
        };

        tokio::select! {
            error = publisher_side => Err(error),
            error = subscriber_side => Err(error),
        }
    }
}

async fn bind_listener(
    host: &str,
    port: u16,
    role: &'static str,
) -> Result<TcpListener, ProxyError> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ProxyError::Bind { role, addr, source })
}

/// Read length-prefixed bundles from one publisher and hand their raw bodies
/// to the fan-out channel.
async fn serve_publisher(mut stream: TcpStream, tx: broadcast::Sender<Bundle>) {
    loop {
        match read_raw_bundle(&mut stream).await {
            Ok(Some(body)) => {
                // Zero subscribers is not an error.
                let _ = tx.send(Arc::new(body));
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "publisher connection failed");
                break;
            }
        }
    }
    debug!("publisher disconnected");
}

/// Forward every relayed bundle to one subscriber until it disconnects.
/// No content inspection happens here; filtering is the subscriber's job.
async fn serve_subscriber(mut stream: TcpStream, mut rx: broadcast::Receiver<Bundle>) {
    loop {
        match rx.recv().await {
            Ok(body) => {
                if write_raw_bundle(&mut stream, &body).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "slow subscriber; messages skipped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("subscriber disconnected");
}

/// One length-prefixed bundle body, uninterpreted.  `None` on a clean EOF.
async fn read_raw_bundle(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    match stream.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_BUNDLE_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("announced bundle of {len} bytes exceeds limit"),
        ));
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(Some(body))
}

async fn write_raw_bundle(stream: &mut TcpStream, body: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(body.len() as u32).to_be_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await
}
