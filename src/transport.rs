//! Socket transport: plain and TLS byte streams.
//!
//! One abstraction with two stream variants. The [`Connector`] resolves a
//! hostname, iterates candidate addresses in order, optionally binds a
//! local endpoint, and upgrades to TLS with SNI set to the target host.
//! Reads are bounded by a configurable timeout so the owning tick loop
//! never blocks indefinitely; a timed-out read is the soft
//! [`TransportError::WouldBlock`] condition, not a failure.
//!
//! The original blocking/non-blocking socket toggle collapses into this
//! timeout model.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, warn};

use crate::error::TransportError;

/// Default bound on a single `read_chunk` call.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client certificate material for TLS connections.
///
/// `certificate` may be a combined PEM carrying both the chain and the key;
/// `key` points at a separate key file when the material is split.
#[derive(Clone, Debug, Default)]
pub struct ClientIdentity {
    /// Certificate chain PEM (and key, when `key` is `None`).
    pub certificate: Option<PathBuf>,
    /// Private key PEM, when kept separately.
    pub key: Option<PathBuf>,
}

impl ClientIdentity {
    /// Whether any certificate material is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.certificate.is_some()
    }
}

enum Stream {
    Tcp(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
    TlsIncoming(Box<tokio_rustls::server::TlsStream<TcpStream>>),
}

/// An established byte stream, plain or TLS.
pub struct Transport {
    stream: Stream,
    read_timeout: Duration,
    send_timeout: Option<Duration>,
}

impl Transport {
    fn new(stream: Stream) -> Self {
        Transport {
            stream,
            read_timeout: DEFAULT_READ_TIMEOUT,
            send_timeout: None,
        }
    }

    /// Whether this stream is TLS-secured.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        !matches!(self.stream, Stream::Tcp(_))
    }

    /// Bound applied to each [`Transport::read_chunk`] call.
    pub fn set_read_timeout(&mut self, read_timeout: Duration) {
        self.read_timeout = read_timeout;
    }

    /// Bound applied to each [`Transport::send`] call; `None` means writes
    /// may block until the peer drains its window.
    pub fn set_send_timeout(&mut self, send_timeout: Option<Duration>) {
        self.send_timeout = send_timeout;
    }

    /// The peer's address.
    pub fn peer_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        let stream = match &self.stream {
            Stream::Tcp(s) => s,
            Stream::Tls(s) => s.get_ref().0,
            Stream::TlsIncoming(s) => s.get_ref().0,
        };
        Ok(stream.peer_addr()?)
    }

    /// Append up to one read's worth of bytes into `buf`.
    ///
    /// `Ok(0)` is end-of-stream. A timeout elapse returns
    /// [`TransportError::WouldBlock`]: no data yet, try again next tick.
    pub async fn read_chunk(&mut self, buf: &mut BytesMut) -> Result<usize, TransportError> {
        let read = match &mut self.stream {
            Stream::Tcp(s) => timeout(self.read_timeout, s.read_buf(buf)).await,
            Stream::Tls(s) => timeout(self.read_timeout, s.read_buf(buf)).await,
            Stream::TlsIncoming(s) => timeout(self.read_timeout, s.read_buf(buf)).await,
        };
        match read {
            Err(_elapsed) => Err(TransportError::WouldBlock),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(TransportError::Io(e)),
        }
    }

    /// Look at buffered plaintext bytes without consuming them.
    ///
    /// Only meaningful on the plain variant; TLS streams have no peekable
    /// cleartext and report `Unsupported`.
    pub async fn peek(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let Stream::Tcp(s) = &mut self.stream else {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "peek on a TLS stream",
            )));
        };
        match timeout(self.read_timeout, s.peek(buf)).await {
            Err(_elapsed) => Err(TransportError::WouldBlock),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(TransportError::Io(e)),
        }
    }

    /// Best-effort write of the whole buffer. Returns the bytes written.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let write = async {
            match &mut self.stream {
                Stream::Tcp(s) => {
                    s.write_all(bytes).await?;
                    s.flush().await
                }
                Stream::Tls(s) => {
                    s.write_all(bytes).await?;
                    s.flush().await
                }
                Stream::TlsIncoming(s) => {
                    s.write_all(bytes).await?;
                    s.flush().await
                }
            }
        };
        match self.send_timeout {
            Some(bound) => match timeout(bound, write).await {
                Err(_elapsed) => return Err(TransportError::WouldBlock),
                Ok(result) => result?,
            },
            None => write.await?,
        }
        Ok(bytes.len())
    }

    /// Tear the stream down. The TLS variants send `close_notify` first,
    /// with one retry if the write would block.
    pub async fn shutdown(&mut self) {
        for attempt in 0..2 {
            let result = match &mut self.stream {
                Stream::Tcp(s) => s.shutdown().await,
                Stream::Tls(s) => s.shutdown().await,
                Stream::TlsIncoming(s) => s.shutdown().await,
            };
            match result {
                Ok(()) => return,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock && attempt == 0 => {
                    continue;
                }
                Err(e) => {
                    debug!(error = %e, "shutdown failed");
                    return;
                }
            }
        }
    }
}

fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));
    sock.set_tcp_keepalive(&keepalive)
}

/// Read a certificate chain and private key for client authentication.
///
/// With no separate key path, the key is taken from the certificate file
/// (combined PEM).
fn read_identity(
    cert_path: &Path,
    key_path: Option<&Path>,
) -> std::io::Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let mut certs = Vec::new();
    let mut key = None;

    let mut reader = std::io::BufReader::new(std::fs::File::open(cert_path)?);
    while let Some(item) = rustls_pemfile::read_one(&mut reader)? {
        match item {
            rustls_pemfile::Item::X509Certificate(c) => certs.push(c),
            rustls_pemfile::Item::Pkcs8Key(k) => key = Some(PrivateKeyDer::from(k)),
            rustls_pemfile::Item::Pkcs1Key(k) => key = Some(PrivateKeyDer::from(k)),
            rustls_pemfile::Item::Sec1Key(k) => key = Some(PrivateKeyDer::from(k)),
            _ => {}
        }
    }
    if let Some(key_path) = key_path {
        let mut reader = std::io::BufReader::new(std::fs::File::open(key_path)?);
        while let Some(item) = rustls_pemfile::read_one(&mut reader)? {
            match item {
                rustls_pemfile::Item::Pkcs8Key(k) => key = Some(PrivateKeyDer::from(k)),
                rustls_pemfile::Item::Pkcs1Key(k) => key = Some(PrivateKeyDer::from(k)),
                rustls_pemfile::Item::Sec1Key(k) => key = Some(PrivateKeyDer::from(k)),
                _ => {}
            }
        }
    }

    if certs.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "no certificates in PEM",
        ));
    }
    let key = key.ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "no private key in PEM")
    })?;
    Ok((certs, key))
}

fn build_client_tls(identity: &ClientIdentity) -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    let natives = rustls_native_certs::load_native_certs();
    for error in &natives.errors {
        warn!(error = %error, "error loading a native root certificate");
    }
    roots.add_parsable_certificates(natives.certs);

    let builder = ClientConfig::builder().with_root_certificates(roots);

    // Certificate load failures degrade to a non-authenticating session.
    let loaded = identity.certificate.as_ref().and_then(|cert_path| {
        match read_identity(cert_path, identity.key.as_deref()) {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!(path = %cert_path.display(), error = %e, "cannot load client certificate");
                None
            }
        }
    });

    let config = match loaded {
        Some((certs, key)) => match builder.clone().with_client_auth_cert(certs, key) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "client certificate rejected");
                builder.with_no_client_auth()
            }
        },
        None => builder.with_no_client_auth(),
    };
    Arc::new(config)
}

/// Establishes outbound [`Transport`]s.
#[derive(Clone, Debug, Default)]
pub struct Connector {
    tls: Option<ClientIdentity>,
    bind: Option<(String, u16)>,
    read_timeout: Option<Duration>,
}

impl Connector {
    /// A connector for plain TCP streams.
    #[must_use]
    pub fn plain() -> Self {
        Connector::default()
    }

    /// A connector that upgrades to TLS after connecting.
    #[must_use]
    pub fn tls(identity: ClientIdentity) -> Self {
        Connector {
            tls: Some(identity),
            ..Connector::default()
        }
    }

    /// Bind the local endpoint before connecting.
    #[must_use]
    pub fn with_local_bind(mut self, host: impl Into<String>, port: u16) -> Self {
        self.bind = Some((host.into(), port));
        self
    }

    /// Override the read timeout applied to the established transport.
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }

    /// Resolve `host:port` and connect, trying candidate addresses in
    /// order. For TLS connectors, performs the handshake with SNI set to
    /// `host`.
    pub async fn connect(&self, host: &str, port: u16) -> Result<Transport, TransportError> {
        let addrs: Vec<_> = lookup_host((host, port))
            .await
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                source,
            })?
            .collect();

        let mut last_err = None;
        let mut stream = None;
        for addr in addrs {
            match self.connect_addr(addr).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    debug!(%addr, error = %e, "candidate address failed");
                    last_err = Some(e);
                }
            }
        }
        let Some(stream) = stream else {
            return Err(TransportError::Connect {
                host: host.to_string(),
                port,
                source: last_err.unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
                }),
            });
        };

        if let Err(e) = enable_keepalive(&stream) {
            warn!(error = %e, "failed to enable TCP keepalive");
        }

        let Some(identity) = &self.tls else {
            let mut transport = Transport::new(Stream::Tcp(stream));
            if let Some(read_timeout) = self.read_timeout {
                transport.set_read_timeout(read_timeout);
            }
            return Ok(transport);
        };

        let config = build_client_tls(identity);
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| TransportError::ServerName(host.to_string()))?;
        let connector = TlsConnector::from(config);
        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(TransportError::Tls)?;

        let mut transport = Transport::new(Stream::Tls(Box::new(tls_stream)));
        if let Some(read_timeout) = self.read_timeout {
            transport.set_read_timeout(read_timeout);
        }
        Ok(transport)
    }

    async fn connect_addr(&self, addr: std::net::SocketAddr) -> std::io::Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        if let Some((bind_host, bind_port)) = &self.bind {
            let candidates = lookup_host((bind_host.as_str(), *bind_port)).await?;
            let local = candidates
                .into_iter()
                .find(|a| a.is_ipv4() == addr.is_ipv4())
                .ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::AddrNotAvailable,
                        "no local address in the peer's family",
                    )
                })?;
            socket.bind(local)?;
        }

        match timeout(CONNECT_TIMEOUT, socket.connect(addr)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            )),
        }
    }
}

/// Accepts inbound [`Transport`]s, optionally TLS-wrapped.
pub struct Listener {
    inner: TcpListener,
    acceptor: Option<TlsAcceptor>,
}

impl Listener {
    /// Bind and listen on `host:port` for plain streams.
    pub async fn bind(host: &str, port: u16) -> Result<Self, TransportError> {
        let inner = TcpListener::bind((host, port))
            .await
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                source,
            })?;
        Ok(Listener {
            inner,
            acceptor: None,
        })
    }

    /// Bind and listen for TLS streams using the given certificate chain
    /// and key files.
    pub async fn bind_tls(
        host: &str,
        port: u16,
        cert_path: &Path,
        key_path: &Path,
    ) -> Result<Self, TransportError> {
        let (certs, key) =
            read_identity(cert_path, Some(key_path)).map_err(TransportError::Tls)?;
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| {
                TransportError::Tls(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;

        let mut listener = Self::bind(host, port).await?;
        listener.acceptor = Some(TlsAcceptor::from(Arc::new(config)));
        Ok(listener)
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        Ok(self.inner.local_addr()?)
    }

    /// Accept one connection; the caller owns the returned transport, which
    /// inherits this listener's plain/TLS type.
    pub async fn accept(&self) -> Result<(Transport, std::net::SocketAddr), TransportError> {
        let (stream, addr) = self.inner.accept().await?;
        let transport = match &self.acceptor {
            None => Transport::new(Stream::Tcp(stream)),
            Some(acceptor) => {
                let tls = acceptor
                    .accept(stream)
                    .await
                    .map_err(TransportError::Tls)?;
                Transport::new(Stream::TlsIncoming(Box::new(tls)))
            }
        };
        Ok((transport, addr))
    }
}

/// A UDP socket with the address-reporting receive operations.
pub struct Datagram {
    inner: UdpSocket,
}

impl Datagram {
    /// Bind a datagram socket.
    pub async fn bind(host: &str, port: u16) -> Result<Self, TransportError> {
        let inner = UdpSocket::bind((host, port))
            .await
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                source,
            })?;
        Ok(Datagram { inner })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        Ok(self.inner.local_addr()?)
    }

    /// Send one datagram.
    pub async fn send_to(
        &self,
        bytes: &[u8],
        target: std::net::SocketAddr,
    ) -> Result<usize, TransportError> {
        Ok(self.inner.send_to(bytes, target).await?)
    }

    /// Receive one datagram and its sender.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> Result<(usize, std::net::SocketAddr), TransportError> {
        Ok(self.inner.recv_from(buf).await?)
    }

    /// Receive without consuming, reporting the sender.
    pub async fn peek_from(
        &self,
        buf: &mut [u8],
    ) -> Result<(usize, std::net::SocketAddr), TransportError> {
        Ok(self.inner.peek_from(buf).await?)
    }
}
