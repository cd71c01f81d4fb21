//! Liveness checks for pooled TCP connections
//!
//! - TCP-level checks using non-blocking peek
//! - Application-level request/response probes (e.g. Redis `PING`)

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::constants::pool::{PROBE_RESPONSE_BUFFER_SIZE, TCP_PEEK_BUFFER_SIZE};
use std::time::Duration;

/// Errors that can occur during connection health checks
#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("TCP connection closed")]
    TcpClosed,

    /// Unread data is waiting on an idle connection
    #[error("Unexpected data in buffer")]
    UnexpectedData,

    #[error("TCP error: {0}")]
    TcpError(std::io::Error),

    #[error("Failed to write health check: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to read health check response: {0}")]
    ReadError(std::io::Error),

    #[error("Health check timeout")]
    Timeout,

    #[error("Unexpected health check response: {0}")]
    UnexpectedResponse(String),

    #[error("Connection closed during health check")]
    ConnectionClosedDuringCheck,
}

/// Request bytes and the prefix a healthy endpoint answers with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub request: Vec<u8>,
    pub expect: Vec<u8>,
}

impl Probe {
    #[must_use]
    pub fn new(request: impl Into<Vec<u8>>, expect: impl Into<Vec<u8>>) -> Self {
        Self {
            request: request.into(),
            expect: expect.into(),
        }
    }

    /// Redis `PING` / `+PONG`
    #[must_use]
    pub fn redis_ping() -> Self {
        Self::new(b"PING\r\n".to_vec(), b"+PONG".to_vec())
    }
}

impl From<&crate::config::ProbeConfig> for Probe {
    fn from(config: &crate::config::ProbeConfig) -> Self {
        Self::new(config.request.as_bytes(), config.expect.as_bytes())
    }
}

/// Fast TCP-level check for obviously dead connections
///
/// - `Ok(0)` from `try_read()` means the peer closed the connection
/// - `Ok(n)` means unread data is pending, which an idle connection never has
/// - `WouldBlock` is the expected case for a healthy idle connection
pub fn check_tcp_alive(stream: &TcpStream) -> Result<(), HealthCheckError> {
    let mut peek_buf = [0u8; TCP_PEEK_BUFFER_SIZE];

    match stream.try_read(&mut peek_buf) {
        Ok(0) => Err(HealthCheckError::TcpClosed),
        Ok(_) => Err(HealthCheckError::UnexpectedData),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
        Err(e) => Err(HealthCheckError::TcpError(e)),
    }
}

/// Application-level check: send the probe request and verify the reply prefix
pub async fn check_probe_response(
    stream: &mut TcpStream,
    probe: &Probe,
    deadline: Duration,
) -> Result<(), HealthCheckError> {
    let exchange = async {
        stream
            .write_all(&probe.request)
            .await
            .map_err(HealthCheckError::WriteError)?;

        let mut response = Vec::with_capacity(PROBE_RESPONSE_BUFFER_SIZE);
        let mut buf = [0u8; PROBE_RESPONSE_BUFFER_SIZE];
        while response.len() < probe.expect.len() {
            let n = stream
                .read(&mut buf)
                .await
                .map_err(HealthCheckError::ReadError)?;
            if n == 0 {
                return Err(HealthCheckError::ConnectionClosedDuringCheck);
            }
            response.extend_from_slice(&buf[..n]);
        }

        if response.starts_with(&probe.expect) {
            Ok(())
        } else {
            Err(HealthCheckError::UnexpectedResponse(
                String::from_utf8_lossy(&response).trim().to_string(),
            ))
        }
    };

    timeout(deadline, exchange)
        .await
        .map_err(|_| HealthCheckError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_idle_connection_is_alive() {
        let (client, _server) = connected_pair().await;
        assert!(check_tcp_alive(&client).is_ok());
    }

    #[tokio::test]
    async fn test_closed_connection_detected() {
        let (client, server) = connected_pair().await;
        drop(server);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            check_tcp_alive(&client),
            Err(HealthCheckError::TcpClosed | HealthCheckError::TcpError(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_data_detected() {
        let (client, mut server) = connected_pair().await;
        server.write_all(b"junk").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            check_tcp_alive(&client),
            Err(HealthCheckError::UnexpectedData)
        ));
    }

    #[tokio::test]
    async fn test_probe_success_and_mismatch() {
        let (mut client, mut server) = connected_pair().await;
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = server.read(&mut buf).await;
            let _ = server.write_all(b"+PONG\r\n").await;
            let _ = server.read(&mut buf).await;
            let _ = server.write_all(b"-ERR no\r\n").await;
        });

        let probe = Probe::redis_ping();
        check_probe_response(&mut client, &probe, Duration::from_secs(1))
            .await
            .unwrap();

        let err = check_probe_response(&mut client, &probe, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HealthCheckError::UnexpectedResponse(r) if r.starts_with("-ERR")));
    }

    #[tokio::test]
    async fn test_probe_times_out_on_silent_peer() {
        let (mut client, _server) = connected_pair().await;
        let err = check_probe_response(&mut client, &Probe::redis_ping(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, HealthCheckError::Timeout));
    }
}
