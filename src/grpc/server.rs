//! gRPC server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

use super::proto::turnstile::v1::attempt_guard_server::AttemptGuardServer;
use super::service::AttemptGuardService;
use crate::error::{Result, TurnstileError};
use crate::limiter::{Clock, GuardRegistry, SystemClock};

/// gRPC server for the attempt guard service.
pub struct GrpcServer<C: Clock = SystemClock> {
    /// Address to bind to
    addr: SocketAddr,
    /// The configured guards
    registry: Arc<GuardRegistry<C>>,
}

impl<C: Clock> GrpcServer<C> {
    /// Create a new gRPC server.
    pub fn new(addr: SocketAddr, registry: Arc<GuardRegistry<C>>) -> Self {
        Self { addr, registry }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let local_addr = listener.local_addr()?;
        let service = AttemptGuardService::new(self.registry);

        info!(
            addr = %local_addr,
            "Starting gRPC server for AttemptGuard with graceful shutdown"
        );

        Server::builder()
            .add_service(AttemptGuardServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                TurnstileError::Grpc(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TurnstileConfig;
    use crate::grpc::{AttemptGuardClient, IsBlockedRequest, RecordAttemptRequest};
    use tokio::sync::oneshot;

    fn registry() -> Arc<GuardRegistry> {
        Arc::new(GuardRegistry::from_config(&TurnstileConfig::default().guards).unwrap())
    }

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let server = GrpcServer::new(addr, registry());
        assert_eq!(server.addr(), addr);
    }

    #[tokio::test]
    async fn test_round_trip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = GrpcServer::new(addr, registry());
        let handle = tokio::spawn(server.serve_listener(listener, async move {
            let _ = stop_rx.await;
        }));

        let mut client = AttemptGuardClient::connect(format!("http://{}", addr))
            .await
            .unwrap();

        for expected in [4, 3, 2, 1, 0] {
            let response = client
                .record_attempt(RecordAttemptRequest {
                    guard: "create_poll".to_string(),
                    identifier: "user@example.com".to_string(),
                })
                .await
                .unwrap()
                .into_inner();
            assert!(response.allowed);
            assert_eq!(response.remaining_attempts, expected);
        }

        let denied = client
            .record_attempt(RecordAttemptRequest {
                guard: "create_poll".to_string(),
                identifier: "user@example.com".to_string(),
            })
            .await
            .unwrap()
            .into_inner();
        assert!(!denied.allowed);
        assert!(denied.blocked_until.is_some());

        let blocked = client
            .is_blocked(IsBlockedRequest {
                guard: "create_poll".to_string(),
                identifier: "user@example.com".to_string(),
            })
            .await
            .unwrap()
            .into_inner();
        assert!(blocked.blocked);

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
