//! gRPC server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tracing::{error, info};

use super::proto::rate_limit_service_server::RateLimitServiceServer;
use super::service::RateLimitServiceImpl;
use super::FILE_DESCRIPTOR_SET;
use crate::error::{RatioError, Result};
use crate::ratelimit::{Limit, Limiter};

/// gRPC server for the rate limit service.
pub struct GrpcServer<L: Limiter + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// Limit applied to every request
    limit: Limit,
    /// The limiter deciding each request
    limiter: Arc<L>,
}

impl<L: Limiter + 'static> GrpcServer<L> {
    /// Create a new gRPC server.
    pub fn new(addr: SocketAddr, limit: Limit, limiter: Arc<L>) -> Self {
        Self {
            addr,
            limit,
            limiter,
        }
    }

    /// Address the server binds to when started with `serve*`.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn service(&self) -> RateLimitServiceServer<RateLimitServiceImpl<L>> {
        RateLimitServiceServer::new(RateLimitServiceImpl::new(
            self.limit,
            Arc::clone(&self.limiter),
        ))
    }

    /// Routes for the rate limit service and gRPC server reflection.
    fn router(&self) -> Result<Router> {
        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()?;

        Ok(Server::builder()
            .add_service(self.service())
            .add_service(reflection))
    }

    /// Start the gRPC server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(
            addr = %self.addr,
            limit = %self.limit,
            "Starting gRPC server for RateLimitService"
        );

        self.router()?
            .serve_with_shutdown(self.addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                RatioError::Grpc(e)
            })
    }

    /// Serve on an already bound listener, ignoring the configured address.
    pub async fn serve_with_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(
            addr = ?listener.local_addr().ok(),
            limit = %self.limit,
            "Starting gRPC server for RateLimitService on bound listener"
        );

        self.router()?
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                RatioError::Grpc(e)
            })
    }
}
