//! gRPC surface of the rate limit service.

mod server;
mod service;

pub use server::GrpcServer;
pub use service::RateLimitServiceImpl;

// Include the generated protobuf code
pub mod proto {
    tonic::include_proto!("ratio");
}

/// Encoded descriptor set of `ratio.proto`, served through gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("ratio_descriptor");

// Re-export commonly used types
pub use proto::{
    rate_limit_response::Code, rate_limit_service_client::RateLimitServiceClient,
    rate_limit_service_server::RateLimitServiceServer, RateLimitRequest, RateLimitResponse,
};
