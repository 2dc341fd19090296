//! Ratio - Sliding-Window Rate Limiting Service
//!
//! This crate decides whether an owner may act on a resource based on how many
//! times that pair has acted within a trailing time window. Hits are kept in a
//! pluggable window store (process-local or Redis) and the decision is exposed
//! over a single gRPC call.

pub mod config;
pub mod error;
pub mod grpc;
pub mod ratelimit;
