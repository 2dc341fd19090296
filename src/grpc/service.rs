//! Rate limit service implementation.

use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{error, info, instrument};

use super::proto::{
    rate_limit_response::Code, rate_limit_service_server::RateLimitService, RateLimitRequest,
    RateLimitResponse,
};

use crate::ratelimit::{Decision, Limit, Limiter};

/// Implementation of the `ratio.RateLimitService` gRPC interface.
pub struct RateLimitServiceImpl<L: Limiter> {
    /// Limit applied to every request
    limit: Limit,
    /// The limiter instance
    limiter: Arc<L>,
}

impl<L: Limiter> RateLimitServiceImpl<L> {
    /// Create a new RateLimitServiceImpl with the given limit and limiter.
    pub fn new(limit: Limit, limiter: Arc<L>) -> Self {
        Self { limit, limiter }
    }
}

#[tonic::async_trait]
impl<L: Limiter + 'static> RateLimitService for RateLimitServiceImpl<L> {
    /// Decide whether the owner may act on the resource.
    ///
    /// Admitted requests answer `OK` and denied ones `OVER_LIMIT`. When the
    /// limiter cannot decide, the call fails with an `Unknown` status.
    #[instrument(
        skip(self, request),
        fields(
            owner = %request.get_ref().owner,
            resource = %request.get_ref().resource
        )
    )]
    async fn rate_limit(
        &self,
        request: Request<RateLimitRequest>,
    ) -> Result<Response<RateLimitResponse>, Status> {
        let req = request.into_inner();

        info!(owner = %req.owner, resource = %req.resource, "RateLimit request");

        let decision = self
            .limiter
            .check(&self.limit, &req.owner, &req.resource)
            .await
            .map_err(|e| {
                error!(error = %e, "Rate limit check failed");
                Status::unknown(e.to_string())
            })?;

        let code = match decision {
            Decision::Admitted => Code::Ok,
            Decision::Denied => Code::OverLimit,
        };

        info!(code = ?code, "Rate limit decision made");

        Ok(Response::new(RateLimitResponse { code: code.into() }))
    }
}
