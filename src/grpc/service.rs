//! Attempt guard service implementation.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};

use super::proto::turnstile::v1::{
    attempt_guard_server::AttemptGuard, IsBlockedRequest, IsBlockedResponse,
    RecordAttemptRequest, RecordAttemptResponse, ResetAttemptsRequest, ResetAttemptsResponse,
};
use crate::error::TurnstileError;
use crate::limiter::{Clock, Guard, GuardRegistry, SystemClock};

/// Implementation of the `turnstile.v1.AttemptGuard` gRPC interface.
pub struct AttemptGuardService<C: Clock = SystemClock> {
    /// The configured guards
    registry: Arc<GuardRegistry<C>>,
}

impl<C: Clock> AttemptGuardService<C> {
    /// Create a new service over the given guards.
    pub fn new(registry: Arc<GuardRegistry<C>>) -> Self {
        Self { registry }
    }

    /// Look up the guard and normalize the identifier, rejecting blanks.
    fn resolve<'a>(
        &'a self,
        guard: &str,
        identifier: &'a str,
    ) -> Result<(&'a Guard<C>, Cow<'a, str>), Status> {
        if guard.is_empty() {
            warn!("Received request with empty guard");
            return Err(Status::invalid_argument("guard is required"));
        }

        let guard = self.registry.get(guard).map_err(|e| match e {
            TurnstileError::UnknownGuard(name) => {
                warn!(guard = %name, "Received request for unknown guard");
                Status::not_found(format!("unknown guard '{}'", name))
            }
            other => Status::internal(other.to_string()),
        })?;

        let identifier = guard.identifier(identifier);
        if identifier.is_empty() {
            warn!("Received request with empty identifier");
            return Err(Status::invalid_argument("identifier is required"));
        }

        Ok((guard, identifier))
    }
}

fn to_timestamp(at: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

fn to_duration(duration: std::time::Duration) -> prost_types::Duration {
    prost_types::Duration {
        seconds: duration.as_secs() as i64,
        nanos: duration.subsec_nanos() as i32,
    }
}

#[async_trait]
impl<C: Clock> AttemptGuard for AttemptGuardService<C> {
    #[instrument(skip(self, request), fields(guard = %request.get_ref().guard))]
    async fn is_blocked(
        &self,
        request: Request<IsBlockedRequest>,
    ) -> Result<Response<IsBlockedResponse>, Status> {
        let req = request.into_inner();
        let (guard, identifier) = self.resolve(&req.guard, &req.identifier)?;

        let blocked = guard.limiter().is_blocked(&identifier);
        debug!(identifier = %identifier, blocked, "Lockout check");

        Ok(Response::new(IsBlockedResponse { blocked }))
    }

    #[instrument(skip(self, request), fields(guard = %request.get_ref().guard))]
    async fn record_attempt(
        &self,
        request: Request<RecordAttemptRequest>,
    ) -> Result<Response<RecordAttemptResponse>, Status> {
        let req = request.into_inner();
        let (guard, identifier) = self.resolve(&req.guard, &req.identifier)?;

        let decision = guard.limiter().record_attempt(&identifier);

        if decision.allowed {
            debug!(
                identifier = %identifier,
                remaining = decision.remaining_attempts,
                "Attempt allowed"
            );
        } else {
            info!(
                identifier = %identifier,
                blocked_until = ?decision.blocked_until,
                "Attempt denied"
            );
        }

        Ok(Response::new(RecordAttemptResponse {
            allowed: decision.allowed,
            remaining_attempts: decision.remaining_attempts,
            blocked_until: decision.blocked_until.map(to_timestamp),
            retry_after: decision.retry_after().map(to_duration),
        }))
    }

    #[instrument(skip(self, request), fields(guard = %request.get_ref().guard))]
    async fn reset_attempts(
        &self,
        request: Request<ResetAttemptsRequest>,
    ) -> Result<Response<ResetAttemptsResponse>, Status> {
        let req = request.into_inner();
        let (guard, identifier) = self.resolve(&req.guard, &req.identifier)?;

        let cleared = guard.limiter().reset(&identifier);
        debug!(identifier = %identifier, cleared, "Reset attempts");

        Ok(Response::new(ResetAttemptsResponse { cleared }))
    }
}
