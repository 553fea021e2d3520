//! gRPC surface for the attempt guards.

mod server;
mod service;

pub use server::GrpcServer;
pub use service::AttemptGuardService;

// Include the generated protobuf code
pub mod proto {
    pub mod turnstile {
        pub mod v1 {
            tonic::include_proto!("turnstile.v1");
        }
    }
}

// Re-export commonly used types
pub use proto::turnstile::v1::{
    attempt_guard_client::AttemptGuardClient, attempt_guard_server::AttemptGuardServer,
    IsBlockedRequest, IsBlockedResponse, RecordAttemptRequest, RecordAttemptResponse,
    ResetAttemptsRequest, ResetAttemptsResponse,
};
