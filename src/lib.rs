//! Turnstile - Attempt Budget Rate Limiting Service
//!
//! This crate tracks attempts at sensitive operations (login, registration,
//! poll creation) per identifier and locks an identifier out for a fixed
//! period once it exceeds its budget within a rolling window. State is held
//! in process memory and exposed both as a library and over gRPC.

pub mod config;
pub mod error;
pub mod grpc;
pub mod identifier;
pub mod limiter;
