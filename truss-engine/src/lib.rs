//! ABOUTME: Durable execution primitives used by truss-workflow: retrying
//! ABOUTME: activities, a per-activity-kind circuit breaker, signals/queries

mod circuit_breaker;
mod handle;
mod retry;

pub use circuit_breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use handle::WorkflowHandle;
pub use retry::{non_retryable, RetryPolicy};
