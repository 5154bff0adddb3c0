use thiserror::Error;

/// Programmer errors surfaced synchronously at the call site.
///
/// None of these leave a flow half-updated: the failing call returns before
/// any cache is written or any observer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlowError {
    /// Assignment to a flow produced by a combinator.
    #[error("flow is immutable: only root flows can be assigned")]
    ImmutableWrite,
    /// Assignment of the absence marker (`None`) to a root flow.
    #[error("value cannot be absent")]
    AbsentValue,
    /// A sampling window below zero.
    #[error("throttle window must be >= 0 ms, got {millis} ms")]
    InvalidWindow { millis: i64 },
}
