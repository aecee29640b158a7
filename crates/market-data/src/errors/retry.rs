/// Classification for retry policy.
///
/// Used to determine how the registry should respond to errors from providers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - the request is fundamentally invalid or every option
    /// has already been exhausted.
    Never,

    /// Retry the same provider with bounded exponential backoff - rate
    /// limited (429) or timed out; it may succeed shortly.
    WithBackoff,

    /// Try the next provider in the routing chain - this one can't handle
    /// the request or returned a bad payload.
    NextProvider,

    /// Circuit breaker is open for this provider.
    /// Skip it until the circuit closes.
    CircuitOpen,
}
