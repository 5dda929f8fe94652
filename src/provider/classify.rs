//! Provider error classification.
//!
//! Maps the `{status, code, message}` triple of an OCI error response onto the
//! closed set of outcomes the poll loop knows how to handle. Kept as a pure
//! function so it can be tested without any HTTP machinery.

/// Status OCI returns alongside "Out of host capacity"
pub const CAPACITY_STATUS: u16 = 500;

/// Message fragment identifying capacity exhaustion
pub const CAPACITY_MESSAGE: &str = "Out of host capacity";

/// Status of a throttled request
pub const THROTTLE_STATUS: u16 = 429;

/// Error code of a throttled request
pub const THROTTLE_CODE: &str = "TooManyRequests";

/// What the poll loop should make of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Valid request, no physical capacity right now: try the next target
    CapacityExhausted,
    /// Rate ceiling exceeded: back off
    Throttled,
    /// Anything else: stop, most likely a configuration problem
    Fatal,
}

impl ErrorClass {
    /// Short description used in log lines
    pub fn description(&self) -> &'static str {
        match self {
            Self::CapacityExhausted => "out of host capacity",
            Self::Throttled => "too many requests",
            Self::Fatal => "unrecoverable provider error",
        }
    }

    /// Operator guidance printed with fatal failures
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::CapacityExhausted => "Capacity frees up over time, keep polling",
            Self::Throttled => "Lower the request rate or increase the backoff delays",
            Self::Fatal => "Check tenancy, subnet, image and shape settings in the env file",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CapacityExhausted => "capacity_exhausted",
            Self::Throttled => "throttled",
            Self::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// Classify an OCI error response.
///
/// Capacity is checked first: OCI reports it as a 500 whose message names the
/// condition, which must not be mistaken for a generic server failure.
pub fn classify(status: u16, code: &str, message: &str) -> ErrorClass {
    if status == CAPACITY_STATUS && message.contains(CAPACITY_MESSAGE) {
        return ErrorClass::CapacityExhausted;
    }

    if status == THROTTLE_STATUS || code == THROTTLE_CODE {
        return ErrorClass::Throttled;
    }

    ErrorClass::Fatal
}
