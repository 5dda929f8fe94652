//! Poll loop timing constants

/// Pause between two targets after an "Out of host capacity" answer
pub const CAPACITY_RETRY_SECS: u64 = 16;

/// Pause between daemon cycles that found no capacity
pub const CYCLE_DELAY_SECS: u64 = 60;

/// Suspension written by a throttled single invocation
pub const TOO_MANY_REQUESTS_WAIT_SECS: u64 = 300;

/// First exponential backoff delay
pub const BACKOFF_INITIAL_SECS: u64 = 60;

/// Exponential backoff ceiling
pub const BACKOFF_MAX_SECS: u64 = 900;

/// Binary backoff delay for the first throttle of a streak
pub const BACKOFF_SHORT_SECS: u64 = 60;

/// Binary backoff delay for consecutive throttles
pub const BACKOFF_LONG_SECS: u64 = 300;

/// Shape used when none is configured
pub const DEFAULT_SHAPE: &str = "VM.Standard.A1.Flex";

/// Suspension marker file name inside the temp directory
pub const WAITER_FILE_NAME: &str = "too_many_requests_waiter.txt";

