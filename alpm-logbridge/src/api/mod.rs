mod logger;

use std::fmt;

pub use logger::{
    DefaultHandler, FnHandler, ForeignHandler, ForeignLogHandler, HandlerLogger, LogHandler,
    DEFAULT_LOG_THRESHOLD,
};

/// Initial size of the per-call message buffer.
pub const DEFAULT_INITIAL_CAPACITY: u32 = 128;

// alpm_loglevel_t
pub const ALPM_LOG_ERROR: u32 = 1;
pub const ALPM_LOG_WARNING: u32 = 1 << 1;
pub const ALPM_LOG_DEBUG: u32 = 1 << 2;
pub const ALPM_LOG_FUNCTION: u32 = 1 << 3;

/// Severity tag supplied by libalpm, passed through to handlers unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum LogLevel {
    Error,
    Warning,
    Debug,
    Function,
    Other { raw: u32 },
}

impl LogLevel {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            ALPM_LOG_ERROR => LogLevel::Error,
            ALPM_LOG_WARNING => LogLevel::Warning,
            ALPM_LOG_DEBUG => LogLevel::Debug,
            ALPM_LOG_FUNCTION => LogLevel::Function,
            raw => LogLevel::Other { raw },
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            LogLevel::Error => ALPM_LOG_ERROR,
            LogLevel::Warning => ALPM_LOG_WARNING,
            LogLevel::Debug => ALPM_LOG_DEBUG,
            LogLevel::Function => ALPM_LOG_FUNCTION,
            LogLevel::Other { raw } => *raw,
        }
    }

    /// Whether this level is at least as severe as `threshold`.
    /// Lower raw values are more severe.
    pub fn passes(&self, threshold: LogLevel) -> bool {
        self.raw() <= threshold.raw()
    }

    pub fn to_log_level(&self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Function | LogLevel::Other { .. } => log::Level::Trace,
        }
    }

    pub fn from_log_level(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warning,
            log::Level::Info | log::Level::Debug => LogLevel::Debug,
            log::Level::Trace => LogLevel::Function,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => f.write_str("error"),
            LogLevel::Warning => f.write_str("warning"),
            LogLevel::Debug => f.write_str("debug"),
            LogLevel::Function => f.write_str("function"),
            LogLevel::Other { raw } => write!(f, "level({raw})"),
        }
    }
}

/// What the bridge does when the first render did not fit the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uniffi::Enum)]
pub enum GrowthPolicy {
    /// Grow the buffer and render the message again.
    Reformat,
    /// Grow the buffer but deliver the truncated first render.
    /// Matches the historical libalpm binding, including its `>` comparison.
    GrowOnly,
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        GrowthPolicy::Reformat
    }
}

impl GrowthPolicy {
    pub fn needs_growth(&self, required: usize, capacity: usize) -> bool {
        match self {
            GrowthPolicy::Reformat => required >= capacity,
            GrowthPolicy::GrowOnly => required > capacity,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, uniffi::Record)]
pub struct BridgeOpts {
    pub initial_capacity: u32,
    pub growth: GrowthPolicy,
}

impl BridgeOpts {
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.initial_capacity == 0 {
            return Err(BridgeError::InvalidCapacity(self.initial_capacity));
        }
        Ok(())
    }
}

impl Default for BridgeOpts {
    fn default() -> Self {
        BridgeOpts {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            growth: GrowthPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum BridgeError {
    #[error("Unable to allocate a {0} byte message buffer")]
    AllocationFailed(usize),
    #[error("Invalid initial buffer capacity: {0}")]
    InvalidCapacity(u32),
    #[error("Registering the log callback failed with status {0}")]
    RegistrationFailed(i32),
    #[error("Library handle is null")]
    NullHandle,
    #[error("Library handle address {0:#x} does not fit this platform")]
    InvalidHandle(u64),
    #[error("Failed to set up the diagnostic logger: {0}")]
    LoggerSetupFailed(String),
}
