use super::LogLevel;

/// Handlers at or above this severity are forwarded by [`DefaultHandler`].
pub const DEFAULT_LOG_THRESHOLD: LogLevel = LogLevel::Warning;

/// Receives rendered libalpm messages.
///
/// Called synchronously on whichever thread libalpm is logging from. The
/// message is only borrowed for the duration of the call.
pub trait LogHandler: Send + Sync {
    fn on_log(&self, level: LogLevel, message: &str);
}

/// Handler implemented in the embedding language.
#[uniffi::export(callback_interface)]
pub trait ForeignLogHandler: Send + Sync {
    fn on_log(&self, level: LogLevel, message: String);
}

pub struct ForeignHandler {
    handler: Box<dyn ForeignLogHandler>,
}

impl ForeignHandler {
    pub fn new(handler: Box<dyn ForeignLogHandler>) -> Self {
        ForeignHandler { handler }
    }
}

impl LogHandler for ForeignHandler {
    fn on_log(&self, level: LogLevel, message: &str) {
        self.handler.on_log(level, message.to_owned());
    }
}

/// Adapts a closure into a [`LogHandler`].
pub struct FnHandler<F>(pub F);

impl<F> LogHandler for FnHandler<F>
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn on_log(&self, level: LogLevel, message: &str) {
        (self.0)(level, message)
    }
}

/// Forwards sufficiently severe messages to the `log` facade under the
/// `alpm` target.
#[derive(Clone, Copy, Debug)]
pub struct DefaultHandler {
    threshold: LogLevel,
}

impl DefaultHandler {
    pub fn new(threshold: LogLevel) -> Self {
        DefaultHandler { threshold }
    }

    pub fn threshold(&self) -> LogLevel {
        self.threshold
    }
}

impl Default for DefaultHandler {
    fn default() -> Self {
        DefaultHandler::new(DEFAULT_LOG_THRESHOLD)
    }
}

impl LogHandler for DefaultHandler {
    fn on_log(&self, level: LogLevel, message: &str) {
        if level.passes(self.threshold) {
            log::log!(target: "alpm", level.to_log_level(), "{}", message.trim_end());
        }
    }
}

/// `log::Log` implementation that routes this crate's own records to a
/// handler, so embeddings see bridge diagnostics next to libalpm output.
pub struct HandlerLogger<H> {
    handler: H,
    max_level: log::LevelFilter,
}

impl<H: LogHandler> HandlerLogger<H> {
    pub fn new(handler: H, max_level: log::LevelFilter) -> Self {
        HandlerLogger { handler, max_level }
    }
}

impl<H: LogHandler> log::Log for HandlerLogger<H> {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let message = format!("[{}] {}", record.target(), record.args());
        self.handler
            .on_log(LogLevel::from_log_level(record.level()), &message);
    }

    fn flush(&self) {}
}
