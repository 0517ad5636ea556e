//! Forwards libalpm's printf-style log callback to Rust or foreign-language
//! handlers.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod api;
pub mod bridge;
pub mod buffer;
pub mod ffi;
pub mod render;

#[cfg(test)]
mod testing;

pub use api::{
    BridgeError, BridgeOpts, DefaultHandler, FnHandler, ForeignHandler, ForeignLogHandler,
    GrowthPolicy, HandlerLogger, LogHandler, LogLevel,
};
pub use bridge::{Delivery, DeliveryReport, LogBridge};
pub use buffer::{BufferAllocator, SystemAllocator};
pub use ffi::{bridge_log_cb, guarded_dispatch, InstallTable, LogRegistry, LoggedHandle};

uniffi::setup_scaffolding!();

/// Sends this crate's own diagnostics to `handler`. Can only be set once per
/// process.
#[uniffi::export]
pub fn set_diagnostic_logger(
    handler: Box<dyn ForeignLogHandler>,
    max_level: LogLevel,
) -> Result<(), BridgeError> {
    let max_level = max_level.to_log_level().to_level_filter();
    let logger = HandlerLogger::new(ForeignHandler::new(handler), max_level);

    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| BridgeError::LoggerSetupFailed(e.to_string()))?;

    log::set_max_level(max_level);

    Ok(())
}
