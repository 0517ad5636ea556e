use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::api::{BridgeError, BridgeOpts, GrowthPolicy, LogHandler, LogLevel};
use crate::buffer::{grown_capacity, BufferAllocator, MessageBuffer, SystemAllocator};
use crate::render::Render;

/// Result of one bridge invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered(DeliveryReport),
    /// Allocation failed; the handler was not called.
    Dropped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Untruncated message length reported by the first render.
    pub required: usize,
    /// Buffer capacity at the time the handler ran.
    pub capacity: usize,
    pub grown: bool,
    pub truncated: bool,
}

/// Renders messages into a per-call buffer and forwards them to a handler.
///
/// Holds no mutable state, so a single bridge may be invoked from any
/// number of threads at once.
pub struct LogBridge {
    handler: Box<dyn LogHandler>,
    allocator: Arc<dyn BufferAllocator>,
    initial_capacity: usize,
    growth: GrowthPolicy,
}

impl LogBridge {
    pub fn new(handler: impl LogHandler + 'static) -> Self {
        LogBridge {
            handler: Box::new(handler),
            allocator: Arc::new(SystemAllocator),
            initial_capacity: BridgeOpts::default().initial_capacity as usize,
            growth: GrowthPolicy::default(),
        }
    }

    pub fn with_opts(
        handler: impl LogHandler + 'static,
        opts: BridgeOpts,
    ) -> Result<Self, BridgeError> {
        opts.validate()?;

        Ok(LogBridge {
            initial_capacity: opts.initial_capacity as usize,
            growth: opts.growth,
            ..LogBridge::new(handler)
        })
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn BufferAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    pub fn growth(&self) -> GrowthPolicy {
        self.growth
    }

    /// Formats `args` and forwards the result. See [`crate::alpm_log!`].
    pub fn log(&self, level: LogLevel, mut args: fmt::Arguments<'_>) -> Delivery {
        self.dispatch(level, &mut args)
    }

    /// Renders a message and calls the handler at most once.
    ///
    /// Allocation failures drop the message. The buffer is released before
    /// returning on every path.
    pub fn dispatch<R: Render + ?Sized>(&self, level: LogLevel, message: &mut R) -> Delivery {
        let mut buffer = match MessageBuffer::allocate(&*self.allocator, self.initial_capacity) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Dropping {} message: {}", level, e);
                return Delivery::Dropped;
            }
        };

        let required = render_or_clear(message, &mut buffer);

        let mut grown = false;
        if self.growth.needs_growth(required, buffer.capacity()) {
            let grow = grown_capacity(required)
                .ok_or(BridgeError::AllocationFailed(usize::MAX))
                .and_then(|capacity| buffer.grow(capacity));

            if let Err(e) = grow {
                warn!("Dropping {} message of {} bytes: {}", level, required, e);
                return Delivery::Dropped;
            }

            debug!(
                "Grew message buffer from {} to {} bytes",
                self.initial_capacity,
                buffer.capacity()
            );
            grown = true;

            if self.growth == GrowthPolicy::Reformat {
                if message.can_render_again() {
                    render_or_clear(message, &mut buffer);
                } else {
                    debug!("Arguments already consumed, delivering the first render");
                }
            }
        }

        let capacity = buffer.capacity();
        let Some(text) = buffer.as_c_str() else {
            warn!("Dropping {} message without terminator", level);
            return Delivery::Dropped;
        };

        let truncated = text.to_bytes().len() < required;
        self.handler.on_log(level, &text.to_string_lossy());

        Delivery::Delivered(DeliveryReport {
            required,
            capacity,
            grown,
            truncated,
        })
    }
}

fn render_or_clear<R: Render + ?Sized>(message: &mut R, buffer: &mut MessageBuffer<'_>) -> usize {
    match message.render(buffer.as_mut_bytes()) {
        Some(required) => required,
        None => {
            debug!("Message formatting failed, delivering an empty message");
            buffer.clear();
            0
        }
    }
}

/// Formats and forwards a message through a [`LogBridge`].
///
/// ```
/// use alpm_logbridge::{alpm_log, DefaultHandler, LogBridge, LogLevel};
///
/// let bridge = LogBridge::new(DefaultHandler::default());
/// alpm_log!(bridge, LogLevel::Warning, "disk {} at {}%\n", "full", 98);
/// ```
#[macro_export]
macro_rules! alpm_log {
    ($bridge:expr, $level:expr, $($arg:tt)+) => {
        $bridge.log($level, format_args!($($arg)+))
    };
}
