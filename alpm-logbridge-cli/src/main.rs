use std::sync::Arc;

use alpm_logbridge::{
    alpm_log, BridgeOpts, Delivery, FnHandler, GrowthPolicy, LogBridge, LogLevel,
};
use clap::{command, Parser, ValueEnum};
use log::{debug, error, info, warn};
use simplelog::{ColorChoice, LevelFilter, TermLogger, TerminalMode};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Level {
    Error,
    Warning,
    Debug,
    Function,
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => LogLevel::Error,
            Level::Warning => LogLevel::Warning,
            Level::Debug => LogLevel::Debug,
            Level::Function => LogLevel::Function,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Level the message is emitted at
    #[arg(short, long, value_enum, default_value_t = Level::Warning)]
    level: Level,

    /// Initial message buffer size in bytes
    #[arg(short, long, default_value_t = 128)]
    capacity: u32,

    /// Deliver the truncated first render instead of formatting again
    /// after the buffer grows
    #[arg(long, default_value_t = false)]
    grow_only: bool,

    /// Repeat the message this many times to force buffer growth
    #[arg(short, long, default_value_t = 1)]
    repeat: usize,

    /// Emit the message from this many threads at once
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// Print the delivered bytes as hex
    #[arg(long, default_value_t = false)]
    hexdump: bool,

    /// Enables debug logging
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Message text
    #[arg(required = true, trailing_var_arg = true)]
    message: Vec<String>,
}

/// At least one worker runs, whatever `--threads` says.
fn worker_count(requested: usize) -> usize {
    requested.max(1)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_level = if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = TermLogger::init(
        log_level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    debug!("Args: {:?}", args);

    let opts = BridgeOpts {
        initial_capacity: args.capacity,
        growth: if args.grow_only {
            GrowthPolicy::GrowOnly
        } else {
            GrowthPolicy::Reformat
        },
    };

    let hexdump = args.hexdump;
    let handler = FnHandler(move |level: LogLevel, message: &str| {
        info!("[{}] {} ({} bytes)", level, message, message.len());
        if hexdump {
            info!("{}", hex::encode(message.as_bytes()));
        }
    });

    let bridge = match LogBridge::with_opts(handler, opts) {
        Ok(bridge) => Arc::new(bridge),
        Err(e) => {
            error!("Invalid options: {}", e);
            return;
        }
    };

    let message = args.message.join(" ").repeat(args.repeat);
    let level = LogLevel::from(args.level);

    let threads = worker_count(args.threads);
    let mut workers = Vec::with_capacity(threads);
    for worker in 0..threads {
        let bridge = bridge.clone();
        let message = message.clone();
        workers.push(tokio::task::spawn_blocking(move || {
            (worker, alpm_log!(bridge, level, "{}", message))
        }));
    }

    for task in workers {
        match task.await {
            Ok((worker, Delivery::Delivered(report))) => info!(
                "worker {}: required {} bytes, capacity {}, grown: {}, truncated: {}",
                worker, report.required, report.capacity, report.grown, report.truncated
            ),
            Ok((worker, Delivery::Dropped)) => warn!("worker {}: message dropped", worker),
            Err(e) => error!("Worker failed: {}", e),
        }
    }
}
