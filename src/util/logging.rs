//! Standardized logging utility
//!
//! Regular diagnostics go through `tracing`. The `wlog!` macro is reserved for
//! state dumps that must keep the `YYYY-MM-DD HH:MM:SS [MODULE] Message` layout
//! no matter which subscriber is installed.

#[macro_export]
macro_rules! wlog {
    ($module:expr, $($arg:tt)*) => {{
        let now = chrono::Local::now();
        eprintln!("{} [{}] {}",
            now.format("%Y-%m-%d %H:%M:%S"),
            $module,
            format!($($arg)*)
        );
    }};
}

/// Standardized module identifiers
pub const MAIN: &str = "MAIN";
pub const COMPOSITOR: &str = "COMPOSITOR";
pub const BUFFER: &str = "BUFFER";
pub const STREAM: &str = "STREAM";
pub const CONTROLLER: &str = "CONTROLLER";

/// Timestamp layout shared by `wlog!` and the tracing subscriber of the binaries.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Install the process-wide tracing subscriber.
///
/// `default_filter` applies when `RUST_LOG` is not set.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_ansi(false)
        .init();
}
