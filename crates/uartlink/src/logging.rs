use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Crates whose events `--log-level` controls. Everything else stays at
/// `warn` unless `RUST_LOG` says otherwise.
const OWN_TARGETS: &[&str] = &[
    "uartlink",
    "uartlink_transport",
    "uartlink_frame",
    "uartlink_cmd",
    "uartlink_bridge",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn directives(level: LogLevel) -> String {
    let mut out = String::from("warn");
    for target in OWN_TARGETS {
        out.push_str(&format!(",{target}={}", level.as_str()));
    }
    out
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG`, when
/// set and valid, replaces the `--log-level` directives.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false);

    match format {
        LogFormat::Text => {
            let _ = builder.with_target(false).try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().flatten_event(true).try_init();
        }
    }
}
