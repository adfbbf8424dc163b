use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt};

use crate::{DeepResearchError, LoggingConfig};

static TELEMETRY_GUARD: OnceLock<()> = OnceLock::new();

/// Configuration options when initialising telemetry.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    pub env_filter: Option<String>,
    pub with_ansi: bool,
    pub json: bool,
    pub with_target: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            env_filter: None,
            with_ansi: true,
            json: false,
            with_target: false,
        }
    }
}

impl TelemetryOptions {
    /// Options derived from the `[logging]` section; `RUST_LOG` still wins when set.
    pub fn from_logging(logging: &LoggingConfig) -> Self {
        Self {
            env_filter: Some(format!("{},deepresearch_core={}", logging.level, logging.level)),
            json: logging.json,
            ..Self::default()
        }
    }
}

/// Initialise the global tracing subscriber.
///
/// Safe to call multiple times; only the first invocation installs the subscriber.
pub fn init_telemetry(options: TelemetryOptions) -> Result<(), DeepResearchError> {
    if TELEMETRY_GUARD.get().is_some() {
        return Ok(());
    }

    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .or(options.env_filter)
        .unwrap_or_else(|| "info".to_string());

    let builder = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(options.with_target)
        .with_writer(std::io::stderr);

    let installed = if options.json {
        builder.json().try_init()
    } else {
        builder.with_ansi(options.with_ansi).try_init()
    };
    installed.map_err(|err| {
        DeepResearchError::InvalidConfiguration(format!("telemetry init failed: {err}"))
    })?;

    TELEMETRY_GUARD.get_or_init(|| ());
    Ok(())
}
