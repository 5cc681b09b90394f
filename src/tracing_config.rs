//! Tracing subscriber configuration for the command-line tools.
//!
//! Library code only emits trace events; the subscriber is configured here,
//! by the application.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Tracing configuration builder
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
}

impl TracingConfig {
    /// Create a new tracing configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set custom environment filter
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",  // Default: problems only; progress bars carry the rest
            1 => "info",  // -v: high-level operations
            2 => "debug", // -vv: internal state and computations
            _ => "trace", // -vvv+: extremely detailed traces
        }
    }

    /// Initialize the tracing subscriber based on this configuration
    ///
    /// # Errors
    /// Returns an error if the filter string is invalid or a subscriber is
    /// already installed.
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = if let Some(env_filter) = &self.env_filter {
            EnvFilter::try_new(env_filter)?
        } else {
            EnvFilter::try_new(self.verbosity_to_filter())?
        };

        let fmt_layer = fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .with_level(true)
            .compact();

        Registry::default().with(filter).with(fmt_layer).init();
        Ok(())
    }
}
