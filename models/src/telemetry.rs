//! Tracing subscriber setup shared by every binary in the workspace.
use serde::Deserialize;
use snafu::ResultExt;
use std::env;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, EnvFilter, Layer, Registry,
};

const DEFAULT_TRACING_FILTER_DIRECTIVE: LevelFilter = LevelFilter::INFO;

const TRACING_FILTER_DIRECTIVE_ENV_VAR: &str = "TRACING_FILTER_DIRECTIVE";
const LOGGING_FORMATTER_ENV_VAR: &str = "LOGGING_FORMATTER";
const LOGGING_ANSI_ENABLED_ENV_VAR: &str = "LOGGING_ANSI_ENABLED";

/// How tracing events are rendered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct LogFormatter {
    message_format: MessageFormat,
    ansi_enabled: bool,
}

impl LogFormatter {
    pub fn new(message_format: MessageFormat, ansi_enabled: bool) -> Self {
        LogFormatter {
            message_format,
            ansi_enabled,
        }
    }

    pub fn try_from_env() -> Result<Self> {
        Ok(Self::new(
            MessageFormat::from_env_value(env::var(LOGGING_FORMATTER_ENV_VAR).ok())?,
            ansi_enabled_from_env_value(env::var(LOGGING_ANSI_ENABLED_ENV_VAR).ok())?,
        ))
    }

    /// Builds the formatting layer. Each formatter is a distinct type, so they are boxed.
    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer().with_ansi(self.ansi_enabled);
        match self.message_format {
            MessageFormat::Full => layer.boxed(),
            MessageFormat::Compact => layer.compact().boxed(),
            MessageFormat::Pretty => layer.pretty().boxed(),
            MessageFormat::Json => layer.json().boxed(),
        }
    }
}

fn ansi_enabled_from_env_value(value: Option<String>) -> Result<bool> {
    value
        .map(|ansi_enabled_str| {
            ansi_enabled_str
                .to_lowercase()
                .parse()
                .context(error::LogAnsiEnvSnafu {
                    env_value: ansi_enabled_str.to_string(),
                })
        })
        .unwrap_or(Ok(false))
}

/// The message format for logging tracing events.
///
/// See https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/format/index.html
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// Human-readable, single-line logs for each event.
    Full,
    /// A variant of the default formatter optimized for short line lengths.
    Compact,
    #[default]
    /// Pretty-formatted multi-line logs optimized for human readability.
    Pretty,
    /// Newline-delimited JSON logs.
    Json,
}

impl MessageFormat {
    fn from_env_value(value: Option<String>) -> Result<Self> {
        value
            .map(|formatter| {
                serde_plain::from_str(&formatter).context(error::LogFormatterEnvSnafu {
                    env_value: formatter,
                })
            })
            .unwrap_or(Ok(Default::default()))
    }
}

/// Installs the global tracing subscriber, configured from the environment.
pub fn init_telemetry_from_env() -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(DEFAULT_TRACING_FILTER_DIRECTIVE.into())
        .with_env_var(TRACING_FILTER_DIRECTIVE_ENV_VAR)
        .from_env_lossy();

    let subscriber = Registry::default()
        .with(LogFormatter::try_from_env()?.layer())
        .with(env_filter);

    tracing::subscriber::set_global_default(subscriber)
        .context(error::TracingConfigurationSnafu)?;

    Ok(())
}

pub mod error {
    use std::str::ParseBoolError;

    use super::*;
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum TelemetryConfigError {
        #[snafu(display("Error configuring tracing: '{}'", source))]
        TracingConfiguration {
            source: tracing::subscriber::SetGlobalDefaultError,
        },

        #[snafu(display(
            "Could not parse formatter from environment variable '{}={}': '{}'",
            LOGGING_FORMATTER_ENV_VAR,
            env_value,
            source
        ))]
        LogFormatterEnv {
            source: serde_plain::Error,
            env_value: String,
        },

        #[snafu(display(
            "Could not parse ANSI enablement from environment variable '{}={}': '{}'",
            LOGGING_ANSI_ENABLED_ENV_VAR,
            env_value,
            source
        ))]
        LogAnsiEnv {
            source: ParseBoolError,
            env_value: String,
        },
    }
}

type Result<T> = std::result::Result<T, TelemetryConfigError>;
pub use error::TelemetryConfigError;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_message_format_from_env_value() {
        let test_cases = vec![
            (None, MessageFormat::Pretty),
            (Some("json"), MessageFormat::Json),
            (Some("compact"), MessageFormat::Compact),
            (Some("full"), MessageFormat::Full),
        ];
        for (value, expected) in test_cases {
            assert_eq!(
                MessageFormat::from_env_value(value.map(String::from)).unwrap(),
                expected
            );
        }
        assert!(MessageFormat::from_env_value(Some("xml".to_string())).is_err());
    }

    #[test]
    fn test_ansi_enabled_from_env_value() {
        assert!(!ansi_enabled_from_env_value(None).unwrap());
        assert!(ansi_enabled_from_env_value(Some("TRUE".to_string())).unwrap());
        assert!(!ansi_enabled_from_env_value(Some("false".to_string())).unwrap());
        assert!(ansi_enabled_from_env_value(Some("yes".to_string())).is_err());
    }
}
