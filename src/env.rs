//! Which environment previewsync runs in.
//!
//! Read from `PREVIEWSYNC_ENV`:
//! - `test`: config lives under the system temp dir so tests never touch the
//!   user's real configuration
//! - `development` or `dev`: debug logging unless `RUST_LOG` says otherwise
//! - anything else, or unset: production

/// Variable consulted by [`Environment::current`].
pub const ENV_VAR: &str = "PREVIEWSYNC_ENV";

/// Runtime environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    /// Normal use.
    #[default]
    Production,
    /// Local hacking on previewsync itself.
    Development,
    /// Test runs.
    Test,
}

impl Environment {
    /// Environment named by `PREVIEWSYNC_ENV`.
    #[must_use]
    pub fn current() -> Self {
        std::env::var(ENV_VAR)
            .map(|value| Self::from_name(&value))
            .unwrap_or_default()
    }

    fn from_name(value: &str) -> Self {
        match value {
            "test" => Self::Test,
            "development" | "dev" => Self::Development,
            _ => Self::Production,
        }
    }

    /// `env_logger` filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_log_filter(self) -> &'static str {
        if self == Self::Development {
            "debug"
        } else {
            "info"
        }
    }
}

/// Whether `PREVIEWSYNC_ENV=test`.
#[must_use]
pub fn is_test_mode() -> bool {
    Environment::current() == Environment::Test
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(Environment::from_name("test"), Environment::Test);
        assert_eq!(Environment::from_name("dev"), Environment::Development);
        assert_eq!(Environment::from_name("development"), Environment::Development);
        assert_eq!(Environment::from_name("staging"), Environment::Production);
        assert_eq!(Environment::from_name(""), Environment::Production);
    }

    #[test]
    fn test_default_log_filter() {
        assert_eq!(Environment::Development.default_log_filter(), "debug");
        assert_eq!(Environment::Production.default_log_filter(), "info");
        assert_eq!(Environment::Test.default_log_filter(), "info");
    }
}
