//! Harness-level error taxonomy.

use thiserror::Error;

use crate::config::ConfigError;
use crate::discovery::RegistrationError;
use crate::handler::ListenerError;
use crate::net::tls::TlsError;

/// A fatal error. None of these are retried; the process exits after
/// best-effort deregistration.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),
}

impl From<TlsError> for HarnessError {
    fn from(e: TlsError) -> Self {
        Self::Configuration(ConfigError::Tls(e))
    }
}

impl HarnessError {
    /// Name of the startup step that failed.
    pub fn step(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Registration(_) => "registration",
            Self::Listener(_) => "listener",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_names() {
        let err = HarnessError::from(RegistrationError::NoEndpoints);
        assert_eq!(err.step(), "registration");
        assert_eq!(err.to_string(), "registration error: no discovery endpoints configured");

        let err = HarnessError::from(TlsError::Missing("private key"));
        assert_eq!(err.step(), "configuration");

        let err = HarnessError::from(ListenerError::Crashed("panic".into()));
        assert_eq!(err.step(), "listener");
    }
}
