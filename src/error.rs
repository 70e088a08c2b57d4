//! Error taxonomy shared by every module.
//!
//! Only validation and configuration problems are errors. A port that refuses
//! or times out is an ordinary probe outcome and never shows up here.
use thiserror::Error;

/// Exit status for bad user input (port spec, numeric option, IP literal).
pub const EXIT_INPUT: i32 = 2;
/// Exit status for a host that does not resolve.
pub const EXIT_RESOLUTION: i32 = 3;
/// Exit status for internal misuse or exhausted resources.
pub const EXIT_CONFIGURATION: i32 = 4;

/// Everything that can abort a module before or during a scan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The port specification was empty or only contained separators.
    #[error("No valid ports or ranges provided")]
    EmptySpec,

    /// A single port segment was not a number in 1-65535.
    #[error("{0}")]
    InvalidPort(String),

    /// A range segment was malformed, reversed or out of bounds.
    #[error("{0}")]
    InvalidRange(String),

    /// A numeric or enumerated option could not be accepted.
    #[error("{0}")]
    InvalidOption(String),

    /// The target host did not resolve to any address.
    #[error("Cannot resolve hostname '{0}'")]
    Resolution(String),

    /// The scanner was misused or ran out of resources mid-scan.
    #[error("{0}")]
    Configuration(String),
}

impl ScanError {
    /// True for the errors caused by what the user typed.
    pub const fn is_input(&self) -> bool {
        matches!(
            self,
            Self::EmptySpec | Self::InvalidPort(_) | Self::InvalidRange(_) | Self::InvalidOption(_)
        )
    }

    /// Process exit status a binary should terminate with.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Resolution(_) => EXIT_RESOLUTION,
            Self::Configuration(_) => EXIT_CONFIGURATION,
            _ => EXIT_INPUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_share_one_status() {
        let errors = [
            ScanError::EmptySpec,
            ScanError::InvalidPort("x".to_owned()),
            ScanError::InvalidRange("x".to_owned()),
            ScanError::InvalidOption("x".to_owned()),
        ];
        for err in errors {
            assert!(err.is_input());
            assert_eq!(err.exit_code(), EXIT_INPUT);
        }
    }

    #[test]
    fn fatal_errors_have_distinct_statuses() {
        let resolution = ScanError::Resolution("nowhere.invalid".to_owned());
        let configuration = ScanError::Configuration("boom".to_owned());

        assert!(!resolution.is_input());
        assert_ne!(resolution.exit_code(), configuration.exit_code());
        assert_ne!(resolution.exit_code(), EXIT_INPUT);
        assert_eq!(
            resolution.to_string(),
            "Cannot resolve hostname 'nowhere.invalid'"
        );
    }
}
