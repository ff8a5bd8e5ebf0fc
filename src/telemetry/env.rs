//! Deployment environment level attached to every exported resource.

use std::fmt;
use std::str::FromStr;

use super::error::Error;

/// Deployment environment of the running service.
///
/// `Invalid` is the zero value; the configuration gate rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum EnvLevel {
    #[default]
    Invalid = 0,
    Dev = 1,
    Qa = 2,
    Prod = 3,
}

impl EnvLevel {
    /// Canonical lowercase name, or `None` for [`EnvLevel::Invalid`].
    pub fn as_str(self) -> Option<&'static str> {
        match self {
            Self::Dev => Some("dev"),
            Self::Qa => Some("qa"),
            Self::Prod => Some("prod"),
            Self::Invalid => None,
        }
    }

    pub fn is_valid(self) -> bool {
        self != Self::Invalid
    }
}

impl fmt::Display for EnvLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(name) => f.write_str(name),
            None => write!(f, "UNKNOWN[{}]", *self as u8),
        }
    }
}

impl FromStr for EnvLevel {
    type Err = Error;

    /// Parses `dev`, `qa` or `prod`, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Dev, Self::Qa, Self::Prod]
            .into_iter()
            .find(|level| level.as_str().is_some_and(|name| name.eq_ignore_ascii_case(s)))
            .ok_or_else(|| Error::InvalidEnvironment(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_is_canonical_lowercase() {
        for input in ["dev", "DEV", "Dev", "qa", "QA", "prod", "PrOd"] {
            let level: EnvLevel = input.parse().unwrap();
            assert_eq!(level.to_string(), input.to_ascii_lowercase());
        }
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        let err = "staging".parse::<EnvLevel>().unwrap_err();
        assert!(matches!(err, Error::InvalidEnvironment(s) if s == "staging"));
        assert!("".parse::<EnvLevel>().is_err());
    }

    #[test]
    fn test_invalid_renders_unknown_marker() {
        assert_eq!(EnvLevel::Invalid.to_string(), "UNKNOWN[0]");
        assert!(!EnvLevel::default().is_valid());
    }
}
