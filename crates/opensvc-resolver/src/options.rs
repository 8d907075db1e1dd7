//! User selection: which port, and which scheme the API server should use

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Scheme override was something other than `http` or `https`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scheme must be \"http\" or \"https\" if specified")]
pub struct InvalidScheme(pub String);

/// Scheme used between the API server and the service backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    /// Parse an optional override. The empty string means "no override".
    pub fn parse_override(s: &str) -> Result<Option<Self>, InvalidScheme> {
        if s.is_empty() {
            return Ok(None);
        }
        s.parse().map(Some)
    }
}

impl FromStr for Scheme {
    type Err = InvalidScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(InvalidScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Port and scheme selection for a single resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionOptions {
    /// Requested port name; empty selects the first declared port
    pub port_name: String,
    /// Scheme override; `None` lets the resolver infer it
    pub scheme: Option<Scheme>,
}

impl SelectionOptions {
    /// Build options from raw user input, validating the scheme override.
    pub fn new(port_name: impl Into<String>, scheme: &str) -> Result<Self, InvalidScheme> {
        Ok(Self {
            port_name: port_name.into(),
            scheme: Scheme::parse_override(scheme)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        assert_eq!(Scheme::parse_override("").unwrap(), None);
        assert_eq!(Scheme::parse_override("http").unwrap(), Some(Scheme::Http));
        assert_eq!(
            Scheme::parse_override("https").unwrap(),
            Some(Scheme::Https)
        );
    }

    #[test]
    fn test_invalid_scheme() {
        let err = SelectionOptions::new("", "tcp").unwrap_err();
        assert_eq!(err, InvalidScheme("tcp".to_string()));
        assert_eq!(
            err.to_string(),
            r#"scheme must be "http" or "https" if specified"#
        );
    }

    #[test]
    fn test_scheme_is_case_sensitive() {
        assert!("HTTPS".parse::<Scheme>().is_err());
    }

    #[test]
    fn test_selection_defaults() {
        let options = SelectionOptions::default();
        assert!(options.port_name.is_empty());
        assert!(options.scheme.is_none());
    }
}
