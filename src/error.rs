//! Error types for fetching, transport and registry construction.

use crate::schema::SiteSchema;
use thiserror::Error;

/// Failure of a single transport request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The HTTP client could not be built (bad proxy URL, TLS setup).
    #[error("HTTP client error: {0}")]
    Client(String),

    /// No response was obtained (DNS, refused, reset).
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// The response body could not be read.
    #[error("failed to read body: {0}")]
    Body(String),
}

/// Per-request failure of a dispatch.
///
/// None of these are fatal to the process. The dispatcher logs them and
/// surfaces an absent result to its caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("no cookie supplied")]
    MissingCredentials,

    #[error("connection to {url} failed: {source}")]
    ConnectionFailed {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("{url} answered with status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("redirect stub at {url} has no usable window.location target")]
    DecoyPageUnresolvable { url: String },

    #[error("anti-scrape redirect to {target} failed: {reason}")]
    AntiScrapeRedirectFailed { target: String, reason: String },

    #[error("index fallback at {target} failed: {reason}")]
    DecoyHomepageFallbackFailed { target: String, reason: String },

    #[error("browser could not open {url}: {reason}")]
    BrowserNavigationFailed { url: String, reason: String },

    #[error("browser did not get past the challenge at {url}")]
    ChallengeNotPassed { url: String },
}

impl FetchError {
    /// Name of the fetch stage that produced this failure.
    pub fn stage(&self) -> &'static str {
        match self {
            FetchError::MissingCredentials => "precondition",
            FetchError::ConnectionFailed { .. } | FetchError::BadStatus { .. } => "primary",
            FetchError::DecoyPageUnresolvable { .. }
            | FetchError::AntiScrapeRedirectFailed { .. } => "redirect",
            FetchError::DecoyHomepageFallbackFailed { .. } => "index-fallback",
            FetchError::BrowserNavigationFailed { .. } | FetchError::ChallengeNotPassed { .. } => {
                "emulation"
            }
        }
    }
}

/// Startup misconfiguration of the schema registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No parser was registered under the fallback schema.
    #[error("no parser registered for the default schema {0}")]
    Empty(SiteSchema),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(FetchError::MissingCredentials.stage(), "precondition");
        assert_eq!(
            FetchError::BadStatus {
                url: "https://a.test".into(),
                status: 503
            }
            .stage(),
            "primary"
        );
        assert_eq!(
            FetchError::DecoyPageUnresolvable {
                url: "https://a.test".into()
            }
            .stage(),
            "redirect"
        );
        assert_eq!(
            FetchError::ChallengeNotPassed {
                url: "https://a.test".into()
            }
            .stage(),
            "emulation"
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = FetchError::ConnectionFailed {
            url: "https://a.test".into(),
            source: TransportError::Timeout,
        };
        assert_eq!(
            err.to_string(),
            "connection to https://a.test failed: request timed out"
        );
        assert_eq!(
            RegistryError::Empty(SiteSchema::NexusPhp).to_string(),
            "no parser registered for the default schema nexusphp"
        );
    }
}
