//! Peppol identifier primitives: participants, document types, processes,
//! and transport profiles.
//!
//! All identifiers share the `{scheme, value}` shape with a per-type
//! default scheme and the canonical `scheme::value` URI-encoded form used
//! in SMP lookups and SBDH business scopes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default scheme for participant identifiers.
pub const DEFAULT_PARTICIPANT_SCHEME: &str = "iso6523-actorid-upis";

/// Standard scheme for document type identifiers.
pub const DOCUMENT_TYPE_SCHEME_BUSDOX_DOCID_QNS: &str = "busdox-docid-qns";

/// Wildcard document type scheme (Peppol doctype wildcard matching).
pub const DOCUMENT_TYPE_SCHEME_PEPPOL_DOCTYPE_WILDCARD: &str = "peppol-doctype-wildcard";

/// Default scheme for process identifiers.
pub const DEFAULT_PROCESS_SCHEME: &str = "cenbii-procid-ubl";

/// Error parsing an identifier from its URI-encoded form.
#[derive(Debug, Error)]
#[error("invalid identifier '{input}': expected 'scheme::value'")]
pub struct IdentifierParseError {
    /// The rejected input.
    pub input: String,
}

fn split_uri_encoded(input: &str) -> Result<(&str, &str), IdentifierParseError> {
    match input.split_once("::") {
        Some((scheme, value)) if !scheme.is_empty() && !value.is_empty() => Ok((scheme, value)),
        _ => Err(IdentifierParseError {
            input: input.to_string(),
        }),
    }
}

/// A Peppol participant identifier (sender or receiver endpoint id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantIdentifier {
    /// Identifier scheme (e.g. `iso6523-actorid-upis`).
    pub scheme: String,
    /// Scheme-specific value (e.g. `9915:test`).
    pub value: String,
}

impl ParticipantIdentifier {
    /// Create a participant identifier with an explicit scheme.
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    /// Create a participant identifier using the default Peppol scheme.
    pub fn with_default_scheme(value: impl Into<String>) -> Self {
        Self::new(DEFAULT_PARTICIPANT_SCHEME, value)
    }

    /// Parse the canonical `scheme::value` form.
    pub fn from_uri_encoded(input: &str) -> Result<Self, IdentifierParseError> {
        let (scheme, value) = split_uri_encoded(input)?;
        Ok(Self::new(scheme, value))
    }

    /// The canonical `scheme::value` form.
    pub fn uri_encoded(&self) -> String {
        format!("{}::{}", self.scheme, self.value)
    }

    /// Whether this identifier uses the given scheme.
    pub fn has_scheme(&self, expected: &str) -> bool {
        self.scheme == expected
    }
}

impl std::fmt::Display for ParticipantIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.scheme, self.value)
    }
}

/// A Peppol document type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentTypeIdentifier {
    /// Identifier scheme (e.g. `busdox-docid-qns`).
    pub scheme: String,
    /// Scheme-specific value (the full qualified document type string).
    pub value: String,
}

impl DocumentTypeIdentifier {
    /// Create a document type identifier with an explicit scheme.
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    /// Create a document type identifier using the `busdox-docid-qns` scheme.
    pub fn with_default_scheme(value: impl Into<String>) -> Self {
        Self::new(DOCUMENT_TYPE_SCHEME_BUSDOX_DOCID_QNS, value)
    }

    /// Parse the canonical `scheme::value` form.
    pub fn from_uri_encoded(input: &str) -> Result<Self, IdentifierParseError> {
        let (scheme, value) = split_uri_encoded(input)?;
        Ok(Self::new(scheme, value))
    }

    /// The canonical `scheme::value` form.
    pub fn uri_encoded(&self) -> String {
        format!("{}::{}", self.scheme, self.value)
    }

    /// Whether this identifier uses the given scheme.
    pub fn has_scheme(&self, expected: &str) -> bool {
        self.scheme == expected
    }
}

impl std::fmt::Display for DocumentTypeIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.scheme, self.value)
    }
}

/// A Peppol process identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessIdentifier {
    /// Identifier scheme (e.g. `cenbii-procid-ubl`).
    pub scheme: String,
    /// Scheme-specific value (the process/profile URN).
    pub value: String,
}

impl ProcessIdentifier {
    /// Create a process identifier with an explicit scheme.
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    /// Create a process identifier using the default `cenbii-procid-ubl` scheme.
    pub fn with_default_scheme(value: impl Into<String>) -> Self {
        Self::new(DEFAULT_PROCESS_SCHEME, value)
    }

    /// Parse the canonical `scheme::value` form.
    pub fn from_uri_encoded(input: &str) -> Result<Self, IdentifierParseError> {
        let (scheme, value) = split_uri_encoded(input)?;
        Ok(Self::new(scheme, value))
    }

    /// The canonical `scheme::value` form.
    pub fn uri_encoded(&self) -> String {
        format!("{}::{}", self.scheme, self.value)
    }

    /// Whether this identifier uses the given scheme.
    pub fn has_scheme(&self, expected: &str) -> bool {
        self.scheme == expected
    }
}

impl std::fmt::Display for ProcessIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.scheme, self.value)
    }
}

/// A transport profile identifier used for SMP endpoint selection.
///
/// Only equality matters; the ordered list of profiles passed to the
/// resolver drives which endpoint of a service registration is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportProfile {
    id: std::borrow::Cow<'static, str>,
}

impl TransportProfile {
    /// Peppol AS2 profile v1 (SHA-1 signing).
    pub const AS2_V1: TransportProfile = TransportProfile {
        id: std::borrow::Cow::Borrowed("busdox-transport-as2-ver1p0"),
    };

    /// Peppol AS2 profile v2 (SHA-256 signing).
    pub const AS2_V2: TransportProfile = TransportProfile {
        id: std::borrow::Cow::Borrowed("busdox-transport-as2-ver2p0"),
    };

    /// Create a custom transport profile.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: std::borrow::Cow::Owned(id.into()),
        }
    }

    /// The profile identifier string.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for TransportProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}
