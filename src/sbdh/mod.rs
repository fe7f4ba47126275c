//! Standard Business Document envelope: model, writer, and reader.
//!
//! The SBD wraps the business payload with the routing metadata Peppol
//! needs: sender, receiver, document type, process, and a document
//! identification block. The writer binds the SBDH namespace to the
//! default (empty) prefix unless told otherwise — several receiver
//! implementations scan the raw bytes for `<StandardBusinessDocument`
//! and choke on a prefixed form.

mod read;
mod write;

pub use read::{parse_sbd, parse_sbd_str};
pub use write::to_sbdh_xml;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::identifier::{
    DocumentTypeIdentifier, ParticipantIdentifier, ProcessIdentifier,
};
use crate::xml::XmlElement;

/// The SBDH namespace URI.
pub const SBDH_NAMESPACE: &str =
    "http://www.unece.org/cefact/namespaces/StandardBusinessDocumentHeader";

/// The SBDH header version written into every envelope.
pub const HEADER_VERSION: &str = "1.0";

/// Default UBL type version when none is configured.
pub const DEFAULT_UBL_VERSION: &str = "2.1";

/// Business scope type carrying the document type identifier.
pub const SCOPE_DOCUMENT_ID: &str = "DOCUMENTID";

/// Business scope type carrying the process identifier.
pub const SCOPE_PROCESS_ID: &str = "PROCESSID";

/// Error producing or consuming an SBD envelope.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SbdhError {
    /// XML reading or writing failed.
    #[error("SBDH XML error: {0}")]
    Xml(String),

    /// The document bytes are not valid UTF-8.
    #[error("SBD is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    /// The root element is not an SBDH `StandardBusinessDocument`.
    #[error("unexpected root element '{found}', expected StandardBusinessDocument")]
    UnexpectedRoot {
        /// Local name of the root element encountered.
        found: String,
    },

    /// A mandatory header field is absent.
    #[error("SBDH is missing the mandatory field {0}")]
    MissingField(&'static str),

    /// `CreationDateAndTime` could not be parsed.
    #[error("invalid SBDH creation timestamp: {0}")]
    InvalidTimestamp(String),

    /// The business payload element has no namespace, so the
    /// `DocumentIdentification/Standard` entry cannot be derived.
    #[error("business document root element has no namespace")]
    PayloadNamespaceMissing,
}

impl From<quick_xml::Error> for SbdhError {
    fn from(e: quick_xml::Error) -> Self {
        SbdhError::Xml(e.to_string())
    }
}

/// Namespace binding used when serializing the envelope.
///
/// The default context maps the SBDH namespace to the default (empty)
/// prefix, which is what Peppol receivers expect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceContext {
    sbdh_prefix: Option<String>,
}

impl NamespaceContext {
    /// The compatibility default: SBDH bound to the empty prefix.
    pub fn default_prefix() -> Self {
        Self::default()
    }

    /// Bind the SBDH namespace to a named prefix instead.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            sbdh_prefix: Some(prefix.into()),
        }
    }

    /// The configured prefix, if any.
    pub fn sbdh_prefix(&self) -> Option<&str> {
        self.sbdh_prefix.as_deref()
    }
}

/// A Standard Business Document: routing header data plus the verbatim
/// business payload element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeppolSbd {
    /// Peppol participant id of the sender.
    pub sender: ParticipantIdentifier,
    /// Peppol participant id of the receiver.
    pub receiver: ParticipantIdentifier,
    /// Document type, mirrored into the `DOCUMENTID` business scope.
    pub document_type: DocumentTypeIdentifier,
    /// Process, mirrored into the `PROCESSID` business scope.
    pub process: ProcessIdentifier,
    /// Unique envelope instance id.
    pub instance_identifier: String,
    /// UBL type version (`DocumentIdentification/TypeVersion`).
    pub ubl_version: String,
    /// Envelope creation time, millisecond precision.
    pub creation_date_time: DateTime<Utc>,
    /// The business payload, byte-preserved.
    pub business_message: XmlElement,
}

/// Assemble an SBD around a business payload.
///
/// When `instance_identifier` is absent a fresh UUID is generated; when
/// `ubl_version` is absent [`DEFAULT_UBL_VERSION`] is used. The creation
/// time is truncated to millisecond precision so that a serialize/parse
/// round trip reproduces the document exactly.
pub fn build_sbd(
    sender: &ParticipantIdentifier,
    receiver: &ParticipantIdentifier,
    document_type: &DocumentTypeIdentifier,
    process: &ProcessIdentifier,
    instance_identifier: Option<&str>,
    ubl_version: Option<&str>,
    business_message: XmlElement,
) -> PeppolSbd {
    let now = Utc::now();
    let creation = DateTime::<Utc>::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
    PeppolSbd {
        sender: sender.clone(),
        receiver: receiver.clone(),
        document_type: document_type.clone(),
        process: process.clone(),
        instance_identifier: instance_identifier
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        ubl_version: ubl_version.unwrap_or(DEFAULT_UBL_VERSION).to_string(),
        creation_date_time: creation,
        business_message,
    }
}
