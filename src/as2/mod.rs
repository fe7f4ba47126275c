//! AS2 wire-level primitives shared by the sending and receiving sides:
//! signing algorithms, content-transfer encodings, MDN disposition
//! options, and the request/response model around the transport seam.

mod request;
mod transport;

pub use request::{As2ClientRequest, As2ClientResponse, Mdn, RequestPayload};
pub use transport::{
    As2Transport, As2TransportFactory, HttpIncomingDumper, HttpOutgoingDumper,
    HttpOutgoingDumperFactory,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// AS2 header names used on the wire.
pub mod header {
    /// Protocol version header.
    pub const AS2_VERSION: &str = "AS2-Version";
    /// Sender AS2 id.
    pub const AS2_FROM: &str = "AS2-From";
    /// Receiver AS2 id.
    pub const AS2_TO: &str = "AS2-To";
    /// Message subject.
    pub const SUBJECT: &str = "Subject";
    /// Unique message id.
    pub const MESSAGE_ID: &str = "Message-ID";
    /// Requests an MDN; some receivers only issue one when it is present.
    pub const DISPOSITION_NOTIFICATION_TO: &str = "Disposition-Notification-To";
    /// Signed-receipt requirements.
    pub const DISPOSITION_NOTIFICATION_OPTIONS: &str = "Disposition-Notification-Options";
    /// MIME content type.
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// MIME transfer encoding.
    pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
}

/// S/MIME signing algorithm of the AS2 message and its MDN MIC.
///
/// Peppol AS2 v1 mandates SHA-1, v2 mandates SHA-256; messages are never
/// encrypted on the business level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// SHA-1, used by the Peppol AS2 v1 profile.
    Sha1,
    /// SHA-256, used by the Peppol AS2 v2 profile.
    Sha256,
}

impl SigningAlgorithm {
    /// The `micalg` parameter value (RFC 3851 names).
    pub fn mic_alg(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha-256",
        }
    }

    /// Parse a `micalg` value, accepting both dashed and plain spellings.
    pub fn from_mic_alg(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Some(Self::Sha1),
            "sha256" | "sha-256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mic_alg())
    }
}

/// MIME `Content-Transfer-Encoding` of the AS2 payload body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentTransferEncoding {
    /// The AS2 default.
    #[default]
    Binary,
    /// Base64 text encoding.
    Base64,
    /// Quoted-printable text encoding.
    QuotedPrintable,
    /// 7bit pass-through.
    SevenBit,
    /// 8bit pass-through.
    EightBit,
}

impl ContentTransferEncoding {
    /// The header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
        }
    }
}

impl std::fmt::Display for ContentTransferEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Importance attached to a signed-receipt requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Importance {
    /// The receiver must honor the requirement.
    Required,
    /// The receiver may ignore the requirement.
    Optional,
}

impl Importance {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
        }
    }
}

/// The signature protocol requested for signed receipts.
pub const PROTOCOL_PKCS7_SIGNATURE: &str = "pkcs7-signature";

/// Error parsing a `Disposition-Notification-Options` header.
#[derive(Debug, Error)]
#[error("invalid Disposition-Notification-Options header: {0}")]
pub struct DispositionOptionsParseError(String);

/// The `Disposition-Notification-Options` header: which receipt
/// signature protocol and MIC algorithm the sender demands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispositionOptions {
    /// Requested MIC algorithm. Must match the message signing algorithm.
    pub mic_alg: SigningAlgorithm,
    /// Importance of the MIC algorithm requirement.
    pub mic_alg_importance: Importance,
    /// Requested receipt signature protocol.
    pub protocol: String,
    /// Importance of the protocol requirement.
    pub protocol_importance: Importance,
}

impl DispositionOptions {
    /// The Peppol defaults: both requirements required, PKCS#7 receipts.
    pub fn for_signing_algorithm(mic_alg: SigningAlgorithm) -> Self {
        Self {
            mic_alg,
            mic_alg_importance: Importance::Required,
            protocol: PROTOCOL_PKCS7_SIGNATURE.to_string(),
            protocol_importance: Importance::Required,
        }
    }

    /// Render the header value.
    pub fn as_header_value(&self) -> String {
        format!(
            "signed-receipt-protocol={}, {}; signed-receipt-micalg={}, {}",
            self.protocol_importance.as_str(),
            self.protocol,
            self.mic_alg_importance.as_str(),
            self.mic_alg.mic_alg()
        )
    }

    /// Parse a header value, tolerating parameter order and whitespace.
    pub fn parse(value: &str) -> Result<Self, DispositionOptionsParseError> {
        let mut mic_alg = None;
        let mut mic_alg_importance = Importance::Required;
        let mut protocol = None;
        let mut protocol_importance = Importance::Required;

        for part in value.split(';') {
            let Some((name, rest)) = part.split_once('=') else {
                continue;
            };
            let mut values = rest.split(',').map(str::trim);
            let importance = match values.next() {
                Some("optional") => Importance::Optional,
                _ => Importance::Required,
            };
            match name.trim().to_ascii_lowercase().as_str() {
                "signed-receipt-protocol" => {
                    protocol_importance = importance;
                    protocol = values.next().map(str::to_string);
                }
                "signed-receipt-micalg" => {
                    mic_alg_importance = importance;
                    // Several algorithms may be listed; take the first
                    // one this implementation supports.
                    mic_alg = values.find_map(SigningAlgorithm::from_mic_alg);
                }
                _ => {}
            }
        }

        match (mic_alg, protocol) {
            (Some(mic_alg), Some(protocol)) => Ok(Self {
                mic_alg,
                mic_alg_importance,
                protocol,
                protocol_importance,
            }),
            _ => Err(DispositionOptionsParseError(value.to_string())),
        }
    }
}

impl std::fmt::Display for DispositionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_header_value())
    }
}
