//! AS2 request and response model.

use chrono::{DateTime, Utc};

use super::ContentTransferEncoding;

/// How the payload is attached to the outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPayload {
    /// Typed binary attachment; the MIME layer takes the declared type.
    Handler {
        /// The serialized SBD bytes.
        bytes: Vec<u8>,
        /// MIME type of the attachment.
        mime_type: String,
    },
    /// UTF-8 text attachment with an explicitly forced `Content-Type`.
    ///
    /// Some MIME layers infer `text/plain` for string bodies; the
    /// explicit content type overrides that.
    Text {
        /// The serialized SBD as UTF-8 text.
        text: String,
        /// The `Content-Type` to force on the body part.
        content_type: String,
    },
}

impl RequestPayload {
    /// The effective `Content-Type` of the body part.
    pub fn content_type(&self) -> &str {
        match self {
            Self::Handler { mime_type, .. } => mime_type,
            Self::Text { content_type, .. } => content_type,
        }
    }

    /// The payload bytes regardless of attachment style.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Handler { bytes, .. } => bytes,
            Self::Text { text, .. } => text.as_bytes(),
        }
    }
}

/// One outgoing AS2 message, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct As2ClientRequest {
    /// The AS2 `Subject` header.
    pub subject: String,
    /// The message body.
    pub payload: RequestPayload,
    /// MIME transfer encoding of the body part.
    pub content_transfer_encoding: ContentTransferEncoding,
}

/// The MDN extracted from the receiver's synchronous response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mdn {
    /// The MDN's own message id.
    pub message_id: Option<String>,
    /// The machine-readable disposition line.
    pub disposition: String,
    /// The `Received-Content-MIC` reported by the receiver.
    pub mic: Option<String>,
    /// Human-readable MDN text.
    pub text: Option<String>,
    /// Whether the MDN signature verified against the receiver
    /// certificate. `None` when the MDN was unsigned.
    pub signature_verified: Option<bool>,
    /// Whether the reported MIC matches the MIC computed over the
    /// outbound body. `None` when no MIC was reported.
    pub mic_matched: Option<bool>,
}

/// Everything that came back from one synchronous send.
///
/// Transport-level failures are attributes of the response, never
/// panics or errors, so callers can always inspect headers and MIC
/// outcomes even for failed exchanges.
#[derive(Debug, Clone, Default)]
pub struct As2ClientResponse {
    /// The MDN, when one was received and parsed.
    pub mdn: Option<Mdn>,
    /// When the response was received.
    pub received_at: Option<DateTime<Utc>>,
    /// Raw response headers in receive order.
    pub headers: Vec<(String, String)>,
    /// Description of a socket/TLS/HTTP or MDN-verification failure.
    pub exception: Option<String>,
    /// Raw response text, when the transport retained it.
    pub raw_text: Option<String>,
}

impl As2ClientResponse {
    /// Whether an MDN is present.
    pub fn has_mdn(&self) -> bool {
        self.mdn.is_some()
    }

    /// Whether the exchange failed at the transport level.
    pub fn has_exception(&self) -> bool {
        self.exception.is_some()
    }

    /// First header value with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
