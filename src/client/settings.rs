//! Assembled AS2 client settings handed to the transport.

use std::sync::Arc;
use std::time::Duration;

use crate::as2::{
    DispositionOptions, HttpIncomingDumper, HttpOutgoingDumperFactory, SigningAlgorithm,
};
use crate::cert::Certificate;
use crate::keystore::KeyStoreConfig;

/// Default connect timeout of the AS2 HTTP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default read timeout of the AS2 HTTP connection.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Fixed sender-side partner data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderSettings {
    /// The `AS2-From` id, i.e. the subject CN of the sender AP certificate.
    pub as2_id: String,
    /// Sender contact email, required by AS2 though unused in Peppol.
    pub email: String,
    /// Key alias of the sender's private key in the key store.
    pub key_alias: String,
}

/// Receiver-side partner data, usually filled from the SMP lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverSettings {
    /// The `AS2-To` id, i.e. the subject CN of the receiver AP certificate.
    pub as2_id: String,
    /// Key alias under which the receiver certificate is stored.
    pub key_alias: String,
    /// The receiver's AS2 endpoint URL.
    pub url: String,
}

/// Everything the transport needs for one exchange.
///
/// Assembled by the builder in its settings step; user code normally
/// never constructs this directly.
#[derive(Clone)]
pub struct As2ClientSettings {
    /// Key store binding.
    pub key_store: KeyStoreConfig,
    /// Sender partner data.
    pub sender: SenderSettings,
    /// Receiver partner data.
    pub receiver: ReceiverSettings,
    /// The receiver's AP certificate for MDN verification.
    pub receiver_certificate: Certificate,
    /// Partnership name, `"<senderAS2Id>-<receiverAS2Id>"`.
    pub partnership_name: String,
    /// Signed-receipt requirements; the MIC algorithm equals the
    /// signing algorithm.
    pub mdn_options: DispositionOptions,
    /// Message signing algorithm. Peppol AS2 forbids encryption, so
    /// there is no encryption algorithm to configure.
    pub signing_algorithm: SigningAlgorithm,
    /// Message-id template (see [`crate::client::expand_message_id`]).
    pub message_id_format: String,
    /// Bounds the TCP+TLS handshake.
    pub connect_timeout: Duration,
    /// Bounds any single socket read.
    pub read_timeout: Duration,
    /// Optional dumper factory for outgoing traffic.
    pub outgoing_dumper_factory: Option<Arc<dyn HttpOutgoingDumperFactory>>,
    /// Optional dumper for incoming traffic.
    pub incoming_dumper: Option<Arc<dyn HttpIncomingDumper>>,
    /// Extra headers set on the outgoing message, in order.
    pub custom_headers: Vec<(String, String)>,
    /// Explicit HTTP proxy URL, if any.
    pub proxy: Option<String>,
    /// Verbose transport diagnostics.
    pub debug: bool,
}

impl As2ClientSettings {
    /// First custom header value with the given name, case-insensitive.
    pub fn custom_header(&self, name: &str) -> Option<&str> {
        self.custom_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Debug for As2ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("As2ClientSettings")
            .field("sender", &self.sender)
            .field("receiver", &self.receiver)
            .field("partnership_name", &self.partnership_name)
            .field("signing_algorithm", &self.signing_algorithm)
            .field("message_id_format", &self.message_id_format)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("custom_headers", &self.custom_headers)
            .field("proxy", &self.proxy)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}
