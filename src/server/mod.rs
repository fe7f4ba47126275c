//! Inbound AS2 message handling.
//!
//! The HTTP runtime in front of this module hands over the raw request
//! (headers plus body); the S/MIME unwrapping itself is delegated to an
//! [`As2MessageDecoder`] implementation wrapping the actual AS2 codec.
//! This module resolves the partner certificate, drives the decoder,
//! parses the contained SBD, fans it out to the registered handlers in
//! registration order, and synthesizes the signed MDN for the response.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::as2::{header, DispositionOptions, SigningAlgorithm};
use crate::cert::Certificate;
use crate::sbdh::{parse_sbd, PeppolSbd, SbdhError};

/// Disposition line of a successful exchange.
pub const DISPOSITION_PROCESSED: &str = "automatic-action/MDN-sent-automatically; processed";

/// Disposition line of a failed exchange.
pub const DISPOSITION_ERROR: &str =
    "automatic-action/MDN-sent-automatically; processed/error: unexpected-processing-error";

/// A raw inbound AS2 request as received by the HTTP layer.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Request headers in receive order.
    pub headers: Vec<(String, String)>,
    /// Raw request body.
    pub body: Vec<u8>,
}

impl InboundMessage {
    /// First header value with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The decoded content of an inbound AS2 message.
#[derive(Debug, Clone)]
pub struct DecodedAs2Message {
    /// The verified payload (the SBD bytes).
    pub payload: Vec<u8>,
    /// The MIC computed over the received content, for the MDN.
    pub received_content_mic: Option<String>,
}

/// Error from the inbound pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InboundError {
    /// The request carries no `AS2-From` header.
    #[error("inbound message has no AS2-From header")]
    MissingAs2From,

    /// No certificate is known for the sending partner.
    #[error("no certificate known for partner '{0}'")]
    UnknownPartner(String),

    /// MIME parsing, signature verification, or decryption failed.
    #[error("failed to decode inbound AS2 message: {0}")]
    Decode(String),

    /// The payload is not a usable SBD.
    #[error(transparent)]
    Sbd(#[from] SbdhError),

    /// The MDN could not be produced.
    #[error("failed to produce MDN: {0}")]
    Mdn(String),
}

/// The seam to the external AS2/S-MIME codec on the receiving side.
pub trait As2MessageDecoder: Send + Sync {
    /// Unpack an inbound message: MIME parse, verify the S/MIME
    /// signature against the partner certificate, decompress and decrypt
    /// where applicable, and return the contained payload.
    fn decode(
        &self,
        message: &InboundMessage,
        partner_certificate: &Certificate,
    ) -> Result<DecodedAs2Message, InboundError>;

    /// Sign an MDN with the receiving side's private key using the given
    /// algorithm, producing the complete HTTP response parts.
    fn sign_mdn(&self, mdn: &MdnData, algorithm: SigningAlgorithm)
        -> Result<SignedMdn, InboundError>;
}

/// Resolves partner certificates from the `AS2-From` id, typically out
/// of the key store.
pub trait PartnerCertificateSource: Send + Sync {
    /// The certificate for the given partner, if known.
    fn certificate_for(&self, as2_id: &str) -> Option<Certificate>;
}

/// Routing metadata of an inbound message, passed to the handlers.
#[derive(Debug, Clone)]
pub struct IncomingMetadata<'a> {
    /// The sending partner's AS2 id.
    pub as2_from: &'a str,
    /// Our AS2 id as addressed by the sender.
    pub as2_to: Option<&'a str>,
    /// The AS2 message id.
    pub message_id: Option<&'a str>,
}

/// An application handler for received SBDs.
///
/// Handlers run on the server's request threads and must be thread-safe.
pub trait IncomingSbdHandler: Send + Sync {
    /// Process one received SBD. Errors are reported in the MDN per the
    /// dispatch policy.
    fn handle_incoming_sbd(
        &self,
        metadata: &IncomingMetadata<'_>,
        sbd: &PeppolSbd,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// How handler failures affect the remaining handlers and the MDN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Log the failure, keep invoking the remaining handlers, and report
    /// an error MDN at the end. The default.
    #[default]
    ContinueOnError,
    /// Stop at the first failing handler and report an error MDN.
    AbortOnFirstError,
}

/// The MDN content to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdnData {
    /// `Message-ID` of the message the MDN acknowledges.
    pub original_message_id: Option<String>,
    /// The machine-readable disposition line.
    pub disposition: String,
    /// The MIC computed over the received content.
    pub received_content_mic: Option<String>,
    /// Human-readable explanation.
    pub text: String,
}

/// A signed MDN ready to be written into the HTTP response.
#[derive(Debug, Clone)]
pub struct SignedMdn {
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Signed response body.
    pub body: Vec<u8>,
}

/// Outcome of one inbound exchange.
#[derive(Debug)]
pub struct InboundOutcome {
    /// The signed MDN to return to the sender.
    pub mdn: SignedMdn,
    /// Whether the message was accepted and dispatched without errors.
    pub accepted: bool,
    /// The parsed SBD, when the message got that far.
    pub sbd: Option<PeppolSbd>,
    /// Description of the failure, when not accepted.
    pub error: Option<String>,
}

/// The inbound AS2 endpoint logic behind an HTTP POST route.
pub struct As2InboundHandler {
    decoder: Box<dyn As2MessageDecoder>,
    partner_certificates: Box<dyn PartnerCertificateSource>,
    handlers: Vec<Box<dyn IncomingSbdHandler>>,
    dispatch_policy: DispatchPolicy,
    incoming_dumper: Option<std::sync::Arc<dyn crate::as2::HttpIncomingDumper>>,
    default_mdn_algorithm: SigningAlgorithm,
}

impl As2InboundHandler {
    /// A handler with no registered SBD consumers yet.
    pub fn new(
        decoder: Box<dyn As2MessageDecoder>,
        partner_certificates: Box<dyn PartnerCertificateSource>,
    ) -> Self {
        Self {
            decoder,
            partner_certificates,
            handlers: Vec::new(),
            dispatch_policy: DispatchPolicy::default(),
            incoming_dumper: None,
            default_mdn_algorithm: SigningAlgorithm::Sha256,
        }
    }

    /// Register an SBD handler. Handlers are invoked in registration
    /// order.
    pub fn register_handler(&mut self, handler: Box<dyn IncomingSbdHandler>) {
        self.handlers.push(handler);
    }

    /// Set the dispatch policy.
    pub fn dispatch_policy(mut self, policy: DispatchPolicy) -> Self {
        self.dispatch_policy = policy;
        self
    }

    /// Dump raw inbound traffic through this dumper.
    pub fn incoming_dumper(mut self, dumper: std::sync::Arc<dyn crate::as2::HttpIncomingDumper>) -> Self {
        self.incoming_dumper = Some(dumper);
        self
    }

    /// MDN signing algorithm used when the sender requested none.
    pub fn default_mdn_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.default_mdn_algorithm = algorithm;
        self
    }

    /// Handle one inbound POST.
    ///
    /// Wherever an MDN can still be issued, failures are reported inside
    /// it rather than as an error return; only an unproducible MDN makes
    /// this method fail.
    pub fn handle(&self, message: &InboundMessage) -> Result<InboundOutcome, InboundError> {
        if let Some(dumper) = &self.incoming_dumper {
            dumper.dump_incoming(&message.headers, &message.body);
        }

        let mdn_algorithm = self.requested_mdn_algorithm(message);
        let original_message_id = message.header(header::MESSAGE_ID).map(str::to_string);

        let as2_from = match message.header(header::AS2_FROM) {
            Some(from) => from.to_string(),
            None => {
                return self.error_outcome(
                    original_message_id,
                    None,
                    mdn_algorithm,
                    InboundError::MissingAs2From.to_string(),
                );
            }
        };
        debug!(as2_from, "received AS2 message");

        let Some(partner_certificate) = self.partner_certificates.certificate_for(&as2_from)
        else {
            return self.error_outcome(
                original_message_id,
                None,
                mdn_algorithm,
                InboundError::UnknownPartner(as2_from).to_string(),
            );
        };

        let decoded = match self.decoder.decode(message, &partner_certificate) {
            Ok(decoded) => decoded,
            Err(e) => {
                return self.error_outcome(original_message_id, None, mdn_algorithm, e.to_string());
            }
        };

        let sbd = match parse_sbd(&decoded.payload) {
            Ok(sbd) => sbd,
            Err(e) => {
                return self.error_outcome(
                    original_message_id,
                    decoded.received_content_mic,
                    mdn_algorithm,
                    e.to_string(),
                );
            }
        };
        info!(
            sender = %sbd.sender,
            receiver = %sbd.receiver,
            instance = %sbd.instance_identifier,
            "parsed inbound SBD"
        );

        let metadata = IncomingMetadata {
            as2_from: &as2_from,
            as2_to: message.header(header::AS2_TO),
            message_id: original_message_id.as_deref(),
        };

        let mut dispatch_errors: Vec<String> = Vec::new();
        for (index, handler) in self.handlers.iter().enumerate() {
            match handler.handle_incoming_sbd(&metadata, &sbd) {
                Ok(()) => {}
                Err(e) => {
                    error!("incoming SBD handler #{index} failed: {e}");
                    dispatch_errors.push(format!("handler #{index}: {e}"));
                    if self.dispatch_policy == DispatchPolicy::AbortOnFirstError {
                        break;
                    }
                }
            }
        }

        if dispatch_errors.is_empty() {
            let mdn = self.decoder.sign_mdn(
                &MdnData {
                    original_message_id,
                    disposition: DISPOSITION_PROCESSED.to_string(),
                    received_content_mic: decoded.received_content_mic,
                    text: "The message was received and processed successfully.".to_string(),
                },
                mdn_algorithm,
            )?;
            Ok(InboundOutcome {
                mdn,
                accepted: true,
                sbd: Some(sbd),
                error: None,
            })
        } else {
            let error = dispatch_errors.join("; ");
            let mdn = self.decoder.sign_mdn(
                &MdnData {
                    original_message_id,
                    disposition: DISPOSITION_ERROR.to_string(),
                    received_content_mic: decoded.received_content_mic,
                    text: format!("The message could not be processed: {error}"),
                },
                mdn_algorithm,
            )?;
            Ok(InboundOutcome {
                mdn,
                accepted: false,
                sbd: Some(sbd),
                error: Some(error),
            })
        }
    }

    /// The MDN algorithm requested through the sender's disposition
    /// options, else the configured default.
    fn requested_mdn_algorithm(&self, message: &InboundMessage) -> SigningAlgorithm {
        message
            .header(header::DISPOSITION_NOTIFICATION_OPTIONS)
            .and_then(|value| match DispositionOptions::parse(value) {
                Ok(options) => Some(options.mic_alg),
                Err(e) => {
                    warn!("unparsable disposition options on inbound message: {e}");
                    None
                }
            })
            .unwrap_or(self.default_mdn_algorithm)
    }

    fn error_outcome(
        &self,
        original_message_id: Option<String>,
        received_content_mic: Option<String>,
        algorithm: SigningAlgorithm,
        error: String,
    ) -> Result<InboundOutcome, InboundError> {
        error!("rejecting inbound AS2 message: {error}");
        let mdn = self.decoder.sign_mdn(
            &MdnData {
                original_message_id,
                disposition: DISPOSITION_ERROR.to_string(),
                received_content_mic,
                text: format!("The message could not be processed: {error}"),
            },
            algorithm,
        )?;
        Ok(InboundOutcome {
            mdn,
            accepted: false,
            sbd: None,
            error: Some(error),
        })
    }
}

impl std::fmt::Debug for As2InboundHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("As2InboundHandler")
            .field("handlers", &self.handlers.len())
            .field("dispatch_policy", &self.dispatch_policy)
            .field("default_mdn_algorithm", &self.default_mdn_algorithm)
            .finish_non_exhaustive()
    }
}
