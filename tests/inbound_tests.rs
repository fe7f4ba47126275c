#![cfg(feature = "server")]

use std::sync::{Arc, Mutex};

use peppol_as2::as2::SigningAlgorithm;
use peppol_as2::cert::{self, Certificate};
use peppol_as2::identifier::{
    DocumentTypeIdentifier, ParticipantIdentifier, ProcessIdentifier,
};
use peppol_as2::sbdh::{build_sbd, to_sbdh_xml, NamespaceContext, PeppolSbd};
use peppol_as2::server::{
    As2InboundHandler, As2MessageDecoder, DecodedAs2Message, DispatchPolicy, InboundError,
    InboundMessage, IncomingMetadata, IncomingSbdHandler, MdnData, PartnerCertificateSource,
    SignedMdn, DISPOSITION_ERROR, DISPOSITION_PROCESSED,
};
use peppol_as2::xml::XmlElement;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn partner_certificate() -> Certificate {
    let key = rcgen::KeyPair::generate().unwrap();
    let mut params = rcgen::CertificateParams::default();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "POP000091");
    let cert = params.self_signed(&key).unwrap();
    cert::parse_der(cert.der().as_ref()).unwrap()
}

fn sample_sbd() -> PeppolSbd {
    build_sbd(
        &ParticipantIdentifier::with_default_scheme("9915:sender"),
        &ParticipantIdentifier::with_default_scheme("9915:receiver"),
        &DocumentTypeIdentifier::with_default_scheme("urn:test:doc::Invoice##ver2.0"),
        &ProcessIdentifier::with_default_scheme("urn:test:process"),
        Some("inbound-instance-1"),
        None,
        XmlElement::parse(b"<Invoice xmlns=\"urn:test:invoice\"><ID>77</ID></Invoice>").unwrap(),
    )
}

fn inbound_message(sbd: &PeppolSbd) -> InboundMessage {
    // What the wire really carries is the signed S/MIME body; the stub
    // decoder below hands the contained SBD back out of it.
    let body = to_sbdh_xml(sbd, &NamespaceContext::default())
        .unwrap()
        .into_bytes();
    InboundMessage {
        headers: vec![
            ("AS2-Version".into(), "1.0".into()),
            ("AS2-From".into(), "POP000091".into()),
            ("AS2-To".into(), "POP000092".into()),
            ("Message-ID".into(), "<msg-1@sender>".into()),
            (
                "Disposition-Notification-Options".into(),
                "signed-receipt-protocol=required, pkcs7-signature; \
                 signed-receipt-micalg=required, sha-256"
                    .into(),
            ),
        ],
        body,
    }
}

#[derive(Clone, Default)]
struct DecoderLog {
    signed_with: Arc<Mutex<Option<SigningAlgorithm>>>,
    mdn_data: Arc<Mutex<Option<MdnData>>>,
}

/// Stub for the external S/MIME codec: the "decoded" payload is the raw
/// body, and signing an MDN just records what would have been signed.
struct StubDecoder {
    log: DecoderLog,
    fail_decode: bool,
}

impl As2MessageDecoder for StubDecoder {
    fn decode(
        &self,
        message: &InboundMessage,
        _partner_certificate: &Certificate,
    ) -> Result<DecodedAs2Message, InboundError> {
        if self.fail_decode {
            return Err(InboundError::Decode("signature verification failed".into()));
        }
        Ok(DecodedAs2Message {
            payload: message.body.clone(),
            received_content_mic: Some("mic-of-body, sha-256".into()),
        })
    }

    fn sign_mdn(
        &self,
        mdn: &MdnData,
        algorithm: SigningAlgorithm,
    ) -> Result<SignedMdn, InboundError> {
        *self.log.signed_with.lock().unwrap() = Some(algorithm);
        *self.log.mdn_data.lock().unwrap() = Some(mdn.clone());
        Ok(SignedMdn {
            headers: vec![(
                "Content-Type".into(),
                format!(
                    "multipart/signed; protocol=\"application/pkcs7-signature\"; micalg=\"{}\"",
                    algorithm.mic_alg()
                ),
            )],
            body: mdn.disposition.clone().into_bytes(),
        })
    }
}

struct KnownPartners(Certificate);

impl PartnerCertificateSource for KnownPartners {
    fn certificate_for(&self, as2_id: &str) -> Option<Certificate> {
        (as2_id == "POP000091").then(|| self.0.clone())
    }
}

struct RecordingHandler {
    name: &'static str,
    seen: Arc<Mutex<Vec<(&'static str, PeppolSbd)>>>,
    fail: bool,
}

impl IncomingSbdHandler for RecordingHandler {
    fn handle_incoming_sbd(
        &self,
        metadata: &IncomingMetadata<'_>,
        sbd: &PeppolSbd,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        assert_eq!(metadata.as2_from, "POP000091");
        self.seen.lock().unwrap().push((self.name, sbd.clone()));
        if self.fail {
            return Err("handler exploded".into());
        }
        Ok(())
    }
}

fn handler_with(
    log: DecoderLog,
    fail_decode: bool,
) -> As2InboundHandler {
    As2InboundHandler::new(
        Box::new(StubDecoder { log, fail_decode }),
        Box::new(KnownPartners(partner_certificate())),
    )
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[test]
fn all_handlers_receive_the_same_sbd_in_registration_order() {
    let log = DecoderLog::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut inbound = handler_with(log.clone(), false);
    inbound.register_handler(Box::new(RecordingHandler {
        name: "first",
        seen: seen.clone(),
        fail: false,
    }));
    inbound.register_handler(Box::new(RecordingHandler {
        name: "second",
        seen: seen.clone(),
        fail: false,
    }));

    let sbd = sample_sbd();
    let outcome = inbound.handle(&inbound_message(&sbd)).unwrap();

    assert!(outcome.accepted);
    assert_eq!(outcome.sbd.as_ref(), Some(&sbd));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "first");
    assert_eq!(seen[1].0, "second");
    assert_eq!(seen[0].1, seen[1].1);
    assert_eq!(seen[0].1, sbd);

    // The MDN acknowledges success and was signed with the requested
    // SHA-256.
    assert_eq!(*log.signed_with.lock().unwrap(), Some(SigningAlgorithm::Sha256));
    let mdn = log.mdn_data.lock().unwrap().clone().unwrap();
    assert_eq!(mdn.disposition, DISPOSITION_PROCESSED);
    assert_eq!(mdn.original_message_id.as_deref(), Some("<msg-1@sender>"));
    assert_eq!(mdn.received_content_mic.as_deref(), Some("mic-of-body, sha-256"));
}

#[test]
fn failing_handler_keeps_remaining_handlers_running_by_default() {
    let log = DecoderLog::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut inbound = handler_with(log.clone(), false);
    inbound.register_handler(Box::new(RecordingHandler {
        name: "boom",
        seen: seen.clone(),
        fail: true,
    }));
    inbound.register_handler(Box::new(RecordingHandler {
        name: "after",
        seen: seen.clone(),
        fail: false,
    }));

    let outcome = inbound.handle(&inbound_message(&sample_sbd())).unwrap();

    assert!(!outcome.accepted);
    assert!(outcome.error.as_deref().unwrap().contains("handler exploded"));
    assert_eq!(seen.lock().unwrap().len(), 2);

    let mdn = log.mdn_data.lock().unwrap().clone().unwrap();
    assert_eq!(mdn.disposition, DISPOSITION_ERROR);
}

#[test]
fn abort_policy_stops_after_the_first_failure() {
    let log = DecoderLog::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut inbound =
        handler_with(log, false).dispatch_policy(DispatchPolicy::AbortOnFirstError);
    inbound.register_handler(Box::new(RecordingHandler {
        name: "boom",
        seen: seen.clone(),
        fail: true,
    }));
    inbound.register_handler(Box::new(RecordingHandler {
        name: "after",
        seen: seen.clone(),
        fail: false,
    }));

    let outcome = inbound.handle(&inbound_message(&sample_sbd())).unwrap();
    assert!(!outcome.accepted);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Error MDNs
// ---------------------------------------------------------------------------

#[test]
fn unknown_partner_yields_an_error_mdn() {
    let log = DecoderLog::default();
    let inbound = handler_with(log.clone(), false);

    let mut message = inbound_message(&sample_sbd());
    for header in message.headers.iter_mut() {
        if header.0 == "AS2-From" {
            header.1 = "STRANGER".into();
        }
    }

    let outcome = inbound.handle(&message).unwrap();
    assert!(!outcome.accepted);
    assert!(outcome.sbd.is_none());
    assert!(outcome.error.as_deref().unwrap().contains("STRANGER"));
    let mdn = log.mdn_data.lock().unwrap().clone().unwrap();
    assert_eq!(mdn.disposition, DISPOSITION_ERROR);
}

#[test]
fn decode_failure_yields_an_error_mdn() {
    let log = DecoderLog::default();
    let inbound = handler_with(log.clone(), true);

    let outcome = inbound.handle(&inbound_message(&sample_sbd())).unwrap();
    assert!(!outcome.accepted);
    assert!(outcome
        .error
        .as_deref()
        .unwrap()
        .contains("signature verification failed"));
}

#[test]
fn non_sbd_payload_yields_an_error_mdn() {
    let log = DecoderLog::default();
    let inbound = handler_with(log.clone(), false);

    let mut message = inbound_message(&sample_sbd());
    message.body = b"<NotAnSbd xmlns=\"urn:x\"/>".to_vec();

    let outcome = inbound.handle(&message).unwrap();
    assert!(!outcome.accepted);
    assert!(outcome.sbd.is_none());
    // The MIC is still reported so the sender can correlate.
    let mdn = log.mdn_data.lock().unwrap().clone().unwrap();
    assert_eq!(mdn.received_content_mic.as_deref(), Some("mic-of-body, sha-256"));
}

#[test]
fn default_mdn_algorithm_applies_without_disposition_options() {
    let log = DecoderLog::default();
    let inbound = handler_with(log.clone(), false);

    let mut message = inbound_message(&sample_sbd());
    message
        .headers
        .retain(|(k, _)| !k.eq_ignore_ascii_case("Disposition-Notification-Options"));

    inbound.handle(&message).unwrap();
    assert_eq!(*log.signed_with.lock().unwrap(), Some(SigningAlgorithm::Sha256));
}

#[test]
fn sha1_disposition_options_select_sha1_mdn() {
    let log = DecoderLog::default();
    let inbound = handler_with(log.clone(), false);

    let mut message = inbound_message(&sample_sbd());
    for header in message.headers.iter_mut() {
        if header.0 == "Disposition-Notification-Options" {
            header.1 = "signed-receipt-protocol=required, pkcs7-signature; \
                        signed-receipt-micalg=required, sha1"
                .into();
        }
    }

    inbound.handle(&message).unwrap();
    assert_eq!(*log.signed_with.lock().unwrap(), Some(SigningAlgorithm::Sha1));
}
