use peppol_as2::identifier::{
    DocumentTypeIdentifier, ParticipantIdentifier, ProcessIdentifier,
};
use peppol_as2::sbdh::{
    build_sbd, parse_sbd_str, to_sbdh_xml, NamespaceContext, SbdhError, SBDH_NAMESPACE,
};
use peppol_as2::xml::XmlElement;

/// A payload with attributes, comments, odd whitespace, and nested
/// namespaces — everything that a re-serializing implementation would
/// normalize away.
const FUSSY_PAYLOAD: &str = "<Invoice xmlns=\"urn:test:invoice\" \
xmlns:cbc=\"urn:test:cbc\"  attr='single-quoted'>\n\
\t<!-- a comment that must survive -->\n\
\t<cbc:ID  schemeID=\"X\" >TOSL108</cbc:ID>\n\
\t<Empty/>\n\
</Invoice>";

fn sample_sbd() -> peppol_as2::sbdh::PeppolSbd {
    build_sbd(
        &ParticipantIdentifier::with_default_scheme("0088:7315458756324"),
        &ParticipantIdentifier::with_default_scheme("9915:receiver"),
        &DocumentTypeIdentifier::with_default_scheme(
            "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2::Invoice##ver2.0",
        ),
        &ProcessIdentifier::with_default_scheme("urn:www.cenbii.eu:profile:bii04:ver1.0"),
        None,
        None,
        XmlElement::parse(FUSSY_PAYLOAD.as_bytes()).unwrap(),
    )
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[test]
fn round_trip_is_field_exact() {
    let original = sample_sbd();
    let xml = to_sbdh_xml(&original, &NamespaceContext::default()).unwrap();
    let parsed = parse_sbd_str(&xml).unwrap();

    assert_eq!(parsed.sender, original.sender);
    assert_eq!(parsed.receiver, original.receiver);
    assert_eq!(parsed.document_type, original.document_type);
    assert_eq!(parsed.process, original.process);
    assert_eq!(parsed.instance_identifier, original.instance_identifier);
    assert_eq!(parsed.ubl_version, original.ubl_version);
    assert_eq!(parsed.creation_date_time, original.creation_date_time);
    assert_eq!(parsed, original);
}

#[test]
fn business_element_is_byte_preserved() {
    let original = sample_sbd();
    let xml = to_sbdh_xml(&original, &NamespaceContext::default()).unwrap();
    let parsed = parse_sbd_str(&xml).unwrap();
    assert_eq!(parsed.business_message.raw, FUSSY_PAYLOAD);
}

#[test]
fn double_round_trip_is_stable() {
    let original = sample_sbd();
    let once = to_sbdh_xml(&original, &NamespaceContext::default()).unwrap();
    let twice = to_sbdh_xml(&parse_sbd_str(&once).unwrap(), &NamespaceContext::default()).unwrap();
    assert_eq!(once, twice);
}

// ---------------------------------------------------------------------------
// Namespace context
// ---------------------------------------------------------------------------

#[test]
fn default_context_binds_sbdh_to_the_default_prefix() {
    let xml = to_sbdh_xml(&sample_sbd(), &NamespaceContext::default()).unwrap();
    // Receivers scanning for the unprefixed root tag must find it.
    assert!(xml.contains(&format!(
        "<StandardBusinessDocument xmlns=\"{SBDH_NAMESPACE}\">"
    )));
    assert!(xml.contains("<HeaderVersion>1.0</HeaderVersion>"));
}

#[test]
fn prefixed_context_round_trips_too() {
    let original = sample_sbd();
    let xml = to_sbdh_xml(&original, &NamespaceContext::with_prefix("sh")).unwrap();
    assert!(xml.contains("<sh:StandardBusinessDocument"));
    let parsed = parse_sbd_str(&xml).unwrap();
    assert_eq!(parsed, original);
}

// ---------------------------------------------------------------------------
// Header content
// ---------------------------------------------------------------------------

#[test]
fn header_carries_identifiers_and_scopes() {
    let sbd = sample_sbd();
    let xml = to_sbdh_xml(&sbd, &NamespaceContext::default()).unwrap();
    assert!(xml.contains(
        "<Identifier Authority=\"iso6523-actorid-upis\">0088:7315458756324</Identifier>"
    ));
    assert!(xml.contains("<Type>DOCUMENTID</Type>"));
    assert!(xml.contains("<Type>PROCESSID</Type>"));
    assert!(xml.contains("<TypeVersion>2.1</TypeVersion>"));
    assert!(xml.contains(&format!(
        "<InstanceIdentifier>{}</InstanceIdentifier>",
        sbd.instance_identifier
    )));
    // DocumentIdentification derives from the payload element.
    assert!(xml.contains("<Standard>urn:test:invoice</Standard>"));
    assert!(xml.contains("<Type>Invoice</Type>"));
}

#[test]
fn fresh_instance_identifiers_are_unique() {
    let a = sample_sbd();
    let b = sample_sbd();
    assert_ne!(a.instance_identifier, b.instance_identifier);
}

// ---------------------------------------------------------------------------
// Error cases
// ---------------------------------------------------------------------------

#[test]
fn parse_rejects_non_sbd_documents() {
    assert!(matches!(
        parse_sbd_str("<Invoice xmlns=\"urn:test:invoice\"/>"),
        Err(SbdhError::UnexpectedRoot { .. })
    ));
}

#[test]
fn parse_rejects_sbd_in_wrong_namespace() {
    assert!(matches!(
        parse_sbd_str("<StandardBusinessDocument xmlns=\"urn:wrong\"/>"),
        Err(SbdhError::UnexpectedRoot { .. })
    ));
}

#[test]
fn parse_rejects_garbled_timestamp() {
    let sbd = sample_sbd();
    let xml = to_sbdh_xml(&sbd, &NamespaceContext::default()).unwrap();
    let broken = xml.replace(
        &sbd.creation_date_time
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "yesterday at noon",
    );
    assert!(matches!(
        parse_sbd_str(&broken),
        Err(SbdhError::InvalidTimestamp(_))
    ));
}
