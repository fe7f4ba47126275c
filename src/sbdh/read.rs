//! SBDH envelope parsing.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{QName, ResolveResult};
use quick_xml::NsReader;
use tracing::debug;

use super::{PeppolSbd, SbdhError, DEFAULT_UBL_VERSION, SBDH_NAMESPACE, SCOPE_DOCUMENT_ID, SCOPE_PROCESS_ID};
use crate::identifier::{
    DocumentTypeIdentifier, ParticipantIdentifier, ProcessIdentifier,
    DEFAULT_PARTICIPANT_SCHEME, DEFAULT_PROCESS_SCHEME, DOCUMENT_TYPE_SCHEME_BUSDOX_DOCID_QNS,
};
use crate::xml::XmlElement;

/// Parse an SBD from raw bytes.
pub fn parse_sbd(bytes: &[u8]) -> Result<PeppolSbd, SbdhError> {
    parse_sbd_str(std::str::from_utf8(bytes)?)
}

#[derive(Default)]
struct ScopeData {
    scope_type: Option<String>,
    instance_identifier: Option<String>,
    identifier: Option<String>,
}

#[derive(Default)]
struct HeaderData {
    sender_scheme: Option<String>,
    sender_value: Option<String>,
    receiver_scheme: Option<String>,
    receiver_value: Option<String>,
    type_version: Option<String>,
    instance_identifier: Option<String>,
    creation_date_time: Option<String>,
    document_type: Option<DocumentTypeIdentifier>,
    process: Option<ProcessIdentifier>,
}

fn authority_attribute(e: &BytesStart<'_>) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"Authority" {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

/// Parse an SBD from an XML string.
///
/// The business payload element is captured byte-for-byte, so the parsed
/// document serializes back to an identical payload.
pub fn parse_sbd_str(text: &str) -> Result<PeppolSbd, SbdhError> {
    let mut reader = NsReader::from_str(text);

    // Find and check the document root.
    loop {
        let (ns, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(e) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let bound_to_sbdh = matches!(
                    ns,
                    ResolveResult::Bound(namespace) if namespace.as_ref() == SBDH_NAMESPACE.as_bytes()
                );
                if local != "StandardBusinessDocument" || !bound_to_sbdh {
                    return Err(SbdhError::UnexpectedRoot { found: local });
                }
                break;
            }
            Event::Eof => {
                return Err(SbdhError::UnexpectedRoot {
                    found: String::new(),
                })
            }
            _ => continue,
        }
    }

    let mut header = HeaderData::default();
    let mut business_message: Option<XmlElement> = None;
    let mut path: Vec<String> = Vec::new();
    let mut scope = ScopeData::default();

    loop {
        let pos_before = reader.buffer_position() as usize;
        let (ns, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(e) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

                // Anything directly below the root that is not the header
                // is the business payload.
                if path.is_empty() && local != "StandardBusinessDocumentHeader" {
                    let namespace_uri = match ns {
                        ResolveResult::Bound(namespace) => {
                            Some(String::from_utf8_lossy(namespace.as_ref()).into_owned())
                        }
                        _ => None,
                    };
                    let name = e.name().as_ref().to_vec();
                    reader.read_to_end(QName(&name))?;
                    let end = reader.buffer_position() as usize;
                    business_message = Some(XmlElement {
                        local_name: local,
                        namespace_uri,
                        raw: text[pos_before..end].to_string(),
                    });
                    continue;
                }

                if local == "Scope" {
                    scope = ScopeData::default();
                }
                if local == "Identifier" {
                    match path.last().map(String::as_str) {
                        Some("Sender") => header.sender_scheme = authority_attribute(&e),
                        Some("Receiver") => header.receiver_scheme = authority_attribute(&e),
                        _ => {}
                    }
                }
                path.push(local);
            }
            Event::Empty(e) => {
                // A self-closing element directly below the root can only
                // be the business payload.
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if path.is_empty() && local != "StandardBusinessDocumentHeader" {
                    let namespace_uri = match ns {
                        ResolveResult::Bound(namespace) => {
                            Some(String::from_utf8_lossy(namespace.as_ref()).into_owned())
                        }
                        _ => None,
                    };
                    let end = reader.buffer_position() as usize;
                    business_message = Some(XmlElement {
                        local_name: local,
                        namespace_uri,
                        raw: text[pos_before..end].to_string(),
                    });
                }
            }
            Event::Text(t) => {
                let value = t
                    .unescape()
                    .map_err(|e| SbdhError::Xml(e.to_string()))?
                    .into_owned();
                let value = value.trim().to_string();
                if value.is_empty() {
                    continue;
                }
                match path_tail(&path) {
                    ["Sender", "Identifier"] => header.sender_value = Some(value),
                    ["Receiver", "Identifier"] => header.receiver_value = Some(value),
                    ["DocumentIdentification", "TypeVersion"] => {
                        header.type_version = Some(value)
                    }
                    ["DocumentIdentification", "InstanceIdentifier"] => {
                        header.instance_identifier = Some(value)
                    }
                    ["DocumentIdentification", "CreationDateAndTime"] => {
                        header.creation_date_time = Some(value)
                    }
                    ["Scope", "Type"] => scope.scope_type = Some(value),
                    ["Scope", "InstanceIdentifier"] => {
                        scope.instance_identifier = Some(value)
                    }
                    ["Scope", "Identifier"] => scope.identifier = Some(value),
                    _ => {}
                }
            }
            Event::End(_) => {
                let closed = path.pop();
                if closed.as_deref() == Some("Scope") {
                    commit_scope(&mut header, std::mem::take(&mut scope));
                }
                if path.is_empty() && closed.is_none() {
                    // Closing tag of the document root.
                    break;
                }
            }
            Event::Eof => break,
            _ => continue,
        }
    }

    let sender = ParticipantIdentifier::new(
        header
            .sender_scheme
            .unwrap_or_else(|| DEFAULT_PARTICIPANT_SCHEME.to_string()),
        header.sender_value.ok_or(SbdhError::MissingField("Sender/Identifier"))?,
    );
    let receiver = ParticipantIdentifier::new(
        header
            .receiver_scheme
            .unwrap_or_else(|| DEFAULT_PARTICIPANT_SCHEME.to_string()),
        header
            .receiver_value
            .ok_or(SbdhError::MissingField("Receiver/Identifier"))?,
    );
    let document_type = header
        .document_type
        .ok_or(SbdhError::MissingField("BusinessScope DOCUMENTID"))?;
    let process = header
        .process
        .ok_or(SbdhError::MissingField("BusinessScope PROCESSID"))?;
    let instance_identifier = header
        .instance_identifier
        .ok_or(SbdhError::MissingField("DocumentIdentification/InstanceIdentifier"))?;
    let creation_raw = header
        .creation_date_time
        .ok_or(SbdhError::MissingField("DocumentIdentification/CreationDateAndTime"))?;
    let creation_date_time = DateTime::parse_from_rfc3339(&creation_raw)
        .map_err(|e| SbdhError::InvalidTimestamp(format!("{creation_raw}: {e}")))?
        .with_timezone(&Utc);
    let ubl_version = header.type_version.unwrap_or_else(|| {
        debug!("SBDH has no TypeVersion, assuming {DEFAULT_UBL_VERSION}");
        DEFAULT_UBL_VERSION.to_string()
    });
    let business_message =
        business_message.ok_or(SbdhError::MissingField("business payload element"))?;

    Ok(PeppolSbd {
        sender,
        receiver,
        document_type,
        process,
        instance_identifier,
        ubl_version,
        creation_date_time,
        business_message,
    })
}

fn path_tail(path: &[String]) -> [&str; 2] {
    match path {
        [.., a, b] => [a.as_str(), b.as_str()],
        _ => ["", ""],
    }
}

fn commit_scope(header: &mut HeaderData, scope: ScopeData) {
    let (Some(scope_type), Some(value)) = (scope.scope_type, scope.instance_identifier) else {
        return;
    };
    match scope_type.as_str() {
        SCOPE_DOCUMENT_ID => {
            let scheme = scope
                .identifier
                .unwrap_or_else(|| DOCUMENT_TYPE_SCHEME_BUSDOX_DOCID_QNS.to_string());
            header.document_type = Some(DocumentTypeIdentifier::new(scheme, value));
        }
        SCOPE_PROCESS_ID => {
            let scheme = scope
                .identifier
                .unwrap_or_else(|| DEFAULT_PROCESS_SCHEME.to_string());
            header.process = Some(ProcessIdentifier::new(scheme, value));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbdh::{build_sbd, to_sbdh_xml, NamespaceContext};

    fn sample_sbd() -> PeppolSbd {
        build_sbd(
            &ParticipantIdentifier::with_default_scheme("9915:sender"),
            &ParticipantIdentifier::with_default_scheme("9915:receiver"),
            &DocumentTypeIdentifier::with_default_scheme("urn:test:doc::Invoice##ver2.0"),
            &ProcessIdentifier::with_default_scheme("urn:test:process"),
            Some("instance-42"),
            Some("2.1"),
            XmlElement::parse(b"<Invoice xmlns=\"urn:test:invoice\"><ID>7</ID></Invoice>").unwrap(),
        )
    }

    #[test]
    fn round_trip_preserves_all_fields() {
        let original = sample_sbd();
        let xml = to_sbdh_xml(&original, &NamespaceContext::default()).unwrap();
        let parsed = parse_sbd_str(&xml).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn round_trip_with_prefixed_header() {
        let original = sample_sbd();
        let xml = to_sbdh_xml(&original, &NamespaceContext::with_prefix("sh")).unwrap();
        let parsed = parse_sbd_str(&xml).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn rejects_wrong_root_element() {
        let err = parse_sbd_str("<Invoice xmlns=\"urn:x\"/>").unwrap_err();
        assert!(matches!(err, SbdhError::UnexpectedRoot { .. }));
    }

    #[test]
    fn rejects_missing_business_payload() {
        let xml = format!(
            "<StandardBusinessDocument xmlns=\"{SBDH_NAMESPACE}\">\
             <StandardBusinessDocumentHeader>\
             <HeaderVersion>1.0</HeaderVersion>\
             <Sender><Identifier Authority=\"iso6523-actorid-upis\">9915:a</Identifier></Sender>\
             <Receiver><Identifier Authority=\"iso6523-actorid-upis\">9915:b</Identifier></Receiver>\
             <DocumentIdentification>\
             <Standard>urn:x</Standard><TypeVersion>2.1</TypeVersion>\
             <InstanceIdentifier>i</InstanceIdentifier><Type>Invoice</Type>\
             <CreationDateAndTime>2024-06-15T12:00:00.000Z</CreationDateAndTime>\
             </DocumentIdentification>\
             <BusinessScope>\
             <Scope><Type>DOCUMENTID</Type><InstanceIdentifier>urn:doc</InstanceIdentifier></Scope>\
             <Scope><Type>PROCESSID</Type><InstanceIdentifier>urn:proc</InstanceIdentifier></Scope>\
             </BusinessScope>\
             </StandardBusinessDocumentHeader>\
             </StandardBusinessDocument>"
        );
        let err = parse_sbd_str(&xml).unwrap_err();
        assert!(matches!(err, SbdhError::MissingField("business payload element")));
    }

    #[test]
    fn scope_scheme_defaults_when_identifier_absent() {
        let xml = format!(
            "<StandardBusinessDocument xmlns=\"{SBDH_NAMESPACE}\">\
             <StandardBusinessDocumentHeader>\
             <HeaderVersion>1.0</HeaderVersion>\
             <Sender><Identifier Authority=\"iso6523-actorid-upis\">9915:a</Identifier></Sender>\
             <Receiver><Identifier Authority=\"iso6523-actorid-upis\">9915:b</Identifier></Receiver>\
             <DocumentIdentification>\
             <Standard>urn:x</Standard><TypeVersion>2.1</TypeVersion>\
             <InstanceIdentifier>i</InstanceIdentifier><Type>Invoice</Type>\
             <CreationDateAndTime>2024-06-15T12:00:00.000Z</CreationDateAndTime>\
             </DocumentIdentification>\
             <BusinessScope>\
             <Scope><Type>DOCUMENTID</Type><InstanceIdentifier>urn:doc</InstanceIdentifier></Scope>\
             <Scope><Type>PROCESSID</Type><InstanceIdentifier>urn:proc</InstanceIdentifier></Scope>\
             </BusinessScope>\
             </StandardBusinessDocumentHeader>\
             <Invoice xmlns=\"urn:x\"><ID>1</ID></Invoice>\
             </StandardBusinessDocument>"
        );
        let sbd = parse_sbd_str(&xml).unwrap();
        assert_eq!(sbd.document_type.scheme, DOCUMENT_TYPE_SCHEME_BUSDOX_DOCID_QNS);
        assert_eq!(sbd.process.scheme, DEFAULT_PROCESS_SCHEME);
        assert_eq!(sbd.business_message.raw, "<Invoice xmlns=\"urn:x\"><ID>1</ID></Invoice>");
    }
}
