//! SBDH envelope serialization.

use std::io::Cursor;

use chrono::SecondsFormat;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::{
    NamespaceContext, PeppolSbd, SbdhError, HEADER_VERSION, SBDH_NAMESPACE, SCOPE_DOCUMENT_ID,
    SCOPE_PROCESS_ID,
};

fn xml_io(e: quick_xml::Error) -> SbdhError {
    SbdhError::Xml(format!("XML write error: {e}"))
}

/// Event writer that prefixes SBDH element names per the namespace context.
struct SbdhWriter {
    writer: Writer<Cursor<Vec<u8>>>,
    prefix: Option<String>,
}

impl SbdhWriter {
    fn new(context: &NamespaceContext) -> Result<Self, SbdhError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_io)?;
        Ok(Self {
            writer,
            prefix: context.sbdh_prefix().map(str::to_string),
        })
    }

    fn qualified(&self, local: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{local}"),
            None => local.to_string(),
        }
    }

    fn start(&mut self, local: &str) -> Result<(), SbdhError> {
        let elem = BytesStart::new(self.qualified(local));
        self.writer.write_event(Event::Start(elem)).map_err(xml_io)
    }

    fn start_with_attrs(&mut self, local: &str, attrs: &[(&str, &str)]) -> Result<(), SbdhError> {
        let mut elem = BytesStart::new(self.qualified(local));
        for (k, v) in attrs {
            elem.push_attribute((*k, *v));
        }
        self.writer.write_event(Event::Start(elem)).map_err(xml_io)
    }

    fn end(&mut self, local: &str) -> Result<(), SbdhError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(self.qualified(local))))
            .map_err(xml_io)
    }

    fn text_element(&mut self, local: &str, text: &str) -> Result<(), SbdhError> {
        self.start(local)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_io)?;
        self.end(local)
    }

    fn text_element_with_attrs(
        &mut self,
        local: &str,
        text: &str,
        attrs: &[(&str, &str)],
    ) -> Result<(), SbdhError> {
        self.start_with_attrs(local, attrs)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_io)?;
        self.end(local)
    }

    /// Write pre-serialized XML through without escaping.
    fn raw(&mut self, xml: &str) -> Result<(), SbdhError> {
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(xml)))
            .map_err(xml_io)
    }

    fn into_string(self) -> Result<String, SbdhError> {
        let buf = self.writer.into_inner().into_inner();
        String::from_utf8(buf).map_err(|e| SbdhError::Xml(format!("XML UTF-8 error: {e}")))
    }
}

/// Serialize an SBD to its XML form.
///
/// The business payload is spliced in verbatim; only the envelope around
/// it is produced here. With the default namespace context the SBDH
/// namespace is declared as the default namespace of the root element.
pub fn to_sbdh_xml(sbd: &PeppolSbd, context: &NamespaceContext) -> Result<String, SbdhError> {
    let standard = sbd
        .business_message
        .namespace_uri
        .as_deref()
        .ok_or(SbdhError::PayloadNamespaceMissing)?;

    let mut w = SbdhWriter::new(context)?;

    let ns_attr = match context.sbdh_prefix() {
        Some(prefix) => format!("xmlns:{prefix}"),
        None => "xmlns".to_string(),
    };
    w.start_with_attrs(
        "StandardBusinessDocument",
        &[(ns_attr.as_str(), SBDH_NAMESPACE)],
    )?;

    w.start("StandardBusinessDocumentHeader")?;
    w.text_element("HeaderVersion", HEADER_VERSION)?;

    w.start("Sender")?;
    w.text_element_with_attrs(
        "Identifier",
        &sbd.sender.value,
        &[("Authority", sbd.sender.scheme.as_str())],
    )?;
    w.end("Sender")?;

    w.start("Receiver")?;
    w.text_element_with_attrs(
        "Identifier",
        &sbd.receiver.value,
        &[("Authority", sbd.receiver.scheme.as_str())],
    )?;
    w.end("Receiver")?;

    w.start("DocumentIdentification")?;
    w.text_element("Standard", standard)?;
    w.text_element("TypeVersion", &sbd.ubl_version)?;
    w.text_element("InstanceIdentifier", &sbd.instance_identifier)?;
    w.text_element("Type", &sbd.business_message.local_name)?;
    w.text_element(
        "CreationDateAndTime",
        &sbd.creation_date_time
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    )?;
    w.end("DocumentIdentification")?;

    w.start("BusinessScope")?;
    w.start("Scope")?;
    w.text_element("Type", SCOPE_DOCUMENT_ID)?;
    w.text_element("InstanceIdentifier", &sbd.document_type.value)?;
    w.text_element("Identifier", &sbd.document_type.scheme)?;
    w.end("Scope")?;
    w.start("Scope")?;
    w.text_element("Type", SCOPE_PROCESS_ID)?;
    w.text_element("InstanceIdentifier", &sbd.process.value)?;
    w.text_element("Identifier", &sbd.process.scheme)?;
    w.end("Scope")?;
    w.end("BusinessScope")?;

    w.end("StandardBusinessDocumentHeader")?;

    w.raw(&sbd.business_message.raw)?;

    w.end("StandardBusinessDocument")?;
    w.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::{
        DocumentTypeIdentifier, ParticipantIdentifier, ProcessIdentifier,
    };
    use crate::sbdh::build_sbd;
    use crate::xml::XmlElement;

    fn sample_sbd() -> PeppolSbd {
        build_sbd(
            &ParticipantIdentifier::with_default_scheme("9915:sender"),
            &ParticipantIdentifier::with_default_scheme("9915:receiver"),
            &DocumentTypeIdentifier::with_default_scheme("urn:test:doc::Invoice##ver2.0"),
            &ProcessIdentifier::with_default_scheme("urn:test:process"),
            Some("instance-42"),
            None,
            XmlElement::parse(b"<Invoice xmlns=\"urn:test:invoice\"><ID>7</ID></Invoice>").unwrap(),
        )
    }

    #[test]
    fn default_context_uses_default_namespace_prefix() {
        let xml = to_sbdh_xml(&sample_sbd(), &NamespaceContext::default()).unwrap();
        assert!(xml.contains(
            "<StandardBusinessDocument xmlns=\
             \"http://www.unece.org/cefact/namespaces/StandardBusinessDocumentHeader\">"
        ));
        assert!(!xml.contains("<sh:StandardBusinessDocument"));
    }

    #[test]
    fn custom_prefix_is_applied_to_header_only() {
        let xml = to_sbdh_xml(&sample_sbd(), &NamespaceContext::with_prefix("sh")).unwrap();
        assert!(xml.contains("<sh:StandardBusinessDocument xmlns:sh="));
        assert!(xml.contains("<sh:HeaderVersion>1.0</sh:HeaderVersion>"));
        // The payload stays untouched.
        assert!(xml.contains("<Invoice xmlns=\"urn:test:invoice\"><ID>7</ID></Invoice>"));
    }

    #[test]
    fn payload_is_embedded_verbatim() {
        let xml = to_sbdh_xml(&sample_sbd(), &NamespaceContext::default()).unwrap();
        assert!(xml.contains("<Invoice xmlns=\"urn:test:invoice\"><ID>7</ID></Invoice>"));
    }

    #[test]
    fn scopes_carry_identifier_schemes() {
        let xml = to_sbdh_xml(&sample_sbd(), &NamespaceContext::default()).unwrap();
        assert!(xml.contains("<Type>DOCUMENTID</Type>"));
        assert!(xml.contains("<InstanceIdentifier>urn:test:doc::Invoice##ver2.0</InstanceIdentifier>"));
        assert!(xml.contains("<Identifier>busdox-docid-qns</Identifier>"));
        assert!(xml.contains("<Type>PROCESSID</Type>"));
        assert!(xml.contains("<Identifier>cenbii-procid-ubl</Identifier>"));
    }

    #[test]
    fn payload_without_namespace_is_rejected() {
        let mut sbd = sample_sbd();
        sbd.business_message = XmlElement::parse(b"<Invoice><ID>7</ID></Invoice>").unwrap();
        assert!(matches!(
            to_sbdh_xml(&sbd, &NamespaceContext::default()),
            Err(SbdhError::PayloadNamespaceMissing)
        ));
    }
}
