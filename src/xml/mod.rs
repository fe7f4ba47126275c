//! Business-document XML handling.
//!
//! Peppol payloads are carried through the pipeline as an [`XmlElement`]:
//! the root element's resolved namespace and local name plus the raw
//! element text, preserved byte-for-byte. Nothing is re-serialized, so
//! what the caller put in is exactly what ends up inside the SBD.

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use thiserror::Error;

/// Error reading a business document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum XmlError {
    /// The document could not be read from its source.
    #[error("business document could not be read: {0}")]
    Io(#[from] std::io::Error),

    /// The document bytes are not valid UTF-8.
    #[error("business document is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    /// The document is not well-formed XML.
    #[error("business document is not well-formed XML: {0}")]
    Malformed(String),

    /// The document contains no root element.
    #[error("business document contains no root element")]
    NoRootElement,
}

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        XmlError::Malformed(e.to_string())
    }
}

/// A captured XML element: resolved name plus verbatim raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Local name of the element (prefix stripped).
    pub local_name: String,
    /// Resolved namespace URI of the element, if any.
    pub namespace_uri: Option<String>,
    /// The element text exactly as it appeared in the source, from the
    /// opening `<` to the closing `>` of the end tag.
    pub raw: String,
}

impl XmlElement {
    /// Parse a complete XML document and capture its root element.
    ///
    /// The whole document is scanned, so any well-formedness error
    /// anywhere in the input is rejected, not just errors before the
    /// root start tag. A leading XML declaration, comments, and
    /// processing instructions around the root are permitted and are not
    /// part of the captured element.
    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        let text = std::str::from_utf8(bytes)?;
        Self::parse_str(text)
    }

    /// Parse a complete XML document from a string slice.
    pub fn parse_str(text: &str) -> Result<Self, XmlError> {
        let mut reader = NsReader::from_str(text);
        loop {
            let pos_before = reader.buffer_position() as usize;
            let (ns, event) = reader.read_resolved_event()?;
            match event {
                Event::Start(e) => {
                    let local_name =
                        String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    let namespace_uri = resolved_namespace(ns);
                    let name = e.name().as_ref().to_vec();
                    reader.read_to_end(quick_xml::name::QName(&name))?;
                    let end = reader.buffer_position() as usize;
                    let element = XmlElement {
                        local_name,
                        namespace_uri,
                        raw: text[pos_before..end].to_string(),
                    };
                    // Keep scanning so trailing garbage is still rejected.
                    drain_to_eof(&mut reader)?;
                    return Ok(element);
                }
                Event::Empty(e) => {
                    let local_name =
                        String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    let namespace_uri = resolved_namespace(ns);
                    let end = reader.buffer_position() as usize;
                    let element = XmlElement {
                        local_name,
                        namespace_uri,
                        raw: text[pos_before..end].to_string(),
                    };
                    drain_to_eof(&mut reader)?;
                    return Ok(element);
                }
                Event::Eof => return Err(XmlError::NoRootElement),
                // Declaration, comments, PIs, whitespace before the root.
                _ => continue,
            }
        }
    }
}

fn resolved_namespace(ns: ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Bound(namespace) => {
            Some(String::from_utf8_lossy(namespace.as_ref()).into_owned())
        }
        _ => None,
    }
}

fn drain_to_eof(reader: &mut NsReader<&[u8]>) -> Result<(), XmlError> {
    loop {
        match reader.read_resolved_event()?.1 {
            Event::Eof => return Ok(()),
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_root_element_verbatim() {
        let xml = "<?xml version=\"1.0\"?>\n<Invoice xmlns=\"urn:test:invoice\">\n  <ID>42</ID>\n</Invoice>\n";
        let element = XmlElement::parse(xml.as_bytes()).unwrap();
        assert_eq!(element.local_name, "Invoice");
        assert_eq!(element.namespace_uri.as_deref(), Some("urn:test:invoice"));
        assert_eq!(
            element.raw,
            "<Invoice xmlns=\"urn:test:invoice\">\n  <ID>42</ID>\n</Invoice>"
        );
    }

    #[test]
    fn resolves_prefixed_namespace() {
        let xml = "<inv:Invoice xmlns:inv=\"urn:test:invoice\"><inv:ID>1</inv:ID></inv:Invoice>";
        let element = XmlElement::parse(xml.as_bytes()).unwrap();
        assert_eq!(element.local_name, "Invoice");
        assert_eq!(element.namespace_uri.as_deref(), Some("urn:test:invoice"));
        assert_eq!(element.raw, xml);
    }

    #[test]
    fn self_closing_root() {
        let element = XmlElement::parse(b"<Empty xmlns=\"urn:e\"/>").unwrap();
        assert_eq!(element.local_name, "Empty");
        assert_eq!(element.raw, "<Empty xmlns=\"urn:e\"/>");
    }

    #[test]
    fn no_namespace_is_none() {
        let element = XmlElement::parse(b"<Plain><X/></Plain>").unwrap();
        assert_eq!(element.namespace_uri, None);
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(matches!(
            XmlElement::parse(b"<Invoice><ID>42</Invoice>"),
            Err(XmlError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_empty_document() {
        assert!(matches!(
            XmlElement::parse(b"<?xml version=\"1.0\"?>"),
            Err(XmlError::NoRootElement)
        ));
    }

    #[test]
    fn rejects_non_utf8() {
        assert!(matches!(
            XmlElement::parse(&[0x3c, 0xff, 0xfe, 0x3e]),
            Err(XmlError::NotUtf8(_))
        ));
    }
}
