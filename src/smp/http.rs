//! Blocking HTTP SMP client.
//!
//! Fetches `{base}/{participant}/services/{document-type}` and parses the
//! `SignedServiceMetadata` response. DNS-based SMP host discovery is the
//! caller's business; this client takes the SMP base URL as-is.

use std::time::Duration;

use base64::prelude::*;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use super::{
    ProcessMetadata, SignedServiceMetadata, SmpEndpoint, SmpError, SmpServiceMetadataProvider,
};
use crate::identifier::{
    DocumentTypeIdentifier, ParticipantIdentifier, ProcessIdentifier, TransportProfile,
    DEFAULT_PROCESS_SCHEME,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A blocking SMP client over HTTP.
pub struct SmpHttpClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl SmpHttpClient {
    /// Create a client for the given SMP base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SmpError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SmpError::Lookup(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn service_url(
        &self,
        receiver: &ParticipantIdentifier,
        document_type: &DocumentTypeIdentifier,
    ) -> Result<reqwest::Url, SmpError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| SmpError::Lookup(format!("invalid SMP base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SmpError::Lookup("SMP base URL cannot carry a path".into()))?
            .pop_if_empty()
            .push(&receiver.uri_encoded())
            .push("services")
            .push(&document_type.uri_encoded());
        Ok(url)
    }
}

impl SmpServiceMetadataProvider for SmpHttpClient {
    fn service_metadata(
        &self,
        receiver: &ParticipantIdentifier,
        document_type: &DocumentTypeIdentifier,
    ) -> Result<Option<SignedServiceMetadata>, SmpError> {
        let url = self.service_url(receiver, document_type)?;
        debug!(%url, "querying SMP");

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SmpError::Lookup(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response
            .text()
            .map_err(|e| SmpError::Lookup(e.to_string()))?;
        if !status.is_success() {
            return Err(SmpError::Lookup(format!("HTTP {status}: {body}")));
        }

        parse_signed_service_metadata(&body, receiver, document_type).map(Some)
    }
}

/// Parse a `SignedServiceMetadata` response body.
///
/// Only the path the sending pipeline consumes is read:
/// `ServiceInformation → ProcessList → Process → ServiceEndpointList →
/// Endpoint` with `EndpointURI` (or the older `Address` form) and
/// `Certificate`. The enclosing XMLDSIG signature is not verified here.
pub fn parse_signed_service_metadata(
    xml: &str,
    receiver: &ParticipantIdentifier,
    document_type: &DocumentTypeIdentifier,
) -> Result<SignedServiceMetadata, SmpError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut processes: Vec<ProcessMetadata> = Vec::new();
    let mut current_process: Option<ProcessMetadata> = None;
    let mut current_endpoint: Option<SmpEndpoint> = None;
    let mut path: Vec<String> = Vec::new();
    let mut process_scheme: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_str() {
                    "Process" => {
                        current_process = Some(ProcessMetadata {
                            process: ProcessIdentifier::new(DEFAULT_PROCESS_SCHEME, ""),
                            endpoints: Vec::new(),
                        });
                        process_scheme = None;
                    }
                    "ProcessIdentifier" => {
                        process_scheme = attribute(&e, b"scheme");
                    }
                    "Endpoint" => {
                        let profile = attribute(&e, b"transportProfile").ok_or_else(|| {
                            SmpError::Parse("Endpoint without transportProfile attribute".into())
                        })?;
                        current_endpoint = Some(SmpEndpoint {
                            transport_profile: TransportProfile::new(profile),
                            endpoint_uri: String::new(),
                            certificate_der: Vec::new(),
                        });
                    }
                    _ => {}
                }
                path.push(local);
            }
            Ok(Event::Empty(_)) => {}
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| SmpError::Parse(e.to_string()))?
                    .trim()
                    .to_string();
                if value.is_empty() {
                    continue;
                }
                match path.last().map(String::as_str) {
                    Some("ProcessIdentifier") => {
                        if let Some(process) = current_process.as_mut() {
                            process.process = ProcessIdentifier::new(
                                process_scheme
                                    .clone()
                                    .unwrap_or_else(|| DEFAULT_PROCESS_SCHEME.to_string()),
                                value,
                            );
                        }
                    }
                    Some("EndpointURI") | Some("Address") => {
                        if let Some(endpoint) = current_endpoint.as_mut() {
                            endpoint.endpoint_uri = value;
                        }
                    }
                    Some("Certificate") => {
                        if let Some(endpoint) = current_endpoint.as_mut() {
                            endpoint.certificate_der = decode_certificate(&value)?;
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                match path.pop().as_deref() {
                    Some("Endpoint") => {
                        if let (Some(process), Some(endpoint)) =
                            (current_process.as_mut(), current_endpoint.take())
                        {
                            process.endpoints.push(endpoint);
                        }
                    }
                    Some("Process") => {
                        if let Some(process) = current_process.take() {
                            processes.push(process);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(SmpError::Parse(e.to_string())),
        }
    }

    Ok(SignedServiceMetadata {
        participant: receiver.clone(),
        document_type: document_type.clone(),
        processes,
    })
}

fn local_name(qname: &[u8]) -> String {
    let name = match qname.iter().rposition(|&b| b == b':') {
        Some(idx) => &qname[idx + 1..],
        None => qname,
    };
    String::from_utf8_lossy(name).into_owned()
}

fn attribute(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        // Ignore any namespace prefix on the attribute name.
        let attr_local = match attr.key.as_ref().iter().rposition(|&b| b == b':') {
            Some(idx) => &attr.key.as_ref()[idx + 1..],
            None => attr.key.as_ref(),
        };
        if attr_local == key {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

/// Decode the `Certificate` element payload: base64 of the DER bytes,
/// possibly wrapped in PEM armor lines.
fn decode_certificate(text: &str) -> Result<Vec<u8>, SmpError> {
    let cleaned: String = text
        .lines()
        .filter(|line| !line.contains("-----"))
        .flat_map(|line| line.chars())
        .filter(|c| !c.is_whitespace())
        .collect();
    BASE64_STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| SmpError::Parse(format!("invalid endpoint certificate base64: {e}")))
}
