//! SMP endpoint discovery.
//!
//! The resolver consumes the signed service metadata of a receiver
//! participant and picks an endpoint by walking an ordered list of
//! transport profiles. Only the subset of the metadata the sending
//! pipeline needs is modeled: process list, endpoints, endpoint URI, and
//! the endpoint certificate.

#[cfg(feature = "smp-http")]
mod http;

#[cfg(feature = "smp-http")]
pub use http::{parse_signed_service_metadata, SmpHttpClient};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cert::{self, Certificate};
use crate::identifier::{
    DocumentTypeIdentifier, ParticipantIdentifier, ProcessIdentifier, TransportProfile,
};

/// Error from an SMP lookup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SmpError {
    /// Network-level failure while querying the SMP.
    #[error("SMP lookup failed: {0}")]
    Lookup(String),

    /// The SMP response could not be parsed.
    #[error("SMP response could not be parsed: {0}")]
    Parse(String),

    /// No service registration exists for the participant/document type.
    #[error("no SMP service registration for the given participant and document type")]
    NoServiceRegistration,

    /// A registration exists but no endpoint matches process + profiles.
    #[error("SMP service registration has no endpoint matching the process and transport profiles")]
    NoMatchingEndpoint,

    /// The endpoint certificate could not be decoded.
    #[error("SMP endpoint certificate is unusable: {0}")]
    Certificate(String),
}

/// One endpoint of a service registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmpEndpoint {
    /// Transport profile this endpoint speaks.
    pub transport_profile: TransportProfile,
    /// The AS2 endpoint URL.
    pub endpoint_uri: String,
    /// DER-encoded endpoint certificate.
    pub certificate_der: Vec<u8>,
}

/// One process entry of a service registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMetadata {
    /// The process this entry serves.
    pub process: ProcessIdentifier,
    /// Endpoints in document order.
    pub endpoints: Vec<SmpEndpoint>,
}

/// The consumed subset of a `SignedServiceMetadata` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedServiceMetadata {
    /// The participant the registration belongs to.
    pub participant: ParticipantIdentifier,
    /// The registered document type.
    pub document_type: DocumentTypeIdentifier,
    /// Process entries in document order.
    pub processes: Vec<ProcessMetadata>,
}

/// A resolved endpoint, ready for the AS2 pipeline.
#[derive(Debug, Clone)]
pub struct EndpointInfo {
    /// The AS2 endpoint URL.
    pub url: String,
    /// The endpoint's AP certificate.
    pub certificate: Certificate,
    /// The transport profile that matched.
    pub transport_profile: TransportProfile,
}

/// Source of signed service metadata — typically an SMP HTTP client.
pub trait SmpServiceMetadataProvider {
    /// Fetch the service metadata for `(receiver, document_type)`.
    ///
    /// `Ok(None)` means the SMP has no registration for the combination;
    /// errors mean the lookup itself failed.
    fn service_metadata(
        &self,
        receiver: &ParticipantIdentifier,
        document_type: &DocumentTypeIdentifier,
    ) -> Result<Option<SignedServiceMetadata>, SmpError>;
}

/// Select an endpoint by ordered transport-profile preference.
///
/// For each profile, the registration's processes are scanned for an
/// endpoint matching both the process identifier and the profile. The
/// first profile with any match wins; within a profile, document order
/// decides.
pub fn select_endpoint<'a>(
    metadata: &'a SignedServiceMetadata,
    process: &ProcessIdentifier,
    profiles: &'a [TransportProfile],
) -> Option<(&'a SmpEndpoint, &'a TransportProfile)> {
    for profile in profiles {
        for entry in &metadata.processes {
            if &entry.process != process {
                continue;
            }
            for endpoint in &entry.endpoints {
                if &endpoint.transport_profile == profile {
                    return Some((endpoint, profile));
                }
            }
        }
    }
    None
}

/// Resolve the receiver endpoint via an SMP lookup.
///
/// The chosen transport profile is part of the returned [`EndpointInfo`];
/// callers adjust their signing algorithm from it exactly once.
pub fn resolve_endpoint(
    provider: &dyn SmpServiceMetadataProvider,
    receiver: &ParticipantIdentifier,
    document_type: &DocumentTypeIdentifier,
    process: &ProcessIdentifier,
    profiles: &[TransportProfile],
) -> Result<EndpointInfo, SmpError> {
    debug!(
        receiver = %receiver.uri_encoded(),
        document_type = %document_type.uri_encoded(),
        process = %process.uri_encoded(),
        "performing SMP lookup"
    );

    let metadata = provider
        .service_metadata(receiver, document_type)?
        .ok_or(SmpError::NoServiceRegistration)?;

    let (endpoint, profile) =
        select_endpoint(&metadata, process, profiles).ok_or(SmpError::NoMatchingEndpoint)?;
    debug!(profile = %profile, url = %endpoint.endpoint_uri, "selected SMP endpoint");

    let certificate = cert::parse_der(&endpoint.certificate_der)
        .map_err(|e| SmpError::Certificate(e.to_string()))?;

    Ok(EndpointInfo {
        url: endpoint.endpoint_uri.clone(),
        certificate,
        transport_profile: profile.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(profile: &TransportProfile, url: &str) -> SmpEndpoint {
        SmpEndpoint {
            transport_profile: profile.clone(),
            endpoint_uri: url.to_string(),
            certificate_der: vec![0x30],
        }
    }

    fn metadata(processes: Vec<ProcessMetadata>) -> SignedServiceMetadata {
        SignedServiceMetadata {
            participant: ParticipantIdentifier::with_default_scheme("9915:r"),
            document_type: DocumentTypeIdentifier::with_default_scheme("urn:doc"),
            processes,
        }
    }

    #[test]
    fn first_preferred_profile_with_match_wins() {
        let process = ProcessIdentifier::with_default_scheme("urn:proc");
        let md = metadata(vec![ProcessMetadata {
            process: process.clone(),
            endpoints: vec![
                endpoint(&TransportProfile::AS2_V1, "http://v1.example.org/as2"),
                endpoint(&TransportProfile::AS2_V2, "http://v2.example.org/as2"),
            ],
        }]);

        let preference = [TransportProfile::AS2_V2, TransportProfile::AS2_V1];
        let (ep, profile) = select_endpoint(&md, &process, &preference).unwrap();
        assert_eq!(profile, &TransportProfile::AS2_V2);
        assert_eq!(ep.endpoint_uri, "http://v2.example.org/as2");

        let preference = [TransportProfile::AS2_V1, TransportProfile::AS2_V2];
        let (ep, profile) = select_endpoint(&md, &process, &preference).unwrap();
        assert_eq!(profile, &TransportProfile::AS2_V1);
        assert_eq!(ep.endpoint_uri, "http://v1.example.org/as2");
    }

    #[test]
    fn document_order_breaks_ties_within_a_profile() {
        let process = ProcessIdentifier::with_default_scheme("urn:proc");
        let md = metadata(vec![ProcessMetadata {
            process: process.clone(),
            endpoints: vec![
                endpoint(&TransportProfile::AS2_V1, "http://first.example.org/as2"),
                endpoint(&TransportProfile::AS2_V1, "http://second.example.org/as2"),
            ],
        }]);

        let (ep, _) = select_endpoint(&md, &process, &[TransportProfile::AS2_V1]).unwrap();
        assert_eq!(ep.endpoint_uri, "http://first.example.org/as2");
    }

    #[test]
    fn non_matching_process_yields_nothing() {
        let process = ProcessIdentifier::with_default_scheme("urn:proc");
        let other = ProcessIdentifier::with_default_scheme("urn:other");
        let md = metadata(vec![ProcessMetadata {
            process,
            endpoints: vec![endpoint(&TransportProfile::AS2_V1, "http://x/as2")],
        }]);
        assert!(select_endpoint(&md, &other, &[TransportProfile::AS2_V1]).is_none());
    }

    struct FixedProvider(Option<SignedServiceMetadata>);

    impl SmpServiceMetadataProvider for FixedProvider {
        fn service_metadata(
            &self,
            _receiver: &ParticipantIdentifier,
            _document_type: &DocumentTypeIdentifier,
        ) -> Result<Option<SignedServiceMetadata>, SmpError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn resolve_reports_missing_registration() {
        let process = ProcessIdentifier::with_default_scheme("urn:proc");
        let err = resolve_endpoint(
            &FixedProvider(None),
            &ParticipantIdentifier::with_default_scheme("9915:r"),
            &DocumentTypeIdentifier::with_default_scheme("urn:doc"),
            &process,
            &[TransportProfile::AS2_V2],
        )
        .unwrap_err();
        assert!(matches!(err, SmpError::NoServiceRegistration));
    }

    #[test]
    fn resolve_reports_missing_endpoint() {
        let process = ProcessIdentifier::with_default_scheme("urn:proc");
        let md = metadata(vec![]);
        let err = resolve_endpoint(
            &FixedProvider(Some(md)),
            &ParticipantIdentifier::with_default_scheme("9915:r"),
            &DocumentTypeIdentifier::with_default_scheme("urn:doc"),
            &process,
            &[TransportProfile::AS2_V2],
        )
        .unwrap_err();
        assert!(matches!(err, SmpError::NoMatchingEndpoint));
    }
}
