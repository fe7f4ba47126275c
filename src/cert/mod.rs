//! X.509 helpers for Peppol Access Point certificates.
//!
//! The AS2 ids of both partners are the subject common names of their AP
//! certificates, and every trust decision on the sending side hangs off
//! the receiver certificate returned by the SMP. This module extracts
//! subject/issuer common names and runs the AP certificate check:
//! validity window, Peppol trust anchors, and (optionally) revocation.

use chrono::{DateTime, Utc};
use const_oid::db::rfc4519::CN;
use der::Tag;
use der::Tagged;
use thiserror::Error;
use x509_cert::name::Name;

pub use x509_cert::Certificate;

/// Error extracting data from a certificate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CertificateError {
    /// DER decoding failed.
    #[error("failed to parse certificate: {0}")]
    Parse(String),

    /// The distinguished name carries no common-name attribute.
    #[error("certificate subject has no common name (CN)")]
    NoCommonName,
}

/// Parse a DER-encoded X.509 certificate.
pub fn parse_der(der_bytes: &[u8]) -> Result<Certificate, CertificateError> {
    use der::Decode;
    Certificate::from_der(der_bytes).map_err(|e| CertificateError::Parse(e.to_string()))
}

/// Extract the common-name attribute from a distinguished name.
pub fn common_name(name: &Name) -> Result<String, CertificateError> {
    for rdn in name.0.iter() {
        for atv in rdn.0.iter() {
            if atv.oid != CN {
                continue;
            }
            let value = atv.value.value();
            let text = match atv.value.tag() {
                Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
                    std::str::from_utf8(value)
                        .map_err(|e| CertificateError::Parse(e.to_string()))?
                }
                other => {
                    return Err(CertificateError::Parse(format!(
                        "unsupported CN encoding {other:?}"
                    )))
                }
            };
            return Ok(text.to_string());
        }
    }
    Err(CertificateError::NoCommonName)
}

/// The subject common name of a certificate.
///
/// For Peppol AP certificates this is the partner's AS2 id.
pub fn subject_common_name(cert: &Certificate) -> Result<String, CertificateError> {
    common_name(&cert.tbs_certificate.subject)
}

/// The issuer common name of a certificate.
pub fn issuer_common_name(cert: &Certificate) -> Result<String, CertificateError> {
    common_name(&cert.tbs_certificate.issuer)
}

/// Outcome of the AP certificate check.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CertificateCheckOutcome {
    /// The certificate passed all requested checks.
    Valid,
    /// The validity window starts after the check instant.
    NotYetValid,
    /// The validity window ended before the check instant.
    Expired,
    /// The issuer is not a known Peppol trust anchor, or the certificate
    /// was reported revoked.
    RevokedOrUnknownIssuer,
    /// The certificate could not be evaluated.
    Invalid(String),
}

impl CertificateCheckOutcome {
    /// Everything except [`CertificateCheckOutcome::Valid`] is invalid.
    pub fn is_invalid(&self) -> bool {
        !matches!(self, CertificateCheckOutcome::Valid)
    }
}

impl std::fmt::Display for CertificateCheckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::NotYetValid => f.write_str("not yet valid"),
            Self::Expired => f.write_str("expired"),
            Self::RevokedOrUnknownIssuer => f.write_str("revoked or unknown issuer"),
            Self::Invalid(reason) => write!(f, "invalid: {reason}"),
        }
    }
}

/// The set of issuer common names accepted as Peppol trust anchors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeppolTrustList {
    issuer_common_names: Vec<String>,
}

impl PeppolTrustList {
    /// Trust anchors of the Peppol production network.
    pub fn production() -> Self {
        Self::custom([
            "PEPPOL ACCESS POINT CA",
            "PEPPOL ACCESS POINT CA - G2",
        ])
    }

    /// Trust anchors of the Peppol test network.
    pub fn test() -> Self {
        Self::custom([
            "PEPPOL ACCESS POINT TEST CA",
            "PEPPOL ACCESS POINT TEST CA - G2",
        ])
    }

    /// A trust list from arbitrary issuer common names.
    pub fn custom<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            issuer_common_names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the given issuer common name is a trust anchor.
    pub fn contains_issuer(&self, issuer_cn: &str) -> bool {
        self.issuer_common_names.iter().any(|n| n == issuer_cn)
    }
}

/// Optional CRL/OCSP hook for the AP certificate check.
pub trait RevocationChecker: Send + Sync {
    /// Whether the certificate was revoked at the given instant.
    fn is_revoked(&self, cert: &Certificate, at: DateTime<Utc>) -> Result<bool, CertificateError>;
}

/// The receiver AP certificate check.
///
/// Checks run in order: validity window, issuer against the trust list,
/// then revocation when a checker is configured. The first failing check
/// determines the outcome.
pub struct ApCertificateCheck {
    trust_list: PeppolTrustList,
    revocation_checker: Option<Box<dyn RevocationChecker>>,
}

impl ApCertificateCheck {
    /// A check against the given trust list, without revocation checking.
    pub fn new(trust_list: PeppolTrustList) -> Self {
        Self {
            trust_list,
            revocation_checker: None,
        }
    }

    /// Enable revocation checking.
    pub fn with_revocation_checker(mut self, checker: Box<dyn RevocationChecker>) -> Self {
        self.revocation_checker = Some(checker);
        self
    }

    /// Run the check at the given instant.
    pub fn check(&self, cert: &Certificate, now: DateTime<Utc>) -> CertificateCheckOutcome {
        let validity = &cert.tbs_certificate.validity;
        let not_before = DateTime::<Utc>::from(validity.not_before.to_system_time());
        let not_after = DateTime::<Utc>::from(validity.not_after.to_system_time());
        if let Some(outcome) = check_validity_window(not_before, not_after, now) {
            return outcome;
        }

        match issuer_common_name(cert) {
            Ok(issuer_cn) => {
                if !self.trust_list.contains_issuer(&issuer_cn) {
                    return CertificateCheckOutcome::RevokedOrUnknownIssuer;
                }
            }
            Err(e) => return CertificateCheckOutcome::Invalid(e.to_string()),
        }

        if let Some(checker) = &self.revocation_checker {
            match checker.is_revoked(cert, now) {
                Ok(true) => return CertificateCheckOutcome::RevokedOrUnknownIssuer,
                Ok(false) => {}
                Err(e) => return CertificateCheckOutcome::Invalid(e.to_string()),
            }
        }

        CertificateCheckOutcome::Valid
    }
}

impl std::fmt::Debug for ApCertificateCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApCertificateCheck")
            .field("trust_list", &self.trust_list)
            .field("revocation_checker", &self.revocation_checker.is_some())
            .finish()
    }
}

/// Check that the validity window brackets `now`.
///
/// Returns `None` when the window is satisfied.
pub fn check_validity_window(
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<CertificateCheckOutcome> {
    if now < not_before {
        Some(CertificateCheckOutcome::NotYetValid)
    } else if now > not_after {
        Some(CertificateCheckOutcome::Expired)
    } else {
        None
    }
}

/// What the sending pipeline does with a certificate check outcome.
#[derive(Clone)]
pub enum CertificateCheckPolicy {
    /// Reject the send on any invalid outcome. This is the default.
    StrictReject,
    /// Record a warning and continue sending.
    PermissiveWarn,
    /// Custom decision logic.
    Custom(
        std::sync::Arc<
            dyn Fn(&Certificate, DateTime<Utc>, &CertificateCheckOutcome) -> CertificateDecision
                + Send
                + Sync,
        >,
    ),
}

/// Decision produced by a [`CertificateCheckPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateDecision {
    /// Continue sending.
    Accept,
    /// Continue sending, but record the given warning.
    AcceptWithWarning(String),
    /// Abort the send.
    Reject(String),
}

impl CertificateCheckPolicy {
    /// Evaluate a check outcome against this policy.
    pub fn evaluate(
        &self,
        cert: &Certificate,
        checked_at: DateTime<Utc>,
        outcome: &CertificateCheckOutcome,
    ) -> CertificateDecision {
        match self {
            Self::StrictReject => {
                if outcome.is_invalid() {
                    CertificateDecision::Reject(format!(
                        "the received AP certificate is not valid (at {checked_at}) and cannot \
                         be used for sending: {outcome}"
                    ))
                } else {
                    CertificateDecision::Accept
                }
            }
            Self::PermissiveWarn => {
                if outcome.is_invalid() {
                    CertificateDecision::AcceptWithWarning(format!(
                        "the received AP certificate is not valid (at {checked_at}): {outcome}"
                    ))
                } else {
                    CertificateDecision::Accept
                }
            }
            Self::Custom(f) => f(cert, checked_at, outcome),
        }
    }
}

impl Default for CertificateCheckPolicy {
    fn default() -> Self {
        Self::StrictReject
    }
}

impl std::fmt::Debug for CertificateCheckPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrictReject => f.write_str("StrictReject"),
            Self::PermissiveWarn => f.write_str("PermissiveWarn"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn common_name_from_dn() {
        let name = Name::from_str("CN=POP000092,O=Acme AP,C=DE").unwrap();
        assert_eq!(common_name(&name).unwrap(), "POP000092");
    }

    #[test]
    fn missing_common_name() {
        let name = Name::from_str("O=Acme AP,C=DE").unwrap();
        assert!(matches!(
            common_name(&name),
            Err(CertificateError::NoCommonName)
        ));
    }

    #[test]
    fn validity_window_brackets_now() {
        assert_eq!(
            check_validity_window(at(2020, 1, 1), at(2022, 1, 1), at(2021, 6, 1)),
            None
        );
        assert_eq!(
            check_validity_window(at(2020, 1, 1), at(2022, 1, 1), at(2019, 6, 1)),
            Some(CertificateCheckOutcome::NotYetValid)
        );
        assert_eq!(
            check_validity_window(at(2020, 1, 1), at(2022, 1, 1), at(2023, 6, 1)),
            Some(CertificateCheckOutcome::Expired)
        );
    }

    #[test]
    fn trust_list_matching() {
        let list = PeppolTrustList::test();
        assert!(list.contains_issuer("PEPPOL ACCESS POINT TEST CA - G2"));
        assert!(!list.contains_issuer("PEPPOL ACCESS POINT CA - G2"));
        let custom = PeppolTrustList::custom(["My CA"]);
        assert!(custom.contains_issuer("My CA"));
    }

    fn self_signed(cn: &str) -> Certificate {
        let mut params = rcgen::CertificateParams::default();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, cn);
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        parse_der(cert.der().as_ref()).unwrap()
    }

    #[test]
    fn subject_cn_from_generated_certificate() {
        let cert = self_signed("POP000092");
        assert_eq!(subject_common_name(&cert).unwrap(), "POP000092");
    }

    #[test]
    fn self_signed_certificate_has_unknown_issuer() {
        let cert = self_signed("POP000092");
        let check = ApCertificateCheck::new(PeppolTrustList::production());
        assert_eq!(
            check.check(&cert, Utc::now()),
            CertificateCheckOutcome::RevokedOrUnknownIssuer
        );
    }

    #[test]
    fn strict_policy_rejects_invalid() {
        let cert = self_signed("POP000092");
        let policy = CertificateCheckPolicy::StrictReject;
        let decision = policy.evaluate(&cert, Utc::now(), &CertificateCheckOutcome::Expired);
        assert!(matches!(decision, CertificateDecision::Reject(_)));
        let decision = policy.evaluate(&cert, Utc::now(), &CertificateCheckOutcome::Valid);
        assert_eq!(decision, CertificateDecision::Accept);
    }

    #[test]
    fn permissive_policy_warns_on_invalid() {
        let cert = self_signed("POP000092");
        let policy = CertificateCheckPolicy::PermissiveWarn;
        let decision = policy.evaluate(
            &cert,
            Utc::now(),
            &CertificateCheckOutcome::RevokedOrUnknownIssuer,
        );
        assert!(matches!(decision, CertificateDecision::AcceptWithWarning(_)));
    }
}
