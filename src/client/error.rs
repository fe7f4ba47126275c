//! Error type of the sending pipeline.

use thiserror::Error;

use crate::cert::CertificateCheckOutcome;
use crate::keystore::KeyStoreError;
use crate::sbdh::SbdhError;
use crate::validate::ValidationError;
use crate::xml::XmlError;

/// Why a send could not be performed.
///
/// Transport-level failures never appear here — once the AS2 transport
/// has been entered, problems are reported as attributes of the returned
/// response instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum As2ClientBuilderError {
    /// Verification found missing or inconsistent parameters. The
    /// individual issues were recorded on the message handler.
    #[error(
        "not all required fields are present, the AS2 call cannot be performed \
         ({error_count} error(s); see the message handler for details)"
    )]
    Incomplete {
        /// Number of errors the message handler recorded.
        error_count: usize,
    },

    /// The receiver AP certificate was rejected by the check policy.
    #[error("receiver AP certificate rejected: {reason}")]
    CertificateInvalid {
        /// The check outcome that led to the rejection.
        outcome: CertificateCheckOutcome,
        /// Why the policy rejected.
        reason: String,
    },

    /// The business document is missing or not well-formed XML.
    #[error("business document cannot be used: {0}")]
    PayloadMalformed(#[from] XmlError),

    /// Validation failed fatally (unknown rule set, execution failure,
    /// or an aborting result handler).
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// SBD construction or serialization failed.
    #[error(transparent)]
    Sbdh(#[from] SbdhError),

    /// The key store could not be read or written.
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
}
