//! The AS2 client builder and its send pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use super::error::As2ClientBuilderError;
use super::message_id::expand_message_id;
use super::settings::{
    As2ClientSettings, ReceiverSettings, SenderSettings, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_READ_TIMEOUT,
};
use super::{APP_PREFIX_V3, DEFAULT_AS2_SUBJECT, DEFAULT_MESSAGE_ID_FORMAT, DEFAULT_MIME_TYPE};
use crate::as2::{
    header, As2ClientRequest, As2ClientResponse, As2TransportFactory, ContentTransferEncoding,
    DispositionOptions, HttpIncomingDumper, HttpOutgoingDumperFactory, RequestPayload,
    SigningAlgorithm,
};
use crate::cert::{
    self, ApCertificateCheck, Certificate, CertificateCheckPolicy, CertificateDecision,
    PeppolTrustList,
};
use crate::handlers::{CollectingMessageHandler, MessageHandler};
use crate::identifier::{
    DocumentTypeIdentifier, ParticipantIdentifier, ProcessIdentifier, TransportProfile,
    DEFAULT_PARTICIPANT_SCHEME, DEFAULT_PROCESS_SCHEME, DOCUMENT_TYPE_SCHEME_BUSDOX_DOCID_QNS,
    DOCUMENT_TYPE_SCHEME_PEPPOL_DOCTYPE_WILDCARD,
};
use crate::keystore::KeyStoreConfig;
use crate::sbdh::{build_sbd, to_sbdh_xml, NamespaceContext};
use crate::smp::{resolve_endpoint, SmpError, SmpServiceMetadataProvider};
use crate::validate::{
    validate_business_document, LenientValidationResultHandler, RuleSetId, ValidationRegistry,
    ValidationResultHandler,
};
use crate::xml::XmlElement;

/// The business document to be wrapped into the SBD. Exactly one form is
/// configured per send; setting another form replaces the previous one.
#[derive(Debug, Clone)]
pub enum BusinessPayload {
    /// Read the document from a file at send time.
    File(PathBuf),
    /// Use the given document bytes.
    Bytes(Vec<u8>),
    /// Use an already parsed element.
    Element(XmlElement),
}

/// What to do with the transport profile chosen by the SMP lookup.
#[derive(Clone)]
pub enum SelectedProfileAction {
    /// Align the signing algorithm with the profile: AS2 v1 signs with
    /// SHA-1, AS2 v2 with SHA-256. This is the default.
    AdjustSigningAlgorithm,
    /// Leave the configured signing algorithm untouched.
    Ignore,
    /// Custom mapping from profile to signing algorithm; `None` leaves
    /// the configured algorithm untouched.
    Custom(Arc<dyn Fn(&TransportProfile) -> Option<SigningAlgorithm> + Send + Sync>),
}

impl std::fmt::Debug for SelectedProfileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdjustSigningAlgorithm => f.write_str("AdjustSigningAlgorithm"),
            Self::Ignore => f.write_str("Ignore"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A default-derivation step, run in order before verification.
pub type DerivationStep = fn(&mut As2ClientBuilder);

fn derive_sender_key_alias(builder: &mut As2ClientBuilder) {
    if builder.sender_as2_key_alias.is_none() {
        if let Some(id) = builder.sender_as2_id.clone() {
            debug!("the sender AS2 key alias was defaulted to the AS2 sender ID ('{id}')");
            builder.sender_as2_key_alias = Some(id);
        }
    }
}

fn derive_receiver_key_alias(builder: &mut As2ClientBuilder) {
    if builder.receiver_as2_key_alias.is_none() {
        if let Some(id) = builder.receiver_as2_id.clone() {
            debug!("the receiver AS2 key alias was defaulted to the AS2 receiver ID ('{id}')");
            builder.receiver_as2_key_alias = Some(id);
        }
    }
}

/// Builder for one Peppol AS2 send.
///
/// All parameters without an explicit default must be set (or be
/// derivable from the SMP lookup), otherwise verification fails before
/// anything goes over the wire. The builder is not meant to be shared:
/// one builder per send, and the terminal `send_synchronous*` methods
/// consume it.
pub struct As2ClientBuilder {
    message_handler: Box<dyn MessageHandler>,
    key_store: Option<KeyStoreConfig>,
    as2_subject: String,
    sender_as2_id: Option<String>,
    sender_as2_email: Option<String>,
    sender_as2_key_alias: Option<String>,
    receiver_as2_id: Option<String>,
    receiver_as2_key_alias: Option<String>,
    receiver_as2_url: Option<String>,
    receiver_certificate: Option<Certificate>,
    certificate_check: ApCertificateCheck,
    certificate_check_policy: CertificateCheckPolicy,
    signing_algorithm: SigningAlgorithm,
    message_id_format: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    business_document: Option<BusinessPayload>,
    peppol_sender_id: Option<ParticipantIdentifier>,
    peppol_receiver_id: Option<ParticipantIdentifier>,
    peppol_document_type_id: Option<DocumentTypeIdentifier>,
    peppol_process_id: Option<ProcessIdentifier>,
    rule_set_id: Option<RuleSetId>,
    validation_registry: Arc<ValidationRegistry>,
    validation_result_handler: Box<dyn ValidationResultHandler>,
    smp_client: Option<Box<dyn SmpServiceMetadataProvider>>,
    transport_factory: Option<Box<dyn As2TransportFactory>>,
    sbdh_namespace_context: NamespaceContext,
    sbdh_bytes_observer: Option<Box<dyn Fn(&[u8])>>,
    content_transfer_encoding: ContentTransferEncoding,
    mime_type: String,
    outgoing_dumper_factory: Option<Arc<dyn HttpOutgoingDumperFactory>>,
    incoming_dumper: Option<Arc<dyn HttpIncomingDumper>>,
    use_data_handler: bool,
    custom_headers: Vec<(String, String)>,
    transport_profiles: Vec<TransportProfile>,
    selected_profile_action: SelectedProfileAction,
    derivations: Vec<DerivationStep>,
    ubl_version: String,
    proxy: Option<String>,
    debug: bool,
}

impl Default for As2ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl As2ClientBuilder {
    /// A builder with all defaults applied.
    pub fn new() -> Self {
        Self {
            message_handler: Box::new(CollectingMessageHandler::new()),
            key_store: None,
            as2_subject: DEFAULT_AS2_SUBJECT.to_string(),
            sender_as2_id: None,
            sender_as2_email: None,
            sender_as2_key_alias: None,
            receiver_as2_id: None,
            receiver_as2_key_alias: None,
            receiver_as2_url: None,
            receiver_certificate: None,
            certificate_check: ApCertificateCheck::new(PeppolTrustList::production()),
            certificate_check_policy: CertificateCheckPolicy::StrictReject,
            signing_algorithm: SigningAlgorithm::Sha1,
            message_id_format: DEFAULT_MESSAGE_ID_FORMAT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            business_document: None,
            peppol_sender_id: None,
            peppol_receiver_id: None,
            peppol_document_type_id: None,
            peppol_process_id: None,
            rule_set_id: None,
            validation_registry: Arc::new(ValidationRegistry::new()),
            validation_result_handler: Box::new(LenientValidationResultHandler),
            smp_client: None,
            transport_factory: None,
            sbdh_namespace_context: NamespaceContext::default(),
            sbdh_bytes_observer: None,
            content_transfer_encoding: ContentTransferEncoding::default(),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            outgoing_dumper_factory: None,
            incoming_dumper: None,
            use_data_handler: true,
            custom_headers: Vec::new(),
            transport_profiles: vec![TransportProfile::AS2_V2, TransportProfile::AS2_V1],
            selected_profile_action: SelectedProfileAction::AdjustSigningAlgorithm,
            derivations: vec![derive_sender_key_alias, derive_receiver_key_alias],
            ubl_version: crate::sbdh::DEFAULT_UBL_VERSION.to_string(),
            proxy: None,
            debug: false,
        }
    }

    /// Replace the message handler collecting verification issues.
    pub fn message_handler(mut self, handler: Box<dyn MessageHandler>) -> Self {
        self.message_handler = handler;
        self
    }

    /// Set the key store binding.
    pub fn key_store(mut self, key_store: KeyStoreConfig) -> Self {
        self.key_store = Some(key_store);
        self
    }

    /// Set the AS2 message subject.
    pub fn as2_subject(mut self, subject: impl Into<String>) -> Self {
        self.as2_subject = subject.into();
        self
    }

    /// Set the AS2 sender id (`AS2-From`). For Peppol this is the
    /// subject CN of the sender AP certificate.
    pub fn sender_as2_id(mut self, id: impl Into<String>) -> Self {
        self.sender_as2_id = Some(id.into());
        self
    }

    /// Set the sender contact email address.
    pub fn sender_as2_email(mut self, email: impl Into<String>) -> Self {
        self.sender_as2_email = Some(email.into());
        self
    }

    /// Set the key alias of the sender key. Defaults to the sender AS2
    /// id during derivation.
    pub fn sender_as2_key_alias(mut self, alias: impl Into<String>) -> Self {
        self.sender_as2_key_alias = Some(alias.into());
        self
    }

    /// Set the AS2 receiver id (`AS2-To`). Filled from the SMP endpoint
    /// certificate when absent.
    pub fn receiver_as2_id(mut self, id: impl Into<String>) -> Self {
        self.receiver_as2_id = Some(id.into());
        self
    }

    /// Set the key alias under which the receiver certificate is stored.
    /// Defaults to the receiver AS2 id during derivation.
    pub fn receiver_as2_key_alias(mut self, alias: impl Into<String>) -> Self {
        self.receiver_as2_key_alias = Some(alias.into());
        self
    }

    /// Set the receiver endpoint URL. Filled from the SMP when absent.
    pub fn receiver_as2_url(mut self, url: impl Into<String>) -> Self {
        self.receiver_as2_url = Some(url.into());
        self
    }

    /// Set the receiver AP certificate. Filled from the SMP when absent.
    pub fn receiver_certificate(mut self, certificate: Certificate) -> Self {
        self.receiver_certificate = Some(certificate);
        self
    }

    /// Replace the AP certificate check (trust list, revocation).
    pub fn certificate_check(mut self, check: ApCertificateCheck) -> Self {
        self.certificate_check = check;
        self
    }

    /// Set what a failed certificate check means for the send.
    pub fn certificate_check_policy(mut self, policy: CertificateCheckPolicy) -> Self {
        self.certificate_check_policy = policy;
        self
    }

    /// Set the signing algorithm. Overridden by the SMP lookup when the
    /// selected-profile action says so.
    pub fn as2_signing_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.signing_algorithm = algorithm;
        self
    }

    /// Set the message-id template.
    pub fn as2_message_id_format(mut self, format: impl Into<String>) -> Self {
        self.message_id_format = format.into();
        self
    }

    /// Bound the TCP+TLS handshake.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound any single socket read.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Use the file at `path` as the business document.
    pub fn business_document_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.business_document = Some(BusinessPayload::File(path.into()));
        self
    }

    /// Use the given bytes as the business document.
    pub fn business_document_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.business_document = Some(BusinessPayload::Bytes(bytes));
        self
    }

    /// Use an already parsed element as the business document.
    pub fn business_document_element(mut self, element: XmlElement) -> Self {
        self.business_document = Some(BusinessPayload::Element(element));
        self
    }

    /// Set the Peppol sender participant id.
    pub fn peppol_sender_id(mut self, id: ParticipantIdentifier) -> Self {
        self.peppol_sender_id = Some(id);
        self
    }

    /// Set the Peppol receiver participant id.
    pub fn peppol_receiver_id(mut self, id: ParticipantIdentifier) -> Self {
        self.peppol_receiver_id = Some(id);
        self
    }

    /// Set the Peppol document type id.
    pub fn peppol_document_type_id(mut self, id: DocumentTypeIdentifier) -> Self {
        self.peppol_document_type_id = Some(id);
        self
    }

    /// Set the Peppol process id.
    pub fn peppol_process_id(mut self, id: ProcessIdentifier) -> Self {
        self.peppol_process_id = Some(id);
        self
    }

    /// Validate the payload against the given rule set before sending.
    pub fn validation_rule_set(mut self, id: RuleSetId) -> Self {
        self.rule_set_id = Some(id);
        self
    }

    /// Provide the registry the rule set is looked up in.
    pub fn validation_registry(mut self, registry: Arc<ValidationRegistry>) -> Self {
        self.validation_registry = registry;
        self
    }

    /// Replace the validation result handler.
    pub fn validation_result_handler(mut self, handler: Box<dyn ValidationResultHandler>) -> Self {
        self.validation_result_handler = handler;
        self
    }

    /// Configure an SMP client for endpoint discovery. Without one, the
    /// receiver URL, certificate, and AS2 id must be set explicitly.
    pub fn smp_client(mut self, client: Box<dyn SmpServiceMetadataProvider>) -> Self {
        self.smp_client = Some(client);
        self
    }

    /// Set the transport factory performing the actual AS2 exchange.
    pub fn as2_transport_factory(mut self, factory: Box<dyn As2TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Override the SBDH namespace binding.
    pub fn sbdh_namespace_context(mut self, context: NamespaceContext) -> Self {
        self.sbdh_namespace_context = context;
        self
    }

    /// Observe the serialized SBDH bytes (logging only; called once).
    pub fn sbdh_bytes_observer(mut self, observer: Box<dyn Fn(&[u8])>) -> Self {
        self.sbdh_bytes_observer = Some(observer);
        self
    }

    /// Set a custom `Content-Transfer-Encoding`.
    pub fn content_transfer_encoding(mut self, cte: ContentTransferEncoding) -> Self {
        self.content_transfer_encoding = cte;
        self
    }

    /// Set the MIME type of the payload body part.
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Dump outgoing traffic through dumpers from this factory.
    pub fn outgoing_dumper_factory(mut self, factory: Arc<dyn HttpOutgoingDumperFactory>) -> Self {
        self.outgoing_dumper_factory = Some(factory);
        self
    }

    /// Dump incoming traffic through this dumper.
    pub fn incoming_dumper(mut self, dumper: Arc<dyn HttpIncomingDumper>) -> Self {
        self.incoming_dumper = Some(dumper);
        self
    }

    /// Attach the payload as typed bytes (`true`, default) or as a
    /// string with an explicitly forced `Content-Type` (`false`).
    pub fn use_data_handler(mut self, use_data_handler: bool) -> Self {
        self.use_data_handler = use_data_handler;
        self
    }

    /// Add a custom header to the outgoing message.
    pub fn custom_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.push((name.into(), value.into()));
        self
    }

    /// Set the transport profiles tried during SMP endpoint selection,
    /// in preference order.
    pub fn smp_transport_profiles(mut self, profiles: Vec<TransportProfile>) -> Self {
        self.transport_profiles = profiles;
        self
    }

    /// Set what happens when the SMP lookup selects a transport profile.
    pub fn selected_profile_action(mut self, action: SelectedProfileAction) -> Self {
        self.selected_profile_action = action;
        self
    }

    /// Append a default-derivation step.
    pub fn derivation_step(mut self, step: DerivationStep) -> Self {
        self.derivations.push(step);
        self
    }

    /// Set the UBL type version written into the SBDH.
    pub fn ubl_version(mut self, version: impl Into<String>) -> Self {
        self.ubl_version = version.into();
        self
    }

    /// Route the AS2 exchange through an HTTP proxy.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Enable verbose transport diagnostics.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    /// SMP lookup filling receiver URL, certificate, and AS2 id.
    ///
    /// Skipped (with a warning) when the Peppol ids are incomplete, and
    /// skipped silently when all three receiver fields are already set.
    /// Network and parse failures are logged and absorbed; the gaps they
    /// leave are caught by verification. A failing certificate check is
    /// the one hard stop here, subject to the check policy.
    fn perform_smp_client_lookup(&mut self) -> Result<(), As2ClientBuilderError> {
        if self.smp_client.is_none() {
            return Ok(());
        }
        let Some(receiver) = self.peppol_receiver_id.clone() else {
            self.message_handler
                .warn("cannot perform SMP lookup because the Peppol receiver ID is missing".into());
            return Ok(());
        };
        let Some(document_type) = self.peppol_document_type_id.clone() else {
            self.message_handler.warn(
                "cannot perform SMP lookup because the Peppol document type ID is missing".into(),
            );
            return Ok(());
        };
        let Some(process) = self.peppol_process_id.clone() else {
            self.message_handler
                .warn("cannot perform SMP lookup because the Peppol process ID is missing".into());
            return Ok(());
        };

        if self.receiver_as2_url.is_some()
            && self.receiver_certificate.is_some()
            && self.receiver_as2_id.is_some()
        {
            debug!("not performing SMP lookup because all target fields are already set");
            return Ok(());
        }

        let smp_client = match &self.smp_client {
            Some(client) => client.as_ref(),
            None => return Ok(()),
        };
        let endpoint = match resolve_endpoint(
            smp_client,
            &receiver,
            &document_type,
            &process,
            &self.transport_profiles,
        ) {
            Ok(endpoint) => endpoint,
            Err(e @ (SmpError::Lookup(_) | SmpError::Parse(_))) => {
                // Transient SMP trouble; verification will flag whatever
                // stays missing.
                error!("error querying the SMP: {e}");
                return Ok(());
            }
            Err(e @ (SmpError::NoServiceRegistration | SmpError::NoMatchingEndpoint)) => {
                self.message_handler.error(format!(
                    "failed to perform SMP lookup for receiver '{}' on document type '{}' and \
                     process ID '{}' using transport profiles {}: {e}",
                    receiver.uri_encoded(),
                    document_type.uri_encoded(),
                    process.uri_encoded(),
                    self.transport_profiles
                        .iter()
                        .map(TransportProfile::id)
                        .collect::<Vec<_>>()
                        .join(", "),
                ));
                return Ok(());
            }
            Err(e @ SmpError::Certificate(_)) => {
                self.message_handler.error(format!(
                    "failed to build X.509 certificate from SMP client response: {e}"
                ));
                return Ok(());
            }
        };

        // Adjust the signing algorithm from the chosen profile, once.
        match &self.selected_profile_action {
            SelectedProfileAction::AdjustSigningAlgorithm => {
                if endpoint.transport_profile == TransportProfile::AS2_V1 {
                    self.signing_algorithm = SigningAlgorithm::Sha1;
                } else if endpoint.transport_profile == TransportProfile::AS2_V2 {
                    self.signing_algorithm = SigningAlgorithm::Sha256;
                }
            }
            SelectedProfileAction::Ignore => {}
            SelectedProfileAction::Custom(f) => {
                if let Some(algorithm) = f(&endpoint.transport_profile) {
                    self.signing_algorithm = algorithm;
                }
            }
        }

        if self.receiver_as2_url.is_none() {
            self.receiver_as2_url = Some(endpoint.url);
        }
        if self.receiver_certificate.is_none() {
            self.receiver_certificate = Some(endpoint.certificate);
        }

        // Check whatever receiver certificate is in place now.
        if let Some(certificate) = &self.receiver_certificate {
            let now = Utc::now();
            let outcome = self.certificate_check.check(certificate, now);
            match self
                .certificate_check_policy
                .evaluate(certificate, now, &outcome)
            {
                CertificateDecision::Accept => {}
                CertificateDecision::AcceptWithWarning(warning) => {
                    self.message_handler.warn(warning);
                }
                CertificateDecision::Reject(reason) => {
                    return Err(As2ClientBuilderError::CertificateInvalid { outcome, reason });
                }
            }

            if self.receiver_as2_id.is_none() {
                match cert::subject_common_name(certificate) {
                    Ok(cn) => self.receiver_as2_id = Some(cn),
                    Err(e) => self.message_handler.error_with_cause(
                        "failed to get the receiver AS2 ID from the endpoint certificate".into(),
                        &e,
                    ),
                }
            }
        }

        Ok(())
    }

    /// Run the default-derivation steps in order.
    fn set_default_derived_values(&mut self) {
        let steps = self.derivations.clone();
        for step in steps {
            step(self);
        }
    }

    /// Exhaustively check the parameter set, recording every issue on
    /// the message handler. Fails when any error was recorded.
    fn verify_content(&mut self, check_payload: bool) -> Result<(), As2ClientBuilderError> {
        match &self.key_store {
            None => self
                .message_handler
                .error("no AS2 key store is defined".into()),
            Some(key_store) => key_store.verify(self.message_handler.as_mut()),
        }

        if self.as2_subject.is_empty() {
            self.message_handler
                .error("the AS2 message subject is missing".into());
        }

        match self.sender_as2_id.as_deref() {
            None | Some("") => self
                .message_handler
                .error("the AS2 sender ID is missing".into()),
            Some(id) if !id.starts_with(APP_PREFIX_V3) => self.message_handler.warn(format!(
                "the AS2 sender ID '{id}' should start with '{APP_PREFIX_V3}' as required by \
                 the Peppol specification"
            )),
            _ => {}
        }

        match self.sender_as2_email.as_deref() {
            None | Some("") => self
                .message_handler
                .error("the AS2 sender email address is missing".into()),
            Some(email) if !is_plausible_email(email) => self.message_handler.warn(format!(
                "the AS2 sender email address '{email}' seems to be an invalid email address"
            )),
            _ => {}
        }

        match self.sender_as2_key_alias.as_deref() {
            None | Some("") => self
                .message_handler
                .error("the AS2 sender key alias is missing".into()),
            Some(alias) if !alias.starts_with(APP_PREFIX_V3) => {
                self.message_handler.warn(format!(
                    "the AS2 sender key alias '{alias}' should start with '{APP_PREFIX_V3}' \
                     for the use with the dynamic AS2 partnerships"
                ))
            }
            Some(alias) => {
                if let Some(id) = self.sender_as2_id.as_deref() {
                    if id != alias {
                        self.message_handler.warn(format!(
                            "the AS2 sender key alias ('{alias}') should match the AS2 sender \
                             ID ('{id}')"
                        ));
                    }
                }
            }
        }

        match self.receiver_as2_id.as_deref() {
            None | Some("") => self
                .message_handler
                .error("the AS2 receiver ID is missing".into()),
            Some(id) if !id.starts_with(APP_PREFIX_V3) => self.message_handler.warn(format!(
                "the AS2 receiver ID '{id}' should start with '{APP_PREFIX_V3}' as required \
                 by the Peppol specification"
            )),
            _ => {}
        }

        match self.receiver_as2_key_alias.as_deref() {
            None | Some("") => self
                .message_handler
                .error("the AS2 receiver key alias is missing".into()),
            Some(alias) if !alias.starts_with(APP_PREFIX_V3) => {
                self.message_handler.warn(format!(
                    "the AS2 receiver key alias '{alias}' should start with '{APP_PREFIX_V3}' \
                     for the use with the dynamic AS2 partnerships"
                ))
            }
            Some(alias) => {
                if let Some(id) = self.receiver_as2_id.as_deref() {
                    if id != alias {
                        self.message_handler.warn(format!(
                            "the AS2 receiver key alias ('{alias}') should match the AS2 \
                             receiver ID ('{id}')"
                        ));
                    }
                }
            }
        }

        match self.receiver_as2_url.as_deref() {
            None | Some("") => self
                .message_handler
                .error("the AS2 receiver URL (AS2 endpoint URL) is missing".into()),
            Some(url) if !is_plausible_url(url) => self.message_handler.warn(format!(
                "the provided AS2 receiver URL '{url}' seems to be an invalid URL"
            )),
            _ => {}
        }

        if self.receiver_certificate.is_none() {
            self.message_handler.error(
                "the receiver X.509 certificate is missing; usually this is extracted from \
                 the SMP response"
                    .into(),
            );
        }

        if self.message_id_format.is_empty() {
            self.message_handler
                .error("the AS2 message ID format is missing".into());
        } else if let Err(e) =
            expand_message_id(&self.message_id_format, "sender", "receiver", Utc::now())
        {
            self.message_handler.warn(format!(
                "the AS2 message ID format '{}' cannot be expanded: {e}",
                self.message_id_format
            ));
        }

        if check_payload {
            match &self.business_document {
                None => self
                    .message_handler
                    .error("the XML business document to be sent is missing".into()),
                Some(BusinessPayload::File(path)) if !path.exists() => {
                    self.message_handler.error(format!(
                        "the XML business document to be sent '{}' does not exist",
                        path.display()
                    ))
                }
                _ => {}
            }
        }

        match &self.peppol_sender_id {
            None => self
                .message_handler
                .error("the Peppol sender participant ID is missing".into()),
            Some(id) if !id.has_scheme(DEFAULT_PARTICIPANT_SCHEME) => {
                self.message_handler.warn(format!(
                    "the Peppol sender participant ID '{}' is using a non-standard scheme",
                    id.uri_encoded()
                ))
            }
            _ => {}
        }

        match &self.peppol_receiver_id {
            None => self
                .message_handler
                .error("the Peppol receiver participant ID is missing".into()),
            Some(id) if !id.has_scheme(DEFAULT_PARTICIPANT_SCHEME) => {
                self.message_handler.warn(format!(
                    "the Peppol receiver participant ID '{}' is using a non-standard scheme",
                    id.uri_encoded()
                ))
            }
            _ => {}
        }

        match &self.peppol_document_type_id {
            None => self
                .message_handler
                .error("the Peppol document type ID is missing".into()),
            Some(id)
                if !id.has_scheme(DOCUMENT_TYPE_SCHEME_BUSDOX_DOCID_QNS)
                    && !id.has_scheme(DOCUMENT_TYPE_SCHEME_PEPPOL_DOCTYPE_WILDCARD) =>
            {
                self.message_handler.warn(format!(
                    "the Peppol document type ID '{}' is using a non-standard scheme",
                    id.uri_encoded()
                ))
            }
            _ => {}
        }

        match &self.peppol_process_id {
            None => self
                .message_handler
                .error("the Peppol process ID is missing".into()),
            Some(id) if !id.has_scheme(DEFAULT_PROCESS_SCHEME) => {
                self.message_handler.warn(format!(
                    "the Peppol process ID '{}' is using a non-standard scheme",
                    id.uri_encoded()
                ))
            }
            _ => {}
        }

        if check_payload && self.rule_set_id.is_none() {
            self.message_handler.warn(
                "the validation rule set determining the business document validation is \
                 missing, therefore the outgoing business document is NOT validated"
                    .into(),
            );
        }

        if self.transport_factory.is_none() {
            self.message_handler
                .error("no AS2 transport factory is configured".into());
        }

        let error_count = self.message_handler.error_count();
        if error_count > 0 {
            return Err(As2ClientBuilderError::Incomplete { error_count });
        }
        Ok(())
    }

    /// Read the configured business document into an element.
    fn read_business_document(&mut self) -> Result<XmlElement, As2ClientBuilderError> {
        let payload = self
            .business_document
            .take()
            .ok_or(As2ClientBuilderError::PayloadMalformed(
                crate::xml::XmlError::NoRootElement,
            ))?;
        let element = match payload {
            BusinessPayload::File(path) => {
                let bytes = std::fs::read(&path).map_err(crate::xml::XmlError::Io)?;
                XmlElement::parse(&bytes)?
            }
            BusinessPayload::Bytes(bytes) => XmlElement::parse(&bytes)?,
            BusinessPayload::Element(element) => element,
        };
        info!("successfully parsed the business document");
        Ok(element)
    }

    /// Assemble the transport settings from the verified parameter set.
    fn create_as2_client_settings(&self) -> Result<As2ClientSettings, As2ClientBuilderError> {
        let (
            Some(key_store),
            Some(sender_as2_id),
            Some(sender_email),
            Some(sender_key_alias),
            Some(receiver_as2_id),
            Some(receiver_key_alias),
            Some(receiver_url),
            Some(receiver_certificate),
        ) = (
            self.key_store.clone(),
            self.sender_as2_id.clone(),
            self.sender_as2_email.clone(),
            self.sender_as2_key_alias.clone(),
            self.receiver_as2_id.clone(),
            self.receiver_as2_key_alias.clone(),
            self.receiver_as2_url.clone(),
            self.receiver_certificate.clone(),
        )
        else {
            // Unreachable after a successful verify_content.
            return Err(As2ClientBuilderError::Incomplete {
                error_count: self.message_handler.error_count().max(1),
            });
        };

        let partnership_name = format!("{sender_as2_id}-{receiver_as2_id}");

        let mut custom_headers = Vec::new();
        let user_sets_dnt = self
            .custom_headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(header::DISPOSITION_NOTIFICATION_TO));
        if !user_sets_dnt {
            // Some receiver implementations only issue an MDN when this
            // header is present.
            custom_headers.push((
                header::DISPOSITION_NOTIFICATION_TO.to_string(),
                "dummy".to_string(),
            ));
        }
        custom_headers.extend(self.custom_headers.iter().cloned());

        Ok(As2ClientSettings {
            key_store,
            sender: SenderSettings {
                as2_id: sender_as2_id,
                email: sender_email,
                key_alias: sender_key_alias,
            },
            receiver: ReceiverSettings {
                as2_id: receiver_as2_id,
                key_alias: receiver_key_alias,
                url: receiver_url,
            },
            receiver_certificate,
            partnership_name,
            mdn_options: DispositionOptions::for_signing_algorithm(self.signing_algorithm),
            signing_algorithm: self.signing_algorithm,
            message_id_format: self.message_id_format.clone(),
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            outgoing_dumper_factory: self.outgoing_dumper_factory.clone(),
            incoming_dumper: self.incoming_dumper.clone(),
            custom_headers,
            proxy: self.proxy.clone(),
            debug: self.debug,
        })
    }

    fn build_request(&self, sbdh_xml: String) -> As2ClientRequest {
        if let Some(observer) = &self.sbdh_bytes_observer {
            observer(sbdh_xml.as_bytes());
        }
        let payload = if self.use_data_handler {
            RequestPayload::Handler {
                bytes: sbdh_xml.into_bytes(),
                mime_type: self.mime_type.clone(),
            }
        } else {
            // Attach as text, but force the content type: MIME layers
            // tend to infer text/plain for string bodies.
            RequestPayload::Text {
                text: sbdh_xml,
                content_type: self.mime_type.clone(),
            }
        };
        As2ClientRequest {
            subject: self.as2_subject.clone(),
            payload,
            content_transfer_encoding: self.content_transfer_encoding,
        }
    }

    fn send(
        self,
        settings: As2ClientSettings,
        request: As2ClientRequest,
    ) -> Result<As2ClientResponse, As2ClientBuilderError> {
        let Some(factory) = &self.transport_factory else {
            // Unreachable after a successful verify_content.
            return Err(As2ClientBuilderError::Incomplete {
                error_count: self.message_handler.error_count().max(1),
            });
        };
        let transport = factory.create_transport();
        Ok(transport.send_synchronous(&settings, request))
    }

    /// Perform the send.
    ///
    /// The pipeline: SMP lookup, default derivation, certificate check,
    /// content verification, payload parse, validation, SBD build and
    /// serialization, settings and request assembly, synchronous send.
    /// Transport-level failures do not fail this method; they are
    /// attributes of the returned response.
    pub fn send_synchronous(mut self) -> Result<As2ClientResponse, As2ClientBuilderError> {
        self.perform_smp_client_lookup()?;
        self.set_default_derived_values();
        self.verify_content(true)?;

        let business_document = self.read_business_document()?;

        if let Some(rule_set) = self.rule_set_id.clone() {
            validate_business_document(
                &self.validation_registry,
                &rule_set,
                &business_document,
                self.validation_result_handler.as_ref(),
            )?;
        }

        let (
            Some(peppol_sender),
            Some(peppol_receiver),
            Some(document_type),
            Some(process),
        ) = (
            self.peppol_sender_id.clone(),
            self.peppol_receiver_id.clone(),
            self.peppol_document_type_id.clone(),
            self.peppol_process_id.clone(),
        )
        else {
            // Unreachable after a successful verify_content.
            return Err(As2ClientBuilderError::Incomplete {
                error_count: self.message_handler.error_count().max(1),
            });
        };

        let sbd = build_sbd(
            &peppol_sender,
            &peppol_receiver,
            &document_type,
            &process,
            None,
            Some(&self.ubl_version),
            business_document,
        );
        let sbdh_xml = to_sbdh_xml(&sbd, &self.sbdh_namespace_context)?;

        let settings = self.create_as2_client_settings()?;
        let request = self.build_request(sbdh_xml);
        self.send(settings, request)
    }

    /// Send a pre-wrapped SBD.
    ///
    /// Same pipeline as [`As2ClientBuilder::send_synchronous`] minus
    /// payload parsing, validation, and SBD construction; verification
    /// runs in no-payload mode.
    pub fn send_synchronous_sbd(
        mut self,
        sbdh: Vec<u8>,
    ) -> Result<As2ClientResponse, As2ClientBuilderError> {
        self.perform_smp_client_lookup()?;
        self.set_default_derived_values();
        self.verify_content(false)?;

        let settings = self.create_as2_client_settings()?;
        let request = if self.use_data_handler {
            As2ClientRequest {
                subject: self.as2_subject.clone(),
                payload: RequestPayload::Handler {
                    bytes: sbdh,
                    mime_type: self.mime_type.clone(),
                },
                content_transfer_encoding: self.content_transfer_encoding,
            }
        } else {
            let text = String::from_utf8(sbdh)
                .map_err(|e| crate::xml::XmlError::NotUtf8(e.utf8_error()))
                .map_err(As2ClientBuilderError::PayloadMalformed)?;
            As2ClientRequest {
                subject: self.as2_subject.clone(),
                payload: RequestPayload::Text {
                    text,
                    content_type: self.mime_type.clone(),
                },
                content_transfer_encoding: self.content_transfer_encoding,
            }
        };
        self.send(settings, request)
    }
}

fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

fn is_plausible_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    match rest {
        Some(rest) => !rest.is_empty() && !rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plausible_email_checks() {
        assert!(is_plausible_email("ap@example.org"));
        assert!(!is_plausible_email("no-at-sign"));
        assert!(!is_plausible_email("spaced name@example.org"));
        assert!(!is_plausible_email("x@nodot"));
    }

    #[test]
    fn plausible_url_checks() {
        assert!(is_plausible_url("http://localhost:8878/as2"));
        assert!(is_plausible_url("https://ap.example.org/as2"));
        assert!(!is_plausible_url("ftp://ap.example.org"));
        assert!(!is_plausible_url("http://"));
    }

    #[test]
    fn key_alias_derivation_fills_unset_aliases() {
        let mut builder = As2ClientBuilder::new()
            .sender_as2_id("POP000001")
            .receiver_as2_id("POP000002");
        builder.set_default_derived_values();
        assert_eq!(builder.sender_as2_key_alias.as_deref(), Some("POP000001"));
        assert_eq!(builder.receiver_as2_key_alias.as_deref(), Some("POP000002"));
    }

    #[test]
    fn key_alias_derivation_keeps_explicit_aliases() {
        let mut builder = As2ClientBuilder::new()
            .sender_as2_id("POP000001")
            .sender_as2_key_alias("my-alias");
        builder.set_default_derived_values();
        assert_eq!(builder.sender_as2_key_alias.as_deref(), Some("my-alias"));
    }

    #[test]
    fn verification_on_empty_builder_collects_errors() {
        let mut builder = As2ClientBuilder::new();
        let err = builder.verify_content(true).unwrap_err();
        match err {
            As2ClientBuilderError::Incomplete { error_count } => assert!(error_count >= 8),
            other => panic!("unexpected error: {other}"),
        }
    }
}
