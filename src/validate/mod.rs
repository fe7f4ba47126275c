//! Business-document validation against named rule sets.
//!
//! Rule-set content (Schematron, XSD, …) is not part of this crate; an
//! executor is whatever the application registers under a [`RuleSetId`].
//! The pipeline looks the executor up, runs it synchronously, and routes
//! the outcome through a pluggable result handler that decides whether
//! errors abort the send.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::xml::XmlElement;

/// Identifier of a registered validation executor set, in the
/// `group:artifact:version` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleSetId {
    /// Grouping namespace (e.g. `eu.peppol.bis`).
    pub group: String,
    /// Artifact within the group (e.g. `t10`).
    pub artifact: String,
    /// Rule-set version.
    pub version: String,
}

impl RuleSetId {
    /// Create a rule-set id from its three parts.
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
        }
    }

    /// Parse the `group:artifact:version` form.
    pub fn parse(input: &str) -> Option<Self> {
        let mut parts = input.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(g), Some(a), Some(v)) if !g.is_empty() && !a.is_empty() && !v.is_empty() => {
                Some(Self::new(g, a, v))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for RuleSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

/// Severity of a single validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValidationSeverity {
    /// Informational only.
    Info,
    /// Should be fixed, does not block sending.
    Warning,
    /// Blocks sending unless the result handler decides otherwise.
    Error,
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationItem {
    /// Finding severity.
    pub severity: ValidationSeverity,
    /// Location inside the document (XPath or similar), if available.
    pub location: Option<String>,
    /// Human-readable description.
    pub message: String,
    /// Rule identifier, if the rule set provides one.
    pub rule: Option<String>,
}

/// All findings of one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResults {
    items: Vec<ValidationItem>,
}

impl ValidationResults {
    /// Results from a list of findings.
    pub fn new(items: Vec<ValidationItem>) -> Self {
        Self { items }
    }

    /// All findings in rule-set order.
    pub fn items(&self) -> &[ValidationItem] {
        &self.items
    }

    /// Whether at least one error-severity finding is present.
    pub fn contains_errors(&self) -> bool {
        self.items
            .iter()
            .any(|i| i.severity == ValidationSeverity::Error)
    }

    /// Number of error-severity findings.
    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Error)
            .count()
    }
}

/// Error running a validation executor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// No executor is registered under the rule-set id.
    #[error("the validation rule set '{0}' is not registered")]
    UnknownRuleSet(String),

    /// The executor itself failed.
    #[error("validation execution failed: {0}")]
    Execution(String),

    /// The result handler decided to abort the send.
    #[error("validation produced {error_count} error(s) and the result handler aborted")]
    Aborted {
        /// Error findings at the time of the abort.
        error_count: usize,
    },
}

/// A synchronous validation executor for one rule set.
pub trait ValidationExecutor: Send + Sync {
    /// Validate the document and return all findings.
    fn validate(&self, document: &XmlElement) -> Result<ValidationResults, ValidationError>;
}

/// Registry of validation executors keyed by rule-set id.
#[derive(Default)]
pub struct ValidationRegistry {
    executors: HashMap<RuleSetId, Arc<dyn ValidationExecutor>>,
}

impl ValidationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor; replaces any previous one under the same id.
    pub fn register(&mut self, id: RuleSetId, executor: Arc<dyn ValidationExecutor>) {
        self.executors.insert(id, executor);
    }

    /// Look up the executor for an id.
    pub fn of_id(&self, id: &RuleSetId) -> Option<Arc<dyn ValidationExecutor>> {
        self.executors.get(id).cloned()
    }
}

impl std::fmt::Debug for ValidationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationRegistry")
            .field("rule_sets", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Decides what validation findings mean for the send.
pub trait ValidationResultHandler {
    /// Called when error-severity findings are present. Returning an
    /// error aborts the send.
    fn on_errors(&self, results: &ValidationResults) -> Result<(), ValidationError>;

    /// Called when no error-severity findings are present.
    fn on_success(&self, results: &ValidationResults) {
        let _ = results;
    }
}

/// Default handler: log the errors and keep sending.
#[derive(Debug, Clone, Copy, Default)]
pub struct LenientValidationResultHandler;

impl ValidationResultHandler for LenientValidationResultHandler {
    fn on_errors(&self, results: &ValidationResults) -> Result<(), ValidationError> {
        warn!(
            errors = results.error_count(),
            "continuing to send although validation reported errors"
        );
        Ok(())
    }
}

/// Handler that aborts the send on any error-severity finding.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingValidationResultHandler;

impl ValidationResultHandler for RejectingValidationResultHandler {
    fn on_errors(&self, results: &ValidationResults) -> Result<(), ValidationError> {
        Err(ValidationError::Aborted {
            error_count: results.error_count(),
        })
    }
}

/// Validate a business document against a registered rule set.
///
/// Unknown rule-set ids fail immediately; otherwise the executor runs and
/// the findings are routed to the handler, which decides whether errors
/// abort.
pub fn validate_business_document(
    registry: &ValidationRegistry,
    id: &RuleSetId,
    document: &XmlElement,
    handler: &dyn ValidationResultHandler,
) -> Result<ValidationResults, ValidationError> {
    let executor = registry
        .of_id(id)
        .ok_or_else(|| ValidationError::UnknownRuleSet(id.to_string()))?;
    let results = executor.validate(document)?;
    if results.contains_errors() {
        handler.on_errors(&results)?;
    } else {
        handler.on_success(&results);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExecutor(ValidationResults);

    impl ValidationExecutor for FixedExecutor {
        fn validate(&self, _document: &XmlElement) -> Result<ValidationResults, ValidationError> {
            Ok(self.0.clone())
        }
    }

    fn document() -> XmlElement {
        XmlElement::parse(b"<Invoice xmlns=\"urn:x\"><ID>1</ID></Invoice>").unwrap()
    }

    fn error_item(message: &str) -> ValidationItem {
        ValidationItem {
            severity: ValidationSeverity::Error,
            location: None,
            message: message.to_string(),
            rule: None,
        }
    }

    #[test]
    fn rule_set_id_display_and_parse() {
        let id = RuleSetId::new("eu.peppol.bis", "t10", "4.0.0");
        assert_eq!(id.to_string(), "eu.peppol.bis:t10:4.0.0");
        assert_eq!(RuleSetId::parse("eu.peppol.bis:t10:4.0.0"), Some(id));
        assert_eq!(RuleSetId::parse("missing-parts"), None);
    }

    #[test]
    fn unknown_rule_set_is_fatal() {
        let registry = ValidationRegistry::new();
        let err = validate_business_document(
            &registry,
            &RuleSetId::new("g", "a", "1"),
            &document(),
            &LenientValidationResultHandler,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownRuleSet(_)));
    }

    #[test]
    fn lenient_handler_continues_on_errors() {
        let mut registry = ValidationRegistry::new();
        let id = RuleSetId::new("g", "a", "1");
        registry.register(
            id.clone(),
            Arc::new(FixedExecutor(ValidationResults::new(vec![
                error_item("bad"),
                error_item("worse"),
            ]))),
        );
        let results = validate_business_document(
            &registry,
            &id,
            &document(),
            &LenientValidationResultHandler,
        )
        .unwrap();
        assert_eq!(results.error_count(), 2);
    }

    #[test]
    fn rejecting_handler_aborts_on_errors() {
        let mut registry = ValidationRegistry::new();
        let id = RuleSetId::new("g", "a", "1");
        registry.register(
            id.clone(),
            Arc::new(FixedExecutor(ValidationResults::new(vec![error_item("bad")]))),
        );
        let err = validate_business_document(
            &registry,
            &id,
            &document(),
            &RejectingValidationResultHandler,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::Aborted { error_count: 1 }));
    }

    #[test]
    fn success_path_has_no_errors() {
        let mut registry = ValidationRegistry::new();
        let id = RuleSetId::new("g", "a", "1");
        registry.register(id.clone(), Arc::new(FixedExecutor(ValidationResults::default())));
        let results = validate_business_document(
            &registry,
            &id,
            &document(),
            &RejectingValidationResultHandler,
        )
        .unwrap();
        assert!(!results.contains_errors());
    }
}
