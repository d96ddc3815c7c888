//! Naming and tagging invariants across a whole synthesis run.
//!
//! Checks run after every environment's graph is sealed, since uniqueness
//! only makes sense once all environments exist side by side. Every violation
//! is collected; nothing here fails fast.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::environment::GlobalDefaults;
use crate::run::{EnvironmentGraph, SynthesisRun};

/// Charset for logical ids.
pub const LOGICAL_ID_PATTERN: &str = "^[A-Za-z][A-Za-z0-9]*$";

/// Which invariant a violation breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    DuplicatePhysicalName,
    MissingTag,
    EmptyTag,
    RetainedEphemeral,
    InvalidPhysicalName,
    SuffixNotExactlyOnce,
    InvalidLogicalId,
}

/// A single compliance problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub environment: String,
    /// Node or output the violation was found on.
    pub subject: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.environment, self.subject, self.message)
    }
}

/// Outcome of a whole-run validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn add(
        &mut self,
        kind: ViolationKind,
        environment: &str,
        subject: &str,
        message: impl Into<String>,
    ) {
        self.violations.push(Violation {
            kind,
            environment: environment.to_string(),
            subject: subject.to_string(),
            message: message.into(),
        });
    }

    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }

    /// Human-readable listing of every violation.
    pub fn report(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("  - {}", v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Validate naming and tagging invariants across every environment of `run`.
pub fn validate(run: &SynthesisRun) -> ValidationResult {
    NamingEnforcer::new(run.defaults()).check(run.environments())
}

/// Enforces naming and tagging rules against a set of sealed graphs.
pub struct NamingEnforcer<'d> {
    defaults: &'d GlobalDefaults,
}

impl<'d> NamingEnforcer<'d> {
    pub fn new(defaults: &'d GlobalDefaults) -> Self {
        Self { defaults }
    }

    pub fn check(&self, environments: &[EnvironmentGraph]) -> ValidationResult {
        let mut result = ValidationResult::new();

        let name_regex = match self.defaults.name_regex() {
            Ok(regex) => Some(regex),
            Err(e) => {
                result.add(ViolationKind::InvalidPhysicalName, "*", "name_pattern", e.to_string());
                None
            }
        };
        let logical_id_regex = Regex::new(LOGICAL_ID_PATTERN).ok();

        // physical name -> (environment, subject) of its first owner
        let mut seen: BTreeMap<String, (String, String)> = BTreeMap::new();

        for env in environments {
            let environment = env.context.name.as_str();
            let suffix = env.context.suffix.as_str();
            let head = env.context.physical_name("");
            let prefix_holds_suffix = occurrences(&env.context.naming_prefix, suffix) > 0;
            debug!("Validating naming and tags for '{}'", environment);

            let names = env
                .graph
                .nodes()
                .iter()
                .map(|n| (n.logical_id.as_str(), n.physical_name.as_str()))
                .chain(
                    env.graph
                        .outputs()
                        .iter()
                        .map(|o| (o.name.as_str(), o.export_name.as_str())),
                );

            for (subject, name) in names {
                if let Some((owner_env, owner)) = seen.get(name) {
                    result.add(
                        ViolationKind::DuplicatePhysicalName,
                        environment,
                        subject,
                        format!("physical name '{}' is already used by {}/{}", name, owner_env, owner),
                    );
                } else {
                    seen.insert(name.to_string(), (environment.to_string(), subject.to_string()));
                }

                if let Some(regex) = &name_regex {
                    if !regex.is_match(name) {
                        result.add(
                            ViolationKind::InvalidPhysicalName,
                            environment,
                            subject,
                            format!("physical name '{}' does not match {}", name, self.defaults.name_pattern),
                        );
                    }
                }

                // Base names may repeat a suffix segment; only the head counts
                if prefix_holds_suffix || !name.starts_with(&head) {
                    result.add(
                        ViolationKind::SuffixNotExactlyOnce,
                        environment,
                        subject,
                        format!(
                            "physical name '{}' must start with '{}' with suffix '{}' only after the prefix",
                            name, head, suffix
                        ),
                    );
                }
            }

            for node in env.graph.nodes() {
                let id = node.logical_id.as_str();

                if let Some(regex) = &logical_id_regex {
                    if !regex.is_match(id) {
                        result.add(
                            ViolationKind::InvalidLogicalId,
                            environment,
                            id,
                            format!("logical id does not match {}", LOGICAL_ID_PATTERN),
                        );
                    }
                }

                for key in &self.defaults.mandatory_tags {
                    match node.tags.get(key) {
                        None => result.add(
                            ViolationKind::MissingTag,
                            environment,
                            id,
                            format!("missing mandatory tag '{}'", key),
                        ),
                        Some(value) if value.trim().is_empty() => result.add(
                            ViolationKind::EmptyTag,
                            environment,
                            id,
                            format!("mandatory tag '{}' is empty", key),
                        ),
                        Some(_) => {}
                    }
                }

                if node.lifecycle.ephemeral && node.lifecycle.retain_on_delete {
                    result.add(
                        ViolationKind::RetainedEphemeral,
                        environment,
                        id,
                        "ephemeral resource is retained on delete",
                    );
                }
            }
        }

        info!(
            "Validated {} environment(s): {} violation(s)",
            environments.len(),
            result.violations.len()
        );
        result
    }
}

/// Count how often `suffix` appears in `name` as a run of whole `-`-separated
/// segments. Used on the naming prefix, which must not contain the suffix.
fn occurrences(name: &str, suffix: &str) -> usize {
    let segments: Vec<&str> = name.split('-').collect();
    let wanted: Vec<&str> = suffix.split('-').collect();
    if wanted.len() > segments.len() {
        return 0;
    }
    segments.windows(wanted.len()).filter(|w| *w == wanted.as_slice()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvironmentClass, EnvironmentDescriptor, ResolvedEnvironmentContext};
    use crate::model::{ResourceKind, ResourceNode};
    use crate::template::{CompositionTemplate, Slot, SlotDecision, SlotVariant};

    fn defaults() -> GlobalDefaults {
        GlobalDefaults::default()
            .with_default_tag("Owner", "platform")
            .with_default_tag("Project", "shop")
    }

    fn always(_: &ResolvedEnvironmentContext) -> SlotDecision {
        SlotDecision::Variant(SlotVariant::Standard)
    }

    #[test]
    fn test_occurrences_counts_whole_segments() {
        assert_eq!(occurrences("app-dev-network", "dev"), 1);
        assert_eq!(occurrences("app-dev-devices", "dev"), 1);
        assert_eq!(occurrences("dev-dev-network", "dev"), 2);
        assert_eq!(occurrences("app-pr-1234-assets", "pr-1234"), 1);
        assert_eq!(occurrences("app-prod-assets", "dev"), 0);
    }

    #[test]
    fn test_report_lists_every_violation() {
        let mut result = ValidationResult::new();
        result.add(ViolationKind::MissingTag, "dev", "Network", "missing mandatory tag 'Owner'");
        result.add(ViolationKind::EmptyTag, "prod", "Network", "mandatory tag 'Project' is empty");

        assert!(!result.passed());
        let report = result.report();
        assert!(report.contains("[dev] Network"));
        assert!(report.contains("[prod] Network"));
        assert_eq!(result.of_kind(ViolationKind::MissingTag).count(), 1);
    }

    #[test]
    fn test_suffix_segment_inside_base_name_passes() {
        let descriptors = vec![
            EnvironmentDescriptor::new("data", EnvironmentClass::NonProduction, "10.0.0.0/16"),
            EnvironmentDescriptor::new("a", EnvironmentClass::NonProduction, "10.1.0.0/16"),
        ];
        let run = SynthesisRun::synthesize(&descriptors, defaults()).unwrap();

        let result = validate(&run);
        assert!(result.passed(), "{}", result.report());
        assert_eq!(run.graph("data").unwrap().get("DataSecurityGroup").unwrap().physical_name, "app-data-data-sg");
    }

    #[test]
    fn test_name_without_suffix_head_is_reported() {
        let template = CompositionTemplate::new().slot(Slot::new("bucket", always, |scope, _| {
            let mut node = scope.node(ResourceKind::Storage, "Bucket", "AWS::S3::Bucket", "bucket");
            node.physical_name = "app-bucket-dev".to_string();
            scope.add(node)
        }));
        let descriptors = vec![EnvironmentDescriptor::new("dev", EnvironmentClass::NonProduction, "10.0.0.0/16")];
        let run = SynthesisRun::synthesize_with(&descriptors, defaults(), &template).unwrap();

        let result = validate(&run);
        let subjects: Vec<_> = result
            .of_kind(ViolationKind::SuffixNotExactlyOnce)
            .map(|v| v.subject.as_str())
            .collect();
        assert_eq!(subjects, vec!["Bucket"]);
    }

    #[test]
    fn test_custom_node_keeps_unrelated_checks() {
        let template = CompositionTemplate::new().slot(Slot::new("bucket", always, |scope, _| {
            let node = ResourceNode::new(ResourceKind::Storage, "Bucket", "AWS::S3::Bucket", "app-dev-bucket");
            scope.add(node)
        }));
        let descriptors = vec![EnvironmentDescriptor::new("dev", EnvironmentClass::NonProduction, "10.0.0.0/16")];
        let run = SynthesisRun::synthesize_with(&descriptors, defaults(), &template).unwrap();

        let result = validate(&run);
        assert_eq!(result.of_kind(ViolationKind::SuffixNotExactlyOnce).count(), 0);
        assert_eq!(result.of_kind(ViolationKind::MissingTag).count(), 4);
    }
}
