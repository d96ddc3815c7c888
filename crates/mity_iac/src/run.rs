//! Synthesis runs.
//!
//! A run resolves every descriptor up front, so configuration errors surface
//! before any graph is built. It then builds one graph per environment in
//! descriptor order. Any composition error aborts the whole run.

use tracing::info;

use crate::emitter::{ArtifactEmitter, EmitOptions, SerializedArtifact};
use crate::enforcer::{self, ValidationResult};
use crate::environment::{resolve_all, EnvironmentDescriptor, GlobalDefaults, ResolvedEnvironmentContext};
use crate::error::{IacError, IacResult};
use crate::graph::{Graph, GraphBuilder};
use crate::template::CompositionTemplate;

/// A resolved environment together with its sealed graph.
#[derive(Debug, Clone)]
pub struct EnvironmentGraph {
    pub context: ResolvedEnvironmentContext,
    pub graph: Graph,
}

/// One invocation of the composition core over a set of environments.
#[derive(Debug, Clone)]
pub struct SynthesisRun {
    defaults: GlobalDefaults,
    environments: Vec<EnvironmentGraph>,
}

impl SynthesisRun {
    /// Synthesize with the standard composition template.
    pub fn synthesize(descriptors: &[EnvironmentDescriptor], defaults: GlobalDefaults) -> IacResult<Self> {
        Self::synthesize_with(descriptors, defaults, &CompositionTemplate::standard())
    }

    /// Synthesize with a caller-supplied composition template.
    pub fn synthesize_with(
        descriptors: &[EnvironmentDescriptor],
        defaults: GlobalDefaults,
        template: &CompositionTemplate,
    ) -> IacResult<Self> {
        info!("Starting synthesis run for {} environment(s)", descriptors.len());

        let contexts = resolve_all(descriptors, &defaults)?;

        let builder = GraphBuilder::new(template);
        let environments = contexts
            .into_iter()
            .map(|context| {
                let graph = builder.build(&context)?;
                Ok(EnvironmentGraph { context, graph })
            })
            .collect::<IacResult<Vec<_>>>()?;

        Ok(Self { defaults, environments })
    }

    pub fn defaults(&self) -> &GlobalDefaults {
        &self.defaults
    }

    /// Environments in descriptor order.
    pub fn environments(&self) -> &[EnvironmentGraph] {
        &self.environments
    }

    pub fn environment(&self, name: &str) -> IacResult<&EnvironmentGraph> {
        self.environments
            .iter()
            .find(|e| e.context.name == name)
            .ok_or_else(|| IacError::EnvironmentNotFound(name.to_string()))
    }

    pub fn graph(&self, name: &str) -> IacResult<&Graph> {
        Ok(&self.environment(name)?.graph)
    }

    /// Check naming and tagging invariants across the whole run.
    pub fn validate(&self) -> ValidationResult {
        enforcer::validate(self)
    }

    /// Emit artifacts; refuses when validation reports any violation.
    pub fn emit(&self, options: &EmitOptions) -> IacResult<Vec<SerializedArtifact>> {
        ArtifactEmitter::new(options.clone()).emit(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentClass;
    use crate::error::ConfigError;

    fn defaults() -> GlobalDefaults {
        GlobalDefaults::default()
            .with_default_tag("Owner", "platform")
            .with_default_tag("Project", "shop")
    }

    #[test]
    fn test_run_keeps_descriptor_order() {
        let descriptors = vec![
            EnvironmentDescriptor::new("prod", EnvironmentClass::Production, "10.1.0.0/16"),
            EnvironmentDescriptor::new("dev", EnvironmentClass::NonProduction, "10.0.0.0/16"),
        ];
        let run = SynthesisRun::synthesize(&descriptors, defaults()).unwrap();

        let names: Vec<_> = run.environments().iter().map(|e| e.context.name.as_str()).collect();
        assert_eq!(names, vec!["prod", "dev"]);
        assert!(run.validate().passed());
    }

    #[test]
    fn test_config_error_precedes_building() {
        let descriptors = vec![
            EnvironmentDescriptor::new("dev", EnvironmentClass::NonProduction, "10.0.0.0/16"),
            EnvironmentDescriptor::new("dev", EnvironmentClass::Production, "10.1.0.0/16"),
        ];
        let err = SynthesisRun::synthesize(&descriptors, defaults()).unwrap_err();
        assert!(matches!(err, IacError::Config(ConfigError::DuplicateName(_))));
    }

    #[test]
    fn test_unknown_environment() {
        let descriptors = vec![EnvironmentDescriptor::new("dev", EnvironmentClass::NonProduction, "10.0.0.0/16")];
        let run = SynthesisRun::synthesize(&descriptors, defaults()).unwrap();
        assert!(matches!(run.graph("qa"), Err(IacError::EnvironmentNotFound(_))));
    }
}
