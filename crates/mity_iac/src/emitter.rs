//! Artifact emission.
//!
//! Turns a validated run into declarative documents with `Parameters`,
//! `Resources` and `Outputs` sections. Resources keep their graph order and
//! carry explicit `DependsOn` hints. Symbolic references become the
//! provisioning engine's deferred-reference tokens. Output is deterministic:
//! the same run always serializes to the same bytes.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::environment::ReferenceSyntax;
use crate::error::{IacError, IacResult};
use crate::model::{AttributeValue, ResourceNode, SymbolicReference};
use crate::run::{EnvironmentGraph, SynthesisRun};

const FORMAT_VERSION: &str = "2010-09-09";

/// Serialization encoding of emitted artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Json,
    Yaml,
}

impl Encoding {
    pub fn extension(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Yaml => "yaml",
        }
    }
}

/// One artifact per environment, or a single artifact for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    #[default]
    PerEnvironment,
    Combined,
}

/// Emission options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitOptions {
    pub encoding: Encoding,
    pub layout: Layout,
    /// Write `DependsOn` ordering hints on every resource.
    pub explicit_depends_on: bool,
    /// Restrict output to these environments; empty means all.
    pub environments: Vec<String>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            layout: Layout::default(),
            explicit_depends_on: true,
            environments: Vec::new(),
        }
    }
}

impl EmitOptions {
    pub fn yaml(mut self) -> Self {
        self.encoding = Encoding::Yaml;
        self
    }

    pub fn combined(mut self) -> Self {
        self.layout = Layout::Combined;
        self
    }

    pub fn only(mut self, environment: impl Into<String>) -> Self {
        self.environments.push(environment.into());
        self
    }

    pub fn without_depends_on(mut self) -> Self {
        self.explicit_depends_on = false;
        self
    }
}

/// A serialized document ready to be written to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedArtifact {
    /// `None` for a combined artifact.
    pub environment: Option<String>,
    pub file_name: String,
    pub encoding: Encoding,
    pub content: String,
}

/// Map serialized in insertion order.
struct Ordered<T>(Vec<(String, T)>);

impl<T: Serialize> Serialize for Ordered<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Parameter {
    #[serde(rename = "Type")]
    kind: &'static str,
    default: String,
    description: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Resource {
    #[serde(rename = "Type")]
    resource_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
    deletion_policy: &'static str,
    properties: BTreeMap<String, Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Output {
    description: String,
    value: Value,
    export: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Document {
    format_version: &'static str,
    description: String,
    parameters: BTreeMap<String, Parameter>,
    resources: Ordered<Resource>,
    outputs: Ordered<Output>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CombinedDocument {
    format_version: &'static str,
    environments: Ordered<Document>,
}

/// Translate a symbolic reference into the engine's deferred-reference token.
pub fn deferred_token(syntax: &ReferenceSyntax, reference: &SymbolicReference) -> Value {
    match syntax {
        ReferenceSyntax::Intrinsic if reference.attribute() == "id" => json!({ "Ref": reference.target() }),
        ReferenceSyntax::Intrinsic => json!({ "Fn::GetAtt": [reference.target(), reference.attribute()] }),
        ReferenceSyntax::Interpolation { open, close } => Value::String(format!(
            "{}{}.{}{}",
            open,
            reference.target(),
            reference.attribute(),
            close
        )),
    }
}

/// Serializes validated runs.
pub struct ArtifactEmitter {
    options: EmitOptions,
}

impl ArtifactEmitter {
    pub fn new(options: EmitOptions) -> Self {
        Self { options }
    }

    /// Emit artifacts for `run`, refusing if any invariant is violated.
    pub fn emit(&self, run: &SynthesisRun) -> IacResult<Vec<SerializedArtifact>> {
        let validation = run.validate();
        if !validation.passed() {
            return Err(IacError::NonCompliant(validation));
        }

        let selected = self.select(run)?;
        let syntax = &run.defaults().reference_syntax;

        let artifacts = match self.options.layout {
            Layout::PerEnvironment => selected
                .into_iter()
                .map(|env| {
                    let document = self.document(env, syntax);
                    let artifact = SerializedArtifact {
                        environment: Some(env.context.name.clone()),
                        file_name: format!("{}.{}", env.context.name, self.options.encoding.extension()),
                        encoding: self.options.encoding,
                        content: self.encode(&document)?,
                    };
                    debug!("Emitted {} ({} bytes)", artifact.file_name, artifact.content.len());
                    Ok(artifact)
                })
                .collect::<IacResult<Vec<_>>>()?,
            Layout::Combined => {
                let document = CombinedDocument {
                    format_version: FORMAT_VERSION,
                    environments: Ordered(
                        selected
                            .into_iter()
                            .map(|env| (env.context.name.clone(), self.document(env, syntax)))
                            .collect(),
                    ),
                };
                vec![SerializedArtifact {
                    environment: None,
                    file_name: format!("run.{}", self.options.encoding.extension()),
                    encoding: self.options.encoding,
                    content: self.encode(&document)?,
                }]
            }
        };

        info!("Emitted {} artifact(s)", artifacts.len());
        Ok(artifacts)
    }

    fn select<'r>(&self, run: &'r SynthesisRun) -> IacResult<Vec<&'r EnvironmentGraph>> {
        if self.options.environments.is_empty() {
            return Ok(run.environments().iter().collect());
        }
        for name in &self.options.environments {
            run.environment(name)?;
        }
        Ok(run
            .environments()
            .iter()
            .filter(|e| self.options.environments.contains(&e.context.name))
            .collect())
    }

    fn document(&self, env: &EnvironmentGraph, syntax: &ReferenceSyntax) -> Document {
        let ctx = &env.context;

        let mut parameters = BTreeMap::new();
        let mut parameter = |name: &str, default: String, description: &'static str| {
            parameters.insert(
                name.to_string(),
                Parameter {
                    kind: "String",
                    default,
                    description,
                },
            );
        };
        parameter("Environment", ctx.name.clone(), "Environment name");
        parameter("EnvironmentClass", ctx.class.as_str().to_string(), "Environment class");
        parameter("NamingSuffix", ctx.suffix.clone(), "Suffix interpolated into physical names");
        parameter("NetworkCidr", ctx.network.to_string(), "Network address block");
        parameter("InstanceClass", ctx.features.instance_class.clone(), "Compute instance class");

        let resources = env
            .graph
            .nodes()
            .iter()
            .map(|node| (node.logical_id.clone(), self.resource(node, syntax)))
            .collect();

        let outputs = env
            .graph
            .outputs()
            .iter()
            .map(|output| {
                (
                    output.name.clone(),
                    Output {
                        description: output.description.clone(),
                        value: deferred_token(syntax, &output.value),
                        export: json!({ "Name": output.export_name }),
                    },
                )
            })
            .collect();

        Document {
            format_version: FORMAT_VERSION,
            description: format!("{} environment ({})", ctx.name, ctx.class),
            parameters,
            resources: Ordered(resources),
            outputs: Ordered(outputs),
        }
    }

    fn resource(&self, node: &ResourceNode, syntax: &ReferenceSyntax) -> Resource {
        let mut properties: BTreeMap<String, Value> = node
            .attributes
            .iter()
            .map(|(key, value)| (key.clone(), translate(value, syntax)))
            .collect();

        let tags: Vec<Value> = node
            .tags
            .iter()
            .map(|(key, value)| json!({ "Key": key, "Value": value }))
            .collect();
        properties.insert("Tags".to_string(), Value::Array(tags));

        Resource {
            resource_type: node.resource_type.clone(),
            depends_on: if self.options.explicit_depends_on {
                node.depends_on.clone()
            } else {
                Vec::new()
            },
            deletion_policy: if node.lifecycle.retain_on_delete { "Retain" } else { "Delete" },
            properties,
        }
    }

    fn encode<T: Serialize>(&self, document: &T) -> IacResult<String> {
        Ok(match self.options.encoding {
            Encoding::Json => {
                let mut content = serde_json::to_string_pretty(document)?;
                content.push('\n');
                content
            }
            Encoding::Yaml => serde_yaml::to_string(document)?,
        })
    }
}

fn translate(value: &AttributeValue, syntax: &ReferenceSyntax) -> Value {
    match value {
        AttributeValue::String(s) => Value::String(s.clone()),
        AttributeValue::Integer(n) => Value::from(*n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::List(items) => Value::Array(items.iter().map(|v| translate(v, syntax)).collect()),
        AttributeValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), translate(v, syntax)))
                .collect(),
        ),
        AttributeValue::Reference(reference) => deferred_token(syntax, reference),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvironmentClass, EnvironmentDescriptor, GlobalDefaults};

    fn run_with(defaults: GlobalDefaults) -> SynthesisRun {
        let descriptors = vec![
            EnvironmentDescriptor::new("dev", EnvironmentClass::NonProduction, "10.0.0.0/16"),
            EnvironmentDescriptor::new("prod", EnvironmentClass::Production, "10.1.0.0/16"),
        ];
        SynthesisRun::synthesize(&descriptors, defaults).unwrap()
    }

    fn compliant() -> GlobalDefaults {
        GlobalDefaults::default()
            .with_default_tag("Owner", "platform")
            .with_default_tag("Project", "shop")
    }

    #[test]
    fn test_intrinsic_tokens() {
        let id = SymbolicReference::new("Network", "id");
        let arn = SymbolicReference::new("AppRole", "arn");
        assert_eq!(deferred_token(&ReferenceSyntax::Intrinsic, &id), json!({ "Ref": "Network" }));
        assert_eq!(
            deferred_token(&ReferenceSyntax::Intrinsic, &arn),
            json!({ "Fn::GetAtt": ["AppRole", "arn"] })
        );
    }

    #[test]
    fn test_interpolation_tokens() {
        let id = SymbolicReference::new("Network", "id");
        assert_eq!(
            deferred_token(&ReferenceSyntax::interpolation(), &id),
            Value::String("${Network.id}".to_string())
        );
    }

    #[test]
    fn test_resources_keep_graph_order() {
        let run = run_with(compliant());
        let artifacts = run.emit(&EmitOptions::default().only("dev")).unwrap();
        assert_eq!(artifacts.len(), 1);

        let content = &artifacts[0].content;
        let network = content.find("\"Network\": {").unwrap();
        let subnet = content.find("\"PublicSubnetA\": {").unwrap();
        let fleet = content.find("\"AppFleet\": {").unwrap();
        assert!(network < subnet && subnet < fleet);
    }

    #[test]
    fn test_depends_on_and_deletion_policy() {
        let run = run_with(compliant());
        let artifacts = run.emit(&EmitOptions::default().only("prod")).unwrap();
        let doc: Value = serde_json::from_str(&artifacts[0].content).unwrap();

        let subnet = &doc["Resources"]["PublicSubnetA"];
        assert_eq!(subnet["DependsOn"], json!(["Network"]));
        assert_eq!(subnet["Properties"]["VpcId"], json!({ "Ref": "Network" }));
        assert_eq!(doc["Resources"]["AssetBucket"]["DeletionPolicy"], "Retain");
        assert_eq!(doc["Outputs"]["NetworkId"]["Export"]["Name"], "app-prod-network-id");
        assert_eq!(doc["Parameters"]["Environment"]["Default"], "prod");
    }

    #[test]
    fn test_without_depends_on() {
        let run = run_with(compliant());
        let artifacts = run.emit(&EmitOptions::default().only("dev").without_depends_on()).unwrap();
        assert!(!artifacts[0].content.contains("DependsOn"));
    }

    #[test]
    fn test_combined_yaml() {
        let run = run_with(compliant());
        let artifacts = run.emit(&EmitOptions::default().combined().yaml()).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].file_name, "run.yaml");
        assert!(artifacts[0].environment.is_none());

        let doc: serde_yaml::Value = serde_yaml::from_str(&artifacts[0].content).unwrap();
        assert!(doc["Environments"]["dev"]["Resources"]["Network"].is_mapping());
        assert!(doc["Environments"]["prod"]["Resources"]["ApiKey"].is_mapping());
    }

    #[test]
    fn test_refuses_non_compliant_run() {
        let run = run_with(GlobalDefaults::default());
        let err = run.emit(&EmitOptions::default()).unwrap_err();
        match err {
            IacError::NonCompliant(result) => assert!(!result.passed()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_environment_filter() {
        let run = run_with(compliant());
        let err = run.emit(&EmitOptions::default().only("staging")).unwrap_err();
        assert!(matches!(err, IacError::EnvironmentNotFound(_)));
    }
}
