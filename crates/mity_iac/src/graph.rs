//! Resource graph builder.
//!
//! The builder walks a [`CompositionTemplate`] slot by slot. The template is
//! already a valid linearization of the dependency relation, so nodes are
//! appended in template order and no sort pass is needed. Sealing checks that
//! every edge points to an earlier node, which catches a mis-ordered template
//! that slipped past the reference resolver.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::environment::ResolvedEnvironmentContext;
use crate::error::{IacResult, TemplateViolation};
use crate::model::{ResourceKind, ResourceNode, SymbolicReference};
use crate::reference::ReferenceResolver;
use crate::template::{CompositionTemplate, SlotDecision};

/// Attribute keys the emitter fills from other node fields.
pub const RESERVED_ATTRIBUTES: &[&str] = &["Tags"];

/// A value exported from an environment's graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphOutput {
    pub name: String,
    pub description: String,
    pub value: SymbolicReference,
    /// Physical export name, unique across the run.
    pub export_name: String,
}

/// Sealed resource graph for one environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Graph {
    environment: String,
    nodes: Vec<ResourceNode>,
    #[serde(skip)]
    index: BTreeMap<String, usize>,
    outputs: Vec<GraphOutput>,
}

impl Graph {
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Nodes in dependency order.
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn outputs(&self) -> &[GraphOutput] {
        &self.outputs
    }

    pub fn get(&self, logical_id: &str) -> Option<&ResourceNode> {
        self.index.get(logical_id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.index.contains_key(logical_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every dependency must point to a node earlier in the order.
    pub fn verify_order(&self) -> Result<(), TemplateViolation> {
        for (position, node) in self.nodes.iter().enumerate() {
            for dependency in &node.depends_on {
                match self.index.get(dependency) {
                    Some(&i) if i < position => {}
                    _ => {
                        return Err(TemplateViolation::ForwardEdge {
                            environment: self.environment.clone(),
                            node: node.logical_id.clone(),
                            dependency: dependency.clone(),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// Every symbolic reference must target a node of this graph that the
    /// referencing node depends on.
    pub fn verify_references(&self) -> Result<(), TemplateViolation> {
        for node in &self.nodes {
            for reference in node.references() {
                let backed = self.contains(reference.target())
                    && node.depends_on.iter().any(|d| d == reference.target());
                if !backed {
                    return Err(TemplateViolation::UnbackedReference {
                        environment: self.environment.clone(),
                        node: node.logical_id.clone(),
                        target: reference.target().to_string(),
                    });
                }
            }
        }
        for output in &self.outputs {
            if !self.contains(output.value.target()) {
                return Err(TemplateViolation::UnbackedReference {
                    environment: self.environment.clone(),
                    node: output.name.clone(),
                    target: output.value.target().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Handle a slot uses to add nodes and outputs to the graph under construction.
pub struct SlotScope<'a> {
    context: &'a ResolvedEnvironmentContext,
    slot: &'a str,
    resolver: ReferenceResolver,
    nodes: Vec<ResourceNode>,
    index: BTreeMap<String, usize>,
    outputs: Vec<GraphOutput>,
}

impl<'a> SlotScope<'a> {
    fn new(context: &'a ResolvedEnvironmentContext) -> Self {
        Self {
            context,
            slot: "",
            resolver: ReferenceResolver::new(),
            nodes: Vec::new(),
            index: BTreeMap::new(),
            outputs: Vec::new(),
        }
    }

    pub fn context(&self) -> &'a ResolvedEnvironmentContext {
        self.context
    }

    /// Start a node with its physical name and environment tags filled in.
    pub fn node(
        &self,
        kind: ResourceKind,
        logical_id: &str,
        resource_type: &str,
        base_name: &str,
    ) -> ResourceNode {
        let physical_name = self.context.physical_name(base_name);
        let mut node = ResourceNode::new(kind, logical_id, resource_type, physical_name.clone());
        node.tags = self.context.tags.clone();
        node.tags.insert("Name".to_string(), physical_name);
        node
    }

    /// Reference an attribute of an already instantiated node.
    pub fn reference(
        &self,
        from: &mut ResourceNode,
        target: &str,
        attribute: &str,
    ) -> IacResult<SymbolicReference> {
        Ok(self.resolver.reference(from, target, attribute)?)
    }

    /// Order `from` after `target` without referencing an attribute.
    pub fn depend_on(&self, from: &mut ResourceNode, target: &str) -> IacResult<()> {
        Ok(self.resolver.depend_on(from, target)?)
    }

    /// Append a finished node to the graph.
    pub fn add(&mut self, node: ResourceNode) -> IacResult<()> {
        if self.index.contains_key(&node.logical_id) {
            return Err(TemplateViolation::DuplicateLogicalId {
                environment: self.context.name.clone(),
                slot: self.slot.to_string(),
                logical_id: node.logical_id,
            }
            .into());
        }
        if let Some(attribute) = RESERVED_ATTRIBUTES.iter().find(|a| node.attributes.contains_key(**a)) {
            return Err(TemplateViolation::ReservedAttribute {
                environment: self.context.name.clone(),
                node: node.logical_id,
                attribute: attribute.to_string(),
            }
            .into());
        }
        debug!(
            "[{}] slot '{}' added {} '{}'",
            self.context.name, self.slot, node.kind, node.logical_id
        );
        self.resolver.register(node.logical_id.clone());
        self.index.insert(node.logical_id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Export an attribute of an instantiated node.
    pub fn export(
        &mut self,
        name: &str,
        description: &str,
        target: &str,
        attribute: &str,
        export_base: &str,
    ) -> IacResult<()> {
        let value = self.resolver.output_reference(name, target, attribute)?;
        self.outputs.push(GraphOutput {
            name: name.to_string(),
            description: description.to_string(),
            value,
            export_name: self.context.physical_name(export_base),
        });
        Ok(())
    }

    fn seal(self) -> Result<Graph, TemplateViolation> {
        let graph = Graph {
            environment: self.context.name.clone(),
            nodes: self.nodes,
            index: self.index,
            outputs: self.outputs,
        };
        graph.verify_order()?;
        graph.verify_references()?;
        Ok(graph)
    }
}

/// Builds one sealed [`Graph`] per resolved environment.
pub struct GraphBuilder<'t> {
    template: &'t CompositionTemplate,
}

impl<'t> GraphBuilder<'t> {
    pub fn new(template: &'t CompositionTemplate) -> Self {
        Self { template }
    }

    /// Instantiate the template for one environment.
    pub fn build(&self, context: &ResolvedEnvironmentContext) -> IacResult<Graph> {
        info!("Building resource graph for '{}'", context.name);

        let mut scope = SlotScope::new(context);
        for slot in self.template.slots() {
            scope.slot = slot.name();
            match slot.decide(context) {
                SlotDecision::Absent => {
                    debug!("[{}] slot '{}' omitted", context.name, slot.name());
                }
                SlotDecision::Variant(variant) => {
                    debug!("[{}] slot '{}' as {:?}", context.name, slot.name(), variant);
                    slot.populate(&mut scope, variant)?;
                }
            }
        }

        let graph = scope.seal()?;
        info!("Sealed '{}' with {} node(s)", context.name, graph.len());
        Ok(graph)
    }
}

/// Build one environment's graph from `template`.
pub fn build(context: &ResolvedEnvironmentContext, template: &CompositionTemplate) -> IacResult<Graph> {
    GraphBuilder::new(template).build(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{resolve, EnvironmentClass, EnvironmentDescriptor, GlobalDefaults};
    use crate::error::IacError;
    use crate::template::{Slot, SlotVariant};

    fn context() -> ResolvedEnvironmentContext {
        let descriptor = EnvironmentDescriptor::new("dev", EnvironmentClass::NonProduction, "10.0.0.0/16");
        resolve(&descriptor, &GlobalDefaults::default()).unwrap()
    }

    fn always(_: &ResolvedEnvironmentContext) -> SlotDecision {
        SlotDecision::Variant(SlotVariant::Standard)
    }

    #[test]
    fn test_builder_fills_names_and_tags() {
        let template = CompositionTemplate::new().slot(Slot::new("network", always, |scope, _| {
            let node = scope.node(ResourceKind::Network, "Network", "AWS::EC2::VPC", "network");
            scope.add(node)
        }));

        let graph = build(&context(), &template).unwrap();
        let network = graph.get("Network").unwrap();
        assert_eq!(network.physical_name, "app-dev-network");
        assert_eq!(network.tags["Name"], "app-dev-network");
        assert_eq!(network.tags["Environment"], "dev");
    }

    #[test]
    fn test_duplicate_logical_id_is_template_violation() {
        let template = CompositionTemplate::new()
            .slot(Slot::new("first", always, |scope, _| {
                let node = scope.node(ResourceKind::Storage, "Bucket", "AWS::S3::Bucket", "a");
                scope.add(node)
            }))
            .slot(Slot::new("second", always, |scope, _| {
                let node = scope.node(ResourceKind::Storage, "Bucket", "AWS::S3::Bucket", "b");
                scope.add(node)
            }));

        let err = build(&context(), &template).unwrap_err();
        match err {
            IacError::Template(TemplateViolation::DuplicateLogicalId { slot, logical_id, .. }) => {
                assert_eq!(slot, "second");
                assert_eq!(logical_id, "Bucket");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_tags_attribute_is_reserved() {
        let template = CompositionTemplate::new().slot(Slot::new("bucket", always, |scope, _| {
            let node = scope
                .node(ResourceKind::Storage, "Bucket", "AWS::S3::Bucket", "bucket")
                .attr("Tags", "Team=data");
            scope.add(node)
        }));

        let err = build(&context(), &template).unwrap_err();
        match err {
            IacError::Template(TemplateViolation::ReservedAttribute { node, attribute, .. }) => {
                assert_eq!(node, "Bucket");
                assert_eq!(attribute, "Tags");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reference_to_later_slot_fails_at_build() {
        let template = CompositionTemplate::new()
            .slot(Slot::new("subnet", always, |scope, _| {
                let mut node = scope.node(ResourceKind::Subnetwork, "Subnet", "AWS::EC2::Subnet", "subnet");
                let vpc = scope.reference(&mut node, "Network", "id")?;
                node.set("VpcId", vpc);
                scope.add(node)
            }))
            .slot(Slot::new("network", always, |scope, _| {
                let node = scope.node(ResourceKind::Network, "Network", "AWS::EC2::VPC", "network");
                scope.add(node)
            }));

        let err = build(&context(), &template).unwrap_err();
        assert!(matches!(err, IacError::UnknownReference(ref e) if e.target == "Network"));
    }

    #[test]
    fn test_export_of_unknown_node_fails() {
        let template = CompositionTemplate::new().slot(Slot::new("outputs", always, |scope, _| {
            scope.export("NetworkId", "network id", "Network", "id", "network-id")
        }));

        let err = build(&context(), &template).unwrap_err();
        assert!(matches!(err, IacError::UnknownReference(_)));
    }

    #[test]
    fn test_verify_order_rejects_forward_edge() {
        let mut first = ResourceNode::new(ResourceKind::Network, "A", "T", "a");
        first.add_dependency("B");
        let second = ResourceNode::new(ResourceKind::Network, "B", "T", "b");
        let graph = Graph {
            environment: "dev".to_string(),
            index: [("A".to_string(), 0), ("B".to_string(), 1)].into_iter().collect(),
            nodes: vec![first, second],
            outputs: Vec::new(),
        };

        assert!(matches!(
            graph.verify_order(),
            Err(TemplateViolation::ForwardEdge { .. })
        ));
    }
}
