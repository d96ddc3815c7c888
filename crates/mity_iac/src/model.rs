//! Resource descriptor model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse category of an infrastructure resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    Subnetwork,
    SecurityBoundary,
    Compute,
    Storage,
    Database,
    Identity,
    Observability,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Subnetwork => "subnetwork",
            ResourceKind::SecurityBoundary => "security_boundary",
            ResourceKind::Compute => "compute",
            ResourceKind::Storage => "storage",
            ResourceKind::Database => "database",
            ResourceKind::Identity => "identity",
            ResourceKind::Observability => "observability",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Placeholder for an attribute of another node, known only once the
/// provisioning engine has created it.
///
/// Only [`ReferenceResolver`](crate::reference::ReferenceResolver) hands
/// these out, so every instance is backed by a dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolicReference {
    target: String,
    attribute: String,
}

impl SymbolicReference {
    pub(crate) fn new(target: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            attribute: attribute.into(),
        }
    }

    /// Logical id of the referenced node.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Attribute path on the referenced node (e.g. `id`, `arn`).
    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

impl fmt::Display for SymbolicReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target, self.attribute)
    }
}

/// Attribute value of a resource node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Bool(bool),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
    Reference(SymbolicReference),
}

impl AttributeValue {
    /// Build a nested map value from key/value pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        AttributeValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V: Into<AttributeValue>>(items: impl IntoIterator<Item = V>) -> Self {
        AttributeValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&SymbolicReference> {
        match self {
            AttributeValue::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Collect every symbolic reference nested in this value.
    pub fn collect_references<'a>(&'a self, out: &mut Vec<&'a SymbolicReference>) {
        match self {
            AttributeValue::Reference(r) => out.push(r),
            AttributeValue::List(items) => items.iter().for_each(|v| v.collect_references(out)),
            AttributeValue::Map(entries) => entries.values().for_each(|v| v.collect_references(out)),
            AttributeValue::String(_) | AttributeValue::Integer(_) | AttributeValue::Bool(_) => {}
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Integer(i64::from(value))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<SymbolicReference> for AttributeValue {
    fn from(value: SymbolicReference) -> Self {
        AttributeValue::Reference(value)
    }
}

/// Lifecycle flags of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Lifecycle {
    /// Keep the physical resource when the stack is deleted.
    pub retain_on_delete: bool,
    /// The resource is expected to be torn down with its environment.
    pub ephemeral: bool,
}

/// A single infrastructure resource in one environment's graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceNode {
    pub kind: ResourceKind,
    pub logical_id: String,
    /// Provider resource type, e.g. `AWS::EC2::VPC`.
    pub resource_type: String,
    pub physical_name: String,
    pub tags: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Logical ids this node depends on, in the order they were recorded.
    pub depends_on: Vec<String>,
    pub lifecycle: Lifecycle,
    /// Present only in production-class environments.
    pub production_only: bool,
}

impl ResourceNode {
    pub fn new(
        kind: ResourceKind,
        logical_id: impl Into<String>,
        resource_type: impl Into<String>,
        physical_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            logical_id: logical_id.into(),
            resource_type: resource_type.into(),
            physical_name: physical_name.into(),
            tags: BTreeMap::new(),
            attributes: BTreeMap::new(),
            depends_on: Vec::new(),
            lifecycle: Lifecycle::default(),
            production_only: false,
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn production_only(mut self) -> Self {
        self.production_only = true;
        self
    }

    pub fn retain_on_delete(mut self, retain: bool) -> Self {
        self.lifecycle.retain_on_delete = retain;
        self
    }

    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.lifecycle.ephemeral = ephemeral;
        self
    }

    /// Record a dependency edge, keeping the first occurrence only.
    pub(crate) fn add_dependency(&mut self, logical_id: &str) {
        if !self.depends_on.iter().any(|d| d == logical_id) {
            self.depends_on.push(logical_id.to_string());
        }
    }

    /// Every symbolic reference in the attribute map, in key order.
    pub fn references(&self) -> Vec<&SymbolicReference> {
        let mut out = Vec::new();
        for value in self.attributes.values() {
            value.collect_references(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_nested_references() {
        let vpc = SymbolicReference::new("Network", "id");
        let sg = SymbolicReference::new("WebSecurityGroup", "id");
        let node = ResourceNode::new(ResourceKind::Compute, "AppFleet", "AWS::AutoScaling::AutoScalingGroup", "x")
            .attr("VpcId", vpc.clone())
            .attr(
                "Ingress",
                AttributeValue::list([AttributeValue::map([("Source", sg.clone())])]),
            )
            .attr("Port", 443i64);

        let refs = node.references();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&&vpc));
        assert!(refs.contains(&&sg));
    }

    #[test]
    fn test_dependencies_are_deduplicated() {
        let mut node = ResourceNode::new(ResourceKind::Subnetwork, "PublicSubnetA", "AWS::EC2::Subnet", "x");
        node.add_dependency("Network");
        node.add_dependency("Network");
        assert_eq!(node.depends_on, vec!["Network".to_string()]);
    }
}
