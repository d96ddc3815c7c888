//! Symbolic references between nodes of one environment graph.

use std::collections::BTreeSet;

use tracing::trace;

use crate::error::UnknownReferenceError;
use crate::model::{ResourceNode, SymbolicReference};

/// Tracks which logical ids have been instantiated so far and hands out
/// references only to those, recording the backing dependency edge.
#[derive(Debug, Default)]
pub struct ReferenceResolver {
    known: BTreeSet<String>,
}

impl ReferenceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a node as instantiated so later nodes may reference it.
    pub fn register(&mut self, logical_id: impl Into<String>) {
        self.known.insert(logical_id.into());
    }

    pub fn is_known(&self, logical_id: &str) -> bool {
        self.known.contains(logical_id)
    }

    /// Reference `attribute` of `target` from `from`, adding the edge
    /// `from -> target`.
    pub fn reference(
        &self,
        from: &mut ResourceNode,
        target: &str,
        attribute: &str,
    ) -> Result<SymbolicReference, UnknownReferenceError> {
        self.check(&from.logical_id, target, attribute)?;
        from.add_dependency(target);
        trace!("{} -> {}.{}", from.logical_id, target, attribute);
        Ok(SymbolicReference::new(target, attribute))
    }

    /// Add an ordering edge with no attribute reference.
    pub fn depend_on(&self, from: &mut ResourceNode, target: &str) -> Result<(), UnknownReferenceError> {
        self.check(&from.logical_id, target, "<ordering>")?;
        from.add_dependency(target);
        Ok(())
    }

    /// Reference a node from a graph output rather than from another node.
    pub fn output_reference(
        &self,
        output: &str,
        target: &str,
        attribute: &str,
    ) -> Result<SymbolicReference, UnknownReferenceError> {
        self.check(output, target, attribute)?;
        Ok(SymbolicReference::new(target, attribute))
    }

    fn check(&self, from: &str, target: &str, attribute: &str) -> Result<(), UnknownReferenceError> {
        if self.known.contains(target) {
            Ok(())
        } else {
            Err(UnknownReferenceError {
                from: from.to_string(),
                target: target.to_string(),
                attribute: attribute.to_string(),
            })
        }
    }
}
