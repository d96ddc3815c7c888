//! Error types for IaC synthesis.

use std::path::PathBuf;

use thiserror::Error;

use crate::enforcer::ValidationResult;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Caller input problems, reported before any graph is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No environments supplied")]
    NoEnvironments,

    #[error("Invalid environment name '{name}': must match {pattern}")]
    InvalidName { name: String, pattern: String },

    #[error("Environment name '{name}' collides with reserved prefix '{prefix}'")]
    ReservedName { name: String, prefix: String },

    #[error("Duplicate environment name: {0}")]
    DuplicateName(String),

    #[error("Naming suffix '{suffix}' is used by both '{first}' and '{second}'")]
    DuplicateSuffix {
        suffix: String,
        first: String,
        second: String,
    },

    #[error("Invalid network block for '{environment}': {message}")]
    InvalidNetwork { environment: String, message: String },

    #[error("Network block {first_cidr} of '{first}' overlaps {second_cidr} of '{second}'")]
    OverlappingNetwork {
        first: String,
        first_cidr: String,
        second: String,
        second_cidr: String,
    },

    #[error("Feature '{feature}' in '{environment}' requires sizing parameter '{parameter}'")]
    MissingSizing {
        environment: String,
        feature: String,
        parameter: String,
    },

    #[error("Invalid sizing parameter '{parameter}' in '{environment}': {message}")]
    InvalidSizing {
        environment: String,
        parameter: String,
        message: String,
    },

    #[error("Invalid name pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// A composition template produced an inconsistent graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateViolation {
    #[error("Slot '{slot}' in '{environment}' declared logical id '{logical_id}' twice")]
    DuplicateLogicalId {
        environment: String,
        slot: String,
        logical_id: String,
    },

    #[error("Node '{node}' in '{environment}' sets reserved attribute '{attribute}'")]
    ReservedAttribute {
        environment: String,
        node: String,
        attribute: String,
    },

    #[error("Node '{node}' in '{environment}' depends on later node '{dependency}'")]
    ForwardEdge {
        environment: String,
        node: String,
        dependency: String,
    },

    #[error("Node '{node}' in '{environment}' references '{target}' without a dependency edge")]
    UnbackedReference {
        environment: String,
        node: String,
        target: String,
    },
}

/// A slot referenced a node that has not been instantiated yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Node '{from}' references unknown node '{target}' ({attribute})")]
pub struct UnknownReferenceError {
    pub from: String,
    pub target: String,
    pub attribute: String,
}

/// Errors that can occur during synthesis.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Template violation: {0}")]
    Template(#[from] TemplateViolation),

    #[error("Unknown reference: {0}")]
    UnknownReference(#[from] UnknownReferenceError),

    #[error("Environment not found in run: {0}")]
    EnvironmentNotFound(String),

    #[error("Refusing to emit non-compliant run: {} violation(s)", .0.violations.len())]
    NonCompliant(ValidationResult),

    #[error("Failed to load configuration from {path}: {message}")]
    ConfigLoad { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl IacError {
    /// Whether the error comes from caller input rather than the template.
    pub fn is_config(&self) -> bool {
        matches!(self, IacError::Config(_) | IacError::ConfigLoad { .. })
    }

    /// Whether the error is a composition bug.
    pub fn is_composition(&self) -> bool {
        matches!(self, IacError::Template(_) | IacError::UnknownReference(_))
    }
}
