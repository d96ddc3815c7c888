//! Environment descriptors and their resolution into synthesis parameters.
//!
//! Resolution is a pure transform: the same descriptor and defaults always
//! yield the same [`ResolvedEnvironmentContext`]. Conditional features are
//! gated on the explicit [`EnvironmentClass`], never on the environment name.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cidr::Ipv4Block;
use crate::error::ConfigError;

/// Charset accepted for environment names and naming suffixes.
pub const ENVIRONMENT_NAME_PATTERN: &str = "^[a-z][a-z0-9-]*$";

/// Longest network prefix that still fits the four standard subnetworks.
const MAX_NETWORK_PREFIX: u8 = 28;

/// Coarse environment category driving conditional inclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvironmentClass {
    #[serde(rename = "production", alias = "prod")]
    Production,
    #[serde(rename = "non-production", alias = "non-prod", alias = "nonprod")]
    NonProduction,
}

impl EnvironmentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentClass::Production => "production",
            EnvironmentClass::NonProduction => "non-production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, EnvironmentClass::Production)
    }
}

impl fmt::Display for EnvironmentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Feature flags a descriptor may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Monitoring,
    PublicApiKey,
    Autoscaling,
    ProvisionedCapacity,
    Database,
    RetainData,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Monitoring => "monitoring",
            Feature::PublicApiKey => "public_api_key",
            Feature::Autoscaling => "autoscaling",
            Feature::ProvisionedCapacity => "provisioned_capacity",
            Feature::Database => "database",
            Feature::RetainData => "retain_data",
        }
    }

    /// Sizing parameters that must be supplied when the feature is enabled.
    pub fn required_sizing(&self) -> &'static [&'static str] {
        match self {
            Feature::Autoscaling => &["min_capacity", "max_capacity"],
            Feature::ProvisionedCapacity => &["read_capacity", "write_capacity"],
            Feature::Database => &["db_instance_class"],
            Feature::Monitoring | Feature::PublicApiKey | Feature::RetainData => &[],
        }
    }
}

/// A sizing parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizingValue {
    Integer(u64),
    Text(String),
}

impl From<u64> for SizingValue {
    fn from(value: u64) -> Self {
        SizingValue::Integer(value)
    }
}

impl From<&str> for SizingValue {
    fn from(value: &str) -> Self {
        SizingValue::Text(value.to_string())
    }
}

/// Caller-supplied description of one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    pub name: String,
    pub class: EnvironmentClass,
    /// IPv4 CIDR block for the environment's network.
    pub network: String,
    #[serde(default)]
    pub sizing: BTreeMap<String, SizingValue>,
    #[serde(default)]
    pub features: BTreeMap<Feature, bool>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Overrides the naming suffix, which defaults to the name.
    #[serde(default)]
    pub name_suffix: Option<String>,
}

impl EnvironmentDescriptor {
    pub fn new(name: impl Into<String>, class: EnvironmentClass, network: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class,
            network: network.into(),
            sizing: BTreeMap::new(),
            features: BTreeMap::new(),
            tags: BTreeMap::new(),
            name_suffix: None,
        }
    }

    pub fn with_sizing(mut self, key: impl Into<String>, value: impl Into<SizingValue>) -> Self {
        self.sizing.insert(key.into(), value.into());
        self
    }

    pub fn with_feature(mut self, feature: Feature, enabled: bool) -> Self {
        self.features.insert(feature, enabled);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.name_suffix = Some(suffix.into());
        self
    }

    fn flag(&self, feature: Feature) -> Option<bool> {
        self.features.get(&feature).copied()
    }

    fn effective_suffix(&self) -> &str {
        self.name_suffix.as_deref().unwrap_or(&self.name)
    }
}

/// Token syntax the provisioning engine uses for deferred references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum ReferenceSyntax {
    /// `{"Ref": id}` for identifiers, `{"Fn::GetAtt": [id, path]}` otherwise.
    Intrinsic,
    /// A string token such as `${Network.id}`.
    Interpolation { open: String, close: String },
}

impl Default for ReferenceSyntax {
    fn default() -> Self {
        Self::Intrinsic
    }
}

impl ReferenceSyntax {
    pub fn interpolation() -> Self {
        Self::Interpolation {
            open: "${".to_string(),
            close: "}".to_string(),
        }
    }
}

/// Log retention in days, per environment class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRetention {
    pub production: u32,
    pub non_production: u32,
}

impl Default for LogRetention {
    fn default() -> Self {
        Self {
            production: 365,
            non_production: 14,
        }
    }
}

/// Run-wide settings shared by every environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalDefaults {
    /// Prepended to every physical name.
    pub naming_prefix: String,
    /// Tag keys every resource must carry with a non-empty value.
    pub mandatory_tags: Vec<String>,
    /// Tag values applied before caller tags.
    pub default_tags: BTreeMap<String, String>,
    /// Environment names may not start with any of these.
    pub reserved_prefixes: Vec<String>,
    /// Charset for physical resource names.
    pub name_pattern: String,
    pub reference_syntax: ReferenceSyntax,
    pub default_instance_class: String,
    pub log_retention: LogRetention,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        let mut default_tags = BTreeMap::new();
        default_tags.insert("ManagedBy".to_string(), "mity".to_string());

        Self {
            naming_prefix: "app".to_string(),
            mandatory_tags: vec![
                "Environment".to_string(),
                "ManagedBy".to_string(),
                "Owner".to_string(),
                "Project".to_string(),
            ],
            default_tags,
            reserved_prefixes: vec!["aws".to_string(), "default".to_string(), "global".to_string()],
            name_pattern: "^[a-z0-9][a-z0-9-]{0,62}$".to_string(),
            reference_syntax: ReferenceSyntax::default(),
            default_instance_class: "t3.micro".to_string(),
            log_retention: LogRetention::default(),
        }
    }
}

impl GlobalDefaults {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.naming_prefix = prefix.into();
        self
    }

    pub fn with_default_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_tags.insert(key.into(), value.into());
        self
    }

    pub fn with_reference_syntax(mut self, syntax: ReferenceSyntax) -> Self {
        self.reference_syntax = syntax;
        self
    }

    /// Compile the physical name charset.
    pub fn name_regex(&self) -> Result<Regex, ConfigError> {
        compile(&self.name_pattern)
    }
}

/// Compute fleet sizing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FleetCapacity {
    Fixed { desired: u32 },
    Autoscaling { min: u32, max: u32 },
}

/// State table billing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableBilling {
    OnDemand,
    Provisioned { read: u32, write: u32 },
}

/// Database settings, present when the database feature is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseSettings {
    pub instance_class: String,
    pub storage_gb: u32,
    pub multi_az: bool,
}

/// Concrete value of every conditional feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFeatures {
    pub monitoring: bool,
    pub alarms: bool,
    pub api_key: bool,
    pub retain_data: bool,
    pub log_retention_days: u32,
    pub instance_class: String,
    pub fleet: FleetCapacity,
    pub table_billing: TableBilling,
    pub database: Option<DatabaseSettings>,
}

/// Fully resolved parameters for synthesizing one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEnvironmentContext {
    pub name: String,
    pub class: EnvironmentClass,
    pub naming_prefix: String,
    /// Unique across the run.
    pub suffix: String,
    pub network: Ipv4Block,
    pub tags: BTreeMap<String, String>,
    pub features: ResolvedFeatures,
}

impl ResolvedEnvironmentContext {
    pub fn is_production(&self) -> bool {
        self.class.is_production()
    }

    /// Physical name for a resource base name, e.g. `app-dev-network`.
    pub fn physical_name(&self, base: &str) -> String {
        if self.naming_prefix.is_empty() {
            format!("{}-{}", self.suffix, base)
        } else {
            format!("{}-{}-{}", self.naming_prefix, self.suffix, base)
        }
    }
}

/// Resolve one descriptor against the run defaults.
pub fn resolve(
    descriptor: &EnvironmentDescriptor,
    defaults: &GlobalDefaults,
) -> Result<ResolvedEnvironmentContext, ConfigError> {
    let identifier = compile(ENVIRONMENT_NAME_PATTERN)?;
    let suffix = descriptor.effective_suffix();
    for candidate in [descriptor.name.as_str(), suffix] {
        if !identifier.is_match(candidate) {
            return Err(ConfigError::InvalidName {
                name: candidate.to_string(),
                pattern: ENVIRONMENT_NAME_PATTERN.to_string(),
            });
        }
    }

    if let Some(prefix) = defaults
        .reserved_prefixes
        .iter()
        .find(|p| !p.is_empty() && descriptor.name.starts_with(p.as_str()))
    {
        return Err(ConfigError::ReservedName {
            name: descriptor.name.clone(),
            prefix: prefix.clone(),
        });
    }

    let network: Ipv4Block = descriptor
        .network
        .parse()
        .map_err(|message| ConfigError::InvalidNetwork {
            environment: descriptor.name.clone(),
            message,
        })?;
    if network.prefix() > MAX_NETWORK_PREFIX {
        return Err(ConfigError::InvalidNetwork {
            environment: descriptor.name.clone(),
            message: format!(
                "{} is smaller than /{} and cannot hold the subnetwork layout",
                network, MAX_NETWORK_PREFIX
            ),
        });
    }

    let features = resolve_features(descriptor, defaults)?;

    let mut tags = defaults.default_tags.clone();
    tags.extend(descriptor.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    tags.insert("Environment".to_string(), descriptor.name.clone());
    tags.insert("EnvironmentClass".to_string(), descriptor.class.as_str().to_string());

    debug!(
        "Resolved environment '{}' ({}) with suffix '{}'",
        descriptor.name, descriptor.class, suffix
    );

    Ok(ResolvedEnvironmentContext {
        name: descriptor.name.clone(),
        class: descriptor.class,
        naming_prefix: defaults.naming_prefix.clone(),
        suffix: suffix.to_string(),
        network,
        tags,
        features,
    })
}

/// Resolve every descriptor of a run, checking cross-environment constraints.
pub fn resolve_all(
    descriptors: &[EnvironmentDescriptor],
    defaults: &GlobalDefaults,
) -> Result<Vec<ResolvedEnvironmentContext>, ConfigError> {
    if descriptors.is_empty() {
        return Err(ConfigError::NoEnvironments);
    }
    defaults.name_regex()?;

    let mut names = BTreeSet::new();
    for descriptor in descriptors {
        if !names.insert(descriptor.name.as_str()) {
            return Err(ConfigError::DuplicateName(descriptor.name.clone()));
        }
    }

    let contexts = descriptors
        .iter()
        .map(|d| resolve(d, defaults))
        .collect::<Result<Vec<_>, _>>()?;

    for (i, first) in contexts.iter().enumerate() {
        for second in &contexts[i + 1..] {
            if first.suffix == second.suffix {
                return Err(ConfigError::DuplicateSuffix {
                    suffix: first.suffix.clone(),
                    first: first.name.clone(),
                    second: second.name.clone(),
                });
            }
            if first.network.overlaps(&second.network) {
                return Err(ConfigError::OverlappingNetwork {
                    first: first.name.clone(),
                    first_cidr: first.network.to_string(),
                    second: second.name.clone(),
                    second_cidr: second.network.to_string(),
                });
            }
        }
    }

    Ok(contexts)
}

fn resolve_features(
    descriptor: &EnvironmentDescriptor,
    defaults: &GlobalDefaults,
) -> Result<ResolvedFeatures, ConfigError> {
    let production = descriptor.class.is_production();

    for (feature, enabled) in &descriptor.features {
        if !*enabled {
            continue;
        }
        for parameter in feature.required_sizing() {
            if !descriptor.sizing.contains_key(*parameter) {
                return Err(ConfigError::MissingSizing {
                    environment: descriptor.name.clone(),
                    feature: feature.as_str().to_string(),
                    parameter: parameter.to_string(),
                });
            }
        }
    }

    let monitoring = descriptor.flag(Feature::Monitoring).unwrap_or(production);

    let api_key = match descriptor.flag(Feature::PublicApiKey) {
        Some(true) if !production => {
            warn!(
                "Ignoring production-only feature '{}' for non-production environment '{}'",
                Feature::PublicApiKey.as_str(),
                descriptor.name
            );
            false
        }
        Some(requested) => requested,
        None => production,
    };

    let instance_class = match optional_text(descriptor, "instance_class")? {
        Some(class) => class,
        None => defaults.default_instance_class.clone(),
    };

    let fleet = if descriptor.flag(Feature::Autoscaling).unwrap_or(false) {
        let min = required_u32(descriptor, "min_capacity")?;
        let max = required_u32(descriptor, "max_capacity")?;
        if min > max {
            return Err(ConfigError::InvalidSizing {
                environment: descriptor.name.clone(),
                parameter: "min_capacity".to_string(),
                message: format!("min_capacity {} exceeds max_capacity {}", min, max),
            });
        }
        FleetCapacity::Autoscaling { min, max }
    } else {
        FleetCapacity::Fixed {
            desired: optional_u32(descriptor, "desired_capacity")?.unwrap_or(1),
        }
    };

    let table_billing = if descriptor.flag(Feature::ProvisionedCapacity).unwrap_or(false) {
        TableBilling::Provisioned {
            read: required_u32(descriptor, "read_capacity")?,
            write: required_u32(descriptor, "write_capacity")?,
        }
    } else {
        TableBilling::OnDemand
    };

    let database = if descriptor.flag(Feature::Database).unwrap_or(false) {
        Some(DatabaseSettings {
            instance_class: optional_text(descriptor, "db_instance_class")?.unwrap_or_default(),
            storage_gb: optional_u32(descriptor, "storage_gb")?.unwrap_or(20),
            multi_az: production,
        })
    } else {
        None
    };

    Ok(ResolvedFeatures {
        monitoring,
        alarms: production && monitoring,
        api_key,
        retain_data: descriptor.flag(Feature::RetainData).unwrap_or(false),
        log_retention_days: if production {
            defaults.log_retention.production
        } else {
            defaults.log_retention.non_production
        },
        instance_class,
        fleet,
        table_billing,
        database,
    })
}

fn invalid_sizing(descriptor: &EnvironmentDescriptor, parameter: &str, message: &str) -> ConfigError {
    ConfigError::InvalidSizing {
        environment: descriptor.name.clone(),
        parameter: parameter.to_string(),
        message: message.to_string(),
    }
}

fn optional_u32(descriptor: &EnvironmentDescriptor, parameter: &str) -> Result<Option<u32>, ConfigError> {
    match descriptor.sizing.get(parameter) {
        None => Ok(None),
        Some(SizingValue::Integer(n)) => u32::try_from(*n)
            .map(Some)
            .map_err(|_| invalid_sizing(descriptor, parameter, "value is too large")),
        Some(SizingValue::Text(_)) => Err(invalid_sizing(descriptor, parameter, "expected an integer")),
    }
}

fn required_u32(descriptor: &EnvironmentDescriptor, parameter: &str) -> Result<u32, ConfigError> {
    optional_u32(descriptor, parameter)?.ok_or_else(|| invalid_sizing(descriptor, parameter, "value is required"))
}

fn optional_text(descriptor: &EnvironmentDescriptor, parameter: &str) -> Result<Option<String>, ConfigError> {
    match descriptor.sizing.get(parameter) {
        None => Ok(None),
        Some(SizingValue::Text(s)) if !s.is_empty() => Ok(Some(s.clone())),
        Some(SizingValue::Text(_)) => Err(invalid_sizing(descriptor, parameter, "value is empty")),
        Some(SizingValue::Integer(_)) => Err(invalid_sizing(descriptor, parameter, "expected text")),
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev() -> EnvironmentDescriptor {
        EnvironmentDescriptor::new("dev", EnvironmentClass::NonProduction, "10.0.0.0/16")
    }

    fn prod() -> EnvironmentDescriptor {
        EnvironmentDescriptor::new("prod", EnvironmentClass::Production, "10.1.0.0/16")
    }

    #[test]
    fn test_resolve_production_defaults() {
        let ctx = resolve(&prod(), &GlobalDefaults::default()).unwrap();
        assert!(ctx.features.monitoring);
        assert!(ctx.features.alarms);
        assert!(ctx.features.api_key);
        assert_eq!(ctx.features.log_retention_days, 365);
        assert_eq!(ctx.features.instance_class, "t3.micro");
        assert_eq!(ctx.features.fleet, FleetCapacity::Fixed { desired: 1 });
        assert_eq!(ctx.features.table_billing, TableBilling::OnDemand);
    }

    #[test]
    fn test_resolve_non_production_ignores_api_key_flag() {
        let descriptor = dev()
            .with_feature(Feature::PublicApiKey, true)
            .with_feature(Feature::Monitoring, true);
        let ctx = resolve(&descriptor, &GlobalDefaults::default()).unwrap();
        assert!(!ctx.features.api_key);
        assert!(ctx.features.monitoring);
        assert!(!ctx.features.alarms);
        assert_eq!(ctx.features.log_retention_days, 14);
    }

    #[test]
    fn test_class_drives_gating_not_name() {
        let descriptor = EnvironmentDescriptor::new("pr-1234", EnvironmentClass::Production, "10.9.0.0/16");
        let ctx = resolve(&descriptor, &GlobalDefaults::default()).unwrap();
        assert!(ctx.features.api_key);
    }

    #[test]
    fn test_tag_merge_precedence() {
        let defaults = GlobalDefaults::default().with_default_tag("Owner", "platform");
        let descriptor = dev()
            .with_tag("Owner", "team-a")
            .with_tag("Environment", "spoofed");
        let ctx = resolve(&descriptor, &defaults).unwrap();
        assert_eq!(ctx.tags["Owner"], "team-a");
        assert_eq!(ctx.tags["Environment"], "dev");
        assert_eq!(ctx.tags["EnvironmentClass"], "non-production");
        assert_eq!(ctx.tags["ManagedBy"], "mity");
    }

    #[test]
    fn test_reserved_prefix() {
        let descriptor = EnvironmentDescriptor::new("default-env", EnvironmentClass::NonProduction, "10.0.0.0/16");
        let err = resolve(&descriptor, &GlobalDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::ReservedName { .. }));
    }

    #[test]
    fn test_invalid_name() {
        let descriptor = EnvironmentDescriptor::new("Dev_1", EnvironmentClass::NonProduction, "10.0.0.0/16");
        let err = resolve(&descriptor, &GlobalDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidName { .. }));
    }

    #[test]
    fn test_feature_requires_sizing() {
        let descriptor = dev()
            .with_feature(Feature::Autoscaling, true)
            .with_sizing("min_capacity", 1u64);
        let err = resolve(&descriptor, &GlobalDefaults::default()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingSizing {
                environment: "dev".to_string(),
                feature: "autoscaling".to_string(),
                parameter: "max_capacity".to_string(),
            }
        );
    }

    #[test]
    fn test_disabled_feature_needs_no_sizing() {
        let descriptor = dev().with_feature(Feature::Database, false);
        let ctx = resolve(&descriptor, &GlobalDefaults::default()).unwrap();
        assert!(ctx.features.database.is_none());
    }

    #[test]
    fn test_inverted_capacity_bounds() {
        let descriptor = dev()
            .with_feature(Feature::Autoscaling, true)
            .with_sizing("min_capacity", 5u64)
            .with_sizing("max_capacity", 2u64);
        let err = resolve(&descriptor, &GlobalDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSizing { .. }));
    }

    #[test]
    fn test_network_too_small() {
        let descriptor = EnvironmentDescriptor::new("dev", EnvironmentClass::NonProduction, "10.0.0.0/30");
        let err = resolve(&descriptor, &GlobalDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNetwork { .. }));
    }

    #[test]
    fn test_resolve_all_rejects_duplicate_names() {
        let second = EnvironmentDescriptor::new("dev", EnvironmentClass::Production, "10.5.0.0/16");
        let err = resolve_all(&[dev(), second], &GlobalDefaults::default()).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateName("dev".to_string()));
    }

    #[test]
    fn test_resolve_all_rejects_overlap() {
        let second = EnvironmentDescriptor::new("qa", EnvironmentClass::NonProduction, "10.0.128.0/20");
        let err = resolve_all(&[dev(), second], &GlobalDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::OverlappingNetwork { .. }));
    }

    #[test]
    fn test_resolve_all_rejects_shared_suffix() {
        let second = prod().with_name_suffix("dev");
        let err = resolve_all(&[dev(), second], &GlobalDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSuffix { .. }));
    }

    #[test]
    fn test_resolve_all_rejects_empty_run() {
        let err = resolve_all(&[], &GlobalDefaults::default()).unwrap_err();
        assert_eq!(err, ConfigError::NoEnvironments);
    }

    #[test]
    fn test_physical_name() {
        let ctx = resolve(&dev(), &GlobalDefaults::default().with_prefix("shop")).unwrap();
        assert_eq!(ctx.physical_name("network"), "shop-dev-network");
    }
}
