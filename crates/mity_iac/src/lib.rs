//! # mity_iac
//!
//! Multi-environment infrastructure synthesis for mITyFactory.
//!
//! Given a set of environment descriptors (say `dev` and `prod`), this crate
//! composes one resource graph per environment from a fixed composition
//! template, checks naming and tagging invariants across all of them, and
//! emits one declarative artifact per environment (or a combined one).
//!
//! ## Pipeline
//!
//! - [`environment`] resolves descriptors against [`GlobalDefaults`]
//! - [`graph`] instantiates a [`CompositionTemplate`] per environment, wiring
//!   [`SymbolicReference`]s through the [`reference`] resolver
//! - [`enforcer`] validates the whole [`SynthesisRun`]
//! - [`emitter`] serializes compliant runs
//!
//! ## Example
//!
//! ```rust,no_run
//! use mity_iac::{EmitOptions, EnvironmentClass, EnvironmentDescriptor, GlobalDefaults, SynthesisRun};
//!
//! let descriptors = vec![
//!     EnvironmentDescriptor::new("dev", EnvironmentClass::NonProduction, "10.0.0.0/16"),
//!     EnvironmentDescriptor::new("prod", EnvironmentClass::Production, "10.1.0.0/16"),
//! ];
//! let defaults = GlobalDefaults::default()
//!     .with_prefix("shop")
//!     .with_default_tag("Owner", "platform")
//!     .with_default_tag("Project", "shop");
//!
//! let run = SynthesisRun::synthesize(&descriptors, defaults).unwrap();
//! let artifacts = run.emit(&EmitOptions::default()).unwrap();
//! assert_eq!(artifacts.len(), 2);
//! ```

pub mod cidr;
pub mod config;
pub mod emitter;
pub mod enforcer;
pub mod environment;
pub mod error;
pub mod graph;
pub mod model;
pub mod reference;
pub mod run;
pub mod template;

pub use cidr::Ipv4Block;
pub use config::SynthesisConfig;
pub use emitter::{deferred_token, ArtifactEmitter, EmitOptions, Encoding, Layout, SerializedArtifact};
pub use enforcer::{validate, NamingEnforcer, ValidationResult, Violation, ViolationKind};
pub use environment::{
    resolve, resolve_all, EnvironmentClass, EnvironmentDescriptor, Feature, FleetCapacity, GlobalDefaults,
    LogRetention, ReferenceSyntax, ResolvedEnvironmentContext, ResolvedFeatures, SizingValue, TableBilling,
};
pub use error::{ConfigError, IacError, IacResult, TemplateViolation, UnknownReferenceError};
pub use graph::{build, Graph, GraphBuilder, GraphOutput, SlotScope};
pub use model::{AttributeValue, Lifecycle, ResourceKind, ResourceNode, SymbolicReference};
pub use reference::ReferenceResolver;
pub use run::{EnvironmentGraph, SynthesisRun};
pub use template::{CompositionTemplate, Slot, SlotDecision, SlotVariant};
