//! # stackform-core
//!
//! The template resolution engine: variable expansion, structural
//! resolution of document trees, the template document lifecycle, and
//! cached stack-output lookup.
//!
//! Everything operates against a [`RunContext`], constructed once per run
//! from a parameter store, a merged configuration tree, and trait objects
//! for the three external services (process environment, key/value store,
//! deployment API). There are no ambient globals; tests substitute stubs
//! at the trait seams.
//!
//! The typical flow:
//!
//! 1. build a [`RunContext`],
//! 2. build a [`TemplateSource`] for the stack and load its deployment
//!    plan,
//! 3. [`TemplateDocument::load`] the `MainTemplate` stanza, which
//!    recursively resolves, post-processes, and links child stacks,
//! 4. `render()` each document for upload, `validate()` against the
//!    deployment service, and hand the resource/output index to the
//!    orchestration layer.

mod context;
mod error;
mod expand;
mod outputs;
mod postprocess;
mod resolve;
mod template;

pub use context::{DeploymentApi, EnvSource, KvStore, ProcessEnv, RunContext, ValidationReport};
pub use error::{ApiError, Error, Result};
pub use expand::expand;
pub use outputs::OutputResolver;
pub use resolve::{resolve_tree, DELETE_MARKER, REQUIRED_MARKER};
pub use template::{
    qualified_stack_name, stack_parameters, TemplateDocument, TemplateFormat, TemplateSource,
    MAX_CHILD_DEPTH,
};
