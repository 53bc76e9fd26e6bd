//! # stackform-config
//!
//! Layered configuration for stackform: the run's parameter store, the
//! merged configuration tree, candidate-directory file discovery, and the
//! global tag table.
//!
//! Two discovery modes exist because different callers need different
//! semantics: a template file is located with first-match-wins, while
//! configuration and resource templates are assembled by merging every
//! match found, later directories overriding earlier ones.

mod config;
mod discover;
mod error;
mod params;
mod tags;

pub use config::{merge, ConfigDocument};
pub use discover::{first_existing, merge_all};
pub use error::{Error, Result};
pub use params::ParameterStore;
pub use tags::TagTable;
