//! # stackform-yaml
//!
//! Document value trees and the shorthand-YAML escape codec.
//!
//! CloudFormation templates use shorthand tags (`!Ref`, `!GetAtt [a, b]`,
//! inline flow mappings as sequence elements) that a conformant YAML parser
//! cannot ingest alongside stackform's own `${...}` expansion syntax. This
//! crate provides:
//!
//! - [`DocValue`], a tagged document tree (scalar / sequence / mapping) used
//!   by every downstream component,
//! - [`codec`], a reversible lexical transform that masks the shorthand
//!   before parsing and restores it on emission,
//! - [`parse_yaml`] / [`emit_yaml`] and [`parse_json`] / [`emit_json`],
//!   the codec-aware entry points to and from raw text.
//!
//! ## Design
//!
//! The codec operates on raw text only; downstream components never observe
//! shorthand syntax. `decode(encode(text))` is structurally equivalent to
//! the original for any input that does not already contain the placeholder
//! tokens (placeholder collision is an accepted, undetected limitation).

mod codec;
mod error;
mod parser;
mod value;

pub use codec::{decode, encode, SHORTHAND_TAGS};
pub use error::{Error, Result};
pub use parser::{emit_json, emit_yaml, parse_json, parse_yaml};
pub use value::DocValue;
