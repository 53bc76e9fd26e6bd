//! The `${sigil:key|default}` variable-expansion language.
//!
//! Five sigils select the lookup source: `@` parameter store, `~` process
//! environment, `=` stack outputs, `%` external key/value store, `&` the
//! configuration tree. Everything after the first `|` is the default; a
//! trailing `|` with nothing after it means "default to the empty string",
//! which is distinct from having no default at all.

use crate::{Error, Result, RunContext};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use stackform_yaml::DocValue;

/// Token syntax, matching the reference-character repertoire of the
/// template corpus.
static EXPAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([@=%&~][:|.\-/\w<>=#]+)\}").unwrap());

/// Expanded values may themselves contain tokens, so passes repeat until
/// the text is stable. A cyclic default chain would otherwise never
/// terminate.
const MAX_PASSES: usize = 100;

/// Expand every `${...}` token in `text`, iterating to a fixed point.
pub fn expand(ctx: &RunContext, text: &str) -> Result<String> {
    let mut current = text.to_string();
    let mut passes = 0;
    while EXPAND_RE.is_match(&current) {
        passes += 1;
        if passes > MAX_PASSES {
            return Err(Error::ExpansionLoopDetected {
                text: text.to_string(),
                passes: MAX_PASSES,
            });
        }
        let mut failure: Option<Error> = None;
        let next = EXPAND_RE
            .replace_all(&current, |caps: &Captures| {
                match expand_token(ctx, &caps[1]) {
                    Ok(value) => value,
                    Err(err) => {
                        failure.get_or_insert(err);
                        String::new()
                    }
                }
            })
            .into_owned();
        if let Some(err) = failure {
            return Err(err);
        }
        current = next;
    }
    Ok(current)
}

/// Split a token body into lookup key and optional default.
fn split_default(body: &str) -> (&str, Option<&str>) {
    match body.split_once('|') {
        Some((key, default)) => (key, Some(default)),
        None => (body, None),
    }
}

fn expand_token(ctx: &RunContext, token: &str) -> Result<String> {
    let sigil = token.as_bytes()[0] as char;
    let (key, default) = split_default(&token[1..]);

    match sigil {
        '@' => match ctx.params.get(key) {
            Some(value) if !is_null(value) => scalar_or_fail(value, key),
            _ => default.map(str::to_string).ok_or(Error::UndefinedParameter {
                name: key.to_string(),
            }),
        },
        '~' => match ctx.env_get(key) {
            Some(value) => Ok(value),
            None => default.map(str::to_string).ok_or(Error::UndefinedEnvVar {
                name: key.to_string(),
            }),
        },
        '=' => match ctx.outputs().output(key)? {
            Some(value) => Ok(value),
            None => default.map(str::to_string).ok_or(Error::OutputNotFound {
                spec: key.to_string(),
            }),
        },
        '%' => {
            let Some((item, attr)) = key.split_once(':') else {
                return Err(Error::InvalidReference {
                    token: key.to_string(),
                });
            };
            let values = ctx.kv_query(item, attr)?;
            match values.len() {
                1 => Ok(values.into_iter().next().unwrap()),
                // A default only covers the zero-result case; multiple
                // results are ambiguous no matter what.
                0 if default.is_some() => Ok(default.unwrap().to_string()),
                n => Err(Error::AmbiguousLookup {
                    item: item.to_string(),
                    attr: attr.to_string(),
                    count: n,
                }),
            }
        }
        '&' => match ctx.config.get(key) {
            Some(value) => scalar_or_fail(value, key),
            None => default
                .map(str::to_string)
                .ok_or(Error::UndefinedConfigVar {
                    name: key.to_string(),
                }),
        },
        _ => unreachable!("sigil guaranteed by token regex"),
    }
}

fn is_null(value: &DocValue) -> bool {
    matches!(value, DocValue::Scalar(yaml_rust2::Yaml::Null))
}

/// A value found under a sigil must interpolate as a scalar; a mapping or
/// sequence fails even when a default is present.
fn scalar_or_fail(value: &DocValue, name: &str) -> Result<String> {
    value
        .scalar_display()
        .ok_or_else(|| Error::NonScalarReference {
            name: name.to_string(),
        })
}
