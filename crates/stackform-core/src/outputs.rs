//! Cached lookup of deployed stack outputs.
//!
//! Outputs are fetched once per stack per run and cached under the
//! fully-qualified stack name. Rate-limit failures are the only retried
//! condition anywhere in the engine: up to three extra attempts with
//! linearly increasing backoff.

use crate::context::DeploymentApi;
use crate::{ApiError, Error, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::cell::RefCell;
use std::time::Duration;

/// Location selector inside an output name: `prefix#code+suffix`, code one
/// of `F`irst, `L`ast, a digit index, or `?` for a random pick.
static LOC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w*)#([FL0-9?])(\w*)$").unwrap());

/// Resolves and caches the published outputs of deployed stacks.
pub struct OutputResolver {
    api: Box<dyn DeploymentApi>,
    cache: RefCell<IndexMap<String, IndexMap<String, String>>>,
    stack_family: String,
    retry_delays: Vec<Duration>,
}

impl OutputResolver {
    pub fn new(api: Box<dyn DeploymentApi>) -> Self {
        OutputResolver {
            api,
            cache: RefCell::new(IndexMap::new()),
            stack_family: String::new(),
            retry_delays: vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(6),
            ],
        }
    }

    /// Override the rate-limit backoff schedule (length sets the retry
    /// budget).
    pub fn set_retry_delays(&mut self, delays: Vec<Duration>) {
        self.retry_delays = delays;
    }

    pub(crate) fn api(&self) -> &dyn DeploymentApi {
        self.api.as_ref()
    }

    pub(crate) fn set_stack_family(&mut self, family: String) {
        self.stack_family = family;
    }

    pub fn stack_family(&self) -> &str {
        &self.stack_family
    }

    /// Prefix a stack name with the stack family unless already prefixed.
    pub fn qualify(&self, stack: &str) -> String {
        if !self.stack_family.is_empty() && !stack.starts_with(&self.stack_family) {
            format!("{}{}", self.stack_family, stack)
        } else {
            stack.to_string()
        }
    }

    /// All outputs of a stack. A stack that does not exist yields an
    /// empty map, not an error.
    pub fn outputs(&self, stack: &str) -> Result<IndexMap<String, String>> {
        let qualified = self.qualify(stack);
        if let Some(hit) = self.cache.borrow().get(&qualified) {
            return Ok(hit.clone());
        }
        tracing::debug!(stack = %qualified, "Querying stack outputs");
        let mut tries = 0;
        let fetched = loop {
            match self.api.stack_outputs(&qualified) {
                Ok(found) => break found.unwrap_or_default(),
                Err(ApiError::RateLimited(message)) => {
                    if tries >= self.retry_delays.len() {
                        return Err(ApiError::RateLimited(message).into());
                    }
                    tracing::warn!(stack = %qualified, tries, "Rate limited, backing off");
                    std::thread::sleep(self.retry_delays[tries]);
                    tries += 1;
                }
                Err(other) => return Err(other.into()),
            }
        };
        self.cache
            .borrow_mut()
            .insert(qualified, fetched.clone());
        Ok(fetched)
    }

    /// Outputs of a child stack, located through the parent's `…Stack`
    /// output. A missing mapping yields an empty map.
    pub fn outputs_of_child(
        &self,
        stack: &str,
        child: &str,
    ) -> Result<IndexMap<String, String>> {
        let parent = self.outputs(stack)?;
        let child_key = if child.ends_with("Stack") {
            child.to_string()
        } else {
            format!("{child}Stack")
        };
        match parent.get(&child_key) {
            Some(value) => {
                // The output value is a stack locator of the form
                // name/identifier/...; the identifier names the child.
                let child_stack = value.split('/').nth(1).unwrap_or(value);
                self.outputs(child_stack)
            }
            None => Ok(IndexMap::new()),
        }
    }

    /// Resolve one output by spec: `stack[:child]:outputPattern`.
    ///
    /// When the pattern carries a location selector, the matching output
    /// keys are sorted lexicographically and one is chosen by the
    /// selector; otherwise the pattern is a literal key. A miss returns
    /// `Ok(None)`.
    pub fn output(&self, spec: &str) -> Result<Option<String>> {
        let terms: Vec<&str> = spec.split(':').collect();
        let (outputs, pattern) = match terms.as_slice() {
            [stack, pattern] => (self.outputs(stack)?, *pattern),
            [stack, child, pattern] => (self.outputs_of_child(stack, child)?, *pattern),
            _ => {
                return Err(Error::InvalidReference {
                    token: spec.to_string(),
                });
            }
        };

        let Some(caps) = LOC_RE.captures(pattern) else {
            return Ok(outputs.get(pattern).cloned());
        };

        let key_re = Regex::new(&format!("^{}.*{}$", &caps[1], &caps[3]))
            .expect("prefix and suffix are word characters");
        let mut matching: Vec<&String> = outputs.keys().filter(|k| key_re.is_match(k)).collect();
        matching.sort();

        let chosen = match &caps[2] {
            "F" => matching.first().copied(),
            "L" => matching.last().copied(),
            "?" => {
                if matching.is_empty() {
                    None
                } else {
                    Some(matching[rand::thread_rng().gen_range(0..matching.len())])
                }
            }
            digit => {
                let index: usize = digit.parse().expect("selector is a digit");
                match matching.get(index) {
                    Some(key) => Some(*key),
                    None => {
                        return Err(Error::BadIndex {
                            index,
                            pattern: pattern.to_string(),
                            matches: matching.len(),
                        });
                    }
                }
            }
        };
        Ok(chosen.and_then(|key| outputs.get(key).cloned()))
    }
}
