//! The per-run context.
//!
//! All process-wide state lives here: the parameter store, merged
//! configuration, global tags, the stack-output cache, and the trait
//! objects for the three external services. One `RunContext` is
//! constructed per run and passed by reference into every operation;
//! there are no ambient globals.

use crate::outputs::OutputResolver;
use crate::{resolve, ApiError, Result};
use indexmap::IndexMap;
use stackform_config::{ConfigDocument, ParameterStore, TagTable};
use stackform_yaml::DocValue;

/// Process-environment lookup.
pub trait EnvSource {
    fn get(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// External key/value store: `query(item, attr)` yields zero or more
/// string values in store order.
pub trait KvStore {
    fn query(&self, item: &str, attr: &str) -> std::result::Result<Vec<String>, ApiError>;
}

/// Diagnostics from a template-validation call, passed through verbatim.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Capabilities the deployed stack will require.
    pub capabilities: Vec<String>,
    /// Human-readable diagnostic text.
    pub description: String,
}

/// Read-only deployment API surface. Stack creation and mutation belong
/// to the orchestration layer, not this core.
pub trait DeploymentApi {
    /// Current outputs of a deployed stack; `None` when the stack does
    /// not exist.
    fn stack_outputs(
        &self,
        stack_id: &str,
    ) -> std::result::Result<Option<IndexMap<String, String>>, ApiError>;

    /// Validate a rendered template body.
    fn validate_template(&self, body: &str) -> std::result::Result<ValidationReport, ApiError>;
}

/// Everything one run needs, constructed once and passed by reference.
pub struct RunContext {
    pub params: ParameterStore,
    pub config: ConfigDocument,
    tags: TagTable,
    env: Box<dyn EnvSource>,
    kv: Box<dyn KvStore>,
    outputs: OutputResolver,
}

impl RunContext {
    /// Assemble a context and resolve the configuration-driven pieces:
    /// the stack-family prefix is expanded, then the global tags, so tag
    /// values can reference any parameter or output.
    pub fn new(
        params: ParameterStore,
        config: ConfigDocument,
        env: Box<dyn EnvSource>,
        kv: Box<dyn KvStore>,
        api: Box<dyn DeploymentApi>,
    ) -> Result<Self> {
        let mut ctx = RunContext {
            params,
            config,
            tags: TagTable::new(),
            env,
            kv,
            outputs: OutputResolver::new(api),
        };

        if let Some(family) = ctx
            .config
            .get("StackFamily")
            .and_then(DocValue::scalar_display)
        {
            let mut family = crate::expand(&ctx, &family)?;
            if !family.ends_with('-') {
                family.push('-');
            }
            ctx.outputs.set_stack_family(family);
        }

        ctx.tags = TagTable::from_config(ctx.resolved_config("Tags")?.as_ref());
        Ok(ctx)
    }

    pub fn env_get(&self, name: &str) -> Option<String> {
        self.env.get(name)
    }

    pub fn kv_query(&self, item: &str, attr: &str) -> std::result::Result<Vec<String>, ApiError> {
        self.kv.query(item, attr)
    }

    pub fn outputs(&self) -> &OutputResolver {
        &self.outputs
    }

    /// Submit a rendered template body for validation by the deployment
    /// service; diagnostics are passed through verbatim.
    pub fn validate_template(&self, body: &str) -> Result<ValidationReport> {
        Ok(self.outputs.api().validate_template(body)?)
    }

    pub fn tags(&self) -> &TagTable {
        &self.tags
    }

    /// The stack-family prefix, empty or ending with `-`.
    pub fn stack_family(&self) -> &str {
        self.outputs.stack_family()
    }

    /// Fetch a configuration subtree with every variable reference in it
    /// resolved. The stored configuration is left untouched.
    pub fn resolved_config(&self, key: &str) -> Result<Option<DocValue>> {
        match self.config.get(key) {
            None => Ok(None),
            Some(value) => {
                let mut resolved = value.clone();
                resolve::resolve_tree(self, &mut resolved)?;
                Ok(Some(resolved))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Environment stub with one known variable.
    struct StubEnv;

    impl EnvSource for StubEnv {
        fn get(&self, name: &str) -> Option<String> {
            (name == "HOME_REGION").then(|| "us-west-2".to_string())
        }
    }

    /// Key/value stub: `host:addr` has one value, `host:multi` two,
    /// everything else none.
    struct StubKv;

    impl KvStore for StubKv {
        fn query(&self, item: &str, attr: &str) -> std::result::Result<Vec<String>, ApiError> {
            Ok(match (item, attr) {
                ("host", "addr") => vec!["10.0.0.1".to_string()],
                ("host", "multi") => vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
                _ => Vec::new(),
            })
        }
    }

    /// Deployment API stub: no stacks exist, validation always succeeds.
    struct StubApi;

    impl DeploymentApi for StubApi {
        fn stack_outputs(
            &self,
            _stack_id: &str,
        ) -> std::result::Result<Option<IndexMap<String, String>>, ApiError> {
            Ok(None)
        }

        fn validate_template(
            &self,
            _body: &str,
        ) -> std::result::Result<ValidationReport, ApiError> {
            Ok(ValidationReport::default())
        }
    }

    /// A context over stub services, for use across the crate's tests.
    pub(crate) fn test_context(params: ParameterStore, config: ConfigDocument) -> RunContext {
        RunContext::new(
            params,
            config,
            Box::new(StubEnv),
            Box::new(StubKv),
            Box::new(StubApi),
        )
        .expect("test context")
    }

    /// A context whose deployment API is supplied by the caller.
    pub(crate) fn test_context_with_api(
        params: ParameterStore,
        config: ConfigDocument,
        api: Box<dyn DeploymentApi>,
    ) -> RunContext {
        RunContext::new(params, config, Box::new(StubEnv), Box::new(StubKv), api)
            .expect("test context")
    }

    #[test]
    fn test_stack_family_gains_trailing_dash() {
        let config = ConfigDocument::new(
            stackform_yaml::parse_yaml("StackFamily: site\n").unwrap(),
        );
        let ctx = test_context(ParameterStore::new(), config);
        assert_eq!(ctx.stack_family(), "site-");
    }

    #[test]
    fn test_tags_resolve_against_parameters() {
        let mut params = ParameterStore::new();
        params.set_string("creator", "ops");
        let config = ConfigDocument::new(
            stackform_yaml::parse_yaml("Tags:\n  Creator: \"${@creator}\"\n").unwrap(),
        );
        let ctx = test_context(params, config);
        assert_eq!(ctx.tags().get("Creator"), Some("ops"));
    }
}
