//! Template document lifecycle: locate, parse, resolve, post-process,
//! render.
//!
//! A deployment plan (`stackconfig.yaml`, assembled by merge-all discovery)
//! names one stanza per template. The main stanza is `MainTemplate`; child
//! stacks reference further stanzas by resource name. Template files
//! themselves are located first-match: the stack's local directory wins
//! over the search path, which is probed in reverse order.

use crate::context::ValidationReport;
use crate::postprocess;
use crate::{resolve, Error, Result, RunContext};
use stackform_config::{first_existing, merge_all};
use stackform_yaml::{decode, emit_json, emit_yaml, encode, parse_json, parse_yaml, DocValue};
use std::path::{Path, PathBuf};
use yaml_rust2::Yaml;

/// Nested child templates deeper than this fail rather than recurse
/// forever on a cyclic plan.
pub const MAX_CHILD_DEPTH: usize = 32;

const STACKCONFIG: &str = "stackconfig.yaml";
const DEFAULT_ARTIFACT_URL_PREFIX: &str = "https://s3.amazonaws.com";

/// On-disk representation of a template file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Yaml,
    Json,
}

impl TemplateFormat {
    /// Plan `Format` values are matched case-insensitively; anything that
    /// is not `yaml` is treated as plain JSON.
    pub fn from_tag(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("yaml") {
            TemplateFormat::Yaml
        } else {
            TemplateFormat::Json
        }
    }
}

/// Where a stack's plan and template files are looked for.
pub struct TemplateSource {
    stack: String,
    source_stack: String,
    base: PathBuf,
    search_dirs: Vec<PathBuf>,
}

impl TemplateSource {
    /// Set up discovery for `stack`. When the stack's local plan names a
    /// `SourceStack`, template files are looked up under that name on the
    /// search path instead.
    pub fn new(base: impl Into<PathBuf>, stack: &str, search_dirs: Vec<PathBuf>) -> Result<Self> {
        let base = base.into();
        let mut source_stack = stack.to_string();
        let local_plan = base.join("cfn").join(stack).join(STACKCONFIG);
        if local_plan.exists() {
            let raw = read_file(&local_plan)?;
            if let Some(declared) = parse_yaml(&raw)
                .ok()
                .as_ref()
                .and_then(|plan| plan.get("SourceStack"))
                .and_then(DocValue::scalar_display)
            {
                tracing::debug!(stack, source = %declared, "Using declared source stack");
                source_stack = declared;
            }
        }
        Ok(TemplateSource {
            stack: stack.to_string(),
            source_stack,
            base,
            search_dirs,
        })
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn source_stack(&self) -> &str {
        &self.source_stack
    }

    /// Assemble the deployment plan: every `stackconfig.yaml` on the
    /// search path merged in order, the stack's local copy last so
    /// repository overrides win.
    pub fn load_plan(&self) -> Result<DocValue> {
        let mut dirs = self.search_dirs.clone();
        dirs.push(self.base.clone());
        let mut plan: Option<DocValue> = None;
        for dir in &dirs {
            // The local directory holds the plan under the stack's own
            // name; shared directories hold it under the source stack.
            let sub = if dir == &self.base {
                &self.stack
            } else {
                &self.source_stack
            };
            let relative = format!("cfn/{sub}/{STACKCONFIG}");
            if let Some(layer) = merge_all(std::slice::from_ref(dir), &relative)? {
                match plan.as_mut() {
                    Some(existing) => stackform_config::merge(existing, layer),
                    None => plan = Some(layer),
                }
            }
        }
        plan.ok_or_else(|| Error::TemplateNotFound {
            name: format!("{STACKCONFIG} for stack {}", self.stack),
        })
    }

    /// Candidate paths for one template file, in probe order.
    pub fn template_candidates(&self, filename: &str) -> Vec<PathBuf> {
        let mut candidates = vec![self
            .base
            .join("cfn")
            .join(&self.stack)
            .join(filename)];
        for dir in self.search_dirs.iter().rev() {
            candidates.push(dir.join("cfn").join(&self.source_stack).join(filename));
        }
        candidates
    }
}

/// One fully processed template: parsed, resolved, post-processed, ready
/// to render.
#[derive(Debug)]
pub struct TemplateDocument {
    pub(crate) name: String,
    pub(crate) filename: String,
    pub(crate) format: TemplateFormat,
    pub(crate) tree: DocValue,
    pub(crate) auto_outputs: bool,
    pub(crate) no_upload: bool,
    pub(crate) artifact_url: String,
    pub(crate) children: Vec<TemplateDocument>,
}

impl TemplateDocument {
    /// Load and process the plan stanza `name`, recursing into child
    /// stacks. Any failure is wrapped with the stanza name.
    pub fn load(
        ctx: &RunContext,
        source: &TemplateSource,
        plan: &DocValue,
        name: &str,
    ) -> Result<Self> {
        Self::load_at_depth(ctx, source, plan, name, 0)
    }

    /// Wraps every failure with this stanza's name; a child failure keeps
    /// the child's name through the no-rewrap guard in `in_template`.
    pub(crate) fn load_at_depth(
        ctx: &RunContext,
        source: &TemplateSource,
        plan: &DocValue,
        name: &str,
        depth: usize,
    ) -> Result<Self> {
        Self::load_inner(ctx, source, plan, name, depth).map_err(|e| e.in_template(name))
    }

    fn load_inner(
        ctx: &RunContext,
        source: &TemplateSource,
        plan: &DocValue,
        name: &str,
        depth: usize,
    ) -> Result<Self> {
        if depth >= MAX_CHILD_DEPTH {
            return Err(Error::ChildDepthExceeded {
                max: MAX_CHILD_DEPTH,
            });
        }
        let Some(stanza) = plan.get(name) else {
            return Err(Error::MissingPlanEntry {
                name: name.to_string(),
            });
        };
        let mut stanza = stanza.clone();
        resolve::resolve_tree(ctx, &mut stanza)?;

        let filename = stanza
            .get("File")
            .and_then(DocValue::scalar_display)
            .ok_or_else(|| Error::MissingPlanEntry {
                name: format!("{name}.File"),
            })?;
        let format = stanza
            .get("Format")
            .and_then(DocValue::scalar_display)
            .map(|tag| TemplateFormat::from_tag(&tag))
            .unwrap_or(TemplateFormat::Yaml);
        let auto_outputs = flag(&stanza, "AutoOutputs");
        let no_upload = flag(&stanza, "DisableUpload");

        let candidates = source.template_candidates(&filename);
        let Some(path) = first_existing(&candidates) else {
            return Err(Error::TemplateNotFound {
                name: format!(
                    "{} for stack {}, source stack {}",
                    filename,
                    source.stack(),
                    source.source_stack()
                ),
            });
        };
        tracing::info!(path = %path.display(), template = name, "Loading template");
        let raw = read_file(&path)?;

        let mut tree = match format {
            TemplateFormat::Yaml => parse_yaml(&encode(&raw))?,
            TemplateFormat::Json => parse_json(&raw)?,
        };
        resolve::resolve_tree(ctx, &mut tree)?;
        if let Some(map) = tree.as_map_mut() {
            map.entry("Outputs".to_string())
                .or_insert_with(DocValue::empty_map);
        }

        let mut doc = TemplateDocument {
            name: name.to_string(),
            filename: filename.clone(),
            format,
            tree,
            auto_outputs,
            no_upload,
            artifact_url: artifact_url(ctx, source, plan, &filename),
            children: Vec::new(),
        };
        postprocess::process(ctx, source, plan, &mut doc, depth)?;
        Ok(doc)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn format(&self) -> TemplateFormat {
        self.format
    }

    pub fn tree(&self) -> &DocValue {
        &self.tree
    }

    /// Whether the rendered artifact should be published.
    pub fn upload_enabled(&self) -> bool {
        !self.no_upload
    }

    /// Where the rendered artifact will be published.
    pub fn artifact_url(&self) -> &str {
        &self.artifact_url
    }

    pub fn children(&self) -> &[TemplateDocument] {
        &self.children
    }

    /// The document's resource records, if any.
    pub fn resources(&self) -> Option<&indexmap::IndexMap<String, DocValue>> {
        self.tree.get("Resources").and_then(DocValue::as_map)
    }

    /// The document's output entries.
    pub fn outputs(&self) -> Option<&indexmap::IndexMap<String, DocValue>> {
        self.tree.get("Outputs").and_then(DocValue::as_map)
    }

    /// Serialize the finished tree back to text, restoring shorthand
    /// syntax for YAML documents.
    pub fn render(&self) -> Result<String> {
        match self.format {
            TemplateFormat::Yaml => Ok(decode(&emit_yaml(&self.tree)?)),
            TemplateFormat::Json => Ok(emit_json(&self.tree)?),
        }
    }

    /// Validate the rendered body against the deployment service.
    pub fn validate(&self, ctx: &RunContext) -> Result<ValidationReport> {
        tracing::debug!(template = %self.name, "Validating template");
        let report = ctx.validate_template(&self.render()?)?;
        tracing::info!(
            template = %self.name,
            description = %report.description,
            "Validated template"
        );
        if !report.capabilities.is_empty() {
            tracing::info!(
                capabilities = %report.capabilities.join(","),
                "Template requires capabilities"
            );
        }
        Ok(report)
    }

    /// The deduplicated union of capabilities required by this template
    /// and every child, in first-seen order.
    pub fn required_capabilities(&self, ctx: &RunContext) -> Result<Vec<String>> {
        let mut capabilities = self.validate(ctx)?.capabilities;
        for child in &self.children {
            for capability in child.required_capabilities(ctx)? {
                if !capabilities.contains(&capability) {
                    capabilities.push(capability);
                }
            }
        }
        Ok(capabilities)
    }
}

/// Resolve the plan's `Parameters` stanza into key/value pairs for the
/// deploy orchestrator. No stanza means no parameters.
pub fn stack_parameters(ctx: &RunContext, plan: &DocValue) -> Result<Vec<(String, String)>> {
    let Some(section) = plan.get("Parameters") else {
        return Ok(Vec::new());
    };
    let mut section = section.clone();
    resolve::resolve_tree(ctx, &mut section)?;
    let Some(map) = section.as_map() else {
        return Ok(Vec::new());
    };
    let mut parameters = Vec::with_capacity(map.len());
    for (key, value) in map {
        let value = value
            .scalar_display()
            .ok_or_else(|| Error::NonScalarReference { name: key.clone() })?;
        parameters.push((key.clone(), value));
    }
    Ok(parameters)
}

/// The name the deployed stack will carry: the plan's declared
/// `StackName` (or the stack directory name), prefixed with the stack
/// family.
pub fn qualified_stack_name(ctx: &RunContext, plan: &DocValue, stack: &str) -> String {
    let declared = plan
        .get("MainTemplate")
        .and_then(|main| main.get("StackName"))
        .and_then(DocValue::scalar_display)
        .unwrap_or_else(|| stack.to_string());
    format!("{}{}", ctx.stack_family(), declared)
}

fn artifact_url(
    ctx: &RunContext,
    source: &TemplateSource,
    plan: &DocValue,
    filename: &str,
) -> String {
    let prefix = plan
        .get("MainTemplate")
        .and_then(|main| main.get("S3URL"))
        .and_then(DocValue::scalar_display)
        .unwrap_or_else(|| DEFAULT_ARTIFACT_URL_PREFIX.to_string());
    let bucket = config_string(ctx, "Bucket");
    let key_prefix = config_string(ctx, "Prefix");
    format!(
        "{}/{}/{}/{}/{}",
        prefix,
        bucket,
        key_prefix,
        source.stack(),
        filename
    )
}

fn config_string(ctx: &RunContext, key: &str) -> String {
    ctx.config
        .get(key)
        .and_then(DocValue::scalar_display)
        .unwrap_or_default()
}

fn flag(stanza: &DocValue, key: &str) -> bool {
    matches!(
        stanza.get(key),
        Some(DocValue::Scalar(Yaml::Boolean(true)))
    )
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}
