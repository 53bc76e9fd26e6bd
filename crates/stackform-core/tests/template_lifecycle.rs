//! End-to-end template lifecycle: plan discovery, load, resolution,
//! post-processing, child linking, and render.

use indexmap::IndexMap;
use stackform_config::{ConfigDocument, ParameterStore};
use stackform_core::{
    qualified_stack_name, stack_parameters, ApiError, DeploymentApi, EnvSource, KvStore,
    RunContext, TemplateDocument, TemplateSource, ValidationReport,
};
use stackform_yaml::{parse_yaml, DocValue};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct EmptyEnv;

impl EnvSource for EmptyEnv {
    fn get(&self, _name: &str) -> Option<String> {
        None
    }
}

struct EmptyKv;

impl KvStore for EmptyKv {
    fn query(&self, _item: &str, _attr: &str) -> Result<Vec<String>, ApiError> {
        Ok(Vec::new())
    }
}

/// No deployed stacks; every validation demands the same capability.
struct StubApi;

impl DeploymentApi for StubApi {
    fn stack_outputs(
        &self,
        _stack_id: &str,
    ) -> Result<Option<IndexMap<String, String>>, ApiError> {
        Ok(None)
    }

    fn validate_template(&self, _body: &str) -> Result<ValidationReport, ApiError> {
        Ok(ValidationReport {
            capabilities: vec!["CAPABILITY_IAM".to_string()],
            description: "ok".to_string(),
        })
    }
}

fn run_context(config: &str) -> RunContext {
    let mut params = ParameterStore::new();
    params.set_string("env", "prod");
    RunContext::new(
        params,
        ConfigDocument::new(parse_yaml(config).unwrap()),
        Box::new(EmptyEnv),
        Box::new(EmptyKv),
        Box::new(StubApi),
    )
    .unwrap()
}

const CONFIG: &str = "\
Bucket: mybucket
Prefix: templates
StackFamily: fam
Tags:
  Environment: production
CIDRLists:
  office:
    - 1.1.1.0/24
    - 2.2.2.0/24
    - 3.3.3.0/24
  single: 9.9.9.0/24
";

const PLAN: &str = "\
MainTemplate:
  File: main.yaml
  Format: yaml
  AutoOutputs: true
DbStack:
  File: db.yaml
  Format: yaml
  AutoOutputs: true
Parameters:
  Env: \"${@env}\"
";

const MAIN_TEMPLATE: &str = "\
Resources:
  WebSG:
    Type: AWS::EC2::SecurityGroup
    Properties:
      GroupDescription: web
      SecurityGroupIngress:
        - CidrIp: 10.9.9.9/32
          IpProtocol: tcp
          FromPort: 443
          ToPort: 443
        - CidrIp: $$office
          IpProtocol: tcp
          FromPort: 22
          ToPort: 22
  AclIn:
    Type: AWS::EC2::NetworkAclEntry
    Properties:
      RuleNumber: 100
      CidrBlock: $$office
  AclSelf:
    Type: AWS::EC2::NetworkAclEntry
    Properties:
      RuleNumber: 200
      CidrBlock: $$single
  AppSubnet:
    Type: AWS::EC2::Subnet
    Properties:
      Tags:
        - Key: Name
          Value: custom-name
  DbStack:
    Type: AWS::CloudFormation::Stack
    Properties:
      TemplateURL: placeholder
  GhostStack:
    Type: AWS::CloudFormation::Stack
    Properties:
      TemplateURL: placeholder
";

const DB_TEMPLATE: &str = "\
Resources:
  Db:
    Type: AWS::RDS::DBInstance
    Properties:
      DBInstanceClass: db.t3.micro
Outputs:
  DbName:
    Value: !Ref Db
";

fn write_fixture(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn stack_fixture() -> (TempDir, RunContext) {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path(), "cfn/mystack/stackconfig.yaml", PLAN);
    write_fixture(dir.path(), "cfn/mystack/main.yaml", MAIN_TEMPLATE);
    write_fixture(dir.path(), "cfn/mystack/db.yaml", DB_TEMPLATE);
    (dir, run_context(CONFIG))
}

fn load_main(dir: &TempDir, ctx: &RunContext) -> (TemplateDocument, DocValue) {
    let source = TemplateSource::new(dir.path(), "mystack", Vec::new()).unwrap();
    let plan = source.load_plan().unwrap();
    let doc = TemplateDocument::load(ctx, &source, &plan, "MainTemplate").unwrap();
    (doc, plan)
}

#[test]
fn test_security_group_rule_expansion() {
    let (dir, ctx) = stack_fixture();
    let (doc, _) = load_main(&dir, &ctx);

    let rules = doc
        .tree()
        .get("Resources")
        .and_then(|r| r.get("WebSG"))
        .and_then(|r| r.get("Properties"))
        .and_then(|p| p.get("SecurityGroupIngress"))
        .and_then(DocValue::as_seq)
        .unwrap();

    // One untouched rule plus one clone per CIDR; the templated rule is
    // removed, not counted.
    assert_eq!(rules.len(), 4);
    assert_eq!(rules[0].get("CidrIp"), Some(&DocValue::string("10.9.9.9/32")));
    let cidrs: Vec<&str> = rules[1..]
        .iter()
        .map(|r| r.get("CidrIp").unwrap().as_str().unwrap())
        .collect();
    assert_eq!(cidrs, vec!["1.1.1.0/24", "2.2.2.0/24", "3.3.3.0/24"]);
    for rule in &rules[1..] {
        assert_eq!(rule.get("FromPort"), Some(&DocValue::int(22)));
    }
}

#[test]
fn test_network_acl_multi_cidr_becomes_numbered_siblings() {
    let (dir, ctx) = stack_fixture();
    let (doc, _) = load_main(&dir, &ctx);
    let resources = doc.resources().unwrap();

    assert!(!resources.contains_key("AclIn"));
    for (i, cidr) in ["1.1.1.0/24", "2.2.2.0/24", "3.3.3.0/24"].iter().enumerate() {
        let entry = resources.get(&format!("AclIn{i}")).unwrap();
        let props = entry.get("Properties").unwrap();
        assert_eq!(props.get("RuleNumber"), Some(&DocValue::int(100 + i as i64)));
        assert_eq!(props.get("CidrBlock"), Some(&DocValue::string(*cidr)));
    }
}

#[test]
fn test_network_acl_single_cidr_replaced_in_place() {
    let (dir, ctx) = stack_fixture();
    let (doc, _) = load_main(&dir, &ctx);
    let resources = doc.resources().unwrap();

    let props = resources.get("AclSelf").unwrap().get("Properties").unwrap();
    assert_eq!(props.get("CidrBlock"), Some(&DocValue::string("9.9.9.0/24")));
    assert_eq!(props.get("RuleNumber"), Some(&DocValue::int(200)));
}

#[test]
fn test_resource_declared_tag_wins_over_configured() {
    let (dir, ctx) = stack_fixture();
    let (doc, _) = load_main(&dir, &ctx);

    let tags = doc
        .resources()
        .unwrap()
        .get("AppSubnet")
        .unwrap()
        .get("Properties")
        .and_then(|p| p.get("Tags"))
        .and_then(DocValue::as_seq)
        .unwrap();

    let mut by_key = IndexMap::new();
    for tag in tags {
        by_key.insert(
            tag.get("Key").unwrap().as_str().unwrap().to_string(),
            tag.get("Value").unwrap().as_str().unwrap().to_string(),
        );
    }
    assert_eq!(by_key.get("Environment").map(String::as_str), Some("production"));
    assert_eq!(by_key.get("Name").map(String::as_str), Some("custom-name"));
}

#[test]
fn test_child_stack_linked_and_orphan_pruned() {
    let (dir, ctx) = stack_fixture();
    let (doc, _) = load_main(&dir, &ctx);

    assert_eq!(doc.children().len(), 1);
    let child = &doc.children()[0];
    assert_eq!(child.name(), "DbStack");
    assert_eq!(
        child.artifact_url(),
        "https://s3.amazonaws.com/mybucket/templates/mystack/db.yaml"
    );

    let resources = doc.resources().unwrap();
    assert!(!resources.contains_key("GhostStack"));
    assert_eq!(
        resources
            .get("DbStack")
            .and_then(|r| r.get("Properties"))
            .and_then(|p| p.get("TemplateURL")),
        Some(&DocValue::string(child.artifact_url()))
    );

    // The parent exposes the child's stack id for parent:child:output
    // lookups.
    let outputs = doc.outputs().unwrap();
    let link = outputs.get("DbStack").unwrap();
    assert_eq!(link.get("Value").and_then(|v| v.get("Ref")), Some(&DocValue::string("DbStack")));
}

#[test]
fn test_auto_outputs_follow_per_type_table() {
    let (dir, ctx) = stack_fixture();
    let (doc, _) = load_main(&dir, &ctx);

    let outputs = doc.outputs().unwrap();
    assert!(outputs.contains_key("WebSG"));
    assert!(outputs.contains_key("AppSubnet"));

    let child_outputs = doc.children()[0].outputs().unwrap();
    assert!(child_outputs.contains_key("Db"));
    let addr = child_outputs.get("DbAddr").unwrap();
    assert_eq!(
        addr.get("Value").and_then(|v| v.get("Fn::GetAtt")),
        Some(&DocValue::Seq(vec![
            DocValue::string("Db"),
            DocValue::string("Endpoint.Address"),
        ]))
    );
    assert!(child_outputs.contains_key("DbPort"));
}

#[test]
fn test_render_restores_shorthand_and_reparses() {
    let (dir, ctx) = stack_fixture();
    let (doc, _) = load_main(&dir, &ctx);

    let child = &doc.children()[0];
    let rendered = child.render().unwrap();
    assert!(rendered.contains("!Ref Db"));
    assert!(!rendered.contains("BangRef"));

    let parent = doc.render().unwrap();
    assert!(parent.contains("1.1.1.0/24"));
    assert!(!parent.contains("$$office"));
}

#[test]
fn test_stack_parameters_resolve_plan_values() {
    let (dir, ctx) = stack_fixture();
    let (_, plan) = load_main(&dir, &ctx);

    let parameters = stack_parameters(&ctx, &plan).unwrap();
    assert_eq!(parameters, vec![("Env".to_string(), "prod".to_string())]);
}

#[test]
fn test_qualified_stack_name_uses_family_prefix() {
    let (dir, ctx) = stack_fixture();
    let (_, plan) = load_main(&dir, &ctx);

    assert_eq!(qualified_stack_name(&ctx, &plan, "mystack"), "fam-mystack");
}

#[test]
fn test_required_capabilities_dedupe_across_children() {
    let (dir, ctx) = stack_fixture();
    let (doc, _) = load_main(&dir, &ctx);

    // Parent and child both demand CAPABILITY_IAM; the union holds it
    // once.
    assert_eq!(
        doc.required_capabilities(&ctx).unwrap(),
        vec!["CAPABILITY_IAM".to_string()]
    );
}

#[test]
fn test_source_stack_redirects_search_path_lookup() {
    let repo = TempDir::new().unwrap();
    let shared = TempDir::new().unwrap();

    write_fixture(
        repo.path(),
        "cfn/site-db/stackconfig.yaml",
        "SourceStack: generic-db\n",
    );
    write_fixture(
        shared.path(),
        "cfn/generic-db/stackconfig.yaml",
        "MainTemplate:\n  File: db.yaml\n  Format: yaml\n",
    );
    write_fixture(
        shared.path(),
        "cfn/generic-db/db.yaml",
        "Resources:\n  Db:\n    Type: AWS::RDS::DBInstance\n    Properties:\n      DBInstanceClass: db.t3.micro\n",
    );

    let ctx = run_context("Bucket: b\nPrefix: p\n");
    let source = TemplateSource::new(
        repo.path(),
        "site-db",
        vec![PathBuf::from(shared.path())],
    )
    .unwrap();
    assert_eq!(source.source_stack(), "generic-db");

    let plan = source.load_plan().unwrap();
    let doc = TemplateDocument::load(&ctx, &source, &plan, "MainTemplate").unwrap();
    assert!(doc.resources().unwrap().contains_key("Db"));
}

#[test]
fn test_local_plan_overrides_search_path_layer() {
    let repo = TempDir::new().unwrap();
    let shared = TempDir::new().unwrap();

    write_fixture(
        shared.path(),
        "cfn/app/stackconfig.yaml",
        "MainTemplate:\n  File: shared.yaml\n  Format: yaml\nExtra: shared\n",
    );
    write_fixture(
        repo.path(),
        "cfn/app/stackconfig.yaml",
        "MainTemplate:\n  File: local.yaml\n",
    );
    write_fixture(repo.path(), "cfn/app/local.yaml", "Resources: {}\n");

    let ctx = run_context("Bucket: b\nPrefix: p\n");
    let source =
        TemplateSource::new(repo.path(), "app", vec![PathBuf::from(shared.path())]).unwrap();
    let plan = source.load_plan().unwrap();

    // Local File wins; untouched shared keys survive the merge.
    assert_eq!(
        plan.get("MainTemplate").and_then(|m| m.get("File")),
        Some(&DocValue::string("local.yaml"))
    );
    assert_eq!(plan.get("Extra"), Some(&DocValue::string("shared")));

    let doc = TemplateDocument::load(&ctx, &source, &plan, "MainTemplate").unwrap();
    assert_eq!(doc.filename(), "local.yaml");
}

#[test]
fn test_missing_template_file_fails_with_template_name() {
    let dir = TempDir::new().unwrap();
    write_fixture(
        dir.path(),
        "cfn/broken/stackconfig.yaml",
        "MainTemplate:\n  File: nowhere.yaml\n  Format: yaml\n",
    );
    let ctx = run_context("Bucket: b\nPrefix: p\n");
    let source = TemplateSource::new(dir.path(), "broken", Vec::new()).unwrap();
    let plan = source.load_plan().unwrap();

    let err = TemplateDocument::load(&ctx, &source, &plan, "MainTemplate").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("MainTemplate"), "{message}");
    assert!(message.contains("nowhere.yaml"), "{message}");
}

#[test]
fn test_child_failure_reports_child_stanza_name() {
    let dir = TempDir::new().unwrap();
    write_fixture(
        dir.path(),
        "cfn/web/stackconfig.yaml",
        "MainTemplate:\n  File: main.yaml\n  Format: yaml\nDbStack:\n  File: missing.yaml\n  Format: yaml\n",
    );
    write_fixture(
        dir.path(),
        "cfn/web/main.yaml",
        "Resources:\n  DbStack:\n    Type: AWS::CloudFormation::Stack\n    Properties:\n      TemplateURL: placeholder\n",
    );

    let ctx = run_context("Bucket: b\nPrefix: p\n");
    let source = TemplateSource::new(dir.path(), "web", Vec::new()).unwrap();
    let plan = source.load_plan().unwrap();

    // The missing file belongs to the child, so the wrapping names the
    // child stanza, not MainTemplate.
    let err = TemplateDocument::load(&ctx, &source, &plan, "MainTemplate").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("template DbStack"), "{message}");
    assert!(message.contains("missing.yaml"), "{message}");
}

#[test]
fn test_cyclic_child_reference_hits_depth_ceiling() {
    let dir = TempDir::new().unwrap();
    write_fixture(
        dir.path(),
        "cfn/loop/stackconfig.yaml",
        "MainTemplate:\n  File: main.yaml\n  Format: yaml\nSelfStack:\n  File: self.yaml\n  Format: yaml\n",
    );
    let self_referencing = "\
Resources:
  SelfStack:
    Type: AWS::CloudFormation::Stack
    Properties:
      TemplateURL: placeholder
";
    write_fixture(dir.path(), "cfn/loop/main.yaml", self_referencing);
    write_fixture(dir.path(), "cfn/loop/self.yaml", self_referencing);

    let ctx = run_context("Bucket: b\nPrefix: p\n");
    let source = TemplateSource::new(dir.path(), "loop", Vec::new()).unwrap();
    let plan = source.load_plan().unwrap();

    let err = TemplateDocument::load(&ctx, &source, &plan, "MainTemplate").unwrap_err();
    assert!(err.to_string().contains("nesting"), "{err}");
}

#[test]
fn test_missing_plan_stanza_fails() {
    let (dir, ctx) = stack_fixture();
    let source = TemplateSource::new(dir.path(), "mystack", Vec::new()).unwrap();
    let plan = source.load_plan().unwrap();

    assert!(TemplateDocument::load(&ctx, &source, &plan, "NoSuchStanza").is_err());
}
