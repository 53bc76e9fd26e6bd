//! Resource-graph post-processing.
//!
//! Runs once per template after structural resolution and before render.
//! The resource-name set is snapshotted at pass start, so record
//! replacement, deletion, and insertion during the pass never perturb
//! iteration. Four concerns: global tag injection, automatic output
//! generation, CIDR-list macro expansion, and child-stack linking.

use crate::template::TemplateDocument;
use crate::{Error, Result, RunContext, TemplateSource};
use stackform_yaml::DocValue;
use yaml_rust2::Yaml;

/// Resource types that receive the globally configured tags.
const TAG_RESOURCE_TYPES: &[&str] = &[
    "AWS::EC2::InternetGateway",
    "AWS::EC2::NetworkAcl",
    "AWS::EC2::Instance",
    "AWS::EC2::Volume",
    "AWS::EC2::VPC",
    "AWS::S3::Bucket",
    "AWS::EC2::RouteTable",
    "AWS::RDS::DBInstance",
    "AWS::RDS::DBSubnetGroup",
    "AWS::EC2::SecurityGroup",
    "AWS::EC2::Subnet",
    "AWS::CloudFormation::Stack",
];

pub(crate) fn process(
    ctx: &RunContext,
    source: &TemplateSource,
    plan: &DocValue,
    doc: &mut TemplateDocument,
    depth: usize,
) -> Result<()> {
    let Some(resources) = doc.tree.get("Resources").and_then(DocValue::as_map) else {
        return Ok(());
    };
    let reskeys: Vec<String> = resources.keys().cloned().collect();

    for reskey in reskeys {
        let Some(resource_type) = doc
            .tree
            .get("Resources")
            .and_then(|r| r.get(&reskey))
            .and_then(|r| r.get("Type"))
            .and_then(DocValue::scalar_display)
        else {
            continue;
        };
        tracing::debug!(
            resource = %reskey,
            kind = %resource_type,
            template = %doc.filename,
            "Processing resource"
        );

        if TAG_RESOURCE_TYPES.contains(&resource_type.as_str()) {
            update_tags(ctx, resource_mut(doc, &reskey), Some(&reskey), "Tags");
        }

        match resource_type.as_str() {
            "AWS::CloudFormation::Stack" => {
                link_child(ctx, source, plan, doc, &reskey, depth)?;
            }
            "AWS::EC2::RouteTable" => {
                if doc.auto_outputs {
                    add_output(
                        doc,
                        &reskey,
                        &format!("Route Table Id for {reskey}"),
                        ref_to(&reskey),
                        "Ref",
                    );
                }
            }
            "AWS::SDB::Domain" => {
                if doc.auto_outputs {
                    add_output(
                        doc,
                        &format!("{reskey}Domain"),
                        &format!("SDB Domain Name for {reskey}"),
                        ref_to(&reskey),
                        "Ref",
                    );
                }
            }
            "AWS::IAM::InstanceProfile" => {
                if doc.auto_outputs {
                    add_output(
                        doc,
                        &reskey,
                        &format!("ARN for Instance Profile {reskey}"),
                        attr_of(&reskey, "Arn"),
                        "Fn::GetAtt",
                    );
                }
            }
            "AWS::IAM::Role" => {
                if doc.auto_outputs {
                    add_output(
                        doc,
                        &reskey,
                        &format!("ARN for Role {reskey}"),
                        attr_of(&reskey, "Arn"),
                        "Fn::GetAtt",
                    );
                }
            }
            "AWS::Route53::HostedZone" => {
                // Hosted zones take tags under a different property key
                // and never get an injected Name.
                update_tags(ctx, resource_mut(doc, &reskey), None, "HostedZoneTags");
                if doc.auto_outputs {
                    add_output(
                        doc,
                        &format!("{reskey}Id"),
                        &format!("Hosted Zone Id for {reskey}"),
                        ref_to(&reskey),
                        "Ref",
                    );
                }
            }
            "AWS::RDS::DBInstance" => {
                if doc.auto_outputs {
                    add_output(
                        doc,
                        &reskey,
                        &format!("Instance Identifier for {reskey}"),
                        ref_to(&reskey),
                        "Ref",
                    );
                    add_output(
                        doc,
                        &format!("{reskey}Addr"),
                        &format!("Endpoint address for {reskey}"),
                        attr_of(&reskey, "Endpoint.Address"),
                        "Fn::GetAtt",
                    );
                    add_output(
                        doc,
                        &format!("{reskey}Port"),
                        &format!("TCP port for {reskey}"),
                        attr_of(&reskey, "Endpoint.Port"),
                        "Fn::GetAtt",
                    );
                }
            }
            "AWS::RDS::DBSubnetGroup" => {
                if doc.auto_outputs {
                    add_output(
                        doc,
                        &reskey,
                        &format!("{reskey} database subnet group"),
                        ref_to(&reskey),
                        "Ref",
                    );
                }
            }
            "AWS::EC2::Subnet" => {
                if doc.auto_outputs {
                    add_output(
                        doc,
                        &reskey,
                        &format!("SubnetId of {reskey} subnet"),
                        ref_to(&reskey),
                        "Ref",
                    );
                }
            }
            "AWS::EC2::SecurityGroup" => {
                if doc.auto_outputs {
                    add_output(
                        doc,
                        &reskey,
                        &format!("{reskey} security group"),
                        ref_to(&reskey),
                        "Ref",
                    );
                }
                expand_rule_cidrs(ctx, doc, &reskey)?;
            }
            "AWS::EC2::NetworkAclEntry" => {
                expand_acl_cidr(ctx, doc, &reskey)?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Merge the configured global tags into one resource. A tag the resource
/// already declares wins over the configured value.
fn update_tags(ctx: &RunContext, resource: Option<&mut DocValue>, name: Option<&str>, tagkey: &str) {
    let Some(properties) = resource.and_then(|r| r.get_mut("Properties")) else {
        return;
    };
    let mut tags = ctx.tags().clone();
    if let Some(name) = name {
        tags.set("Name", name);
    }
    if let Some(declared) = properties.get(tagkey) {
        tags.add(declared);
    }
    if let Some(map) = properties.as_map_mut() {
        map.insert(tagkey.to_string(), tags.cfn_tags());
    }
}

fn resource_mut<'a>(doc: &'a mut TemplateDocument, reskey: &str) -> Option<&'a mut DocValue> {
    doc.tree
        .get_mut("Resources")
        .and_then(|resources| resources.get_mut(reskey))
}

fn ref_to(reskey: &str) -> DocValue {
    DocValue::string(reskey)
}

fn attr_of(reskey: &str, attr: &str) -> DocValue {
    DocValue::Seq(vec![DocValue::string(reskey), DocValue::string(attr)])
}

/// Synthesize one output entry: `{Description, Value: {lookup: target}}`.
fn add_output(doc: &mut TemplateDocument, key: &str, desc: &str, target: DocValue, lookup: &str) {
    tracing::debug!(template = %doc.name, output = key, lookup, "Adding output");
    let mut value = indexmap::IndexMap::new();
    value.insert(lookup.to_string(), target);
    let mut entry = indexmap::IndexMap::new();
    entry.insert("Description".to_string(), DocValue::string(desc));
    entry.insert("Value".to_string(), DocValue::Map(value));
    if let Some(outputs) = doc
        .tree
        .get_mut("Outputs")
        .and_then(DocValue::as_map_mut)
    {
        outputs.insert(key.to_string(), DocValue::Map(entry));
    }
}

/// Look a `$$name` reference up in the configured CIDR-list table,
/// normalizing a single scalar entry to a one-element list.
fn resolve_cidr(ctx: &RunContext, name: &str) -> Result<Vec<String>> {
    let lists = ctx.resolved_config("CIDRLists")?;
    let entry = lists.as_ref().and_then(|lists| lists.get(name));
    match entry {
        Some(DocValue::Seq(items)) => Ok(items
            .iter()
            .filter_map(DocValue::scalar_display)
            .collect()),
        Some(scalar) => match scalar.scalar_display() {
            Some(value) => Ok(vec![value]),
            None => Err(Error::UndefinedCidrList {
                name: name.to_string(),
            }),
        },
        None => Err(Error::UndefinedCidrList {
            name: name.to_string(),
        }),
    }
}

/// A `$$name` CIDR macro: leading dollar kept through structural
/// resolution by the `$$` escape, list name after the two-byte prefix.
fn cidr_macro(value: &DocValue) -> Option<String> {
    let text = value.as_str()?;
    if !text.starts_with('$') {
        return None;
    }
    text.get(2..).filter(|rest| !rest.is_empty()).map(str::to_string)
}

/// Expand templated ingress/egress rules: the templated rule is removed
/// and one clone per CIDR entry is appended after the unrelated rules.
fn expand_rule_cidrs(ctx: &RunContext, doc: &mut TemplateDocument, reskey: &str) -> Result<()> {
    for sgtype in ["SecurityGroupIngress", "SecurityGroupEgress"] {
        // Collect expansions against an immutable borrow first.
        let Some(rules) = doc
            .tree
            .get("Resources")
            .and_then(|r| r.get(reskey))
            .and_then(|r| r.get("Properties"))
            .and_then(|p| p.get(sgtype))
            .and_then(DocValue::as_seq)
        else {
            continue;
        };

        let mut retained: Vec<DocValue> = Vec::new();
        let mut additions: Vec<DocValue> = Vec::new();
        for rule in rules {
            let templated = rule.get("CidrIp").and_then(cidr_macro);
            match templated {
                Some(listname) => {
                    for cidr in resolve_cidr(ctx, &listname)? {
                        let mut clone = rule.clone();
                        if let Some(map) = clone.as_map_mut() {
                            map.insert("CidrIp".to_string(), DocValue::string(cidr));
                        }
                        additions.push(clone);
                    }
                }
                None => retained.push(rule.clone()),
            }
        }
        retained.extend(additions);

        if let Some(list) = resource_mut(doc, reskey)
            .and_then(|r| r.get_mut("Properties"))
            .and_then(|p| p.get_mut(sgtype))
        {
            *list = DocValue::Seq(retained);
        }
    }
    Ok(())
}

/// Expand a network ACL entry's CIDR macro. One entry replaces in place;
/// N entries become N numbered sibling resources with incrementing rule
/// numbers, and the original is deleted.
fn expand_acl_cidr(ctx: &RunContext, doc: &mut TemplateDocument, reskey: &str) -> Result<()> {
    let Some(listname) = doc
        .tree
        .get("Resources")
        .and_then(|r| r.get(reskey))
        .and_then(|r| r.get("Properties"))
        .and_then(|p| p.get("CidrBlock"))
        .and_then(cidr_macro)
    else {
        return Ok(());
    };
    let cidrs = resolve_cidr(ctx, &listname)?;

    if cidrs.len() == 1 {
        if let Some(block) = resource_mut(doc, reskey)
            .and_then(|r| r.get_mut("Properties"))
            .and_then(|p| p.get_mut("CidrBlock"))
        {
            *block = DocValue::string(cidrs.into_iter().next().unwrap());
        }
        return Ok(());
    }

    let Some(resources) = doc
        .tree
        .get_mut("Resources")
        .and_then(DocValue::as_map_mut)
    else {
        return Ok(());
    };
    let Some(original) = resources.shift_remove(reskey) else {
        return Ok(());
    };
    let base_rule = original
        .get("Properties")
        .and_then(|p| p.get("RuleNumber"))
        .map(rule_number)
        .unwrap_or(0);

    for (i, cidr) in cidrs.into_iter().enumerate() {
        let mut entry = original.clone();
        if let Some(props) = entry
            .get_mut("Properties")
            .and_then(DocValue::as_map_mut)
        {
            props.insert(
                "RuleNumber".to_string(),
                DocValue::int(base_rule + i as i64),
            );
            props.insert("CidrBlock".to_string(), DocValue::string(cidr));
        }
        resources.insert(format!("{reskey}{i}"), entry);
    }
    Ok(())
}

fn rule_number(value: &DocValue) -> i64 {
    match value {
        DocValue::Scalar(Yaml::Integer(n)) => *n,
        DocValue::Scalar(Yaml::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Link one nested-stack resource. Present in the plan: recursively load
/// the child, expose its stack id as an output, and point the resource at
/// the child's published artifact. Absent: prune the orphan.
fn link_child(
    ctx: &RunContext,
    source: &TemplateSource,
    plan: &DocValue,
    doc: &mut TemplateDocument,
    reskey: &str,
    depth: usize,
) -> Result<()> {
    if plan.get(reskey).is_none() {
        tracing::warn!(
            resource = reskey,
            "Pruning orphan child stack resource not listed in the deployment plan"
        );
        if let Some(resources) = doc
            .tree
            .get_mut("Resources")
            .and_then(DocValue::as_map_mut)
        {
            resources.shift_remove(reskey);
        }
        return Ok(());
    }

    // Every child gets an output enabling parent:child:output lookups.
    add_output(
        doc,
        reskey,
        &format!("{reskey} child stack"),
        ref_to(reskey),
        "Ref",
    );
    let child = TemplateDocument::load_at_depth(ctx, source, plan, reskey, depth + 1)?;
    tracing::debug!(child = %child.name, url = %child.artifact_url, "Linked child template");
    if let Some(props) = resource_mut(doc, reskey)
        .and_then(|r| r.get_mut("Properties"))
        .and_then(DocValue::as_map_mut)
    {
        props.insert(
            "TemplateURL".to_string(),
            DocValue::string(child.artifact_url.clone()),
        );
    }
    doc.children.push(child);
    Ok(())
}
