//! Structural round-trip tests for the shorthand codec.
//!
//! The contract: `decode(encode(text))` must be structurally equivalent to
//! parsing `text` through the codec-aware pipeline. Equivalence is checked
//! by re-encoding the decoded output and comparing the parsed trees.

use stackform_yaml::{decode, emit_yaml, encode, parse_yaml, DocValue};

fn round_trip(doc: &str) -> (DocValue, DocValue) {
    let first = parse_yaml(&encode(doc)).expect("first parse");
    let rendered = decode(&emit_yaml(&first).expect("emit"));
    let second = parse_yaml(&encode(&rendered)).expect("reparse of decoded output");
    (first, second)
}

#[test]
fn bracket_shorthand_survives() {
    let doc = "\
Conditions:
  IsProd: !Equals [!Ref EnvType, prod]
  Both: !And [!Equals [!Ref A, x], !Equals [!Ref B, y]]
";
    let (first, second) = round_trip(doc);
    assert_eq!(first, second);
}

#[test]
fn inline_tags_survive() {
    let doc = "\
Resources:
  Instance:
    Type: AWS::EC2::Instance
    Properties:
      ImageId: !Ref BaseAmi
      IamInstanceProfile: !GetAtt [Profile, Arn]
      AvailabilityZone: !FindInMap [AzMap, !Ref Region, primary]
";
    let (first, second) = round_trip(doc);
    assert_eq!(first, second);
}

#[test]
fn flow_mapping_sequence_element_survives() {
    let doc = "\
Resources:
  Sg:
    Type: AWS::EC2::SecurityGroup
    Properties:
      SecurityGroupIngress:
        - {IpProtocol: tcp, FromPort: 22, ToPort: 22}
        - {IpProtocol: icmp, FromPort: -1, ToPort: -1}
";
    let (first, second) = round_trip(doc);
    assert_eq!(first, second);
}

#[test]
fn block_literal_tag_survives() {
    let doc = "\
Resources:
  Instance:
    Properties:
      UserData: !Base64 |
          #!/bin/bash
          echo booted
";
    let (first, second) = round_trip(doc);
    assert_eq!(first, second);
}

#[test]
fn sub_with_dollar_braces_survives() {
    // ${Instance.PublicIp} uses no stackform sigil, so the expansion
    // language never touches it; the codec must not either.
    let doc = "\
Outputs:
  Addr:
    Value: !Sub addr-${Instance.PublicIp}
";
    let (first, second) = round_trip(doc);
    assert_eq!(first, second);
}

#[test]
fn full_template_corpus() {
    let doc = "\
Resources:
  Instance:
    Type: AWS::EC2::Instance
    Properties:
      ImageId: !Ref BaseAmi
      SubnetId: !GetAtt [NetStack, Outputs.SubnetA]
      UserData: !Base64 |
          #!/bin/bash
          echo booted
      Tags:
        - {Key: Name, Value: web}
Conditions:
  IsProd: !Equals [!Ref EnvType, prod]
Outputs:
  Addr:
    Value: !Sub addr-${Instance.PublicIp}
";
    let (first, second) = round_trip(doc);
    assert_eq!(first, second);

    // The encoded form must contain no unmasked shorthand tags.
    let encoded = encode(doc);
    for tag in stackform_yaml::SHORTHAND_TAGS {
        assert!(
            !encoded.contains(&format!("!{tag}")),
            "unmasked !{tag} in {encoded}"
        );
    }
}
