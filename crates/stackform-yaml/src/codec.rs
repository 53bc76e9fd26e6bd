//! Reversible lexical codec for shorthand-laden YAML.
//!
//! CloudFormation YAML uses tag shorthand (`!Ref x`, `!GetAtt [a, b]`) and
//! inline flow mappings as sequence elements. Those forms either confuse a
//! conformant parser (a tag alone at end of line) or would be destroyed by
//! re-emission (flow style is not preserved). `encode` masks them into
//! plain-scalar text before parsing; `decode` restores them after emission.
//!
//! Encode passes run in order, each to a fixpoint:
//!
//! 1. mask `[`, `]`, `,` in the bracket argument list of a bracket-taking
//!    shorthand tag (`<LB>`, `<RB>`, `<CMA>`),
//! 2. mask `{`, `}` and interior `:` of a flow mapping used as a sequence
//!    element (`<LBC>`, `<RBC>`, `<CLN>`),
//! 3. rename every `!Tag` to `BangTag` so the parser sees an ordinary
//!    identifier instead of a type tag,
//! 4. where a renamed tag ends a line (optionally with a literal-block
//!    indicator), rewrite it into a nested single-key mapping, since the
//!    parser requires an inline scalar or an explicit mapping there.
//!
//! `decode` applies the exact inverses in opposite order. Inputs already
//! containing a placeholder token are not detected; that collision is an
//! accepted limitation.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// The recognized shorthand tags, in substitution order.
pub const SHORTHAND_TAGS: [&str; 10] = [
    "Ref", "GetAtt", "Base64", "FindInMap", "Equals", "If", "And", "Or", "Not", "Sub",
];

static BRACKET_ARGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!(Equals|If|And|Or|Not|GetAtt)(\s+\[[^\[\]]+\])").unwrap());

static FLOW_MAPPING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\s+-\s+)\{([^{}]+)\}([ \t]*)").unwrap());

const TAG_ALT: &str = "Bang(?:Ref|GetAtt|Base64|FindInMap|Equals|If|And|Or|Not|Sub)";

static KEYED_TAG_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^([ \t]+)(\w+:[ \t]+)({TAG_ALT})([ \t]+\|[+-]?[ \t]*)?$"
    ))
    .unwrap()
});

static BARE_TAG_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?m)^([ \t]+)({TAG_ALT})([ \t]+\|[+-]?[ \t]*)?$")).unwrap()
});

static NESTED_TAG_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?m)^([ \t]+{TAG_ALT}):([ \t]+\|[+-]?[ \t]*)?$")).unwrap()
});

/// Make shorthand-laden text parseable by a standard YAML parser.
pub fn encode(text: &str) -> String {
    let mut text = mask_bracket_args(text.to_string());
    text = mask_flow_mappings(text);
    for tag in SHORTHAND_TAGS {
        text = text.replace(&format!("!{tag}"), &format!("Bang{tag}"));
    }
    reline_tag_keys(text)
}

/// Restore shorthand in emitted text; exact inverse of [`encode`].
pub fn decode(text: &str) -> String {
    let mut text = collapse_tag_keys(text.to_string());
    for tag in SHORTHAND_TAGS {
        text = text.replace(&format!("Bang{tag}"), &format!("!{tag}"));
    }
    // The emitter double-quotes masked flow mappings (they start with '<');
    // the quoted forms are restored together with their quotes.
    text = text.replace("\"<LBC>", "{").replace("<RBC>\"", "}");
    text = text.replace("<LBC>", "{").replace("<RBC>", "}");
    text = text.replace("<CLN>", ":");
    text = text
        .replace("<LB>", "[")
        .replace("<RB>", "]")
        .replace("<CMA>", ",");
    text
}

/// Mask `[`, `]`, `,` inside bracket argument lists, innermost first.
fn mask_bracket_args(mut text: String) -> String {
    while BRACKET_ARGS.is_match(&text) {
        text = BRACKET_ARGS
            .replace_all(&text, |caps: &Captures| {
                let args = caps[2]
                    .replace('[', "<LB>")
                    .replace(']', "<RB>")
                    .replace(',', "<CMA>");
                format!("!{}{}", &caps[1], args)
            })
            .into_owned();
    }
    text
}

/// Mask a flow mapping appearing as a sequence element.
fn mask_flow_mappings(mut text: String) -> String {
    while FLOW_MAPPING.is_match(&text) {
        text = FLOW_MAPPING
            .replace_all(&text, |caps: &Captures| {
                format!("{}<LBC>{}<RBC>{}", &caps[1], &caps[2], &caps[3]).replace(':', "<CLN>")
            })
            .into_owned();
    }
    text
}

/// Rewrite a renamed tag ending a line into a nested single-key mapping.
///
/// `key: BangTag |` becomes `key:` with `BangTag: |` on the next line,
/// indented two deeper. A renamed tag alone on a line (produced by a
/// previous decode) just gains a `:` in place.
fn reline_tag_keys(text: String) -> String {
    let text = KEYED_TAG_LINE
        .replace_all(&text, |caps: &Captures| {
            let indent = " ".repeat(caps[1].len() + 2);
            let block = caps.get(4).map_or("", |m| m.as_str());
            format!("{}{}\n{}{}:{}", &caps[1], &caps[2], indent, &caps[3], block)
        })
        .into_owned();
    BARE_TAG_LINE
        .replace_all(&text, |caps: &Captures| {
            let block = caps.get(3).map_or("", |m| m.as_str());
            format!("{}{}:{}", &caps[1], &caps[2], block)
        })
        .into_owned()
}

/// Drop the `:` from a nested renamed-tag key, undoing [`reline_tag_keys`].
fn collapse_tag_keys(text: String) -> String {
    NESTED_TAG_LINE
        .replace_all(&text, |caps: &Captures| {
            let block = caps.get(2).map_or("", |m| m.as_str());
            format!("{}{}", &caps[1], block)
        })
        .into_owned()
}
