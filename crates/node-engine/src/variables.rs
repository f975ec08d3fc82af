//! `{{name}}` placeholder substitution against execution variables

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{NodeEngineError, Result};
use crate::types::{ExecutionContext, WorkflowNode};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid placeholder regex")
});

/// Replace every `{{identifier}}` with its variable value.
///
/// Unknown identifiers are left as written. Substituted values are not
/// scanned again, so a value containing `{{x}}` is inserted literally.
pub fn replace_variables(template: &str, context: &ExecutionContext) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            match context.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Name of the variable if the whole template is a single placeholder
pub fn placeholder_name(template: &str) -> Option<&str> {
    let caps = PLACEHOLDER.captures(template.trim())?;
    let whole = caps.get(0)?;
    if whole.as_str().len() != template.trim().len() {
        return None;
    }
    caps.get(1).map(|m| m.as_str())
}

/// Whether any placeholder survived substitution
pub fn has_unresolved(text: &str) -> bool {
    PLACEHOLDER.is_match(text)
}

/// Substituted value of a required property.
///
/// A value that is empty after substitution, or still names a variable
/// that is not set, is reported as a missing property.
pub fn require_resolved(
    node: &WorkflowNode,
    key: &str,
    context: &ExecutionContext,
) -> Result<String> {
    let value = replace_variables(node.require(key)?, context);
    if value.trim().is_empty() || has_unresolved(&value) {
        log::debug!("{} {}: '{}' resolved to '{}'", node.node_type.label(), node.id, key, value);
        return Err(NodeEngineError::missing(node.node_type.label(), key));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, &str)]) -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        for (k, v) in pairs {
            ctx.set(*k, *v);
        }
        ctx
    }

    #[test]
    fn test_replaces_known_variables() {
        let ctx = ctx(&[("name", "World"), ("n", "3")]);
        assert_eq!(
            replace_variables("Hello {{name}} x{{ n }}", &ctx),
            "Hello World x3"
        );
    }

    #[test]
    fn test_unknown_left_literal() {
        let ctx = ctx(&[]);
        assert_eq!(replace_variables("a {{missing}} b", &ctx), "a {{missing}} b");
        assert!(has_unresolved(&replace_variables("{{missing}}", &ctx)));
    }

    #[test]
    fn test_no_recursive_expansion() {
        let ctx = ctx(&[("a", "{{b}}"), ("b", "boom")]);
        assert_eq!(replace_variables("{{a}}", &ctx), "{{b}}");
    }

    #[test]
    fn test_idempotent_without_placeholders() {
        let ctx = ctx(&[("a", "1")]);
        let text = "plain { text } here";
        assert_eq!(replace_variables(text, &ctx), text);
        assert_eq!(replace_variables(&replace_variables(text, &ctx), &ctx), text);
    }

    #[test]
    fn test_require_resolved() {
        use crate::types::NodeType;

        let node = WorkflowNode::new("w", NodeType::DriveFile)
            .with_property("path", "{{dir}}/{{file}}")
            .with_property("content", "{{empty}}");
        let full = ctx(&[("dir", "notes"), ("file", "today"), ("empty", "")]);
        assert_eq!(require_resolved(&node, "path", &full).unwrap(), "notes/today");

        let partial = ctx(&[("dir", "notes")]);
        let err = require_resolved(&node, "path", &partial).unwrap_err();
        assert_eq!(err.to_string(), "drive-file node missing 'path' property");
        assert!(require_resolved(&node, "content", &full).is_err());
        assert!(require_resolved(&node, "mode", &full).is_err());
    }

    #[test]
    fn test_placeholder_name() {
        assert_eq!(placeholder_name("{{file}}"), Some("file"));
        assert_eq!(placeholder_name(" {{file}} "), Some("file"));
        assert_eq!(placeholder_name("notes/{{file}}"), None);
        assert_eq!(placeholder_name("file"), None);
    }
}
