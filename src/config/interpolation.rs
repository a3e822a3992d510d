//! Variable interpolation for manifest values.
//!
//! Commands, probe paths and env values may reference run-context variables
//! with `${name}`. Interpolation happens once, while the step registry is
//! built, so an undefined variable stops the run before anything executes.
//!
//! # Syntax
//!
//! - `${name}` - replaced with the variable's value
//! - `$${name}` - produces a literal `${name}` (passed through to the shell)
//! - a `$` not followed by `{` is left alone, so `$HOME` still reaches the shell

use std::collections::{BTreeSet, HashMap};

use crate::error::{ProvisorError, Result};

/// A piece of an interpolated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text
    Literal(String),
    /// Variable reference: `${name}`
    Variable(String),
}

/// Split a string into literal and variable segments.
pub fn parse_interpolation(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        literal.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(escaped) = after.strip_prefix("${") {
            // `$${x}` keeps `${x}` verbatim
            let end = escaped.find('}').map_or(escaped.len(), |i| i + 1);
            literal.push_str("${");
            literal.push_str(&escaped[..end]);
            rest = &escaped[end..];
        } else if let Some(body) = after.strip_prefix('{') {
            match body.find('}') {
                Some(close) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Variable(body[..close].trim().to_string()));
                    rest = &body[close + 1..];
                }
                None => {
                    // Unterminated reference: keep as literal text
                    literal.push('$');
                    rest = after;
                }
            }
        } else {
            literal.push('$');
            rest = after;
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    segments
}

/// Variable names referenced by a string, sorted and deduplicated.
pub fn extract_variables(input: &str) -> BTreeSet<String> {
    parse_interpolation(input)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Variable(name) => Some(name),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// Layered variable lookup for one run.
///
/// Resolution order, highest first:
/// 1. Values given on the command line (`--var key=value`)
/// 2. The manifest's `vars` table
/// 3. The process environment
/// 4. Built-ins (`provisor_version`, `manifest_dir`)
#[derive(Debug, Clone, Default)]
pub struct Variables {
    /// `--var` overrides
    pub overrides: HashMap<String, String>,
    /// Manifest `vars`
    pub manifest: HashMap<String, String>,
    /// Process environment
    pub env: HashMap<String, String>,
    /// Built-in variables
    pub builtins: HashMap<String, String>,
}

impl Variables {
    /// Create a scope holding only the built-in variables.
    pub fn new() -> Self {
        let mut builtins = HashMap::new();
        builtins.insert(
            "provisor_version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        Self {
            builtins,
            ..Default::default()
        }
    }

    /// Record the directory the manifest was loaded from.
    pub fn with_manifest_dir(mut self, dir: &std::path::Path) -> Self {
        self.builtins
            .insert("manifest_dir".to_string(), dir.display().to_string());
        self
    }

    /// Use the manifest's `vars` table.
    pub fn with_manifest_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.manifest = vars;
        self
    }

    /// Use command-line overrides.
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Use the given environment (normally `std::env::vars()`).
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Look a variable up through the layers.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.overrides
            .get(name)
            .or_else(|| self.manifest.get(name))
            .or_else(|| self.env.get(name))
            .or_else(|| self.builtins.get(name))
            .map(String::as_str)
    }

    /// Interpolate `input`, failing on the first undefined variable.
    ///
    /// `location` describes where the string came from for error messages,
    /// e.g. `step 'nginx' command`.
    pub fn interpolate(&self, input: &str, location: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        for segment in parse_interpolation(input) {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Variable(name) => {
                    let value =
                        self.resolve(&name)
                            .ok_or_else(|| ProvisorError::UndefinedVariable {
                                name: name.clone(),
                                location: location.to_string(),
                            })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// Parse `key=value` pairs from the command line.
pub fn parse_var_overrides(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(ProvisorError::ManifestValidationError {
                message: format!("expected KEY=VALUE for --var, got '{}'", pair),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_literal_only() {
        let result = parse_interpolation("hello world");
        assert_eq!(result, vec![Segment::Literal("hello world".to_string())]);
    }

    #[test]
    fn parse_variable_with_surrounding_text() {
        let result = parse_interpolation("server_name ${domain};");
        assert_eq!(
            result,
            vec![
                Segment::Literal("server_name ".to_string()),
                Segment::Variable("domain".to_string()),
                Segment::Literal(";".to_string()),
            ]
        );
    }

    #[test]
    fn parse_adjacent_variables() {
        let result = parse_interpolation("${a}${b}");
        assert_eq!(
            result,
            vec![
                Segment::Variable("a".to_string()),
                Segment::Variable("b".to_string()),
            ]
        );
    }

    #[test]
    fn parse_escaped_reference() {
        let result = parse_interpolation("echo $${HOME} ${user}");
        assert_eq!(
            result,
            vec![
                Segment::Literal("echo ${HOME} ".to_string()),
                Segment::Variable("user".to_string()),
            ]
        );
    }

    #[test]
    fn shell_variables_pass_through() {
        let result = parse_interpolation("echo $HOME and $1");
        assert_eq!(
            result,
            vec![Segment::Literal("echo $HOME and $1".to_string())]
        );
    }

    #[test]
    fn unterminated_reference_is_literal() {
        let result = parse_interpolation("echo ${oops");
        assert_eq!(result, vec![Segment::Literal("echo ${oops".to_string())]);
    }

    #[test]
    fn parse_empty_string() {
        assert!(parse_interpolation("").is_empty());
    }

    #[test]
    fn extract_variables_deduplicates() {
        let vars = extract_variables("${a} ${b} ${a}");
        assert_eq!(vars.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn resolution_order_is_overrides_manifest_env_builtin() {
        let mut vars = Variables::new();
        vars.builtins.insert("v".into(), "builtin".into());
        assert_eq!(vars.resolve("v"), Some("builtin"));

        vars.env.insert("v".into(), "env".into());
        assert_eq!(vars.resolve("v"), Some("env"));

        vars.manifest.insert("v".into(), "manifest".into());
        assert_eq!(vars.resolve("v"), Some("manifest"));

        vars.overrides.insert("v".into(), "cli".into());
        assert_eq!(vars.resolve("v"), Some("cli"));
    }

    #[test]
    fn interpolate_replaces_variables() {
        let vars = Variables::new().with_manifest_vars(HashMap::from([(
            "domain".to_string(),
            "ide.example.com".to_string(),
        )]));
        let out = vars
            .interpolate("certbot -d ${domain}", "test")
            .unwrap();
        assert_eq!(out, "certbot -d ide.example.com");
    }

    #[test]
    fn interpolate_fails_on_undefined_variable() {
        let vars = Variables::new();
        let err = vars.interpolate("${missing}", "step 'x' command").unwrap_err();
        match err {
            ProvisorError::UndefinedVariable { name, location } => {
                assert_eq!(name, "missing");
                assert_eq!(location, "step 'x' command");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn builtins_include_version() {
        let vars = Variables::new();
        assert_eq!(vars.resolve("provisor_version"), Some(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn parse_var_overrides_splits_on_first_equals() {
        let parsed =
            parse_var_overrides(&["domain=a.example".to_string(), "flags=a=b".to_string()])
                .unwrap();
        assert_eq!(parsed["domain"], "a.example");
        assert_eq!(parsed["flags"], "a=b");
    }

    #[test]
    fn parse_var_overrides_rejects_missing_equals() {
        assert!(parse_var_overrides(&["domain".to_string()]).is_err());
        assert!(parse_var_overrides(&["=value".to_string()]).is_err());
    }
}
