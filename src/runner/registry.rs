//! Step registry: the resolved, ordered set of steps for one run.

use std::collections::HashMap;

use crate::config::Manifest;
use crate::error::Result;
use crate::runner::dependency::DependencyGraph;
use crate::runner::RunContext;
use crate::steps::Step;

/// All steps of a manifest, resolved and checked for a valid ordering.
///
/// Loading fails before any step runs if a dependency is unknown or the
/// graph has a cycle.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    name: Option<String>,
    steps: Vec<Step>,
    by_name: HashMap<String, usize>,
    graph: DependencyGraph,
    order: Vec<usize>,
}

impl StepRegistry {
    /// Resolve every step of `manifest` against `ctx`.
    ///
    /// # Errors
    ///
    /// - `UndefinedVariable` if a step references an unknown `${var}`
    /// - `UnknownDependency` if `depends_on` names a missing step
    /// - `CircularDependency` if the dependency graph has a cycle
    pub fn load(manifest: &Manifest, ctx: &RunContext) -> Result<Self> {
        let steps = manifest
            .steps
            .iter()
            .map(|config| Step::resolve(config, &manifest.settings, &ctx.vars))
            .collect::<Result<Vec<_>>>()?;

        let graph = steps
            .iter()
            .fold(DependencyGraph::builder(), |builder, step| {
                builder.add_step(&step.name, step.depends_on.clone())
            })
            .build()?;

        let by_name: HashMap<String, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, step)| (step.name.clone(), i))
            .collect();

        let order = graph
            .topological_order()?
            .iter()
            .filter_map(|name| by_name.get(name).copied())
            .collect();

        tracing::debug!("Loaded {} steps", steps.len());

        Ok(Self {
            name: manifest.name.clone(),
            steps,
            by_name,
            graph,
            order,
        })
    }

    /// Manifest name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Steps in execution order.
    pub fn topological_order(&self) -> Vec<&Step> {
        self.order.iter().map(|&i| &self.steps[i]).collect()
    }

    /// Steps in declaration order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Look a step up by name.
    pub fn get(&self, name: &str) -> Option<&Step> {
        self.by_name.get(name).map(|&i| &self.steps[i])
    }

    /// The underlying dependency graph.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the manifest has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_manifest;
    use crate::error::ProvisorError;
    use std::path::Path;

    fn manifest(yaml: &str) -> Manifest {
        parse_manifest(yaml, Path::new("provision.yml")).unwrap()
    }

    fn ctx() -> RunContext {
        RunContext::new("/tmp")
    }

    fn names(registry: &StepRegistry) -> Vec<&str> {
        registry
            .topological_order()
            .into_iter()
            .map(|s| s.name.as_str())
            .collect()
    }

    #[test]
    fn orders_dependencies_first() {
        let m = manifest(
            r#"
steps:
  - name: cert
    command: certbot
    depends_on: [nginx]
  - name: nginx
    command: apt-get install nginx
    depends_on: [base]
  - name: base
    command: apt-get update
"#,
        );
        let registry = StepRegistry::load(&m, &ctx()).unwrap();
        assert_eq!(names(&registry), vec!["base", "nginx", "cert"]);
        assert_eq!(registry.steps()[0].name, "cert");
    }

    #[test]
    fn unknown_dependency_fails() {
        let m = manifest(
            r#"
steps:
  - name: cert
    command: certbot
    depends_on: [nginx]
"#,
        );
        let err = StepRegistry::load(&m, &ctx()).unwrap_err();
        assert!(matches!(err, ProvisorError::UnknownDependency { .. }));
    }

    #[test]
    fn cycle_fails_with_path() {
        let m = manifest(
            r#"
steps:
  - name: a
    command: "true"
    depends_on: [b]
  - name: b
    command: "true"
    depends_on: [a]
"#,
        );
        match StepRegistry::load(&m, &ctx()).unwrap_err() {
            ProvisorError::CircularDependency { cycle } => assert_eq!(cycle, "a -> b -> a"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn undefined_variable_fails_before_ordering() {
        let m = manifest(
            r#"
steps:
  - name: a
    command: echo ${nope}
"#,
        );
        let err = StepRegistry::load(&m, &ctx()).unwrap_err();
        assert!(matches!(err, ProvisorError::UndefinedVariable { .. }));
    }

    #[test]
    fn steps_are_interpolated_from_context() {
        let m = manifest(
            r#"
vars:
  domain: ide.example.com
steps:
  - name: cert
    command: certbot -d ${domain}
"#,
        );
        let mut context = ctx();
        context.vars.manifest = m.vars.clone();

        let registry = StepRegistry::load(&m, &context).unwrap();
        assert_eq!(
            registry.get("cert").unwrap().actions,
            vec!["certbot -d ide.example.com"]
        );
    }

    #[test]
    fn empty_manifest_is_empty_registry() {
        let registry = StepRegistry::load(&Manifest::default(), &ctx()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.topological_order().is_empty());
    }
}
