//! Dependency graph for step execution ordering.
//!
//! Steps keep their declaration order; it is the tie-break whenever more
//! than one step is ready, so the execution order is fully deterministic.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::error::{ProvisorError, Result};

/// Represents the dependency relationships between steps.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Step names in declaration order.
    steps: Vec<String>,
    /// Declaration index of each step.
    index: HashMap<String, usize>,
    /// Direct dependencies of each step, in declaration order of `depends_on`.
    dependencies: Vec<Vec<usize>>,
    /// Steps that directly depend on each step.
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Create a new dependency graph builder.
    pub fn builder() -> DependencyGraphBuilder {
        DependencyGraphBuilder::new()
    }

    /// Get the direct dependencies of a step.
    pub fn dependencies_of(&self, step: &str) -> Option<Vec<&str>> {
        let i = *self.index.get(step)?;
        Some(self.names(&self.dependencies[i]))
    }

    /// Get steps that depend on the given step.
    pub fn dependents_of(&self, step: &str) -> Option<Vec<&str>> {
        let i = *self.index.get(step)?;
        Some(self.names(&self.dependents[i]))
    }

    /// Check if a step exists in the graph.
    pub fn contains(&self, step: &str) -> bool {
        self.index.contains_key(step)
    }

    /// All step names in declaration order.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Get the number of steps in the graph.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn names(&self, indices: &[usize]) -> Vec<&str> {
        indices.iter().map(|&i| self.steps[i].as_str()).collect()
    }

    /// Returns steps in topological order (dependencies before dependents).
    ///
    /// Among steps whose dependencies are all placed, the one declared first
    /// comes next.
    ///
    /// # Errors
    ///
    /// Returns `CircularDependency` naming the cycle path if one exists.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        if let Some(cycle) = self.find_cycle() {
            return Err(ProvisorError::CircularDependency {
                cycle: cycle.join(" -> "),
            });
        }

        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut result = Vec::with_capacity(self.steps.len());

        while let Some(Reverse(step)) = ready.pop() {
            result.push(self.steps[step].clone());

            for &dependent in &self.dependents[step] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        Ok(result)
    }

    /// Find a cycle in the graph, returning the path if one exists.
    ///
    /// The path starts and ends with the same step: `["a", "b", "a"]`.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Unvisited,
            Visiting,
            Visited,
        }

        fn dfs(
            node: usize,
            graph: &DependencyGraph,
            state: &mut [State],
            path: &mut Vec<usize>,
        ) -> Option<Vec<String>> {
            state[node] = State::Visiting;
            path.push(node);

            for &dep in &graph.dependencies[node] {
                match state[dep] {
                    State::Visiting => {
                        let start = path.iter().position(|&s| s == dep).unwrap_or(0);
                        let mut cycle: Vec<String> = path[start..]
                            .iter()
                            .map(|&i| graph.steps[i].clone())
                            .collect();
                        cycle.push(graph.steps[dep].clone());
                        return Some(cycle);
                    }
                    State::Unvisited => {
                        if let Some(cycle) = dfs(dep, graph, state, path) {
                            return Some(cycle);
                        }
                    }
                    State::Visited => {}
                }
            }

            path.pop();
            state[node] = State::Visited;
            None
        }

        let mut state = vec![State::Unvisited; self.steps.len()];
        let mut path = Vec::new();

        (0..self.steps.len()).find_map(|step| {
            if state[step] == State::Unvisited {
                dfs(step, self, &mut state, &mut path)
            } else {
                None
            }
        })
    }
}

/// Builder for constructing a DependencyGraph.
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    steps: Vec<(String, Vec<String>)>,
}

impl DependencyGraphBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step with its dependencies. Order of calls is declaration order.
    pub fn add_step(mut self, name: impl Into<String>, depends_on: Vec<String>) -> Self {
        let name = name.into();
        match self.steps.iter_mut().find(|(n, _)| *n == name) {
            Some((_, deps)) => deps.extend(depends_on),
            None => self.steps.push((name, depends_on)),
        }
        self
    }

    /// Build the dependency graph.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDependency` if any dependency references a step that
    /// was never added.
    pub fn build(self) -> Result<DependencyGraph> {
        let index: HashMap<String, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();

        let mut dependencies = vec![Vec::new(); self.steps.len()];
        let mut dependents = vec![Vec::new(); self.steps.len()];

        for (i, (name, deps)) in self.steps.iter().enumerate() {
            for dep in deps {
                let Some(&d) = index.get(dep) else {
                    return Err(ProvisorError::UnknownDependency {
                        step: name.clone(),
                        dependency: dep.clone(),
                    });
                };
                if !dependencies[i].contains(&d) {
                    dependencies[i].push(d);
                    dependents[d].push(i);
                }
            }
        }

        Ok(DependencyGraph {
            steps: self.steps.into_iter().map(|(name, _)| name).collect(),
            index,
            dependencies,
            dependents,
        })
    }
}
