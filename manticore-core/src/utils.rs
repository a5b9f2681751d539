//! Utility functions for the container
//!
//! Dependency graph analysis and creation tracking used by the bean
//! factory for validation, preinstantiation ordering, and diagnostics.

/// Dependency resolution utilities
pub mod dependency {
    use std::collections::{HashMap, HashSet};

    use parking_lot::RwLock;

    /// Tracks beans currently being created, across all in-flight requests.
    ///
    /// This powers `is_currently_in_creation` diagnostics (for example the
    /// circular-reference hint on instance factory methods). Cycle
    /// detection itself runs on the per-request creation chain, so two
    /// threads creating the same prototype concurrently never trip a
    /// false positive here.
    #[derive(Debug, Default)]
    pub struct CreationTracker {
        creating: RwLock<HashSet<String>>,
    }

    impl CreationTracker {
        /// Creates a new empty creation tracker.
        pub fn new() -> Self {
            Self {
                creating: RwLock::new(HashSet::new()),
            }
        }

        /// Checks if a bean is currently being created.
        pub fn is_creating(&self, name: &str) -> bool {
            self.creating.read().contains(name)
        }

        /// Marks a bean as being created.
        pub fn start_creating(&self, name: &str) {
            self.creating.write().insert(name.to_string());
        }

        /// Marks a bean as finished being created.
        pub fn finish_creating(&self, name: &str) {
            self.creating.write().remove(name);
        }

        /// Gets a snapshot of all beans currently being created.
        pub fn current_creating(&self) -> Vec<String> {
            self.creating.read().iter().cloned().collect()
        }
    }

    /// Dependency graph analysis result
    #[derive(Debug)]
    pub enum DependencyValidationError {
        /// Circular dependency detected
        CircularDependency {
            /// The dependency chain forming the cycle
            cycle: Vec<String>,
        },
        /// Missing dependency detected
        MissingDependency {
            /// The bean that requires the dependency
            bean: String,
            /// The missing dependency
            missing: String,
        },
    }

    impl std::fmt::Display for DependencyValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::CircularDependency { cycle } => {
                    write!(f, "Circular dependency detected: {}", cycle.join(" -> "))
                }
                Self::MissingDependency { bean, missing } => {
                    write!(
                        f,
                        "Bean '{}' depends on '{}' which is not registered",
                        bean, missing
                    )
                }
            }
        }
    }

    /// Validates dependency graph for circular dependencies and missing beans
    ///
    /// # Arguments
    ///
    /// * `dependencies` - Map of bean name to its list of dependencies
    ///
    /// # Returns
    ///
    /// Returns Ok(()) if no issues found, or Err with the first detected issue
    pub fn validate_dependency_graph(
        dependencies: &HashMap<String, Vec<String>>,
    ) -> Result<(), DependencyValidationError> {
        // Check for missing dependencies
        for (bean_name, deps) in dependencies {
            for dep in deps {
                if !dependencies.contains_key(dep) {
                    return Err(DependencyValidationError::MissingDependency {
                        bean: bean_name.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        // Check for circular dependencies using DFS
        let mut visited = HashSet::new();
        let mut rec_stack = Vec::new();

        for bean_name in dependencies.keys() {
            if !visited.contains(bean_name) {
                if let Some(cycle) =
                    detect_cycle_dfs(bean_name, dependencies, &mut visited, &mut rec_stack)
                {
                    return Err(DependencyValidationError::CircularDependency { cycle });
                }
            }
        }

        Ok(())
    }

    /// DFS-based cycle detection
    ///
    /// Returns Some(cycle) if a cycle is detected, None otherwise
    fn detect_cycle_dfs(
        node: &str,
        graph: &HashMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
        rec_stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.push(node.to_string());

        if let Some(deps) = graph.get(node) {
            for dep in deps {
                if !visited.contains(dep) {
                    if let Some(cycle) = detect_cycle_dfs(dep, graph, visited, rec_stack) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    // Found a cycle
                    let start_idx = rec_stack.iter().position(|x| x == dep).unwrap();
                    let mut cycle = rec_stack[start_idx..].to_vec();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
            }
        }

        rec_stack.pop();
        None
    }

    /// Performs topological sort on dependency graph
    ///
    /// Returns a vector of bean names in dependency order (dependencies before dependents)
    ///
    /// # Arguments
    ///
    /// * `dependencies` - Map of bean name to its list of dependencies
    ///
    /// # Returns
    ///
    /// Returns Ok(sorted_beans) if successful, or Err(error_message) if there's a circular dependency
    pub fn topological_sort(
        dependencies: &HashMap<String, Vec<String>>,
    ) -> Result<Vec<String>, String> {
        let mut in_degree: HashMap<String, usize> = HashMap::new();
        let mut graph: HashMap<String, Vec<String>> = HashMap::new();

        // For each bean -> [deps], we want deps to come before bean,
        // so edges run from deps to bean
        for (bean, deps) in dependencies {
            in_degree.entry(bean.clone()).or_insert(0);
            *in_degree.get_mut(bean).unwrap() += deps.len();

            for dep in deps {
                in_degree.entry(dep.clone()).or_insert(0);
                graph
                    .entry(dep.clone())
                    .or_insert_with(Vec::new)
                    .push(bean.clone());
            }
        }

        // Collect nodes with no incoming edges
        let mut queue: Vec<String> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(bean, _)| bean.clone())
            .collect();

        let mut result = Vec::new();

        while let Some(node) = queue.pop() {
            result.push(node.clone());

            if let Some(dependents) = graph.get(&node) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push(dependent.clone());
                        }
                    }
                }
            }
        }

        // Check if all nodes were processed
        if result.len() != in_degree.len() {
            return Err("Circular dependency detected during topological sort".to_string());
        }

        Ok(result)
    }
}
