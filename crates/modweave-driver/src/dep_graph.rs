//! Module dependency graph and the wave scheduler
//!
//! Modules build in waves: every module whose declared dependencies have all
//! compiled is built in the current wave, then readiness is recomputed. A wave
//! that leaves nothing blocked is the final wave and receives the caller's
//! entry-point arguments.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, info_span};

use crate::error::{BlockedModule, BuildError};
use crate::unit::{BuildArgs, CompileUnit, DependencyHandle, ExitStatus, ResolvedDependencies};

/// Index of a module in its graph, in insertion order
pub type ModuleId = usize;

/// Build status of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    NotReady,
    Ready,
    Compiling,
    Compiled,
    Failed(ExitStatus),
}

impl BuildStatus {
    pub fn is_compiled(self) -> bool {
        self == BuildStatus::Compiled
    }
}

/// One scheduling round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wave {
    /// Modules compiled in this wave, in declaration order
    pub modules: Vec<String>,
    /// Whether the wave received the final (entry-point) arguments
    pub is_final: bool,
}

/// Outcome of a successful schedule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub waves: Vec<Wave>,
}

impl BuildReport {
    /// Every compiled module, in build order
    pub fn build_order(&self) -> impl Iterator<Item = &str> {
        self.waves
            .iter()
            .flat_map(|w| w.modules.iter().map(String::as_str))
    }
}

/// Node in the dependency graph representing a module
struct ModuleNode {
    unit: Box<dyn CompileUnit>,
    /// Resolved declared dependencies, filled by [`ModuleGraph::resolve`]
    dependencies: Vec<ModuleId>,
    status: BuildStatus,
}

/// Dependency graph over compilation units
pub struct ModuleGraph {
    nodes: Vec<ModuleNode>,
    by_name: HashMap<String, ModuleId>,
    resolved: bool,
}

impl ModuleGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            by_name: HashMap::new(),
            resolved: false,
        }
    }

    /// Add a unit. Names must be unique.
    pub fn add_unit(&mut self, unit: Box<dyn CompileUnit>) -> Result<ModuleId, BuildError> {
        let name = unit.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(BuildError::DuplicateModule(name));
        }

        let id = self.nodes.len();
        self.nodes.push(ModuleNode {
            unit,
            dependencies: Vec::new(),
            status: BuildStatus::NotReady,
        });
        self.by_name.insert(name, id);
        self.resolved = false;
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn id_of(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    pub fn unit(&self, name: &str) -> Option<&dyn CompileUnit> {
        self.id_of(name).map(|id| self.nodes[id].unit.as_ref())
    }

    pub fn status(&self, name: &str) -> Option<BuildStatus> {
        self.id_of(name).map(|id| self.nodes[id].status)
    }

    /// Module names and output directories, in declaration order
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.nodes
            .iter()
            .map(|n| (n.unit.name(), n.unit.output_dir()))
    }

    /// Look every declared dependency name up in the full module set.
    ///
    /// Performs no compile calls and does not touch the units.
    pub fn resolve_ids(&self) -> Result<Vec<Vec<ModuleId>>, BuildError> {
        let mut resolved = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let module = node.unit.name();
            let mut deps = Vec::new();

            for dep in node.unit.dependency_names() {
                if dep == module {
                    return Err(BuildError::SelfDependency {
                        module: module.to_string(),
                    });
                }
                let id = self
                    .id_of(dep)
                    .ok_or_else(|| BuildError::UnresolvedDependency {
                        module: module.to_string(),
                        dependency: dep.clone(),
                    })?;
                if !deps.contains(&id) {
                    deps.push(id);
                }
            }

            resolved.push(deps);
        }

        Ok(resolved)
    }

    /// Resolve dependencies and hand each unit its dependency handles
    pub fn resolve(&mut self) -> Result<(), BuildError> {
        let resolved = self.resolve_ids()?;
        for (node, deps) in self.nodes.iter_mut().zip(resolved) {
            node.dependencies = deps;
        }

        for id in 0..self.nodes.len() {
            let direct = self.nodes[id]
                .dependencies
                .iter()
                .map(|&dep| DependencyHandle {
                    name: self.nodes[dep].unit.name().to_string(),
                    output_dir: self.nodes[dep].unit.output_dir().to_path_buf(),
                })
                .collect();
            let classpath = self.classpath(id);

            debug!(
                module = self.nodes[id].unit.name(),
                classpath = classpath.len(),
                "resolved dependencies"
            );
            self.nodes[id]
                .unit
                .resolve_dependencies(ResolvedDependencies { direct, classpath });
        }

        self.resolved = true;
        Ok(())
    }

    /// Output directories of all transitive dependencies, nearest first
    fn classpath(&self, id: ModuleId) -> Vec<PathBuf> {
        let mut seen = HashSet::from([id]);
        let mut order = Vec::new();
        let mut frontier = self.nodes[id].dependencies.clone();

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for dep in frontier {
                if seen.insert(dep) {
                    order.push(dep);
                    next.extend(self.nodes[dep].dependencies.iter().copied());
                }
            }
            frontier = next;
        }

        order
            .into_iter()
            .map(|dep| self.nodes[dep].unit.output_dir().to_path_buf())
            .collect()
    }

    /// A module is ready when every declared dependency has compiled
    pub fn is_ready(&self, id: ModuleId) -> bool {
        self.nodes[id]
            .dependencies
            .iter()
            .all(|&dep| self.nodes[dep].status.is_compiled())
    }

    pub fn is_compiled(&self, id: ModuleId) -> bool {
        self.nodes[id].status.is_compiled()
    }

    /// Compute the waves a fully successful build would run, without compiling.
    pub fn plan(&self) -> Result<Vec<Wave>, BuildError> {
        let deps = self.resolve_ids()?;
        let mut compiled = vec![false; self.nodes.len()];
        let mut remaining: Vec<ModuleId> = (0..self.nodes.len()).collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<ModuleId>, Vec<ModuleId>) = remaining
                .iter()
                .partition(|&&id| deps[id].iter().all(|&d| compiled[d]));

            if ready.is_empty() {
                return Err(self.cycle_error(&blocked, &deps, &compiled));
            }

            for &id in &ready {
                compiled[id] = true;
            }
            waves.push(Wave {
                modules: self.names(&ready),
                is_final: blocked.is_empty(),
            });
            remaining = blocked;
        }

        Ok(waves)
    }

    /// Resolve, then build every module wave by wave.
    ///
    /// `final_args` go only to the wave that leaves no module blocked. The first
    /// failing module aborts the run; later waves never start.
    pub fn schedule_and_build(&mut self, final_args: &BuildArgs) -> Result<BuildReport, BuildError> {
        if !self.resolved {
            self.resolve()?;
        }

        let span = info_span!("schedule", modules = self.nodes.len());
        let _enter = span.enter();

        let no_args = BuildArgs::new();
        let mut remaining: Vec<ModuleId> = (0..self.nodes.len())
            .filter(|&id| !self.is_compiled(id))
            .collect();
        let mut report = BuildReport::default();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<ModuleId>, Vec<ModuleId>) =
                remaining.iter().partition(|&&id| self.is_ready(id));

            if ready.is_empty() {
                let deps: Vec<Vec<ModuleId>> =
                    self.nodes.iter().map(|n| n.dependencies.clone()).collect();
                let compiled: Vec<bool> = (0..self.nodes.len()).map(|id| self.is_compiled(id)).collect();
                let err = self.cycle_error(&blocked, &deps, &compiled);
                error!(error = %err, "scheduling stalled");
                return Err(err);
            }

            for &id in &ready {
                self.nodes[id].status = BuildStatus::Ready;
            }

            let is_final = blocked.is_empty();
            let args = if is_final { final_args } else { &no_args };
            let wave_span = info_span!("wave", index = report.waves.len(), is_final);
            let _wave = wave_span.enter();
            info!(modules = ?self.names(&ready), "starting wave");

            for &id in &ready {
                self.compile_module(id, args)?;
            }

            report.waves.push(Wave {
                modules: self.names(&ready),
                is_final,
            });
            remaining.retain(|&id| !self.is_compiled(id));
        }

        Ok(report)
    }

    fn compile_module(&mut self, id: ModuleId, args: &BuildArgs) -> Result<(), BuildError> {
        let node = &mut self.nodes[id];
        let module = node.unit.name().to_string();
        let span = info_span!("compile", module = %module);
        let _enter = span.enter();

        node.status = BuildStatus::Compiling;
        let status = match node.unit.compile(args) {
            Ok(status) => status,
            Err(source) => {
                node.status = BuildStatus::Failed(ExitStatus::InternalError);
                error!(error = %source, "compilation unit could not run");
                return Err(BuildError::Unit { module, source });
            }
        };

        if !status.is_ok() {
            node.status = BuildStatus::Failed(status);
            error!(%status, "compilation failed");
            return Err(BuildError::CompileFailed { module, status });
        }

        // OK without being compiled would only ever be retried
        if !node.unit.is_compiled() {
            node.status = BuildStatus::Ready;
            error!("unit reported OK but is not compiled");
            return Err(BuildError::NoProgress { ready: vec![module] });
        }

        node.status = BuildStatus::Compiled;
        info!(
            generated = node.unit.generated_files().len(),
            args = args.len(),
            "compiled"
        );
        Ok(())
    }

    fn names(&self, ids: &[ModuleId]) -> Vec<String> {
        ids.iter()
            .map(|&id| self.nodes[id].unit.name().to_string())
            .collect()
    }

    fn cycle_error(&self, blocked: &[ModuleId], deps: &[Vec<ModuleId>], compiled: &[bool]) -> BuildError {
        let blocked_set: HashSet<ModuleId> = blocked.iter().copied().collect();

        let details = blocked
            .iter()
            .map(|&id| BlockedModule {
                module: self.nodes[id].unit.name().to_string(),
                waiting_on: deps[id]
                    .iter()
                    .filter(|&&d| !compiled[d])
                    .map(|&d| self.nodes[d].unit.name().to_string())
                    .collect(),
            })
            .collect();

        let cycle = self
            .find_cycle(&blocked_set, deps)
            .map(|ids| self.names(&ids))
            .unwrap_or_default();

        BuildError::Cycle {
            cycle,
            blocked: details,
        }
    }

    /// Find one cycle among `candidates` (DFS). The first module is repeated
    /// at the end of the returned path.
    fn find_cycle(&self, candidates: &HashSet<ModuleId>, deps: &[Vec<ModuleId>]) -> Option<Vec<ModuleId>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        let mut starts: Vec<ModuleId> = candidates.iter().copied().collect();
        starts.sort_unstable();

        for start in starts {
            if !visited.contains(&start) {
                if let Some(cycle) = Self::find_cycle_util(start, candidates, deps, &mut visited, &mut stack) {
                    return Some(cycle);
                }
            }
        }

        None
    }

    fn find_cycle_util(
        current: ModuleId,
        candidates: &HashSet<ModuleId>,
        deps: &[Vec<ModuleId>],
        visited: &mut HashSet<ModuleId>,
        stack: &mut Vec<ModuleId>,
    ) -> Option<Vec<ModuleId>> {
        visited.insert(current);
        stack.push(current);

        for &dep in deps[current].iter().filter(|d| candidates.contains(d)) {
            if let Some(pos) = stack.iter().position(|&s| s == dep) {
                let mut cycle = stack[pos..].to_vec();
                cycle.push(dep);
                return Some(cycle);
            }
            if !visited.contains(&dep) {
                if let Some(cycle) = Self::find_cycle_util(dep, candidates, deps, visited, stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        None
    }
}

impl Default for ModuleGraph {
    fn default() -> Self {
        Self::new()
    }
}
