//! Dependency resolution: binds slots, validates and orders the graph.
//!
//! [`resolve`] turns a [`Graph`] into a [`ResolvedGraph`]:
//!
//! 1. every role must have exactly one publisher;
//! 2. every wire must point at declared steps and slots, and each consumer
//!    slot may be wired at most once;
//! 3. every required input must end up with a source, and producer and
//!    consumer slot kinds must agree;
//! 4. steps are ordered with Kahn's algorithm, ties broken by declaration
//!    order; a leftover cycle is reported as a closed path;
//! 5. every step must descend from at least one raw input.
//!
//! Output location templates are rendered here so the engine and the
//! resume layer see concrete paths.

use crate::artifact::{Artifact, InputValue, RawValue};
use crate::config::interpolation::{resolve_string, InterpolationContext};
use crate::error::{AnatprepError, Result};
use crate::graph::model::{Graph, SlotRef, Source};
use crate::steps::{Invocation, Resources, StepDescriptor};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Resolved value source of one input slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Output of an upstream step.
    Edge {
        /// Producing step and slot.
        producer: SlotRef,
        /// Rendered location of the producer output.
        path: PathBuf,
    },
    /// Raw value supplied by the run.
    Raw {
        /// Raw value key.
        key: String,
        /// The value.
        value: RawValue,
    },
    /// Default of an optional slot.
    Default(RawValue),
    /// Optional slot left empty.
    Unbound,
}

impl Binding {
    /// Value handed to the operation.
    pub fn input_value(&self) -> Option<InputValue> {
        match self {
            Binding::Edge { producer, path } => Some(InputValue::Artifact(Artifact::new(
                producer.step.clone(),
                producer.slot.clone(),
                path.clone(),
            ))),
            Binding::Raw { value, .. } | Binding::Default(value) => {
                Some(InputValue::Raw(value.clone()))
            }
            Binding::Unbound => None,
        }
    }

    /// Paths this binding reads.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Binding::Edge { path, .. } => vec![path.as_path()],
            Binding::Raw { value, .. } | Binding::Default(value) => value.paths(),
            Binding::Unbound => Vec::new(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Binding::Edge { producer, .. } => producer.to_string(),
            Binding::Raw { key, .. } => format!("raw:{}", key),
            Binding::Default(value) => format!("default:{}", value),
            Binding::Unbound => "unbound".to_string(),
        }
    }
}

/// A directed producer → consumer relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    /// Producing step and output slot.
    pub producer: SlotRef,
    /// Consuming step and input slot.
    pub consumer: SlotRef,
}

/// A step with every slot bound.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    /// The declaration.
    pub descriptor: StepDescriptor,
    /// Input slot bindings.
    pub bindings: BTreeMap<String, Binding>,
    /// Concrete output paths.
    pub outputs: BTreeMap<String, PathBuf>,
    /// Scratch directory.
    pub step_dir: PathBuf,
    /// Producer steps, in resolved order.
    pub dependencies: Vec<String>,
    /// Rule that contributed the step.
    pub rule: String,
}

impl ResolvedStep {
    /// Step id.
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Paths of every bound input.
    pub fn input_paths(&self) -> Vec<&Path> {
        self.bindings.values().flat_map(|b| b.paths()).collect()
    }
}

/// Validated, ordered graph ready for execution.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    /// Participant id.
    pub subject_id: String,
    /// Run-level template variables.
    pub vars: BTreeMap<String, String>,
    steps: Vec<ResolvedStep>,
    index: HashMap<String, usize>,
    dependents: HashMap<String, Vec<String>>,
    roles: BTreeMap<String, SlotRef>,
}

impl ResolvedGraph {
    /// Steps in resolved (topological) order.
    pub fn steps(&self) -> &[ResolvedStep] {
        &self.steps
    }

    /// Step ids in resolved order.
    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    /// Look up a step.
    pub fn step(&self, id: &str) -> Option<&ResolvedStep> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    /// Position of a step in resolved order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Direct producers of a step.
    pub fn dependencies(&self, id: &str) -> &[String] {
        self.step(id)
            .map(|s| s.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Direct consumers of a step, in resolved order.
    pub fn dependents(&self, id: &str) -> &[String] {
        self.dependents
            .get(id)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// Every step reachable from `id`.
    pub fn transitive_dependents(&self, id: &str) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        let mut to_visit = vec![id.to_string()];

        while let Some(current) = to_visit.pop() {
            for dep in self.dependents(&current) {
                if result.insert(dep.clone()) {
                    to_visit.push(dep.clone());
                }
            }
        }

        result
    }

    /// Every producer → consumer edge, in resolved consumer order.
    pub fn edges(&self) -> Vec<Edge> {
        self.steps
            .iter()
            .flat_map(|step| {
                step.bindings.iter().filter_map(move |(slot, binding)| match binding {
                    Binding::Edge { producer, .. } => Some(Edge {
                        producer: producer.clone(),
                        consumer: SlotRef::new(step.id(), slot.clone()),
                    }),
                    _ => None,
                })
            })
            .collect()
    }

    /// Published roles.
    pub fn roles(&self) -> &BTreeMap<String, SlotRef> {
        &self.roles
    }

    /// Producer slot and location of a published role.
    pub fn role_output(&self, role: &str) -> Option<(&SlotRef, &Path)> {
        let slot = self.roles.get(role)?;
        let path = self.step(&slot.step)?.outputs.get(&slot.slot)?;
        Some((slot, path.as_path()))
    }

    /// Build the invocation for a step with the granted resources.
    pub fn invocation(&self, id: &str, granted: Resources) -> Option<Invocation> {
        let step = self.step(id)?;
        Some(Invocation {
            step_id: step.id().to_string(),
            operation: step.descriptor.operation.clone(),
            inputs: step
                .bindings
                .iter()
                .map(|(slot, b)| (slot.clone(), b.input_value()))
                .collect(),
            outputs: step.outputs.clone(),
            resources: granted,
            step_dir: step.step_dir.clone(),
            vars: self.vars.clone(),
        })
    }

    /// Identity of the graph: changes whenever a step, binding, output
    /// location or resource requirement changes.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        for step in &self.steps {
            let d = &step.descriptor;
            hasher.update(d.id.as_bytes());
            hasher.update(d.operation.name.as_bytes());
            for (k, v) in &d.operation.params {
                hasher.update(format!("param {}={};", k, v).as_bytes());
            }
            for (slot, binding) in &step.bindings {
                hasher.update(format!("in {}={};", slot, binding.describe()).as_bytes());
                for path in binding.paths() {
                    hasher.update(path.to_string_lossy().as_bytes());
                }
            }
            for (slot, path) in &step.outputs {
                hasher.update(format!("out {}={};", slot, path.display()).as_bytes());
            }
            hasher.update(format!("{};{}", d.resources, d.always_run).as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the graph has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Bind, validate and order a graph.
///
/// # Errors
///
/// `AmbiguousRole`, `AmbiguousBinding`, `UnknownStep`, `UnresolvedSlot`,
/// `TypeMismatch`, `CircularDependency` or `UnreachableStep`, each naming
/// the offending step and slot.
pub fn resolve(graph: Graph) -> Result<ResolvedGraph> {
    let roles = resolve_roles(&graph)?;
    let wired = collect_wires(&graph)?;

    let mut bindings: Vec<BTreeMap<String, Binding>> = Vec::with_capacity(graph.len());
    let mut dependencies: Vec<BTreeSet<usize>> = Vec::with_capacity(graph.len());
    let mut outputs: Vec<BTreeMap<String, PathBuf>> = Vec::with_capacity(graph.len());
    let mut step_dirs: Vec<PathBuf> = Vec::with_capacity(graph.len());

    let work_dir = graph
        .vars
        .get("work_dir")
        .map(PathBuf::from)
        .unwrap_or_default();

    for step in graph.steps() {
        let step_dir = work_dir.join(&step.id);
        outputs.push(render_outputs(&graph.vars, step, &step_dir)?);
        step_dirs.push(step_dir);
    }

    for step in graph.steps() {
        let mut step_bindings = BTreeMap::new();
        let mut step_deps = BTreeSet::new();

        for (slot, spec) in &step.inputs {
            let key = SlotRef::new(step.id.clone(), slot.clone());
            let source = wired.get(&key);

            let producer = match source {
                Some(Source::Step(producer)) => Some(producer.clone()),
                Some(Source::Role(role)) => roles.get(role).cloned(),
                _ => None,
            };

            let binding = match (source, producer) {
                (Some(_), Some(producer)) => {
                    let idx = graph.position(&producer.step).ok_or_else(|| {
                        AnatprepError::UnknownStep {
                            step: step.id.clone(),
                            unknown: producer.step.clone(),
                        }
                    })?;
                    let producer_step = &graph.steps()[idx];
                    let produced = producer_step.output(&producer.slot).ok_or_else(|| {
                        AnatprepError::UnresolvedSlot {
                            step: step.id.clone(),
                            slot: slot.clone(),
                            detail: Some(format!(
                                "'{}' declares no output '{}'",
                                producer.step, producer.slot
                            )),
                        }
                    })?;
                    if produced.kind != spec.kind {
                        return Err(AnatprepError::TypeMismatch {
                            producer: producer.to_string(),
                            consumer: key.to_string(),
                            expected: spec.kind.to_string(),
                            found: produced.kind.to_string(),
                        });
                    }
                    step_deps.insert(idx);
                    Binding::Edge {
                        path: outputs[idx][&producer.slot].clone(),
                        producer,
                    }
                }
                (Some(Source::Raw(raw_key)), _) => match graph.raw().get(raw_key) {
                    Some(value) => Binding::Raw {
                        key: raw_key.clone(),
                        value: value.clone(),
                    },
                    None => fallback(
                        step,
                        slot,
                        Some(format!("raw input '{}' is not available", raw_key)),
                    )?,
                },
                (Some(Source::Role(role)), None) => {
                    fallback(step, slot, Some(format!("role '{}' is not published", role)))?
                }
                _ => fallback(step, slot, None)?,
            };

            step_bindings.insert(slot.clone(), binding);
        }

        bindings.push(step_bindings);
        dependencies.push(step_deps);
    }

    let order = topological_order(&graph, &dependencies)?;
    check_reachability(&graph, &order, &bindings, &dependencies)?;

    let mut position = vec![0usize; graph.len()];
    for (pos, &idx) in order.iter().enumerate() {
        position[idx] = pos;
    }

    let mut steps = Vec::with_capacity(graph.len());
    let mut index = HashMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

    let mut bindings: Vec<Option<_>> = bindings.into_iter().map(Some).collect();
    let mut outputs: Vec<Option<_>> = outputs.into_iter().map(Some).collect();

    for &idx in &order {
        let descriptor = graph.steps()[idx].clone();
        let mut deps: Vec<usize> = dependencies[idx].iter().copied().collect();
        deps.sort_by_key(|&d| position[d]);
        let deps: Vec<String> = deps
            .into_iter()
            .map(|d| graph.steps()[d].id.clone())
            .collect();

        for dep in &deps {
            dependents
                .entry(dep.clone())
                .or_default()
                .push(descriptor.id.clone());
        }

        index.insert(descriptor.id.clone(), steps.len());
        steps.push(ResolvedStep {
            rule: graph.rule_of(&descriptor.id).unwrap_or_default().to_string(),
            bindings: bindings[idx].take().unwrap_or_default(),
            outputs: outputs[idx].take().unwrap_or_default(),
            step_dir: step_dirs[idx].clone(),
            dependencies: deps,
            descriptor,
        });
    }

    tracing::debug!(
        "Resolved {} steps for subject {}",
        steps.len(),
        graph.subject_id
    );

    Ok(ResolvedGraph {
        subject_id: graph.subject_id.clone(),
        vars: graph.vars.clone(),
        steps,
        index,
        dependents,
        roles,
    })
}

fn resolve_roles(graph: &Graph) -> Result<BTreeMap<String, SlotRef>> {
    let mut roles = BTreeMap::new();
    for (role, publishers) in graph.roles() {
        if publishers.len() > 1 {
            return Err(AnatprepError::AmbiguousRole {
                role: role.clone(),
                publishers: join(publishers.iter()),
            });
        }
        if let Some(slot) = publishers.first() {
            let step = graph
                .step(&slot.step)
                .ok_or_else(|| AnatprepError::UnknownStep {
                    step: format!("role:{}", role),
                    unknown: slot.step.clone(),
                })?;
            if step.output(&slot.slot).is_none() {
                return Err(AnatprepError::UnresolvedSlot {
                    step: slot.step.clone(),
                    slot: slot.slot.clone(),
                    detail: Some(format!("published as role '{}' but not declared", role)),
                });
            }
            roles.insert(role.clone(), slot.clone());
        }
    }
    Ok(roles)
}

fn collect_wires(graph: &Graph) -> Result<HashMap<SlotRef, Source>> {
    let mut seen: HashMap<SlotRef, Vec<&Source>> = HashMap::new();
    for wire in graph.wires() {
        let step = graph
            .step(&wire.consumer.step)
            .ok_or_else(|| AnatprepError::UnknownStep {
                step: wire.source.to_string(),
                unknown: wire.consumer.step.clone(),
            })?;
        if step.input(&wire.consumer.slot).is_none() {
            return Err(AnatprepError::UnresolvedSlot {
                step: wire.consumer.step.clone(),
                slot: wire.consumer.slot.clone(),
                detail: Some(format!("wired from {} but not declared", wire.source)),
            });
        }
        if let Source::Step(producer) = &wire.source {
            if !graph.contains(&producer.step) {
                return Err(AnatprepError::UnknownStep {
                    step: wire.consumer.step.clone(),
                    unknown: producer.step.clone(),
                });
            }
        }
        seen.entry(wire.consumer.clone()).or_default().push(&wire.source);
    }

    let mut wired = HashMap::new();
    for (consumer, sources) in seen {
        if sources.len() > 1 {
            return Err(AnatprepError::AmbiguousBinding {
                step: consumer.step,
                slot: consumer.slot,
                sources: join(sources.iter()),
            });
        }
        wired.insert(consumer, sources[0].clone());
    }
    Ok(wired)
}

fn fallback(step: &StepDescriptor, slot: &str, detail: Option<String>) -> Result<Binding> {
    match step.input(slot) {
        Some(spec) if spec.optional => Ok(match &spec.default {
            Some(value) => Binding::Default(value.clone()),
            None => Binding::Unbound,
        }),
        _ => Err(AnatprepError::UnresolvedSlot {
            step: step.id.clone(),
            slot: slot.to_string(),
            detail,
        }),
    }
}

fn render_outputs(
    vars: &BTreeMap<String, String>,
    step: &StepDescriptor,
    step_dir: &Path,
) -> Result<BTreeMap<String, PathBuf>> {
    let mut ctx = InterpolationContext::new();
    for (k, v) in vars {
        ctx.run.insert(k.clone(), v.clone());
    }
    ctx.set_step_var("step_id", step.id.clone());
    ctx.set_step_var("step_dir", step_dir.display().to_string());

    let mut rendered = BTreeMap::new();
    for (slot, spec) in &step.outputs {
        let template = spec.location.as_deref().unwrap_or(slot.as_str());
        let location = resolve_string(template, &ctx).map_err(|e| {
            AnatprepError::ConfigValidationError {
                message: format!("output '{}' of step '{}': {}", slot, step.id, e),
            }
        })?;
        let path = PathBuf::from(location);
        let path = if path.is_absolute() {
            path
        } else {
            step_dir.join(path)
        };
        rendered.insert(slot.clone(), path);
    }
    Ok(rendered)
}

/// Kahn's algorithm; the lowest declaration index among ready steps goes first.
fn topological_order(graph: &Graph, dependencies: &[BTreeSet<usize>]) -> Result<Vec<usize>> {
    let n = graph.len();
    let mut in_degree: Vec<usize> = dependencies.iter().map(|d| d.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (consumer, deps) in dependencies.iter().enumerate() {
        for &producer in deps {
            dependents[producer].push(consumer);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for &dependent in &dependents[idx] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != n {
        let cycle = find_cycle(dependencies)
            .map(|path| {
                path.iter()
                    .map(|&i| graph.steps()[i].id.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            })
            .unwrap_or_default();
        return Err(AnatprepError::CircularDependency { cycle });
    }

    Ok(order)
}

/// Depth-first search for a closed path through the dependency relation.
fn find_cycle(dependencies: &[BTreeSet<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        Visiting,
        Visited,
    }

    fn dfs(
        node: usize,
        dependencies: &[BTreeSet<usize>],
        state: &mut [State],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        state[node] = State::Visiting;
        path.push(node);

        for &dep in &dependencies[node] {
            match state[dep] {
                State::Visiting => {
                    let start = path.iter().position(|&s| s == dep).unwrap_or(0);
                    // path runs consumer -> producer; report producer -> consumer
                    let mut cycle: Vec<usize> = path[start..].to_vec();
                    cycle.push(dep);
                    cycle.reverse();
                    return Some(cycle);
                }
                State::Unvisited => {
                    if let Some(cycle) = dfs(dep, dependencies, state, path) {
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

    let mut state = vec![State::Unvisited; dependencies.len()];
    let mut path = Vec::new();
    for node in 0..dependencies.len() {
        if state[node] == State::Unvisited {
            if let Some(cycle) = dfs(node, dependencies, &mut state, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn check_reachability(
    graph: &Graph,
    order: &[usize],
    bindings: &[BTreeMap<String, Binding>],
    dependencies: &[BTreeSet<usize>],
) -> Result<()> {
    let mut rooted = vec![false; graph.len()];
    for &idx in order {
        let has_raw = bindings[idx]
            .values()
            .any(|b| matches!(b, Binding::Raw { .. }));
        rooted[idx] = has_raw || dependencies[idx].iter().any(|&d| rooted[d]);
        if !rooted[idx] {
            return Err(AnatprepError::UnreachableStep {
                step: graph.steps()[idx].id.clone(),
            });
        }
    }
    Ok(())
}

fn join<T: std::fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items.map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}
