//! Bounded-parallel execution of a resolved graph.
//!
//! The engine loop is the only scheduler and the only writer of the
//! [`ExecutionState`]. Each dispatched step runs on its own worker thread
//! and reports back over a channel; workers never touch shared state.
//!
//! Admission is head-of-line: the oldest ready step is dispatched as soon as
//! the committed resources plus its own requirement fit under the ceiling,
//! and nothing behind it overtakes it.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::cache::{observe_outputs, should_skip, RunReason, SkipDecision};
use crate::context::{Layout, RunContext};
use crate::error::Result;
use crate::graph::{ResolvedGraph, ResolvedStep};
use crate::state::{ExecutionState, RunHistory, RunHistoryBuilder, RunRecord, StepStatus};
use crate::steps::{OperationRegistry, Resources};

use super::report::RunReport;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Mark the process as interrupted. Safe to call from a signal handler.
pub fn request_interrupt() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Cooperative cancellation flag shared between the caller and the engine.
///
/// Cancelling stops new dispatch; steps already running finish and their
/// outputs are recorded. A process-wide interrupt (SIGINT) cancels every
/// token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || INTERRUPTED.load(Ordering::SeqCst)
    }
}

/// Options for running a graph.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Resources available to all running steps together.
    pub ceiling: Resources,
    /// Steps to re-execute regardless of freshness.
    pub force: BTreeSet<String>,
    /// Evaluate skip decisions without executing or persisting anything.
    pub dry_run: bool,
    /// Number of run records kept in the history file.
    pub history_retention: usize,
    /// How often the loop wakes up to observe cancellation.
    pub poll_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            ceiling: Resources::gib(4, 8.0),
            force: BTreeSet::new(),
            dry_run: false,
            history_retention: 20,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl EngineOptions {
    /// Options taking the resource ceiling from the run context.
    pub fn for_context(ctx: &RunContext) -> Self {
        Self {
            ceiling: ctx.ceiling,
            ..Self::default()
        }
    }
}

/// Progress events emitted by the engine loop.
#[derive(Debug)]
pub enum EngineEvent<'a> {
    /// Execution of a subject graph begins.
    Started { subject_id: &'a str, total: usize },
    /// Outputs were fresh; the step will not run.
    Skipped { step: &'a str },
    /// The step was handed to a worker.
    Dispatched {
        step: &'a str,
        granted: Resources,
        running: usize,
    },
    /// The step finished and its outputs were verified.
    Finished { step: &'a str, duration: Duration },
    /// The step failed.
    Failed { step: &'a str, message: &'a str },
    /// The step cannot run because an ancestor failed.
    Blocked { step: &'a str, by: &'a str },
}

/// Skip decision for one step, as `plan` and `--dry-run` show it.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    /// Step id.
    pub step: String,
    /// Whether it would run, and why.
    pub decision: SkipDecision,
}

struct Completion {
    step: String,
    result: std::result::Result<(), String>,
}

struct Running {
    granted: Resources,
    started: Instant,
}

/// Executes resolved graphs.
pub struct Engine {
    registry: OperationRegistry,
    layout: Layout,
    options: EngineOptions,
    cancel: CancelToken,
}

impl Engine {
    /// Create an engine.
    pub fn new(registry: OperationRegistry, layout: Layout, options: EngineOptions) -> Self {
        Self {
            registry,
            layout,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The engine's cancellation token.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Engine options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run a graph.
    pub fn run(&self, graph: &ResolvedGraph) -> Result<RunReport> {
        self.run_with_progress(graph, |_| {})
    }

    /// Skip decisions for every step without executing anything.
    ///
    /// A step whose producer would run is reported as running too: its
    /// inputs do not exist yet in their new form, so freshness cannot be
    /// judged until the producer has finished.
    pub fn preview(&self, graph: &ResolvedGraph) -> Result<Vec<PlannedStep>> {
        self.check_operations(graph)?;
        let previous = self.previous_state(graph);
        let mut would_run: BTreeSet<&str> = BTreeSet::new();
        let mut planned = Vec::with_capacity(graph.len());

        for step in graph.steps() {
            let forced = self.options.force.contains(step.id());
            let upstream = graph
                .dependencies(step.id())
                .iter()
                .find(|d| would_run.contains(d.as_str()));
            let decision = match upstream {
                Some(producer) if !forced => {
                    SkipDecision::Run(RunReason::UpstreamRerun(producer.clone()))
                }
                _ => should_skip(
                    step,
                    previous.as_ref().and_then(|p| p.record(step.id())),
                    forced,
                ),
            };
            if !decision.is_skip() {
                would_run.insert(step.id());
            }
            planned.push(PlannedStep {
                step: step.id().to_string(),
                decision,
            });
        }

        Ok(planned)
    }

    /// Run a graph, reporting progress through `on_event`.
    ///
    /// Returns `Err` only for problems that prevent execution (unknown
    /// operations, unwritable state). Step failures are recorded in the
    /// report.
    pub fn run_with_progress(
        &self,
        graph: &ResolvedGraph,
        mut on_event: impl FnMut(EngineEvent<'_>),
    ) -> Result<RunReport> {
        if self.options.dry_run {
            return self.dry_run(graph);
        }

        self.check_operations(graph)?;
        let started = Utc::now();
        let mut scheduler = Scheduler::new(graph, self.previous_state(graph), &self.layout);
        scheduler.persist()?;

        info!(
            "Running {} step(s) for sub-{} within {}",
            graph.len(),
            graph.subject_id,
            self.options.ceiling
        );
        on_event(EngineEvent::Started {
            subject_id: &graph.subject_id,
            total: graph.len(),
        });

        let interrupted = self.execute(&mut scheduler, &mut on_event)?;

        let report = RunReport::from_state(graph, &scheduler.state, started, interrupted, false);
        report.save(&self.layout.report_file(&graph.subject_id))?;
        self.record_history(graph, scheduler.history.finish(interrupted))?;

        let counts = report.counts();
        info!(
            "sub-{}: {} done, {} skipped, {} failed, {} blocked",
            graph.subject_id, counts.done, counts.skipped, counts.failed, counts.blocked
        );

        Ok(report)
    }

    fn execute<'g>(
        &self,
        scheduler: &mut Scheduler<'g>,
        emit: &mut dyn FnMut(EngineEvent<'_>),
    ) -> Result<bool> {
        let graph = scheduler.graph;
        let ceiling = self.options.ceiling;
        let (tx, rx) = mpsc::channel::<Completion>();
        let mut committed = Resources::default();
        let mut running: HashMap<&'g str, Running> = HashMap::new();
        let mut interrupted = false;

        let roots: Vec<&'g str> = graph
            .steps()
            .iter()
            .filter(|s| s.dependencies.is_empty())
            .map(|s| s.id())
            .collect();
        let mut skipped_roots = Vec::new();
        for id in roots {
            if scheduler.evaluate(id, self.options.force.contains(id), emit)? {
                skipped_roots.push(id);
            }
        }
        for id in skipped_roots {
            scheduler.release(id, &self.options.force, emit)?;
        }

        loop {
            if !interrupted && self.cancel.is_cancelled() {
                interrupted = true;
                warn!(
                    "Cancellation requested; waiting for {} running step(s)",
                    running.len()
                );
            }

            while !interrupted {
                let Some(&head) = scheduler.ready.front() else {
                    break;
                };
                let Some(step) = graph.step(head) else {
                    scheduler.ready.pop_front();
                    continue;
                };
                let granted = grant(step, &ceiling);
                if !(committed + granted).fits_within(&ceiling) {
                    break;
                }
                scheduler.ready.pop_front();
                if let Err(e) = self.dispatch(scheduler, step, granted, tx.clone()) {
                    let message = format!("could not start: {}", e);
                    error!("[{}] {}", head, message);
                    scheduler.fail(head, &message, emit)?;
                    continue;
                }
                committed = committed + granted;
                running.insert(
                    head,
                    Running {
                        granted,
                        started: Instant::now(),
                    },
                );
                emit(EngineEvent::Dispatched {
                    step: head,
                    granted,
                    running: running.len(),
                });
            }

            if running.is_empty() {
                break;
            }

            let completion = match rx.recv_timeout(self.options.poll_interval) {
                Ok(completion) => completion,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let Some(step) = graph.step(&completion.step) else {
                continue;
            };
            let id = step.id();
            let duration = match running.remove(id) {
                Some(run) => {
                    committed = committed - run.granted;
                    run.started.elapsed()
                }
                None => Duration::ZERO,
            };

            let outcome = completion.result.and_then(|()| {
                let missing = scheduler
                    .graph
                    .invocation(id, Resources::default())
                    .map(|invocation| invocation.missing_outputs())
                    .unwrap_or_default();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(format!("declared output(s) not produced: {}", missing.join(", ")))
                }
            });

            match outcome {
                Ok(()) => {
                    info!("[{}] done in {:.1}s", id, duration.as_secs_f64());
                    scheduler.complete(step)?;
                    emit(EngineEvent::Finished { step: id, duration });
                    scheduler.release(id, &self.options.force, emit)?;
                }
                Err(message) => {
                    error!("[{}] failed: {}", id, message);
                    scheduler.fail(id, &message, emit)?;
                }
            }
        }

        Ok(interrupted)
    }

    fn dispatch(
        &self,
        scheduler: &mut Scheduler<'_>,
        step: &ResolvedStep,
        granted: Resources,
        tx: mpsc::Sender<Completion>,
    ) -> Result<()> {
        let id = step.id();
        if granted != step.descriptor.resources {
            warn!(
                "[{}] requires {} which exceeds the ceiling; clamped to {}",
                id, step.descriptor.resources, granted
            );
        }

        scheduler.state.transition(id, StepStatus::Running, None);
        scheduler.history.step_run(id);
        scheduler.persist()?;
        info!("[{}] dispatch ({})", id, granted);

        let operation = self.registry.get(&step.descriptor.operation.name);
        let invocation = scheduler.graph.invocation(id, granted);
        fs::create_dir_all(&step.step_dir)?;

        let step_id = id.to_string();
        thread::Builder::new()
            .name(format!("step-{}", id))
            .spawn(move || {
                let result = match (operation, invocation) {
                    (Some(operation), Some(invocation)) => {
                        let invoked = AssertUnwindSafe(|| operation.invoke(&invocation));
                        match panic::catch_unwind(invoked) {
                            Ok(Ok(())) => Ok(()),
                            Ok(Err(e)) => Err(e.to_string()),
                            Err(_) => Err("operation panicked".to_string()),
                        }
                    }
                    _ => Err("operation is not registered".to_string()),
                };
                let _ = tx.send(Completion {
                    step: step_id,
                    result,
                });
            })?;

        Ok(())
    }

    fn dry_run(&self, graph: &ResolvedGraph) -> Result<RunReport> {
        let started = Utc::now();
        let mut state = ExecutionState::for_graph(graph);
        for planned in self.preview(graph)? {
            match planned.decision {
                SkipDecision::Skip(artifacts) => {
                    state.transition(&planned.step, StepStatus::Skipped, None);
                    state.set_outputs(&planned.step, artifacts);
                }
                SkipDecision::Run(reason) => {
                    state.transition(&planned.step, StepStatus::Ready, Some(reason.to_string()));
                }
            }
        }
        Ok(RunReport::from_state(graph, &state, started, false, true))
    }

    fn check_operations(&self, graph: &ResolvedGraph) -> Result<()> {
        self.registry.check(
            graph
                .steps()
                .iter()
                .map(|s| (s.id(), &s.descriptor.operation)),
        )
    }

    fn previous_state(&self, graph: &ResolvedGraph) -> Option<ExecutionState> {
        let path = self.layout.state_file(&graph.subject_id);
        match ExecutionState::load(&path) {
            Ok(Some(state)) if state.matches(graph) => Some(state),
            Ok(Some(_)) => {
                info!(
                    "Graph for sub-{} changed since the last run; persisted statuses discarded",
                    graph.subject_id
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Ignoring unreadable state {}: {}", path.display(), e);
                None
            }
        }
    }

    fn record_history(&self, graph: &ResolvedGraph, record: RunRecord) -> Result<()> {
        let path = self.layout.history_file(&graph.subject_id);
        let mut history = RunHistory::load(&path).unwrap_or_else(|e| {
            warn!("Starting a new history, {} is unreadable: {}", path.display(), e);
            RunHistory::default()
        });
        history.record(record, self.options.history_retention);
        history.save(&path)
    }
}

fn grant(step: &ResolvedStep, ceiling: &Resources) -> Resources {
    let required = step.descriptor.resources;
    if required.fits_within(ceiling) {
        required
    } else {
        required.clamp_to(ceiling)
    }
}

/// Mutable bookkeeping of one run, owned by the engine loop.
struct Scheduler<'g> {
    graph: &'g ResolvedGraph,
    state: ExecutionState,
    previous: Option<ExecutionState>,
    state_file: PathBuf,
    remaining: HashMap<&'g str, usize>,
    ready: VecDeque<&'g str>,
    history: RunHistoryBuilder,
}

impl<'g> Scheduler<'g> {
    fn new(graph: &'g ResolvedGraph, previous: Option<ExecutionState>, layout: &Layout) -> Self {
        let mut state = ExecutionState::for_graph(graph);
        state.started = Some(Utc::now());
        let remaining = graph
            .steps()
            .iter()
            .map(|s| (s.id(), s.dependencies.len()))
            .collect();
        Self {
            graph,
            history: RunHistoryBuilder::start(&graph.subject_id, &state.graph_hash),
            state,
            previous,
            state_file: layout.state_file(&graph.subject_id),
            remaining,
            ready: VecDeque::new(),
        }
    }

    fn persist(&mut self) -> Result<()> {
        self.state.save(&self.state_file)
    }

    /// Decide whether a step whose producers are satisfied runs or is
    /// skipped. Returns `true` when it was skipped.
    fn evaluate(
        &mut self,
        id: &'g str,
        forced: bool,
        emit: &mut dyn FnMut(EngineEvent<'_>),
    ) -> Result<bool> {
        let graph = self.graph;
        let Some(step) = graph.step(id) else {
            return Ok(false);
        };
        let previous = self.previous.as_ref().and_then(|p| p.record(id));

        // Producers have settled, so outputs they rewrote in this run are
        // compared against like any other input.
        let decision = should_skip(step, previous, forced);
        if decision.is_resume_inconsistency(previous) {
            if let SkipDecision::Run(reason) = &decision {
                warn!("[{}] recorded as done but {}; re-running", id, reason);
            }
        }

        match decision {
            SkipDecision::Skip(artifacts) => {
                debug!("[{}] outputs fresh, skipping", id);
                self.state.transition(id, StepStatus::Skipped, None);
                self.state.set_outputs(id, artifacts);
                self.history.step_skipped(id);
                self.persist()?;
                emit(EngineEvent::Skipped { step: id });
                Ok(true)
            }
            SkipDecision::Run(reason) => {
                debug!("[{}] ready: {}", id, reason);
                self.state
                    .transition(id, StepStatus::Ready, Some(reason.to_string()));
                self.persist()?;
                self.ready.push_back(id);
                Ok(false)
            }
        }
    }

    /// Count `id` as satisfied for its dependents, evaluating every
    /// dependent whose producers are now all satisfied.
    fn release(
        &mut self,
        id: &'g str,
        force: &BTreeSet<String>,
        emit: &mut dyn FnMut(EngineEvent<'_>),
    ) -> Result<()> {
        let graph = self.graph;
        let mut satisfied = VecDeque::from([id]);
        while let Some(done) = satisfied.pop_front() {
            for dependent in graph.dependents(done) {
                let dependent = dependent.as_str();
                let Some(count) = self.remaining.get_mut(dependent) else {
                    continue;
                };
                *count = count.saturating_sub(1);
                if *count == 0 && self.evaluate(dependent, force.contains(dependent), emit)? {
                    satisfied.push_back(dependent);
                }
            }
        }
        Ok(())
    }

    fn complete(&mut self, step: &'g ResolvedStep) -> Result<()> {
        let id = step.id();
        self.state.transition(id, StepStatus::Done, None);
        self.state.set_outputs(id, observe_outputs(step));
        self.persist()
    }

    fn fail(
        &mut self,
        id: &'g str,
        message: &str,
        emit: &mut dyn FnMut(EngineEvent<'_>),
    ) -> Result<()> {
        let graph = self.graph;
        self.state
            .transition(id, StepStatus::Failed, Some(message.to_string()));
        self.history.step_failed(id);
        emit(EngineEvent::Failed { step: id, message });

        let mut blocked: Vec<&'g str> = graph
            .transitive_dependents(id)
            .iter()
            .filter_map(|d| graph.step(d).map(|s| s.id()))
            .collect();
        blocked.sort_by_key(|d| graph.position(d));
        for dependent in blocked {
            if self.state.status(dependent).is_terminal() {
                continue;
            }
            debug!("[{}] blocked by {}", dependent, id);
            self.state.transition(
                dependent,
                StepStatus::Blocked,
                Some(format!("blocked by failed step '{}'", id)),
            );
            self.history.step_blocked(dependent);
            emit(EngineEvent::Blocked {
                step: dependent,
                by: id,
            });
        }

        self.persist()
    }
}
