use std::collections::{BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::{FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use nd_domain::error::{Error, Result};

type NodeFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'static>>;
type NodeFn = Box<dyn FnOnce(Vec<Value>) -> NodeFuture + Send + 'static>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Node
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single executable vertex in the dependency graph.
pub struct AgentNode {
    pub name: String,
    func: NodeFn,
    /// Positional args. A string arg equal to a prior node's name is
    /// substituted with that node's result at start time.
    pub args: Vec<Value>,
    pub depends_on: BTreeSet<String>,
    /// Non-essential: omitted entirely when the policy does not enable it.
    pub is_luxury: bool,
    /// Runs early and may be discarded; pruned while degraded.
    pub is_speculative: bool,
    /// Higher priority nodes are spawned first.
    pub priority: i32,
}

impl AgentNode {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: FnOnce(Vec<Value>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(move |args| Box::pin(func(args))),
            args: Vec::new(),
            depends_on: BTreeSet::new(),
            is_luxury: false,
            is_speculative: false,
            priority: 10,
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Reference a prior node's result as an argument.
    pub fn arg_from(mut self, node_name: &str) -> Self {
        self.args.push(Value::String(node_name.to_string()));
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn luxury(mut self) -> Self {
        self.is_luxury = true;
        self
    }

    pub fn speculative(mut self) -> Self {
        self.is_speculative = true;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Outcome of one node execution.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Completed(Value),
    Failed(String),
    Cancelled,
}

impl NodeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Completed(v) => Some(v),
            _ => None,
        }
    }
}

/// Pruning inputs derived from the execution policy and resource state.
#[derive(Debug, Clone, Default)]
pub struct PruneConfig {
    pub enabled_agents: BTreeSet<String>,
    /// True while the resource monitor is degraded.
    pub prune_speculative: bool,
}

impl PruneConfig {
    fn keeps(&self, node: &AgentNode) -> bool {
        if node.is_luxury && !self.enabled_agents.contains(&node.name) {
            return false;
        }
        if node.is_speculative && self.prune_speculative {
            return false;
        }
        true
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type SharedSignal = Shared<Pin<Box<dyn Future<Output = ()> + Send>>>;

fn shared_signal(rx: oneshot::Receiver<()>) -> SharedSignal {
    let fut: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
        // A dropped sender reads the same as a completion; outcome
        // inspection decides what the dependent does next.
        let _ = rx.await;
    });
    fut.shared()
}

/// Executes registered nodes respecting their dependency edges.
pub struct DagScheduler {
    nodes: HashMap<String, AgentNode>,
    cancel: CancellationToken,
}

impl Default for DagScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DagScheduler {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a node. Re-registering a name replaces the old node.
    pub fn add_node(&mut self, node: AgentNode) {
        if self.nodes.contains_key(&node.name) {
            tracing::warn!(node = %node.name, "overwriting existing node");
        }
        self.nodes.insert(node.name.clone(), node);
    }

    /// A token that cancels every live task when triggered. Cooperative:
    /// running futures observe it at their next await point.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel all live tasks.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Execute the graph. Returns the outcome of every node that was
    /// part of the (pruned) graph, including cascaded cancellations.
    pub async fn execute(&mut self, prune: &PruneConfig) -> Result<HashMap<String, NodeOutcome>> {
        let started = Instant::now();
        let nodes = std::mem::take(&mut self.nodes);

        // Split into runnable and pruned sets before any validation so a
        // pruned luxury branch cannot poison the topology check.
        let (runnable, pruned): (Vec<_>, Vec<_>) =
            nodes.into_values().partition(|n| prune.keeps(n));

        let pruned_names: Vec<String> = pruned.iter().map(|n| n.name.clone()).collect();
        if !pruned_names.is_empty() {
            tracing::info!(pruned = ?pruned_names, "nodes pruned by policy");
        }

        check_topology(&runnable, &pruned_names)?;
        tracing::info!(nodes = runnable.len(), "dag execution started");

        let results: Arc<Mutex<HashMap<String, NodeOutcome>>> =
            Arc::new(Mutex::new(HashMap::new()));

        // One completion signal per node, shared by all dependents.
        let mut senders: HashMap<String, oneshot::Sender<()>> = HashMap::new();
        let mut signals: HashMap<String, SharedSignal> = HashMap::new();
        for node in &runnable {
            let (tx, rx) = oneshot::channel();
            senders.insert(node.name.clone(), tx);
            signals.insert(node.name.clone(), shared_signal(rx));
        }
        // Pruned nodes complete instantly as cancelled so dependents
        // cascade instead of waiting forever.
        for node in pruned {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(());
            signals.insert(node.name.clone(), shared_signal(rx));
            results
                .lock()
                .insert(node.name.clone(), NodeOutcome::Cancelled);
        }

        let mut join_set = JoinSet::new();
        let mut ordered = runnable;
        ordered.sort_by_key(|n| std::cmp::Reverse(n.priority));

        for node in ordered {
            let name = node.name.clone();
            let deps = node.depends_on.clone();
            let dep_signals: Vec<SharedSignal> = deps
                .iter()
                .filter_map(|d| signals.get(d).cloned())
                .collect();
            let done_tx = senders.remove(&name).expect("signal registered above");
            let results = Arc::clone(&results);
            let cancel = self.cancel.clone();
            let args = node.args;
            let func = node.func;

            join_set.spawn(async move {
                let outcome = run_node(&name, func, args, deps, dep_signals, &results, cancel).await;
                results.lock().insert(name.clone(), outcome);
                let _ = done_tx.send(());
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "dag task panicked");
                }
            }
        }

        let results = Arc::try_unwrap(results)
            .map(|m| m.into_inner())
            .unwrap_or_else(|arc| arc.lock().clone());

        tracing::info!(
            duration_ms = started.elapsed().as_millis() as u64,
            nodes = results.len(),
            "dag execution completed"
        );
        Ok(results)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_node(
    name: &str,
    func: NodeFn,
    args: Vec<Value>,
    deps: BTreeSet<String>,
    dep_signals: Vec<SharedSignal>,
    results: &Mutex<HashMap<String, NodeOutcome>>,
    cancel: CancellationToken,
) -> NodeOutcome {
    // 1. Wait for every dependency's completion signal.
    if !dep_signals.is_empty() {
        tracing::debug!(node = name, deps = ?deps, "waiting for dependencies");
        let wait_all = futures_util::future::join_all(dep_signals);
        tokio::select! {
            _ = cancel.cancelled() => return NodeOutcome::Cancelled,
            _ = wait_all => {}
        }

        // 2. A failed or cancelled dependency cascades without running.
        for dep in &deps {
            let ok = results
                .lock()
                .get(dep)
                .map(NodeOutcome::is_completed)
                .unwrap_or(false);
            if !ok {
                tracing::warn!(node = name, dep = %dep, "skipped: dependency failed or cancelled");
                return NodeOutcome::Cancelled;
            }
        }
    }

    if cancel.is_cancelled() {
        return NodeOutcome::Cancelled;
    }

    // 3. Resolve args: string args naming a completed node become that
    //    node's result (lightweight dependency injection).
    let resolved: Vec<Value> = args
        .into_iter()
        .map(|arg| {
            if let Value::String(s) = &arg {
                if let Some(NodeOutcome::Completed(v)) = results.lock().get(s.as_str()) {
                    return v.clone();
                }
            }
            arg
        })
        .collect();

    // 4. Execute, racing the cancel token.
    tracing::debug!(node = name, "starting");
    let t0 = Instant::now();
    let outcome = tokio::select! {
        _ = cancel.cancelled() => NodeOutcome::Cancelled,
        result = func(resolved) => match result {
            Ok(value) => NodeOutcome::Completed(value),
            Err(e) => {
                tracing::error!(node = name, error = %e, "node failed");
                NodeOutcome::Failed(e.to_string())
            }
        },
    };
    tracing::debug!(
        node = name,
        duration_ms = t0.elapsed().as_millis() as u64,
        completed = outcome.is_completed(),
        "finished"
    );
    outcome
}

/// Reject cycles and unknown dependencies before spawning anything.
/// Pruned node names count as known (their dependents cascade-cancel).
fn check_topology(nodes: &[AgentNode], pruned: &[String]) -> Result<()> {
    let known: BTreeSet<&str> = nodes
        .iter()
        .map(|n| n.name.as_str())
        .chain(pruned.iter().map(String::as_str))
        .collect();

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in nodes {
        let mut degree = 0;
        for dep in &node.depends_on {
            if !known.contains(dep.as_str()) {
                return Err(Error::Integrity(format!(
                    "node '{}' depends on unknown node '{dep}'",
                    node.name
                )));
            }
            // Pruned deps resolve immediately; only live edges count.
            if nodes.iter().any(|n| n.name == *dep) {
                degree += 1;
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(node.name.as_str());
            }
        }
        in_degree.insert(node.name.as_str(), degree);
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut visited = 0usize;
    while let Some(name) = queue.pop_front() {
        visited += 1;
        if let Some(children) = dependents.get(name) {
            for child in children {
                let degree = in_degree.get_mut(child).expect("child registered");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    if visited != nodes.len() {
        return Err(Error::Integrity("dependency cycle detected".into()));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
