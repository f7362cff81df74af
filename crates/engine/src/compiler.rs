//! Template compiler: turns a validated process graph into task templates
//! with explicit predecessor lists.
//!
//! Gateways disappear in the output. A task's predecessors are the nearest
//! task nodes found by walking edges backwards through gateways; crossing an
//! exclusive-gateway merge makes a multi-predecessor task `ANY`, everything
//! else is `ALL`.
//!
//! Output is deterministic: the same graph always compiles to the same task
//! list, in the same order, with the same predecessor ordering. The editor
//! recompiles on every structural change and relies on this.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::executor::EngineConfig;
use crate::dag::validate_graph;
use crate::error::EngineError;
use crate::models::{
    GraphEdge, GraphNode, NodeKind, PredecessorMode, ProcessGraph, TaskTemplate, TaskTemplateId,
};

/// Result of [`compile_with`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledGraph {
    /// The graph the tasks were compiled from (edges added if it was linearized).
    pub graph: ProcessGraph,
    pub tasks: Vec<TaskTemplate>,
    /// `true` when the edge-less graph was turned into a sequential chain.
    pub linearized: bool,
}

/// Validate `graph` and compile it into task templates.
///
/// # Errors
/// [`EngineError::GraphValidation`] when the graph breaks any structural
/// rule; nothing is compiled in that case.
pub fn compile(graph: &ProcessGraph) -> Result<Vec<TaskTemplate>, EngineError> {
    validate_graph(graph).into_result()?;
    Ok(compile_validated(graph))
}

/// Compile with the engine's configuration applied: edge-less graphs without
/// gateways are linearized first when `auto_linearize` is on.
///
/// # Errors
/// See [`compile`].
pub fn compile_with(graph: &ProcessGraph, config: &EngineConfig) -> Result<CompiledGraph, EngineError> {
    if config.auto_linearize && needs_linearization(graph) {
        let chained = auto_linearize(graph);
        let tasks = compile(&chained)?;
        debug!("linearized {} edge-less tasks into a chain", tasks.len());
        return Ok(CompiledGraph { graph: chained, tasks, linearized: true });
    }

    let tasks = compile(graph)?;
    Ok(CompiledGraph { graph: graph.clone(), tasks, linearized: false })
}

/// A graph with tasks but no edges and no gateways: the "just a list of
/// steps" case.
pub fn needs_linearization(graph: &ProcessGraph) -> bool {
    graph.edges.is_empty() && !graph.has_gateways() && graph.task_nodes().next().is_some()
}

/// Chain start → tasks (declaration order) → first end node.
pub fn auto_linearize(graph: &ProcessGraph) -> ProcessGraph {
    let start = graph.nodes.iter().find(|n| n.kind == NodeKind::Start);
    let end = graph.nodes.iter().find(|n| n.kind == NodeKind::End);

    let chain: Vec<&str> = start
        .into_iter()
        .chain(graph.task_nodes())
        .chain(end)
        .map(|n| n.id.as_str())
        .collect();

    let edges = chain
        .windows(2)
        .enumerate()
        .map(|(i, pair)| GraphEdge::new(format!("auto-{}", i + 1), pair[0], pair[1]))
        .collect();

    ProcessGraph { nodes: graph.nodes.clone(), edges }
}

/// Compile a graph that already passed validation.
fn compile_validated(graph: &ProcessGraph) -> Vec<TaskTemplate> {
    let nodes: HashMap<&str, &GraphNode> = graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        outgoing.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
        incoming.entry(edge.target.as_str()).or_default().push(edge.source.as_str());
    }

    // -----------------------------------------------------------------------
    // Topological visit order (Kahn's algorithm from the start node)
    // -----------------------------------------------------------------------
    let mut in_degree: HashMap<&str, usize> = incoming.iter().map(|(&id, src)| (id, src.len())).collect();
    let mut queue: VecDeque<&str> = graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Start)
        .map(|n| n.id.as_str())
        .collect();

    let mut visit_order: Vec<&str> = Vec::with_capacity(graph.nodes.len());
    while let Some(id) = queue.pop_front() {
        visit_order.push(id);
        for &next in outgoing.get(id).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(next) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    let order_hints: HashMap<&str, u32> = visit_order
        .iter()
        .filter(|id| nodes.get(*id).is_some_and(|n| n.kind == NodeKind::Task))
        .enumerate()
        .map(|(i, &id)| (id, i as u32))
        .collect();

    // -----------------------------------------------------------------------
    // Predecessors per task
    // -----------------------------------------------------------------------
    let mut tasks = Vec::with_capacity(order_hints.len());
    for &id in &visit_order {
        let Some(node) = nodes.get(id).copied().filter(|n| n.kind == NodeKind::Task) else {
            continue;
        };

        let (mut predecessors, crossed_xor_merge) = nearest_upstream_tasks(id, &nodes, &incoming);
        predecessors.sort_by_key(|p| order_hints.get(p).copied().unwrap_or(u32::MAX));

        let predecessor_mode = if predecessors.len() > 1 && crossed_xor_merge {
            PredecessorMode::Any
        } else {
            PredecessorMode::All
        };

        tasks.push(TaskTemplate {
            id: TaskTemplateId::new(node.id.clone()),
            name: node.display_name().to_owned(),
            task_type: node.task_type.unwrap_or_default(),
            stage_label: node.stage_label.clone(),
            description: node.description.clone(),
            assignee_hint: node.assignee_hint.clone(),
            predecessor_ids: predecessors.into_iter().map(TaskTemplateId::from).collect(),
            predecessor_mode,
            deadline_offset_days: node.deadline_offset_days,
            order_hint: order_hints.get(id).copied().unwrap_or_default(),
        });
    }

    tasks
}

/// Walk backwards from `task_id` through gateways and collect the first task
/// node on every path. Also reports whether an exclusive merge was crossed.
fn nearest_upstream_tasks<'a>(
    task_id: &'a str,
    nodes: &HashMap<&'a str, &'a GraphNode>,
    incoming: &HashMap<&'a str, Vec<&'a str>>,
) -> (Vec<&'a str>, bool) {
    let mut found: Vec<&str> = Vec::new();
    let mut crossed_xor_merge = false;
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = incoming.get(task_id).into_iter().flatten().copied().collect();

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let Some(node) = nodes.get(id) else { continue };

        match node.kind {
            NodeKind::Task => found.push(id),
            NodeKind::GatewayParallel | NodeKind::GatewayXor => {
                let sources = incoming.get(id).map(Vec::as_slice).unwrap_or_default();
                if node.kind == NodeKind::GatewayXor && sources.len() > 1 {
                    crossed_xor_merge = true;
                }
                queue.extend(sources.iter().copied());
            }
            NodeKind::Start | NodeKind::End => {}
        }
    }

    (found, crossed_xor_merge)
}
