//! Graph validation: run this before compiling or persisting a template.
//!
//! Rules enforced on a process graph:
//! 1. Node and edge IDs must be unique.
//! 2. There is exactly one start node.
//! 3. Every edge must reference existing node IDs (both `source` and `target`).
//! 4. Every exclusive gateway has at least one outgoing edge.
//! 5. The directed graph must be acyclic.
//! 6. Every other node is reachable from the start node.
//! 7. Deadline offsets stay within [`MAX_DEADLINE_OFFSET_DAYS`].
//!
//! All violations are collected; validation never stops at the first one.
//! Hand-edited task lists go through [`check_task_templates`] instead.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::deadline::MAX_DEADLINE_OFFSET_DAYS;
use crate::error::{EngineError, GraphValidationError, GraphViolation, ReferenceProblem};
use crate::models::{NodeKind, ProcessGraph, TaskTemplate};

/// Outcome of [`validate_graph`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<GraphViolation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// # Errors
    /// [`EngineError::GraphValidation`] carrying every violation found.
    pub fn into_result(self) -> Result<(), EngineError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(GraphValidationError { violations: self.violations }.into())
        }
    }
}

/// Validate a process graph and report every violation found.
pub fn validate_graph(graph: &ProcessGraph) -> ValidationReport {
    let mut violations = Vec::new();

    // -----------------------------------------------------------------------
    // 1. Unique IDs
    // -----------------------------------------------------------------------
    let mut seen_nodes: HashSet<&str> = HashSet::new();
    for node in &graph.nodes {
        if !seen_nodes.insert(node.id.as_str()) {
            violations.push(GraphViolation::DuplicateNodeId(node.id.clone()));
        }
    }
    let mut seen_edges: HashSet<&str> = HashSet::new();
    for edge in &graph.edges {
        if !seen_edges.insert(edge.id.as_str()) {
            violations.push(GraphViolation::DuplicateEdgeId(edge.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Exactly one start node
    // -----------------------------------------------------------------------
    let starts: Vec<&str> = graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Start)
        .map(|n| n.id.as_str())
        .collect();
    match starts.len() {
        0 => violations.push(GraphViolation::NoStartNode),
        1 => {}
        count => violations.push(GraphViolation::MultipleStartNodes { count }),
    }

    // -----------------------------------------------------------------------
    // 3. Edge endpoints; build the adjacency list from valid edges only
    // -----------------------------------------------------------------------
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        let mut valid = true;
        if !seen_nodes.contains(edge.source.as_str()) {
            violations.push(GraphViolation::DanglingEdge {
                edge_id: edge.id.clone(),
                node_id: edge.source.clone(),
                side: "source",
            });
            valid = false;
        }
        if !seen_nodes.contains(edge.target.as_str()) {
            violations.push(GraphViolation::DanglingEdge {
                edge_id: edge.id.clone(),
                node_id: edge.target.clone(),
                side: "target",
            });
            valid = false;
        }
        if valid {
            adjacency
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }
    }

    // -----------------------------------------------------------------------
    // 4. Exclusive gateways need somewhere to go
    // -----------------------------------------------------------------------
    for node in graph.nodes.iter().filter(|n| n.kind == NodeKind::GatewayXor) {
        if adjacency.get(node.id.as_str()).map_or(true, Vec::is_empty) {
            violations.push(GraphViolation::XorWithoutOutgoing(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 5. Cycles (depth-first, recursion-stack set)
    // -----------------------------------------------------------------------
    let node_order: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    for node_id in find_cycles(&node_order, &adjacency) {
        violations.push(GraphViolation::Cycle(node_id.to_owned()));
    }

    // -----------------------------------------------------------------------
    // 6. Reachability from the start node
    // -----------------------------------------------------------------------
    if let [start] = starts.as_slice() {
        let mut reached: HashSet<&str> = HashSet::from([*start]);
        let mut queue: VecDeque<&str> = VecDeque::from([*start]);
        while let Some(id) = queue.pop_front() {
            for &next in adjacency.get(id).into_iter().flatten() {
                if reached.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        let mut reported: HashSet<&str> = HashSet::new();
        for node in &graph.nodes {
            if node.kind != NodeKind::Start
                && !reached.contains(node.id.as_str())
                && reported.insert(node.id.as_str())
            {
                violations.push(GraphViolation::Unreachable(node.id.clone()));
            }
        }
    }

    // -----------------------------------------------------------------------
    // 7. Deadline offsets
    // -----------------------------------------------------------------------
    for node in &graph.nodes {
        if let Some(violation) = offset_violation(&node.id, node.deadline_offset_days) {
            violations.push(violation);
        }
    }

    ValidationReport { violations }
}

fn offset_violation(node_id: &str, offset_days: Option<u32>) -> Option<GraphViolation> {
    offset_days
        .filter(|&days| days > MAX_DEADLINE_OFFSET_DAYS)
        .map(|days| GraphViolation::DeadlineOffsetOutOfRange {
            node_id: node_id.to_owned(),
            days,
            max: MAX_DEADLINE_OFFSET_DAYS,
        })
}

/// Depth-first search over `adjacency`, started from every node in `order`.
///
/// Returns each node that was re-entered while still on the DFS path, once,
/// in discovery order. The walk keeps its own frame stack, so path length is
/// bounded by memory rather than the thread stack.
fn find_cycles<'a>(order: &[&'a str], adjacency: &HashMap<&'a str, Vec<&'a str>>) -> Vec<&'a str> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: HashSet<&str> = HashSet::new();
    let mut offenders: Vec<&str> = Vec::new();
    // (node, index of the next outgoing edge to follow)
    let mut frames: Vec<(&str, usize)> = Vec::new();

    for &root in order {
        if !visited.insert(root) {
            continue;
        }
        on_stack.insert(root);
        frames.push((root, 0));

        while let Some((node, cursor)) = frames.last_mut() {
            let next = adjacency.get(*node).and_then(|targets| targets.get(*cursor)).copied();
            *cursor += 1;

            match next {
                Some(next) if on_stack.contains(next) => {
                    if !offenders.contains(&next) {
                        offenders.push(next);
                    }
                }
                Some(next) => {
                    if visited.insert(next) {
                        on_stack.insert(next);
                        frames.push((next, 0));
                    }
                }
                None => {
                    on_stack.remove(*node);
                    frames.pop();
                }
            }
        }
    }
    offenders
}

/// Referential checks for a task list whose predecessors may have been edited
/// by hand.
///
/// # Errors
/// - [`EngineError::GraphValidation`] for duplicate task IDs, out-of-range
///   deadline offsets or a cycle in the predecessor relation.
/// - [`EngineError::PredecessorReference`] for self references, unknown IDs
///   and IDs listed twice.
pub fn check_task_templates(tasks: &[TaskTemplate]) -> Result<(), EngineError> {
    let mut ids: HashSet<&str> = HashSet::new();
    let mut violations = Vec::new();
    for task in tasks {
        if !ids.insert(task.id.as_str()) {
            violations.push(GraphViolation::DuplicateNodeId(task.id.to_string()));
        }
        violations.extend(offset_violation(task.id.as_str(), task.deadline_offset_days));
    }
    if !violations.is_empty() {
        return Err(GraphValidationError { violations }.into());
    }

    for task in tasks {
        let mut listed: HashSet<&str> = HashSet::new();
        for pred in &task.predecessor_ids {
            let problem = if pred == &task.id {
                Some(ReferenceProblem::SelfReference)
            } else if !ids.contains(pred.as_str()) {
                Some(ReferenceProblem::UnknownTask)
            } else if !listed.insert(pred.as_str()) {
                Some(ReferenceProblem::Duplicate)
            } else {
                None
            };

            if let Some(problem) = problem {
                return Err(EngineError::PredecessorReference {
                    task_id: task.id.clone(),
                    predecessor_id: pred.clone(),
                    problem,
                });
            }
        }
    }

    // Edges run predecessor -> task, same direction as the diagram.
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in tasks {
        for pred in &task.predecessor_ids {
            adjacency.entry(pred.as_str()).or_default().push(task.id.as_str());
        }
    }
    let order: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let cycles = find_cycles(&order, &adjacency);
    if !cycles.is_empty() {
        return Err(GraphValidationError {
            violations: cycles
                .into_iter()
                .map(|id| GraphViolation::Cycle(id.to_owned()))
                .collect(),
        }
        .into());
    }

    Ok(())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GraphEdge, GraphNode};

    fn node(id: &str, kind: NodeKind) -> GraphNode {
        GraphNode::new(id, kind)
    }

    fn edge(from: &str, to: &str) -> GraphEdge {
        GraphEdge::new(format!("{from}-{to}"), from, to)
    }

    fn linear() -> ProcessGraph {
        // S → A → B → E
        ProcessGraph::new(
            vec![
                node("s", NodeKind::Start),
                GraphNode::task("a"),
                GraphNode::task("b"),
                node("e", NodeKind::End),
            ],
            vec![edge("s", "a"), edge("a", "b"), edge("b", "e")],
        )
    }

    #[test]
    fn valid_linear_graph_has_no_violations() {
        let report = validate_graph(&linear());
        assert!(report.is_valid(), "{:?}", report.violations);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn cycle_is_reported_with_offending_node() {
        // S → A → B → A (back-edge)
        let mut graph = linear();
        graph.edges.push(edge("b", "a"));

        let report = validate_graph(&graph);
        assert_eq!(report.violations, vec![GraphViolation::Cycle("a".into())]);

        match report.into_result() {
            Err(EngineError::GraphValidation(err)) => assert!(err.has_cycle()),
            other => panic!("expected a cycle error, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut graph = linear();
        graph.edges.push(edge("b", "b"));
        assert!(validate_graph(&graph)
            .violations
            .contains(&GraphViolation::Cycle("b".into())));
    }

    #[test]
    fn start_node_count_is_enforced() {
        let mut none = linear();
        none.nodes.retain(|n| n.kind != NodeKind::Start);
        none.edges.retain(|e| e.source != "s");
        assert!(validate_graph(&none).violations.contains(&GraphViolation::NoStartNode));

        let mut two = linear();
        two.nodes.push(node("s2", NodeKind::Start));
        assert!(validate_graph(&two)
            .violations
            .contains(&GraphViolation::MultipleStartNodes { count: 2 }));
    }

    #[test]
    fn orphan_task_is_unreachable() {
        let mut graph = linear();
        graph.nodes.push(GraphNode::task("lonely"));
        assert_eq!(
            validate_graph(&graph).violations,
            vec![GraphViolation::Unreachable("lonely".into())]
        );
    }

    #[test]
    fn dangling_edge_is_reported_per_side() {
        let mut graph = linear();
        graph.edges.push(GraphEdge::new("bad", "ghost", "a"));
        let violations = validate_graph(&graph).violations;
        assert!(matches!(
            violations.as_slice(),
            [GraphViolation::DanglingEdge { node_id, side: "source", .. }] if node_id == "ghost"
        ));
    }

    #[test]
    fn xor_without_outgoing_edge_is_rejected() {
        let mut graph = linear();
        graph.nodes.push(node("x", NodeKind::GatewayXor));
        graph.edges.push(edge("a", "x"));
        assert_eq!(
            validate_graph(&graph).violations,
            vec![GraphViolation::XorWithoutOutgoing("x".into())]
        );
    }

    #[test]
    fn all_violations_are_collected() {
        let mut graph = linear();
        graph.nodes.push(GraphNode::task("a"));
        graph.edges.push(edge("b", "a"));
        graph.edges.push(GraphEdge::new("x", "b", "nowhere"));

        let violations = validate_graph(&graph).violations;
        assert!(violations.contains(&GraphViolation::DuplicateNodeId("a".into())));
        assert!(violations.contains(&GraphViolation::Cycle("a".into())));
        assert!(violations
            .iter()
            .any(|v| matches!(v, GraphViolation::DanglingEdge { side: "target", .. })));
    }

    #[test]
    fn hand_edited_self_reference_is_rejected() {
        let tasks = vec![TaskTemplate::new("a", "A").after(&["a"])];
        assert!(matches!(
            check_task_templates(&tasks),
            Err(EngineError::PredecessorReference { problem: ReferenceProblem::SelfReference, .. })
        ));
    }

    #[test]
    fn hand_edited_unknown_reference_is_rejected() {
        let tasks = vec![
            TaskTemplate::new("a", "A"),
            TaskTemplate::new("b", "B").after(&["a", "ghost"]),
        ];
        match check_task_templates(&tasks) {
            Err(EngineError::PredecessorReference { task_id, predecessor_id, problem }) => {
                assert_eq!(task_id.as_str(), "b");
                assert_eq!(predecessor_id.as_str(), "ghost");
                assert_eq!(problem, ReferenceProblem::UnknownTask);
            }
            other => panic!("expected a reference error, got {other:?}"),
        }
    }

    #[test]
    fn hand_edited_cycle_is_rejected() {
        let tasks = vec![
            TaskTemplate::new("a", "A").after(&["b"]),
            TaskTemplate::new("b", "B").after(&["a"]),
        ];
        assert!(matches!(
            check_task_templates(&tasks),
            Err(EngineError::GraphValidation(err)) if err.has_cycle()
        ));
    }

    #[test]
    fn very_long_chain_is_walked_without_recursion() {
        let names: Vec<String> = (0..200_000).map(|i| format!("n{i}")).collect();
        let order: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = order
            .windows(2)
            .map(|pair| (pair[0], vec![pair[1]]))
            .collect();
        assert!(find_cycles(&order, &adjacency).is_empty());

        // Close the loop at the far end.
        adjacency.insert(order[order.len() - 1], vec![order[0]]);
        assert_eq!(find_cycles(&order, &adjacency), vec!["n0"]);
    }

    #[test]
    fn cycle_found_from_a_later_root() {
        let order = ["x", "a", "b"];
        let adjacency: HashMap<&str, Vec<&str>> =
            HashMap::from([("x", vec![]), ("a", vec!["b"]), ("b", vec!["a"])]);
        assert_eq!(find_cycles(&order, &adjacency), vec!["a"]);
    }

    #[test]
    fn oversized_deadline_offset_is_rejected() {
        let mut graph = linear();
        graph.nodes[1] = GraphNode::task("a").with_deadline_days(200_000_000);
        assert_eq!(
            validate_graph(&graph).violations,
            vec![GraphViolation::DeadlineOffsetOutOfRange {
                node_id: "a".into(),
                days: 200_000_000,
                max: MAX_DEADLINE_OFFSET_DAYS,
            }]
        );

        graph.nodes[1] = GraphNode::task("a").with_deadline_days(MAX_DEADLINE_OFFSET_DAYS);
        assert!(validate_graph(&graph).is_valid());
    }

    #[test]
    fn hand_edited_oversized_offset_is_rejected() {
        let tasks = vec![TaskTemplate::new("a", "A").with_deadline_days(u32::MAX)];
        assert!(matches!(
            check_task_templates(&tasks),
            Err(EngineError::GraphValidation(err))
                if matches!(err.violations.as_slice(), [GraphViolation::DeadlineOffsetOutOfRange { .. }])
        ));
    }

    #[test]
    fn well_formed_task_list_passes() {
        let tasks = vec![
            TaskTemplate::new("a", "A"),
            TaskTemplate::new("b", "B").after(&["a"]),
            TaskTemplate::new("c", "C").after(&["a", "b"]),
        ];
        assert!(check_task_templates(&tasks).is_ok());
    }
}
