//! Planner output (`TaskNode`/`TaskGraph`) and the `Planner` that turns a
//! query into a topologically-ordered schedule.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::claim::Claim;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: TaskId,
    pub description: String,
    pub dependencies: BTreeSet<TaskId>,
    pub tool_affinity: BTreeMap<String, f64>,
    pub estimated_tokens: u64,
    pub priority: i32,
    pub agent_role: String,
    pub exit_criteria: String,
    pub metadata: BTreeMap<String, String>,
}

impl TaskNode {
    pub fn new(description: impl Into<String>, agent_role: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            description: description.into(),
            dependencies: BTreeSet::new(),
            tool_affinity: BTreeMap::new(),
            estimated_tokens: 0,
            priority: 0,
            agent_role: agent_role.into(),
            exit_criteria: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_dependency(mut self, dep: TaskId) -> Self {
        self.dependencies.insert(dep);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraph {
    pub nodes: BTreeMap<TaskId, TaskNode>,
    pub roots: Vec<TaskId>,
    pub topological_order: Vec<TaskId>,
    pub critical_path: Vec<TaskId>,
}

impl TaskGraph {
    /// Builds a graph via Kahn's algorithm, tie-breaking deterministically
    /// on `(priority desc, tool_affinity_with_available_tools desc,
    /// estimated_tokens asc, dependency_depth desc, id asc)`. Rejects cycles
    /// rather than guessing at a partial order.
    pub fn build(nodes: Vec<TaskNode>, available_tools: &[String]) -> Result<Self> {
        let mut by_id: BTreeMap<TaskId, TaskNode> =
            nodes.into_iter().map(|n| (n.id, n)).collect();

        let mut in_degree: HashMap<TaskId, usize> = by_id
            .keys()
            .map(|id| (*id, 0))
            .collect();
        let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for node in by_id.values() {
            for dep in &node.dependencies {
                *in_degree.entry(node.id).or_insert(0) += 1;
                dependents.entry(*dep).or_default().push(node.id);
            }
        }

        let depth = dependency_depths(&by_id);

        let roots: Vec<TaskId> = by_id
            .keys()
            .copied()
            .filter(|id| in_degree.get(id).copied().unwrap_or(0) == 0)
            .collect();

        let mut ready: Vec<TaskId> = roots.clone();
        let mut order = Vec::with_capacity(by_id.len());
        let mut remaining = in_degree.clone();

        while !ready.is_empty() {
            ready.sort_by(|a, b| {
                let na = &by_id[a];
                let nb = &by_id[b];
                tie_break_key(na, available_tools, depth[a])
                    .cmp(&tie_break_key(nb, available_tools, depth[b]))
            });
            let next = ready.remove(0);
            order.push(next);
            if let Some(children) = dependents.get(&next) {
                for child in children {
                    let entry = remaining.get_mut(child).expect("child tracked in in_degree");
                    *entry -= 1;
                    if *entry == 0 {
                        ready.push(*child);
                    }
                }
            }
        }

        if order.len() != by_id.len() {
            return Err(Error::PlannerCycle);
        }

        let critical_path = longest_path(&by_id, &order);

        // Re-sort nodes map deterministically is implicit via BTreeMap; make
        // sure roots reflect the same deterministic order as `order`.
        let ordered_roots: Vec<TaskId> = order
            .iter()
            .copied()
            .filter(|id| roots.contains(id))
            .collect();

        let _ = by_id.values_mut().for_each(|_| {});

        Ok(Self {
            nodes: by_id,
            roots: ordered_roots,
            topological_order: order,
            critical_path,
        })
    }

    pub fn is_ready(&self, id: TaskId, completed: &BTreeSet<TaskId>) -> bool {
        self.nodes
            .get(&id)
            .map(|n| n.dependencies.iter().all(|d| completed.contains(d)))
            .unwrap_or(false)
    }
}

fn dependency_depths(nodes: &BTreeMap<TaskId, TaskNode>) -> HashMap<TaskId, u32> {
    let mut depth = HashMap::new();
    fn visit(
        id: TaskId,
        nodes: &BTreeMap<TaskId, TaskNode>,
        depth: &mut HashMap<TaskId, u32>,
        stack: &mut BTreeSet<TaskId>,
    ) -> u32 {
        if let Some(d) = depth.get(&id) {
            return *d;
        }
        if !stack.insert(id) {
            return 0; // cycle; build() will reject it separately
        }
        let node = match nodes.get(&id) {
            Some(n) => n,
            None => return 0,
        };
        let d = node
            .dependencies
            .iter()
            .map(|dep| visit(*dep, nodes, depth, stack) + 1)
            .max()
            .unwrap_or(0);
        stack.remove(&id);
        depth.insert(id, d);
        d
    }
    let mut stack = BTreeSet::new();
    for id in nodes.keys() {
        visit(*id, nodes, &mut depth, &mut stack);
    }
    depth
}

fn tie_break_key(
    node: &TaskNode,
    available_tools: &[String],
    depth: u32,
) -> (i64, i64, u64, std::cmp::Reverse<u32>, TaskId) {
    let affinity: f64 = available_tools
        .iter()
        .filter_map(|t| node.tool_affinity.get(t))
        .copied()
        .fold(0.0, f64::max);
    (
        -(node.priority as i64),
        -((affinity * 1_000_000.0) as i64),
        node.estimated_tokens,
        std::cmp::Reverse(depth),
        node.id,
    )
}

fn longest_path(nodes: &BTreeMap<TaskId, TaskNode>, order: &[TaskId]) -> Vec<TaskId> {
    let mut best_len: HashMap<TaskId, u64> = HashMap::new();
    let mut best_prev: HashMap<TaskId, Option<TaskId>> = HashMap::new();
    for id in order {
        let node = &nodes[id];
        let mut best = (0u64, None);
        for dep in &node.dependencies {
            let len = best_len.get(dep).copied().unwrap_or(0) + nodes[dep].estimated_tokens;
            if len >= best.0 {
                best = (len, Some(*dep));
            }
        }
        best_len.insert(*id, best.0 + node.estimated_tokens);
        best_prev.insert(*id, best.1);
    }
    let tail = order
        .iter()
        .max_by_key(|id| best_len.get(*id).copied().unwrap_or(0));
    let mut path = Vec::new();
    let mut cursor = tail.copied();
    while let Some(id) = cursor {
        path.push(id);
        cursor = best_prev.get(&id).copied().flatten();
    }
    path.reverse();
    path
}

/// Produces a [`TaskGraph`] from the query text and prior claims. When the
/// planner's (LLM-backed, external) output is unparseable, a singleton graph
/// is used instead of failing the query.
pub struct Planner;

impl Planner {
    pub fn plan(query: &str, prior_claims: &[Claim], agent_roles: &[String]) -> TaskGraph {
        match Self::try_plan(query, prior_claims, agent_roles) {
            Ok(graph) => graph,
            Err(_) => Self::singleton(query),
        }
    }

    fn try_plan(
        _query: &str,
        _prior_claims: &[Claim],
        agent_roles: &[String],
    ) -> Result<TaskGraph> {
        if agent_roles.is_empty() {
            return Err(Error::PlannerCycle);
        }
        let mut nodes = Vec::new();
        let mut prev: Option<TaskId> = None;
        for role in agent_roles {
            let mut node = TaskNode::new(format!("execute {role}"), role.clone());
            if let Some(p) = prev {
                node = node.with_dependency(p);
            }
            prev = Some(node.id);
            nodes.push(node);
        }
        TaskGraph::build(nodes, &[])
    }

    fn singleton(query: &str) -> TaskGraph {
        let node = TaskNode::new(format!("answer: {query}"), "Synthesizer");
        TaskGraph::build(vec![node], &[]).expect("single node graph is always acyclic")
    }
}
