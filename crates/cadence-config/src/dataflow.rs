//! Dataflow task configuration.
//!
//! A dataflow task is a DAG of nodes. Nodes are addressed by their index in
//! `nodes`, edges connect an upstream node's value to a named input of a
//! downstream node, and `toposorted` holds one valid execution order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowConfig {
  pub nodes: Vec<DataFlowNode>,
  /// The connections between nodes, sorted by `(from, to)`.
  pub edges: Vec<DataFlowEdge>,
  pub toposorted: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowNode {
  pub name: String,
  pub func: DataFlowNodeFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataFlowNodeFunction {
  Trigger(DataFlowTrigger),
  Action(DataFlowAction),
  Text(DataFlowText),
  Js(DataFlowJs),
  /// Code supplied inline or resolved from a package ahead of time.
  Code(CodeSource),
  Table,
  Graph,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowTrigger {
  pub local_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowAction {
  /// The task-local id of the action binding.
  pub action_id: String,
  pub payload_code: DataFlowJs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowText {
  pub body: String,
  pub render_as: TextRenderAs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowJs {
  pub code: String,
  pub format: JsCodeFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CodeSource {
  Inline {
    body: String,
  },
  Npm {
    package: String,
    resolved: String,
    code: String,
  },
}

impl CodeSource {
  pub fn code(&self) -> &str {
    match self {
      Self::Inline { body } => body,
      Self::Npm { code, .. } => code,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsCodeFormat {
  Expression,
  Function,
  AsyncFunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextRenderAs {
  PlainText,
  Markdown,
  Html,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFlowEdge {
  pub from: u32,
  pub to: u32,
  pub name: String,
}

impl PartialOrd for DataFlowEdge {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for DataFlowEdge {
  fn cmp(&self, other: &Self) -> Ordering {
    (self.from, self.to, &self.name).cmp(&(other.from, other.to, &other.name))
  }
}

/// The last value computed by each node, indexed like `nodes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFlowState {
  pub nodes: Vec<Value>,
}

impl DataFlowConfig {
  /// Build a config, sorting the edges and computing the execution order.
  pub fn new(nodes: Vec<DataFlowNode>, mut edges: Vec<DataFlowEdge>) -> Result<Self, ConfigError> {
    edges.sort();
    let toposorted = toposort_nodes(nodes.len(), &edges)?;

    Ok(Self {
      nodes,
      edges,
      toposorted,
    })
  }

  pub fn default_state(&self) -> DataFlowState {
    DataFlowState {
      nodes: vec![Value::Null; self.nodes.len()],
    }
  }

  /// Check the stored `toposorted` order against the edges.
  ///
  /// The order is persisted next to the graph and can go stale when nodes or
  /// edges are edited without recomputing it, so it is checked before every run.
  pub fn validate_order(&self) -> Result<(), ConfigError> {
    let count = self.nodes.len();
    if self.toposorted.len() != count {
      return Err(ConfigError::InvalidOrder {
        message: format!(
          "order lists {} nodes but the graph has {}",
          self.toposorted.len(),
          count
        ),
      });
    }

    // position[node] = index of the node in the execution order
    let mut position = vec![usize::MAX; count];
    for (pos, &idx) in self.toposorted.iter().enumerate() {
      let slot = position
        .get_mut(idx as usize)
        .ok_or_else(|| ConfigError::InvalidOrder {
          message: format!("order references unknown node {idx}"),
        })?;

      if *slot != usize::MAX {
        return Err(ConfigError::InvalidOrder {
          message: format!("node {idx} appears more than once in the order"),
        });
      }
      *slot = pos;
    }

    for edge in &self.edges {
      check_edge(edge, count)?;
      if position[edge.from as usize] >= position[edge.to as usize] {
        return Err(ConfigError::InvalidOrder {
          message: format!(
            "edge '{}' from node {} to node {} runs against the order",
            edge.name, edge.from, edge.to
          ),
        });
      }
    }

    Ok(())
  }

  /// Edges feeding the given node.
  pub fn incoming(&self, node: u32) -> impl Iterator<Item = &DataFlowEdge> {
    self.edges.iter().filter(move |edge| edge.to == node)
  }

  /// Index of the trigger node bound to a task trigger id.
  pub fn trigger_node(&self, trigger_id: &str) -> Option<u32> {
    self
      .nodes
      .iter()
      .position(|node| matches!(&node.func, DataFlowNodeFunction::Trigger(t) if t.local_id == trigger_id))
      .map(|idx| idx as u32)
  }
}

fn check_edge(edge: &DataFlowEdge, count: usize) -> Result<(), ConfigError> {
  if edge.from as usize >= count || edge.to as usize >= count {
    return Err(ConfigError::EdgeOutOfRange {
      from: edge.from,
      to: edge.to,
      nodes: count,
    });
  }
  Ok(())
}

/// Sort node indices so that every edge's `from` precedes its `to`.
///
/// Ties are broken by the lowest node index, so the order is deterministic.
pub(crate) fn toposort_nodes(count: usize, edges: &[DataFlowEdge]) -> Result<Vec<u32>, ConfigError> {
  let mut in_degree = vec![0usize; count];
  let mut downstream: Vec<Vec<u32>> = vec![Vec::new(); count];

  for edge in edges {
    check_edge(edge, count)?;
    in_degree[edge.to as usize] += 1;
    downstream[edge.from as usize].push(edge.to);
  }

  let mut ready: BinaryHeap<Reverse<u32>> = in_degree
    .iter()
    .enumerate()
    .filter(|(_, degree)| **degree == 0)
    .map(|(idx, _)| Reverse(idx as u32))
    .collect();

  let mut sorted = Vec::with_capacity(count);
  while let Some(Reverse(idx)) = ready.pop() {
    sorted.push(idx);
    for &to in &downstream[idx as usize] {
      let degree = &mut in_degree[to as usize];
      *degree -= 1;
      if *degree == 0 {
        ready.push(Reverse(to));
      }
    }
  }

  if sorted.len() != count {
    let stuck = in_degree
      .iter()
      .enumerate()
      .filter(|(_, degree)| **degree > 0)
      .map(|(idx, _)| idx as u32)
      .collect();
    return Err(ConfigError::Cycle { nodes: stuck });
  }

  Ok(sorted)
}
