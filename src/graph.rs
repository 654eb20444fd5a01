//! Traversal types shared by the graph store and the query engine.

use crate::edge::GraphEdge;
use crate::node::GraphNode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Maximum traversal depth for `neighbors`
pub const MAX_DEPTH: u32 = 3;

/// Hard cap on node search results
pub const MAX_NODE_RESULTS: usize = 200;

/// Direction of edge traversal relative to the current node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow edges from source to destination
    #[default]
    Out,
    /// Follow edges from destination back to source
    In,
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Out => "out",
            Direction::In => "in",
            Direction::Both => "both",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "out" | "outgoing" => Ok(Direction::Out),
            "in" | "incoming" => Ok(Direction::In),
            "both" | "any" => Ok(Direction::Both),
            _ => Err(Error::InvalidQuery(format!("Unknown direction: {}", s))),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Clamp a requested traversal depth to `[1, MAX_DEPTH]`.
pub fn clamp_depth(depth: u32) -> u32 {
    depth.clamp(1, MAX_DEPTH)
}

/// Result of a bounded breadth-first traversal.
///
/// `nodes` starts with the start node and lists every visited node once, in
/// discovery order. `edges` lists every traversed edge once, in discovery order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Neighborhood {
    pub start_id: i64,
    pub depth: u32,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Neighborhood {
    pub fn node(&self, id: i64) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.nodes.iter().any(|n| n.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_depth() {
        assert_eq!(clamp_depth(0), 1);
        assert_eq!(clamp_depth(2), 2);
        assert_eq!(clamp_depth(10), MAX_DEPTH);
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("IN".parse::<Direction>().unwrap(), Direction::In);
        assert_eq!("both".parse::<Direction>().unwrap(), Direction::Both);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
