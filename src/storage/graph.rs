//! Property graph persistence and traversal.

use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::edge::{EdgeKind, GraphEdge};
use crate::graph::{Direction, MAX_NODE_RESULTS, Neighborhood, clamp_depth};
use crate::node::{Anchor, GraphNode, NewNode, NodeKind, NodeSource};
use crate::{Error, Result};

const NODE_COLUMNS: &str = "id, kind, key, label, source, file_path, start_line, end_line, metadata";
const EDGE_COLUMNS: &str = "id, kind, src_id, dst_id, locations, metadata, origin";

/// Input to an edge upsert
#[derive(Debug, Clone, PartialEq)]
pub struct NewEdge {
    pub kind: EdgeKind,
    pub src_id: i64,
    pub dst_id: i64,
    pub locations: Vec<String>,
    pub metadata: serde_json::Value,
    pub origin: Option<String>,
}

impl NewEdge {
    pub fn new(kind: EdgeKind, src_id: i64, dst_id: i64) -> Self {
        Self {
            kind,
            src_id,
            dst_id,
            locations: Vec::new(),
            metadata: serde_json::Value::Object(Default::default()),
            origin: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.locations.push(location.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// Number of edges of one kind touching a node in one direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeCount {
    pub kind: EdgeKind,
    pub direction: Direction,
    pub count: usize,
}

/// Graph store borrowed from a connection or transaction
pub struct GraphStore<'c> {
    conn: &'c Connection,
}

impl<'c> GraphStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // ========== Node Operations ==========

    /// Insert a node or update the existing `(kind, key)` node. Returns the
    /// node id, which never changes for a given `(kind, key)`.
    pub fn upsert_node(&self, node: &NewNode) -> Result<i64> {
        let label = node.label.as_deref().unwrap_or(&node.key);
        let (path, start, end) = match &node.anchor {
            Some(anchor) => (Some(anchor.path.as_str()), Some(anchor.start_line), Some(anchor.end_line)),
            None => (None, None, None),
        };
        let metadata = serde_json::to_string(&node.metadata)?;
        let id = self.conn.query_row(
            r#"
            INSERT INTO nodes (kind, key, label, source, file_path, start_line, end_line, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(kind, key) DO UPDATE SET
                label = excluded.label,
                source = excluded.source,
                file_path = excluded.file_path,
                start_line = excluded.start_line,
                end_line = excluded.end_line,
                metadata = excluded.metadata
            RETURNING id
            "#,
            params![node.kind.as_str(), node.key, label, node.source.as_str(), path, start, end, metadata],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Return the id of `(kind, key)`, creating an inferred placeholder when
    /// absent. Existing nodes are left untouched.
    pub fn ensure_node(&self, kind: NodeKind, key: &str) -> Result<i64> {
        if let Some(id) = self.node_id(kind, key)? {
            return Ok(id);
        }
        let placeholder = NewNode::new(kind, key, NodeSource::FromSource)
            .with_metadata(serde_json::json!({ "inferred": true }));
        self.upsert_node(&placeholder)
    }

    pub fn node_id(&self, kind: NodeKind, key: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM nodes WHERE kind = ?1 AND key = ?2",
                params![kind.as_str(), key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn get_node(&self, id: i64) -> Result<Option<GraphNode>> {
        let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], row_to_node).optional()?)
    }

    pub fn find_node(&self, kind: NodeKind, key: &str) -> Result<Option<GraphNode>> {
        let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE kind = ?1 AND key = ?2");
        Ok(self
            .conn
            .query_row(&sql, params![kind.as_str(), key], row_to_node)
            .optional()?)
    }

    /// Nodes filtered by kind and a case-insensitive substring of key or label
    pub fn find_nodes(&self, kind: Option<NodeKind>, filter: Option<&str>, limit: usize) -> Result<Vec<GraphNode>> {
        if limit == 0 {
            return Err(Error::InvalidQuery("limit must be at least 1".into()));
        }
        let limit = limit.min(MAX_NODE_RESULTS);
        let filter = filter.map(str::trim).filter(|f| !f.is_empty());
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM nodes \
             WHERE (?1 IS NULL OR kind = ?1) \
               AND (?2 IS NULL OR instr(lower(key), lower(?2)) > 0 OR instr(lower(label), lower(?2)) > 0) \
             ORDER BY kind, key LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let nodes = stmt
            .query_map(params![kind.map(|k| k.as_str()), filter, limit as i64], row_to_node)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(nodes)
    }

    /// Nodes anchored to a source file
    pub fn nodes_anchored_to(&self, path: &str) -> Result<Vec<GraphNode>> {
        let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE file_path = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let nodes = stmt.query_map([path], row_to_node)?.collect::<rusqlite::Result<_>>()?;
        Ok(nodes)
    }

    pub fn nodes_by_source(&self, source: NodeSource) -> Result<Vec<GraphNode>> {
        let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE source = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let nodes = stmt
            .query_map([source.as_str()], row_to_node)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(nodes)
    }

    /// True when any edge still touches the node
    pub fn is_referenced(&self, id: i64) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM edges WHERE src_id = ?1 OR dst_id = ?1)",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn delete_node(&self, id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM nodes WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Turn a node back into an inferred placeholder: drop its anchor and
    /// mark it `inferred`. The id is preserved.
    pub fn demote_node(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE nodes SET file_path = NULL, start_line = NULL, end_line = NULL, \
             metadata = json_set(metadata, '$.inferred', json('true')) WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    // ========== Edge Operations ==========

    /// Insert an edge or overwrite the existing `(kind, src, dst)` edge.
    /// Locations, metadata and the last-writer origin are replaced and the id
    /// is kept. The origin joins the edge's origin set.
    pub fn upsert_edge(&self, edge: &NewEdge) -> Result<i64> {
        let id = self.conn.query_row(
            r#"
            INSERT INTO edges (kind, src_id, dst_id, locations, metadata, origin)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(kind, src_id, dst_id) DO UPDATE SET
                locations = excluded.locations,
                metadata = excluded.metadata,
                origin = excluded.origin
            RETURNING id
            "#,
            params![
                edge.kind.as_str(),
                edge.src_id,
                edge.dst_id,
                serde_json::to_string(&edge.locations)?,
                serde_json::to_string(&edge.metadata)?,
                edge.origin,
            ],
            |row| row.get(0),
        )?;
        if let Some(origin) = &edge.origin {
            self.conn.execute(
                "INSERT OR IGNORE INTO edge_origins (edge_id, origin) VALUES (?1, ?2)",
                params![id, origin],
            )?;
        }
        Ok(id)
    }

    /// Edges that `origin` has emitted and not yet released
    pub fn edge_ids_by_origin(&self, origin: &str) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT edge_id FROM edge_origins WHERE origin = ?1 ORDER BY edge_id")?;
        let ids = stmt.query_map([origin], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?;
        Ok(ids)
    }

    /// Every origin currently holding an edge, sorted
    pub fn edge_origins(&self, id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT origin FROM edge_origins WHERE edge_id = ?1 ORDER BY origin")?;
        let origins = stmt.query_map([id], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?;
        Ok(origins)
    }

    /// Drop `origin`'s claim on an edge. The edge is deleted when no origin
    /// holds it any more; otherwise one of the remaining origins becomes its
    /// recorded origin. Returns true when the edge was deleted.
    pub fn release_edge(&self, id: i64, origin: &str) -> Result<bool> {
        self.conn.execute(
            "DELETE FROM edge_origins WHERE edge_id = ?1 AND origin = ?2",
            params![id, origin],
        )?;
        let remaining: Option<String> = self
            .conn
            .query_row(
                "SELECT origin FROM edge_origins WHERE edge_id = ?1 ORDER BY origin LIMIT 1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        match remaining {
            Some(other) => {
                self.conn
                    .execute("UPDATE edges SET origin = ?2 WHERE id = ?1", params![id, other])?;
                Ok(false)
            }
            None => {
                self.delete_edge(id)?;
                Ok(true)
            }
        }
    }

    pub fn delete_edge(&self, id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM edges WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Release every edge held by one projection origin. Returns how many
    /// edges were deleted.
    pub fn delete_edges_by_origin(&self, origin: &str) -> Result<usize> {
        let mut deleted = 0;
        for id in self.edge_ids_by_origin(origin)? {
            if self.release_edge(id, origin)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub fn edges_from(&self, id: i64) -> Result<Vec<GraphEdge>> {
        self.edges_where("src_id = ?1", id)
    }

    pub fn edges_to(&self, id: i64) -> Result<Vec<GraphEdge>> {
        self.edges_where("dst_id = ?1", id)
    }

    fn edges_where(&self, clause: &str, id: i64) -> Result<Vec<GraphEdge>> {
        let sql = format!("SELECT {EDGE_COLUMNS} FROM edges WHERE {clause} ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let edges = stmt.query_map([id], row_to_edge)?.collect::<rusqlite::Result<_>>()?;
        Ok(edges)
    }

    /// Per-kind edge counts for a node, outgoing first
    pub fn edge_counts(&self, id: i64) -> Result<Vec<EdgeCount>> {
        let mut counts = Vec::new();
        for (direction, column) in [(Direction::Out, "src_id"), (Direction::In, "dst_id")] {
            let sql = format!("SELECT kind, COUNT(*) FROM edges WHERE {column} = ?1 GROUP BY kind ORDER BY kind");
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map([id], |row| {
                let kind: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((kind, count))
            })?;
            for row in rows {
                let (kind, count) = row?;
                counts.push(EdgeCount {
                    kind: kind.parse()?,
                    direction,
                    count: count as usize,
                });
            }
        }
        Ok(counts)
    }

    // ========== Traversal ==========

    /// Breadth-first neighborhood of `start_id`.
    ///
    /// Depth is clamped to `[1, MAX_DEPTH]`. Each level costs one edge query
    /// over the whole frontier. Every node and edge appears once, in discovery
    /// order. An empty `kinds` slice follows every edge kind.
    pub fn neighbors(
        &self,
        start_id: i64,
        kinds: &[EdgeKind],
        direction: Direction,
        depth: u32,
    ) -> Result<Neighborhood> {
        let start = self
            .get_node(start_id)?
            .ok_or_else(|| Error::NotFound(format!("node {}", start_id)))?;
        let depth = clamp_depth(depth);

        let kinds_json = if kinds.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>())?)
        };

        let mut seen_nodes: HashSet<i64> = HashSet::from([start_id]);
        let mut seen_edges: HashSet<i64> = HashSet::new();
        let mut nodes = vec![start];
        let mut edges = Vec::new();
        let mut frontier = vec![start_id];

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let level_edges = self.edges_touching(&frontier, kinds_json.as_deref(), direction)?;
            let in_frontier: HashSet<i64> = frontier.iter().copied().collect();
            let mut discovered = Vec::new();

            for edge in level_edges {
                if !seen_edges.insert(edge.id) {
                    continue;
                }
                let mut reached = Vec::with_capacity(2);
                if direction != Direction::In && in_frontier.contains(&edge.src_id) {
                    reached.push(edge.dst_id);
                }
                if direction != Direction::Out && in_frontier.contains(&edge.dst_id) {
                    reached.push(edge.src_id);
                }
                for id in reached {
                    if seen_nodes.insert(id) {
                        discovered.push(id);
                    }
                }
                edges.push(edge);
            }

            nodes.extend(self.nodes_in_order(&discovered)?);
            frontier = discovered;
        }

        Ok(Neighborhood {
            start_id,
            depth,
            nodes,
            edges,
        })
    }

    fn edges_touching(&self, frontier: &[i64], kinds_json: Option<&str>, direction: Direction) -> Result<Vec<GraphEdge>> {
        let touch = match direction {
            Direction::Out => "src_id IN (SELECT value FROM json_each(?1))",
            Direction::In => "dst_id IN (SELECT value FROM json_each(?1))",
            Direction::Both => {
                "(src_id IN (SELECT value FROM json_each(?1)) OR dst_id IN (SELECT value FROM json_each(?1)))"
            }
        };
        let sql = format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE {touch} \
             AND (?2 IS NULL OR kind IN (SELECT value FROM json_each(?2))) ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let edges = stmt
            .query_map(params![serde_json::to_string(frontier)?, kinds_json], row_to_edge)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(edges)
    }

    fn nodes_in_order(&self, ids: &[i64]) -> Result<Vec<GraphNode>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id IN (SELECT value FROM json_each(?1))");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut by_id: HashMap<i64, GraphNode> = stmt
            .query_map([serde_json::to_string(ids)?], row_to_node)?
            .map(|r| r.map(|node| (node.id, node)))
            .collect::<rusqlite::Result<_>>()?;
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    // ========== Bulk Operations ==========

    pub fn count_nodes(&self) -> Result<usize> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn count_edges(&self) -> Result<usize> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

fn conversion_error(idx: usize, e: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_json(idx: usize, text: &str) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(text).map_err(|e| conversion_error(idx, e.into()))
}

fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<GraphNode> {
    let kind: String = row.get(1)?;
    let source: String = row.get(4)?;
    let path: Option<String> = row.get(5)?;
    let start: Option<u32> = row.get(6)?;
    let end: Option<u32> = row.get(7)?;
    let metadata: String = row.get(8)?;

    let anchor = match (path, start, end) {
        (Some(path), Some(start), Some(end)) => Some(Anchor::new(path, start, end)),
        _ => None,
    };

    Ok(GraphNode {
        id: row.get(0)?,
        kind: kind.parse::<NodeKind>().map_err(|e| conversion_error(1, e))?,
        key: row.get(2)?,
        label: row.get(3)?,
        source: source.parse::<NodeSource>().map_err(|e| conversion_error(4, e))?,
        anchor,
        metadata: parse_json(8, &metadata)?,
    })
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<GraphEdge> {
    let kind: String = row.get(1)?;
    let locations: String = row.get(4)?;
    let metadata: String = row.get(5)?;
    Ok(GraphEdge {
        id: row.get(0)?,
        kind: kind.parse::<EdgeKind>().map_err(|e| conversion_error(1, e))?,
        src_id: row.get(2)?,
        dst_id: row.get(3)?,
        locations: serde_json::from_str(&locations).map_err(|e| conversion_error(4, e.into()))?,
        metadata: parse_json(5, &metadata)?,
        origin: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;

    fn class(store: &GraphStore, key: &str) -> i64 {
        store
            .upsert_node(
                &NewNode::new(NodeKind::Class, key, NodeSource::FromSource)
                    .with_anchor(Anchor::new(format!("app/models/{}.rb", key.to_lowercase()), 1, 10)),
            )
            .unwrap()
    }

    fn link(store: &GraphStore, kind: EdgeKind, src: i64, dst: i64) -> i64 {
        store.upsert_edge(&NewEdge::new(kind, src, dst).with_origin("test")).unwrap()
    }

    #[test]
    fn test_upsert_node_is_stable() {
        let db = SqliteStore::open_in_memory().unwrap();
        let graph = db.graph();
        let a = class(&graph, "User");
        let b = graph
            .upsert_node(&NewNode::new(NodeKind::Class, "User", NodeSource::FromSource).with_label("Account"))
            .unwrap();
        assert_eq!(a, b);
        let node = graph.get_node(a).unwrap().unwrap();
        assert_eq!(node.label, "Account");
        assert_eq!(node.anchor, None);
        assert_eq!(graph.count_nodes().unwrap(), 1);

        // same key, different kind is a different node
        let table = graph.upsert_node(&NewNode::new(NodeKind::Table, "User", NodeSource::FromSchema)).unwrap();
        assert_ne!(a, table);
    }

    #[test]
    fn test_ensure_node_creates_placeholder() {
        let db = SqliteStore::open_in_memory().unwrap();
        let graph = db.graph();
        let id = graph.ensure_node(NodeKind::Class, "Base").unwrap();
        assert!(graph.get_node(id).unwrap().unwrap().is_inferred());

        let real = class(&graph, "Base");
        assert_eq!(id, real);
        assert!(!graph.get_node(id).unwrap().unwrap().is_inferred());
        assert_eq!(graph.ensure_node(NodeKind::Class, "Base").unwrap(), id);
        assert!(!graph.get_node(id).unwrap().unwrap().is_inferred());
    }

    #[test]
    fn test_upsert_edge_overwrites() {
        let db = SqliteStore::open_in_memory().unwrap();
        let graph = db.graph();
        let user = class(&graph, "User");
        let post = class(&graph, "Post");

        let first = graph
            .upsert_edge(&NewEdge::new(EdgeKind::HasMany, user, post).at("app/models/user.rb:3"))
            .unwrap();
        let second = graph
            .upsert_edge(
                &NewEdge::new(EdgeKind::HasMany, user, post)
                    .at("app/models/user.rb:9")
                    .with_metadata(serde_json::json!({"name": "posts"}))
                    .with_origin("app/models/user.rb"),
            )
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(graph.count_edges().unwrap(), 1);

        let edges = graph.edges_from(user).unwrap();
        assert_eq!(edges[0].locations, vec!["app/models/user.rb:9"]);
        assert_eq!(edges[0].metadata["name"], "posts");
        assert_eq!(graph.edge_ids_by_origin("app/models/user.rb").unwrap(), vec![first]);

        // a different kind between the same nodes is a separate edge
        graph.upsert_edge(&NewEdge::new(EdgeKind::HasOne, user, post)).unwrap();
        assert_eq!(graph.count_edges().unwrap(), 2);
        graph.delete_edge(first).unwrap();
        assert_eq!(graph.count_edges().unwrap(), 1);
    }

    #[test]
    fn test_find_nodes() {
        let db = SqliteStore::open_in_memory().unwrap();
        let graph = db.graph();
        class(&graph, "User");
        class(&graph, "UserProfile");
        class(&graph, "Post");

        let users = graph.find_nodes(Some(NodeKind::Class), Some("user"), 10).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(graph.find_nodes(None, None, 2).unwrap().len(), 2);
        assert!(graph.find_nodes(Some(NodeKind::Table), None, 10).unwrap().is_empty());
        assert!(matches!(graph.find_nodes(None, None, 0), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_neighbors_depth_and_direction() {
        let db = SqliteStore::open_in_memory().unwrap();
        let graph = db.graph();
        let a = class(&graph, "A");
        let b = class(&graph, "B");
        let c = class(&graph, "C");
        let d = class(&graph, "D");
        let e = class(&graph, "E");
        link(&graph, EdgeKind::Inherits, a, b);
        link(&graph, EdgeKind::Inherits, b, c);
        link(&graph, EdgeKind::Inherits, c, d);
        link(&graph, EdgeKind::Inherits, d, e);

        let one = graph.neighbors(a, &[], Direction::Out, 1).unwrap();
        assert_eq!(one.nodes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(one.edges.len(), 1);

        let clamped = graph.neighbors(a, &[], Direction::Out, 10).unwrap();
        assert_eq!(clamped.depth, 3);
        assert_eq!(clamped.nodes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![a, b, c, d]);

        let zero = graph.neighbors(a, &[], Direction::Out, 0).unwrap();
        assert_eq!(zero.depth, 1);
        assert_eq!(zero.nodes.len(), 2);

        let incoming = graph.neighbors(c, &[], Direction::In, 2).unwrap();
        assert_eq!(incoming.nodes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![c, b, a]);

        let both = graph.neighbors(c, &[], Direction::Both, 1).unwrap();
        assert_eq!(both.nodes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![c, b, d]);
    }

    #[test]
    fn test_neighbors_visits_each_once() {
        let db = SqliteStore::open_in_memory().unwrap();
        let graph = db.graph();
        let a = class(&graph, "A");
        let b = class(&graph, "B");
        let c = class(&graph, "C");
        link(&graph, EdgeKind::HasMany, a, b);
        link(&graph, EdgeKind::HasMany, a, c);
        link(&graph, EdgeKind::HasMany, b, c);
        link(&graph, EdgeKind::BelongsTo, c, a);

        let hood = graph.neighbors(a, &[], Direction::Both, 3).unwrap();
        assert_eq!(hood.nodes.len(), 3);
        assert_eq!(hood.edges.len(), 4);

        let only_has_many = graph.neighbors(c, &[EdgeKind::HasMany], Direction::In, 1).unwrap();
        assert_eq!(only_has_many.nodes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![c, a, b]);
        assert!(only_has_many.edges.iter().all(|e| e.kind == EdgeKind::HasMany));
    }

    #[test]
    fn test_neighbors_unknown_start() {
        let db = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(db.graph().neighbors(99, &[], Direction::Out, 1), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_by_origin_and_demote() {
        let db = SqliteStore::open_in_memory().unwrap();
        let graph = db.graph();
        let user = class(&graph, "User");
        let post = class(&graph, "Post");
        graph
            .upsert_edge(&NewEdge::new(EdgeKind::HasMany, user, post).with_origin("app/models/user.rb"))
            .unwrap();
        graph
            .upsert_edge(&NewEdge::new(EdgeKind::BelongsTo, post, user).with_origin("app/models/post.rb"))
            .unwrap();

        assert_eq!(graph.delete_edges_by_origin("app/models/user.rb").unwrap(), 1);
        assert_eq!(graph.count_edges().unwrap(), 1);
        assert!(graph.is_referenced(user).unwrap());

        graph.demote_node(user).unwrap();
        let node = graph.get_node(user).unwrap().unwrap();
        assert!(node.is_inferred());
        assert_eq!(node.anchor, None);

        let counts = graph.edge_counts(user).unwrap();
        assert_eq!(
            counts,
            vec![EdgeCount { kind: EdgeKind::BelongsTo, direction: Direction::In, count: 1 }]
        );
    }

    #[test]
    fn test_edge_lives_until_last_origin_releases() {
        let db = SqliteStore::open_in_memory().unwrap();
        let graph = db.graph();
        let user = class(&graph, "User");
        let searchable = graph.ensure_node(NodeKind::Module, "Searchable").unwrap();
        let include = |origin: &str| {
            graph
                .upsert_edge(&NewEdge::new(EdgeKind::Includes, user, searchable).with_origin(origin))
                .unwrap()
        };

        let id = include("app/models/user.rb");
        assert_eq!(include("lib/ext/user_ext.rb"), id);
        assert_eq!(
            graph.edge_origins(id).unwrap(),
            vec!["app/models/user.rb", "lib/ext/user_ext.rb"]
        );

        assert!(!graph.release_edge(id, "lib/ext/user_ext.rb").unwrap());
        let edge = &graph.edges_from(user).unwrap()[0];
        assert_eq!(edge.origin.as_deref(), Some("app/models/user.rb"));
        assert!(graph.edge_ids_by_origin("lib/ext/user_ext.rb").unwrap().is_empty());

        assert_eq!(graph.delete_edges_by_origin("app/models/user.rb").unwrap(), 1);
        assert_eq!(graph.count_edges().unwrap(), 0);
        assert!(graph.edge_origins(id).unwrap().is_empty());
    }
}
