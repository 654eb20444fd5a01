//! Graph Builder - projects parse results and the schema into the graph
//!
//! Every edge written by a projection records the projection's origin (the
//! file path, or [`SCHEMA_ORIGIN`]); an edge emitted by several files holds
//! all of their origins. Re-projecting a unit upserts what it emits, then
//! releases the edges of its origin that were not emitted again, then handles
//! its old nodes that were not emitted again: a node another file still
//! defines is re-anchored there, otherwise it is deleted or demoted. Ids of
//! re-emitted nodes and edges never change.

pub mod session;

pub use session::BuildSession;

use std::collections::{HashMap, HashSet};
use std::fmt;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::adapter::{Category, ParseResult, ParsedAssociation, ParsedSymbol};
use crate::edge::EdgeKind;
use crate::inflect::{camelize, classify, pluralize, singularize, strip_id_suffix};
use crate::node::{Anchor, GraphNode, NewNode, NodeKind, NodeSource};
use crate::schema::{ParsedSchema, SCHEMA_ORIGIN};
use crate::storage::{GraphStore, NewEdge, SymbolStore};
use crate::symbol::SymbolKind;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectionStats {
    pub nodes: usize,
    pub edges: usize,
    /// Old nodes deleted because nothing referenced them any more
    pub pruned: usize,
    /// Old nodes kept as placeholders because other edges still point at them
    pub demoted: usize,
    /// Old nodes moved to another file that still defines them
    pub reanchored: usize,
}

impl fmt::Display for ProjectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes, {} edges ({} pruned, {} demoted, {} re-anchored)",
            self.nodes, self.edges, self.pruned, self.demoted, self.reanchored
        )
    }
}

pub struct GraphBuilder<'c> {
    graph: GraphStore<'c>,
    symbols: SymbolStore<'c>,
}

impl<'c> GraphBuilder<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            graph: GraphStore::new(conn),
            symbols: SymbolStore::new(conn),
        }
    }

    /// Project one file's parse result, replacing its previous contribution
    pub fn project_file(
        &self,
        session: &mut BuildSession,
        path: &str,
        category: Category,
        result: &ParseResult,
    ) -> Result<ProjectionStats> {
        let previous = self.graph.nodes_anchored_to(path)?;
        let mut unit = Unit::new(self, session, path)?;
        let line_count = result.line_count.unwrap_or(0).max(1);
        let file_id = unit.node(
            NewNode::new(NodeKind::File, path, NodeSource::FromSource)
                .with_anchor(Anchor::new(path, 1, line_count))
                .with_metadata(json!({ "category": category.as_str(), "line_count": line_count })),
        )?;

        let mut primary_container = None;
        let mut primary_class = None;

        for symbol in result.symbols.iter().filter(|s| s.kind.is_projected()) {
            let (kind, key) = match symbol.kind {
                SymbolKind::Class => (NodeKind::Class, symbol.name.clone()),
                SymbolKind::Module => (NodeKind::Module, symbol.name.clone()),
                SymbolKind::Method => (NodeKind::Method, method_key(symbol)),
                _ => continue,
            };

            // only containers already built in this run count as owners
            let enclosing = symbol.enclosing_name.as_deref().and_then(|name| {
                unit.session
                    .lookup(NodeKind::Class, name)
                    .or_else(|| unit.session.lookup(NodeKind::Module, name))
            });

            let id = unit.node(
                NewNode::new(kind, &key, NodeSource::FromSource)
                    .with_anchor(Anchor::new(path, symbol.start_line, symbol.end_line))
                    .with_metadata(symbol_metadata(symbol)),
            )?;
            let location = format!("{}:{}", path, symbol.start_line);

            unit.edge(NewEdge::new(EdgeKind::Defines, file_id, id).at(&location))?;
            if let Some(owner) = enclosing.filter(|owner| *owner != id) {
                unit.edge(NewEdge::new(EdgeKind::Defines, owner, id).at(&location))?;
            }

            match kind {
                NodeKind::Class => {
                    primary_container.get_or_insert(id);
                    primary_class.get_or_insert(id);
                    if let Some(superclass) = &symbol.superclass {
                        let parent = unit.resolve(NodeKind::Class, superclass)?;
                        unit.edge(NewEdge::new(EdgeKind::Inherits, id, parent).at(&location))?;
                    }
                }
                NodeKind::Module => {
                    primary_container.get_or_insert(id);
                }
                _ => {}
            }
        }

        let mixin_owner = primary_container.unwrap_or(file_id);
        for name in &result.includes {
            let module = unit.resolve(NodeKind::Module, name)?;
            unit.edge(NewEdge::new(EdgeKind::Includes, mixin_owner, module))?;
        }
        for name in &result.extends {
            let module = unit.resolve(NodeKind::Module, name)?;
            unit.edge(NewEdge::new(EdgeKind::Extends, mixin_owner, module))?;
        }

        for required in &result.requires {
            let key = unit.require_target(required)?;
            let target = unit.resolve(NodeKind::File, &key)?;
            unit.edge(NewEdge::new(EdgeKind::Requires, file_id, target).with_metadata(json!({ "require": required })))?;
        }
        for relative in &result.require_relatives {
            let target = unit.resolve(NodeKind::File, &resolve_relative(path, relative))?;
            unit.edge(
                NewEdge::new(EdgeKind::Requires, file_id, target)
                    .with_metadata(json!({ "require_relative": relative })),
            )?;
        }

        match primary_class {
            Some(owner) => {
                for association in &result.associations {
                    let target = unit.resolve(NodeKind::Class, &association_target(association))?;
                    let mut edge = NewEdge::new(association.kind.edge_kind(), owner, target).with_metadata(json!({
                        "name": association.name,
                        "options": association.options,
                    }));
                    if let Some(line) = association.line {
                        edge = edge.at(format!("{}:{}", path, line));
                    }
                    unit.edge(edge)?;
                }
            }
            None if !result.associations.is_empty() => {
                debug!("{}: {} associations without an owning class", path, result.associations.len());
            }
            None => {}
        }

        unit.prune(previous)?;
        Ok(unit.stats)
    }

    /// Remove a file's whole contribution (the file is gone)
    pub fn retract_file(&self, session: &mut BuildSession, path: &str) -> Result<ProjectionStats> {
        let previous = self.graph.nodes_anchored_to(path)?;
        let mut unit = Unit::new(self, session, path)?;
        unit.prune(previous)?;
        Ok(unit.stats)
    }

    /// Project the relational schema, replacing the previous schema projection
    pub fn project_schema(&self, session: &mut BuildSession, schema: &ParsedSchema) -> Result<ProjectionStats> {
        let previous = self.graph.nodes_by_source(NodeSource::FromSchema)?;
        let mut unit = Unit::new(self, session, SCHEMA_ORIGIN)?;

        let names = schema.table_names();
        let mut table_ids = HashMap::new();
        for table in &schema.tables {
            let id = unit.node(NewNode::new(NodeKind::Table, &table.name, NodeSource::FromSchema).with_metadata(
                json!({
                    "primary_key": table.primary_key,
                    "comment": table.comment,
                    "columns": table.columns.len(),
                }),
            ))?;
            table_ids.insert(table.name.as_str(), id);
        }

        let mut column_ids = HashMap::new();
        for table in &schema.tables {
            let table_id = table_ids[table.name.as_str()];
            for column in &table.columns {
                let key = format!("{}.{}", table.name, column.name);
                let column_id = unit.node(
                    NewNode::new(NodeKind::Column, &key, NodeSource::FromSchema)
                        .with_label(&column.name)
                        .with_metadata(json!({
                            "table": table.name,
                            "type": column.sql_type,
                            "nullable": column.nullable,
                            "default": column.default,
                            "limit": column.limit,
                            "primary_key": column.primary_key,
                        })),
                )?;
                unit.edge(NewEdge::new(EdgeKind::HasColumn, table_id, column_id))?;

                // naming heuristic, not cross-checked against declared keys
                if let Some(target) = strip_id_suffix(&column.name).and_then(|prefix| infer_table(prefix, &names)) {
                    let target_id = table_ids[target];
                    unit.edge(
                        NewEdge::new(EdgeKind::References, column_id, target_id)
                            .with_metadata(json!({ "explicit": false })),
                    )?;
                }
                column_ids.insert(key, column_id);
            }

            let model = classify(&table.name);
            let class_id = match unit.session.lookup(NodeKind::Class, &model) {
                Some(id) => Some(id),
                None => self.graph.node_id(NodeKind::Class, &model)?,
            };
            if let Some(class_id) = class_id {
                unit.edge(NewEdge::new(EdgeKind::Backs, class_id, table_id))?;
            }
        }

        for fk in &schema.foreign_keys {
            let column = column_ids.get(&format!("{}.{}", fk.from_table, fk.from_column));
            let target = table_ids.get(fk.to_table.as_str());
            let (Some(&column_id), Some(&target_id)) = (column, target) else {
                debug!("skipping foreign key {}.{} -> {}", fk.from_table, fk.from_column, fk.to_table);
                continue;
            };
            unit.edge(NewEdge::new(EdgeKind::References, column_id, target_id).with_metadata(json!({
                "explicit": true,
                "to_column": fk.to_column,
                "on_delete": fk.on_delete,
                "on_update": fk.on_update,
                "name": fk.name,
            })))?;
        }

        for index in &schema.indexes {
            let Some(&table_id) = table_ids.get(index.table.as_str()) else {
                continue;
            };
            let index_id = unit.node(NewNode::new(NodeKind::Index, &index.name, NodeSource::FromSchema).with_metadata(
                json!({
                    "table": index.table,
                    "columns": index.columns,
                    "unique": index.unique,
                    "where": index.where_clause,
                    "using": index.using,
                }),
            ))?;
            unit.edge(NewEdge::new(EdgeKind::HasIndex, table_id, index_id))?;
        }

        unit.prune(previous)?;
        Ok(unit.stats)
    }

    /// Remove the schema projection entirely (the schema file is gone)
    pub fn retract_schema(&self, session: &mut BuildSession) -> Result<ProjectionStats> {
        self.project_schema(session, &ParsedSchema::default())
    }
}

/// Working state of one projection unit
struct Unit<'a, 'c> {
    graph: &'a GraphStore<'c>,
    symbols: &'a SymbolStore<'c>,
    session: &'a mut BuildSession,
    origin: &'a str,
    /// Edges this origin owned before the projection started
    stale_edges: HashSet<i64>,
    touched: HashSet<i64>,
    stats: ProjectionStats,
}

impl<'a, 'c> Unit<'a, 'c> {
    fn new(builder: &'a GraphBuilder<'c>, session: &'a mut BuildSession, origin: &'a str) -> Result<Self> {
        let graph = &builder.graph;
        Ok(Self {
            graph,
            symbols: &builder.symbols,
            session,
            origin,
            stale_edges: graph.edge_ids_by_origin(origin)?.into_iter().collect(),
            touched: HashSet::new(),
            stats: ProjectionStats::default(),
        })
    }

    fn node(&mut self, node: NewNode) -> Result<i64> {
        let id = self.graph.upsert_node(&node)?;
        self.session.record(node.kind, &node.key, id);
        if self.touched.insert(id) {
            self.stats.nodes += 1;
        }
        Ok(id)
    }

    /// Existing node for `(kind, key)`, or a new inferred placeholder
    fn resolve(&mut self, kind: NodeKind, key: &str) -> Result<i64> {
        match self.session.lookup(kind, key) {
            Some(id) => Ok(id),
            None => self.graph.ensure_node(kind, key),
        }
    }

    fn edge(&mut self, edge: NewEdge) -> Result<i64> {
        let id = self.graph.upsert_edge(&edge.with_origin(self.origin))?;
        self.stale_edges.remove(&id);
        self.stats.edges += 1;
        Ok(id)
    }

    /// `require "x"` targets `lib/x.rb` when that file is known, else `x.rb`
    fn require_target(&self, required: &str) -> Result<String> {
        let file = with_rb_suffix(required);
        let in_lib = format!("lib/{}", file);
        let known = self.session.is_built(NodeKind::File, &in_lib)
            || self.graph.node_id(NodeKind::File, &in_lib)?.is_some();
        Ok(if known { in_lib } else { file })
    }

    /// Release edges of this origin that were not emitted again, then
    /// re-anchor, drop or demote previous nodes of this unit that were not
    /// emitted again
    fn prune(&mut self, previous: Vec<GraphNode>) -> Result<()> {
        for id in self.stale_edges.drain() {
            self.graph.release_edge(id, self.origin)?;
        }
        for node in previous {
            if self.touched.contains(&node.id) {
                continue;
            }
            if let Some(definition) = self.defined_elsewhere(&node)? {
                self.graph.upsert_node(&definition)?;
                self.stats.reanchored += 1;
                continue;
            }
            if self.graph.is_referenced(node.id)? {
                self.graph.demote_node(node.id)?;
                self.stats.demoted += 1;
            } else {
                self.graph.delete_node(node.id)?;
                self.stats.pruned += 1;
            }
            self.session.forget(node.kind, &node.key);
        }
        Ok(())
    }

    /// The node as defined by another file whose `defines` edge still reaches
    /// it, rebuilt from that file's stored symbol
    fn defined_elsewhere(&self, node: &GraphNode) -> Result<Option<NewNode>> {
        let Some(symbol_kind) = defining_symbol_kind(node.kind) else {
            return Ok(None);
        };
        for edge in self.graph.edges_to(node.id)? {
            if edge.kind != EdgeKind::Defines {
                continue;
            }
            let Some(file) = self.graph.get_node(edge.src_id)? else {
                continue;
            };
            if file.kind != NodeKind::File || file.key == self.origin {
                continue;
            }
            let Some(line) = edge.locations.iter().find_map(|l| location_line(l)) else {
                continue;
            };

            let stored = self
                .symbols
                .symbols_in_file(&file.key)?
                .into_iter()
                .find(|s| s.kind == symbol_kind && s.start_line == line);
            let mut meta = serde_json::Map::new();
            let anchor = match &stored {
                Some(symbol) => {
                    meta.insert("visibility".into(), json!(symbol.visibility.as_str()));
                    if let Some(signature) = &symbol.signature {
                        meta.insert("signature".into(), json!(signature));
                    }
                    Anchor::new(&file.key, symbol.start_line, symbol.end_line)
                }
                None => Anchor::new(&file.key, line, line),
            };
            if let Some(superclass) = self.superclass_from(node.id, &file.key)? {
                meta.insert("superclass".into(), json!(superclass));
            }
            if node.metadata.get("class_method") == Some(&json!(true)) {
                meta.insert("class_method".into(), json!(true));
            }

            debug!("{}: {} still defined in {}", self.origin, node.display_key(), file.key);
            let mut definition = NewNode::new(node.kind, &node.key, NodeSource::FromSource)
                .with_anchor(anchor)
                .with_metadata(serde_json::Value::Object(meta));
            if node.label != node.key {
                definition = definition.with_label(&node.label);
            }
            return Ok(Some(definition));
        }
        Ok(None)
    }

    /// Superclass named by `path`'s own `inherits` edge from this node
    fn superclass_from(&self, id: i64, path: &str) -> Result<Option<String>> {
        for edge in self.graph.edges_from(id)? {
            if edge.kind != EdgeKind::Inherits || !self.graph.edge_origins(edge.id)?.iter().any(|o| o == path) {
                continue;
            }
            if let Some(parent) = self.graph.get_node(edge.dst_id)? {
                return Ok(Some(parent.key));
            }
        }
        Ok(None)
    }
}

/// Symbol kind whose definition anchors a node of `kind`
fn defining_symbol_kind(kind: NodeKind) -> Option<SymbolKind> {
    match kind {
        NodeKind::Class => Some(SymbolKind::Class),
        NodeKind::Module => Some(SymbolKind::Module),
        NodeKind::Method => Some(SymbolKind::Method),
        NodeKind::File | NodeKind::Table | NodeKind::Column | NodeKind::Index => None,
    }
}

/// Line number of a `path:line` location
fn location_line(location: &str) -> Option<u32> {
    location.rsplit_once(':').and_then(|(_, line)| line.parse().ok())
}

/// `Owner#name` for instance methods, `Owner.name` for class-level ones
fn method_key(symbol: &ParsedSymbol) -> String {
    let name = symbol.bare_name();
    match &symbol.enclosing_name {
        Some(owner) if symbol.is_class_method() => format!("{}.{}", owner, name),
        Some(owner) => format!("{}#{}", owner, name),
        None => name.to_string(),
    }
}

fn symbol_metadata(symbol: &ParsedSymbol) -> serde_json::Value {
    let mut meta = serde_json::Map::new();
    meta.insert("visibility".into(), json!(symbol.visibility.as_str()));
    if let Some(signature) = &symbol.signature {
        meta.insert("signature".into(), json!(signature));
    }
    if let Some(superclass) = &symbol.superclass {
        meta.insert("superclass".into(), json!(superclass));
    }
    if symbol.kind == SymbolKind::Method && symbol.is_class_method() {
        meta.insert("class_method".into(), json!(true));
    }
    serde_json::Value::Object(meta)
}

/// Explicit target, then `class_name`, then naming inference
fn association_target(association: &ParsedAssociation) -> String {
    if let Some(target) = association.target.as_deref().filter(|t| !t.is_empty()) {
        return target.trim_start_matches("::").to_string();
    }
    if let Some(class_name) = association.class_name() {
        return class_name.trim_start_matches("::").to_string();
    }
    if association.kind.edge_kind().is_collection() {
        classify(&association.name)
    } else {
        camelize(&association.name)
    }
}

/// Table a `<prefix>_id` column points at: `pluralize(prefix)` first, else any
/// table whose singular form is the prefix.
fn infer_table<'n>(prefix: &str, names: &'n [String]) -> Option<&'n str> {
    let plural = pluralize(prefix);
    names
        .iter()
        .find(|name| **name == plural)
        .or_else(|| names.iter().find(|name| singularize(name) == prefix))
        .map(String::as_str)
}

fn with_rb_suffix(path: &str) -> String {
    if path.ends_with(".rb") {
        path.to_string()
    } else {
        format!("{}.rb", path)
    }
}

/// Resolve a `require_relative` target against the requiring file's directory
pub fn resolve_relative(from: &str, target: &str) -> String {
    let mut parts: Vec<&str> = from.split('/').collect();
    parts.pop();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    with_rb_suffix(&parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AssociationMacro, ParsedSymbol};
    use crate::graph::Direction;
    use crate::schema::parse_schema;
    use crate::storage::SqliteStore;
    use crate::symbol::Symbol;

    fn class_file(name: &str, superclass: Option<&str>, end: u32) -> ParseResult {
        let mut class = ParsedSymbol::new(SymbolKind::Class, name, 1, end);
        if let Some(parent) = superclass {
            class = class.with_superclass(parent);
        }
        let mut result = ParseResult::new();
        result.line_count = Some(end);
        result.add_symbol(class);
        result
    }

    fn user_file() -> ParseResult {
        let mut result = class_file("User", Some("ApplicationRecord"), 20);
        result.add_symbol(ParsedSymbol::new(SymbolKind::Method, "full_name", 3, 5).within("User"));
        result.add_symbol(ParsedSymbol::new(SymbolKind::Method, "self.find_by_email", 7, 9).within("User"));
        result.add_symbol(ParsedSymbol::new(SymbolKind::Scope, "active", 11, 11).within("User"));
        result.includes.push("Searchable".into());
        result.associations.push(ParsedAssociation {
            kind: AssociationMacro::HasMany,
            name: "posts".into(),
            target: None,
            options: serde_json::Map::new(),
            line: Some(2),
        });
        result
    }

    #[test]
    fn test_placeholder_resolves_to_later_definition() {
        let db = SqliteStore::open_in_memory().unwrap();
        let builder = GraphBuilder::new(db.conn());
        let graph = db.graph();
        let mut session = BuildSession::new();

        builder
            .project_file(&mut session, "app/models/child.rb", Category::Model, &class_file("Child", Some("Base"), 3))
            .unwrap();
        session.commit();
        let placeholder = graph.find_node(NodeKind::Class, "Base").unwrap().unwrap();
        assert!(placeholder.is_inferred());
        assert_eq!(placeholder.anchor, None);

        builder
            .project_file(&mut session, "app/models/base.rb", Category::Model, &class_file("Base", None, 5))
            .unwrap();
        session.commit();

        let bases = graph.find_nodes(Some(NodeKind::Class), Some("Base"), 10).unwrap();
        assert_eq!(bases.len(), 1);
        let base = &bases[0];
        assert_eq!(base.id, placeholder.id);
        assert!(!base.is_inferred());
        assert_eq!(base.anchor, Some(Anchor::new("app/models/base.rb", 1, 5)));

        let child = graph.find_node(NodeKind::Class, "Child").unwrap().unwrap();
        let inherits: Vec<_> = graph
            .edges_from(child.id)
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EdgeKind::Inherits)
            .collect();
        assert_eq!(inherits.len(), 1);
        assert_eq!(inherits[0].dst_id, base.id);
    }

    #[test]
    fn test_file_projection_shape() {
        let db = SqliteStore::open_in_memory().unwrap();
        let builder = GraphBuilder::new(db.conn());
        let graph = db.graph();
        let mut session = BuildSession::new();
        builder
            .project_file(&mut session, "app/models/user.rb", Category::Model, &user_file())
            .unwrap();

        assert!(graph.find_node(NodeKind::Method, "User#full_name").unwrap().is_some());
        assert!(graph.find_node(NodeKind::Method, "User.find_by_email").unwrap().is_some());
        // scopes stay relational-only
        assert!(graph.find_nodes(None, Some("active"), 10).unwrap().is_empty());

        let user = graph.find_node(NodeKind::Class, "User").unwrap().unwrap();
        let out = graph.neighbors(user.id, &[], Direction::Out, 1).unwrap();
        let keys: Vec<_> = out.nodes.iter().map(|n| n.display_key()).collect();
        assert!(keys.contains(&"class:ApplicationRecord".to_string()));
        assert!(keys.contains(&"method:User#full_name".to_string()));
        assert!(keys.contains(&"module:Searchable".to_string()));
        assert!(keys.contains(&"class:Post".to_string()));

        let has_many = graph
            .edges_from(user.id)
            .unwrap()
            .into_iter()
            .find(|e| e.kind == EdgeKind::HasMany)
            .unwrap();
        assert_eq!(has_many.metadata["name"], "posts");
        assert_eq!(has_many.locations, vec!["app/models/user.rb:2"]);
        assert_eq!(has_many.origin.as_deref(), Some("app/models/user.rb"));
    }

    #[test]
    fn test_reprojection_is_idempotent() {
        let db = SqliteStore::open_in_memory().unwrap();
        let builder = GraphBuilder::new(db.conn());
        let graph = db.graph();
        let mut session = BuildSession::new();

        builder
            .project_file(&mut session, "app/models/user.rb", Category::Model, &user_file())
            .unwrap();
        let nodes = graph.find_nodes(None, None, 200).unwrap();
        let edges = graph.count_edges().unwrap();

        let stats = builder
            .project_file(&mut session, "app/models/user.rb", Category::Model, &user_file())
            .unwrap();
        assert_eq!(stats.pruned, 0);
        assert_eq!(graph.find_nodes(None, None, 200).unwrap(), nodes);
        assert_eq!(graph.count_edges().unwrap(), edges);
    }

    #[test]
    fn test_reprojection_prunes_and_demotes() {
        let db = SqliteStore::open_in_memory().unwrap();
        let builder = GraphBuilder::new(db.conn());
        let graph = db.graph();
        let mut session = BuildSession::new();

        builder
            .project_file(&mut session, "app/models/base.rb", Category::Model, &{
                let mut r = class_file("Base", None, 9);
                r.add_symbol(ParsedSymbol::new(SymbolKind::Method, "touch", 2, 4).within("Base"));
                r
            })
            .unwrap();
        builder
            .project_file(&mut session, "app/models/child.rb", Category::Model, &class_file("Child", Some("Base"), 3))
            .unwrap();
        let base_id = graph.node_id(NodeKind::Class, "Base").unwrap().unwrap();

        let stats = builder
            .project_file(&mut session, "app/models/base.rb", Category::Model, &ParseResult::new())
            .unwrap();
        assert_eq!(stats.pruned, 1);
        assert_eq!(stats.demoted, 1);
        assert!(graph.find_node(NodeKind::Method, "Base#touch").unwrap().is_none());

        let base = graph.get_node(base_id).unwrap().unwrap();
        assert!(base.is_inferred());
        assert_eq!(base.anchor, None);
    }

    #[test]
    fn test_reopened_class_moves_to_remaining_definition() {
        let db = SqliteStore::open_in_memory().unwrap();
        let builder = GraphBuilder::new(db.conn());
        let graph = db.graph();
        let symbols = SymbolStore::new(db.conn());
        let mut session = BuildSession::new();
        let reopen = |end: u32| {
            let mut result = class_file("User", None, end);
            result.includes.push("Comparable".into());
            result
        };

        let model = symbols
            .upsert_file("app/models/user.rb", "f1", Category::Model, 8, None)
            .unwrap();
        symbols
            .replace_symbols(
                model,
                &[Symbol::new("app/models/user.rb", SymbolKind::Class, "User", 1, 8).with_signature("class User")],
            )
            .unwrap();
        builder
            .project_file(&mut session, "app/models/user.rb", Category::Model, &reopen(8))
            .unwrap();
        builder
            .project_file(&mut session, "lib/ext/user_ext.rb", Category::Other, &reopen(3))
            .unwrap();
        let user = graph.find_node(NodeKind::Class, "User").unwrap().unwrap();
        assert_eq!(user.anchor, Some(Anchor::new("lib/ext/user_ext.rb", 1, 3)));

        let stats = builder
            .project_file(&mut session, "lib/ext/user_ext.rb", Category::Other, &ParseResult::new())
            .unwrap();
        assert_eq!(stats.reanchored, 1);
        assert_eq!(stats.demoted, 0);

        let moved = graph.get_node(user.id).unwrap().unwrap();
        assert!(!moved.is_inferred());
        assert_eq!(moved.anchor, Some(Anchor::new("app/models/user.rb", 1, 8)));
        assert_eq!(moved.metadata["signature"], "class User");

        // the model file still includes Comparable
        let includes: Vec<_> = graph
            .edges_from(user.id)
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EdgeKind::Includes)
            .collect();
        assert_eq!(includes.len(), 1);
        assert_eq!(graph.edge_origins(includes[0].id).unwrap(), vec!["app/models/user.rb"]);
        assert_eq!(includes[0].origin.as_deref(), Some("app/models/user.rb"));
    }

    #[test]
    fn test_retract_file() {
        let db = SqliteStore::open_in_memory().unwrap();
        let builder = GraphBuilder::new(db.conn());
        let graph = db.graph();
        let mut session = BuildSession::new();
        builder
            .project_file(&mut session, "app/models/user.rb", Category::Model, &user_file())
            .unwrap();
        builder.retract_file(&mut session, "app/models/user.rb").unwrap();

        assert_eq!(graph.count_edges().unwrap(), 0);
        assert!(graph.find_node(NodeKind::File, "app/models/user.rb").unwrap().is_none());
        assert!(graph.find_node(NodeKind::Class, "User").unwrap().is_none());
        assert!(!session.is_built(NodeKind::Class, "User"));
    }

    #[test]
    fn test_requires() {
        let db = SqliteStore::open_in_memory().unwrap();
        let builder = GraphBuilder::new(db.conn());
        let graph = db.graph();
        let mut session = BuildSession::new();

        let mut helper = ParseResult::new();
        helper.line_count = Some(1);
        builder
            .project_file(&mut session, "lib/tools/helper.rb", Category::Other, &helper)
            .unwrap();

        let mut result = ParseResult::new();
        result.requires.push("tools/helper".into());
        result.require_relatives.push("../lib/util".into());
        builder.project_file(&mut session, "app/runner.rb", Category::Other, &result).unwrap();

        let runner = graph.find_node(NodeKind::File, "app/runner.rb").unwrap().unwrap();
        let targets: Vec<_> = graph
            .edges_from(runner.id)
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EdgeKind::Requires)
            .map(|e| graph.get_node(e.dst_id).unwrap().unwrap())
            .collect();
        assert_eq!(targets[0].key, "lib/tools/helper.rb");
        assert!(!targets[0].is_inferred());
        assert_eq!(targets[1].key, "lib/util.rb");
        assert!(targets[1].is_inferred());
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve_relative("app/models/user.rb", "concerns/searchable"), "app/models/concerns/searchable.rb");
        assert_eq!(resolve_relative("app/models/user.rb", "../lib/x.rb"), "app/lib/x.rb");
        assert_eq!(resolve_relative("main.rb", "./lib/boot"), "lib/boot.rb");
    }

    #[test]
    fn test_association_target_inference() {
        let mut association = ParsedAssociation {
            kind: AssociationMacro::HasMany,
            name: "order_items".into(),
            target: None,
            options: serde_json::Map::new(),
            line: None,
        };
        assert_eq!(association_target(&association), "OrderItem");
        association.kind = AssociationMacro::BelongsTo;
        association.name = "author".into();
        assert_eq!(association_target(&association), "Author");
        association.options.insert("class_name".into(), json!("User"));
        assert_eq!(association_target(&association), "User");
    }

    const SCHEMA: &str = r#"
ActiveRecord::Schema[7.1].define(version: 2024_01_01_000000) do
  create_table "users", force: :cascade do |t|
    t.string "email", null: false, limit: 255
    t.timestamps
  end

  create_table "posts", force: :cascade do |t|
    t.bigint "user_id", null: false
    t.string "title"
  end

  add_index "users", ["email"], unique: true
  add_foreign_key "posts", "users"
end
"#;

    #[test]
    fn test_schema_projection() {
        let db = SqliteStore::open_in_memory().unwrap();
        let builder = GraphBuilder::new(db.conn());
        let graph = db.graph();
        let mut session = BuildSession::new();

        builder
            .project_file(&mut session, "app/models/user.rb", Category::Model, &class_file("User", None, 3))
            .unwrap();
        let schema = parse_schema(SCHEMA);
        builder.project_schema(&mut session, &schema).unwrap();

        let users = graph.find_node(NodeKind::Table, "users").unwrap().unwrap();
        let posts = graph.find_node(NodeKind::Table, "posts").unwrap().unwrap();
        let user_id = graph.find_node(NodeKind::Column, "posts.user_id").unwrap().unwrap();
        assert_eq!(user_id.label, "user_id");

        let references: Vec<_> = graph
            .edges_from(user_id.id)
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EdgeKind::References)
            .collect();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].dst_id, users.id);
        assert_eq!(references[0].metadata["explicit"], true);

        let user_class = graph.find_node(NodeKind::Class, "User").unwrap().unwrap();
        let backs = graph.edges_from(user_class.id).unwrap();
        assert!(backs.iter().any(|e| e.kind == EdgeKind::Backs && e.dst_id == users.id));
        assert!(!graph.edges_from(posts.id).unwrap().iter().any(|e| e.kind == EdgeKind::Backs));

        let index = graph.find_node(NodeKind::Index, "index_users_on_email").unwrap().unwrap();
        assert!(graph.edges_to(index.id).unwrap().iter().any(|e| e.kind == EdgeKind::HasIndex && e.src_id == users.id));

        // rebuilding keeps ids, retracting removes schema nodes
        builder.project_schema(&mut session, &schema).unwrap();
        assert_eq!(graph.find_node(NodeKind::Table, "users").unwrap().unwrap().id, users.id);
        builder.retract_schema(&mut session).unwrap();
        assert!(graph.find_node(NodeKind::Table, "users").unwrap().is_none());
        assert!(graph.find_node(NodeKind::Class, "User").unwrap().is_some());
    }

    #[test]
    fn test_infer_table() {
        let names = vec!["users".to_string(), "people".to_string(), "categories".to_string()];
        assert_eq!(infer_table("user", &names), Some("users"));
        assert_eq!(infer_table("category", &names), Some("categories"));
        assert_eq!(infer_table("person", &names), None);
    }
}
