//! Query engine implementation
//!
//! Read-side operations over a built index:
//! - Ranked symbol search and source snippets
//! - Test file lookup by naming convention
//! - Per-file summaries and structurally similar files
//! - Schema tables with suggested associations and validations
//! - Graph node search, traversal and explanation

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::adapter::Category;
use crate::associations::{Association, ValidationSuggestion, generate_associations, suggest_validations};
use crate::edge::EdgeKind;
use crate::graph::{Direction, Neighborhood};
use crate::inflect::{classify, pluralize};
use crate::node::{GraphNode, NodeKind};
use crate::schema::{ForeignKey, SchemaIndex, SchemaTable};
use crate::storage::sqlite::{META_SCHEMA_ERROR, META_SCHEMA_FINGERPRINT};
use crate::storage::symbols::build_fts_query;
use crate::storage::{DbStats, EdgeCount, FileRecord, SqliteStore, TableSummary};
use crate::symbol::{Symbol, SymbolKind};
use crate::{Error, Result};

/// Longest slice `snippet` returns
pub const MAX_SNIPPET_LINES: u32 = 400;
/// Hard cap on search results
pub const MAX_SEARCH_RESULTS: usize = 100;

/// FTS candidates fetched per requested hit, before re-scoring
const CANDIDATE_FACTOR: usize = 5;

/// A ranked search hit
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub symbol: Symbol,
    pub category: Category,
    pub score: i64,
    /// Raw bm25 rank (lower is better)
    pub rank: f64,
}

/// A numbered slice of a source file
#[derive(Debug, Clone, Serialize)]
pub struct Snippet {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub total_lines: u32,
    pub truncated: bool,
    pub text: String,
    /// Symbol the snippet was resolved from, if any
    pub symbol: Option<Symbol>,
    /// Other definitions with the same name, as `path:line`
    pub alternatives: Vec<String>,
}

/// What one indexed file holds
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub file: FileRecord,
    /// Symbols keyed by kind, each list in line order
    pub symbols: BTreeMap<String, Vec<Symbol>>,
    /// Files this one requires
    pub requires: Vec<String>,
    pub required_by: Vec<String>,
}

/// A file sharing structure with the queried one
#[derive(Debug, Clone, Serialize)]
pub struct SimilarFile {
    pub path: String,
    pub category: Category,
    /// Jaccard similarity of the two feature sets, in `[0, 1]`
    pub similarity: f64,
    pub shared: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDescription {
    pub table: SchemaTable,
    pub indexes: Vec<SchemaIndex>,
    /// Foreign keys declared on this table
    pub references: Vec<ForeignKey>,
    /// Foreign keys on other tables pointing here
    pub referenced_by: Vec<ForeignKey>,
    pub model: String,
    /// Where the model class is defined, when indexed
    pub model_path: Option<String>,
}

/// A follow-up query worth running after `explain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextAction {
    pub action: String,
    pub target: String,
    pub reason: String,
}

impl NextAction {
    fn new(action: &str, target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            target: target.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeExplanation {
    pub node: GraphNode,
    pub edge_counts: Vec<EdgeCount>,
    /// Direct neighbors, one hop in either direction
    pub neighbors: Vec<GraphNode>,
    pub next_actions: Vec<NextAction>,
    /// Set on schema nodes while the schema file no longer parses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub root: String,
    #[serde(flatten)]
    pub stats: DbStats,
    pub schema_indexed: bool,
    /// Last schema parse failure; the stored tables predate it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_error: Option<String>,
}

/// Query engine for index lookups
pub struct QueryEngine<'a> {
    store: &'a SqliteStore,
    root: PathBuf,
}

impl<'a> QueryEngine<'a> {
    /// `root` is the indexed source tree, used to read snippets and probe for tests
    pub fn new(store: &'a SqliteStore, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    // ========== Symbols ==========

    /// Full-text symbol search, re-scored toward name and path matches.
    ///
    /// Terms are OR-ed. Hits with equal scores keep their bm25 order.
    pub fn search_symbols(&self, query: &str, categories: &[Category], limit: usize) -> Result<Vec<SearchHit>> {
        let fts = build_fts_query(query).ok_or_else(|| Error::InvalidQuery("empty search query".into()))?;
        let limit = result_limit(limit)?;

        let candidates = self
            .store
            .symbols()
            .search(&fts, categories, &[], limit * CANDIDATE_FACTOR)?;
        debug!("{} candidates for {:?}", candidates.len(), fts);

        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        let whole = query.trim().to_lowercase();

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .map(|hit| SearchHit {
                score: score(&hit.symbol, hit.category, &terms, &whole),
                symbol: hit.symbol,
                category: hit.category,
                rank: hit.rank,
            })
            .collect();
        hits.sort_by(|a, b| b.score.cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Lines `start..=end` of `path` (to the end of the file when `end` is
    /// None), capped at [`MAX_SNIPPET_LINES`].
    pub fn snippet(&self, path: &str, start: u32, end: Option<u32>) -> Result<Snippet> {
        let content = self.read_source(path)?;
        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len() as u32;
        let start = start.max(1);

        if total == 0 {
            return Ok(Snippet {
                path: path.to_string(),
                start_line: 1,
                end_line: 0,
                total_lines: 0,
                truncated: false,
                text: String::new(),
                symbol: None,
                alternatives: Vec::new(),
            });
        }
        if start > total {
            return Err(Error::InvalidQuery(format!(
                "line {} is past the end of {} ({} lines)",
                start, path, total
            )));
        }

        let requested_end = end.unwrap_or(total).min(total);
        if requested_end < start {
            return Err(Error::InvalidQuery(format!("empty range {}..{}", start, requested_end)));
        }
        let capped_end = requested_end.min(start + MAX_SNIPPET_LINES - 1);

        let text = (start..=capped_end)
            .map(|n| format!("{:>5}  {}", n, lines[(n - 1) as usize]))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Snippet {
            path: path.to_string(),
            start_line: start,
            end_line: capped_end,
            total_lines: total,
            truncated: capped_end < requested_end,
            text,
            symbol: None,
            alternatives: Vec::new(),
        })
    }

    /// Snippet covering a symbol's definition.
    ///
    /// `name` may be qualified as `Owner#method`. With several definitions the
    /// first one (by path, then line) is shown and the rest are listed.
    pub fn snippet_for_symbol(&self, name: &str, path: Option<&str>) -> Result<Snippet> {
        let (owner, bare) = match name.split_once('#') {
            Some((owner, method)) => (Some(owner), method),
            None => (None, name),
        };

        let matches: Vec<Symbol> = self
            .store
            .symbols()
            .find_symbols(bare, None)?
            .into_iter()
            .filter(|s| path.is_none_or(|p| s.path == p))
            .filter(|s| owner.is_none_or(|o| s.enclosing_name.as_deref() == Some(o)))
            .collect();

        let Some((symbol, rest)) = matches.split_first() else {
            return Err(Error::NotFound(format!("symbol {}", name)));
        };

        let mut snippet = self.snippet(&symbol.path, symbol.start_line, Some(symbol.end_line))?;
        snippet.alternatives = rest.iter().map(|s| format!("{}:{}", s.path, s.start_line)).collect();
        snippet.symbol = Some(symbol.clone());
        Ok(snippet)
    }

    /// Existing test files for an implementation file, by naming convention
    pub fn find_tests(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize(path)?;
        let Some(stem) = path.strip_suffix(".rb") else {
            return Ok(Vec::new());
        };
        if Category::classify(&path) == Category::Spec {
            return Ok(Vec::new());
        }

        let relative = stem.strip_prefix("app/").unwrap_or(stem);
        let file_stem = stem.rsplit('/').next().unwrap_or(stem);

        let mut candidates = vec![
            format!("spec/{}_spec.rb", relative),
            format!("test/{}_test.rb", relative),
        ];
        match Category::classify(&path) {
            Category::Model => {
                let plural = pluralize(file_stem);
                candidates.push(format!("spec/requests/{}_spec.rb", plural));
                candidates.push(format!("spec/integration/{}_spec.rb", plural));
            }
            Category::Controller => {
                if let Some(resource) = file_stem.strip_suffix("_controller") {
                    candidates.push(format!("spec/requests/{}_spec.rb", resource));
                    candidates.push(format!("test/integration/{}_test.rb", resource));
                }
            }
            _ => {}
        }

        let mut seen = HashSet::new();
        Ok(candidates
            .into_iter()
            .filter(|c| seen.insert(c.clone()))
            .filter(|c| self.root.join(c).is_file())
            .collect())
    }

    // ========== Files ==========

    pub fn file_summary(&self, path: &str) -> Result<FileSummary> {
        let path = normalize(path)?;
        let symbols = self.store.symbols();
        let file = symbols
            .get_file(&path)?
            .ok_or_else(|| Error::NotFound(format!("indexed file {}", path)))?;

        let mut grouped: BTreeMap<String, Vec<Symbol>> = BTreeMap::new();
        for symbol in symbols.symbols_in_file(&path)? {
            grouped.entry(symbol.kind.as_str().to_string()).or_default().push(symbol);
        }

        let graph = self.store.graph();
        let mut requires = Vec::new();
        let mut required_by = Vec::new();
        if let Some(id) = graph.node_id(NodeKind::File, &path)? {
            for edge in graph.edges_from(id)?.into_iter().filter(|e| e.kind == EdgeKind::Requires) {
                if let Some(node) = graph.get_node(edge.dst_id)? {
                    requires.push(node.key);
                }
            }
            for edge in graph.edges_to(id)?.into_iter().filter(|e| e.kind == EdgeKind::Requires) {
                if let Some(node) = graph.get_node(edge.src_id)? {
                    required_by.push(node.key);
                }
            }
        }
        requires.sort();
        required_by.sort();

        Ok(FileSummary {
            file,
            symbols: grouped,
            requires,
            required_by,
        })
    }

    /// Files whose symbol features overlap `path`'s by at least `min_similarity`.
    ///
    /// Features are `kind:name` pairs of the non-container symbols, so two
    /// models declaring the same associations and methods compare as similar
    /// whatever their class names.
    pub fn similar_files(&self, path: &str, limit: usize, min_similarity: f64) -> Result<Vec<SimilarFile>> {
        let limit = result_limit(limit)?;
        if !(0.0..=1.0).contains(&min_similarity) {
            return Err(Error::InvalidQuery(format!(
                "similarity threshold must be between 0 and 1, got {}",
                min_similarity
            )));
        }
        let path = normalize(path)?;
        let symbols = self.store.symbols();
        if symbols.get_file(&path)?.is_none() {
            return Err(Error::NotFound(format!("indexed file {}", path)));
        }

        let target = features(&symbols.symbols_in_file(&path)?);
        if target.is_empty() {
            return Ok(Vec::new());
        }

        let mut similar = Vec::new();
        for file in symbols.list_files()? {
            if file.path == path {
                continue;
            }
            let other = features(&symbols.symbols_in_file(&file.path)?);
            let shared: Vec<String> = target.intersection(&other).cloned().collect();
            let union = target.union(&other).count();
            let similarity = shared.len() as f64 / union as f64;
            if !shared.is_empty() && similarity >= min_similarity {
                similar.push(SimilarFile {
                    path: file.path,
                    category: file.category,
                    similarity,
                    shared,
                });
            }
        }

        // list_files is path-ordered, so ties stay alphabetical
        similar.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        similar.truncate(limit);
        Ok(similar)
    }

    // ========== Schema ==========

    pub fn list_tables(&self) -> Result<Vec<TableSummary>> {
        self.store.tables().list_tables()
    }

    pub fn describe_table(&self, name: &str) -> Result<TableDescription> {
        let tables = self.store.tables();
        let table = tables
            .table(name)?
            .ok_or_else(|| Error::NotFound(format!("table {}", name)))?;
        let indexes = tables.indexes(Some(name))?;
        let (references, referenced_by): (Vec<_>, Vec<_>) = tables
            .foreign_keys()?
            .into_iter()
            .filter(|fk| fk.from_table == name || fk.to_table == name)
            .partition(|fk| fk.from_table == name);

        let model = classify(name);
        let model_path = self
            .store
            .graph()
            .find_node(NodeKind::Class, &model)?
            .and_then(|node| node.anchor)
            .map(|anchor| anchor.path);

        Ok(TableDescription {
            table,
            indexes,
            references,
            referenced_by,
            model,
            model_path,
        })
    }

    pub fn suggest_associations(&self, table: &str) -> Result<Vec<Association>> {
        let tables = self.store.tables();
        let names = tables.table_names()?;
        if !names.iter().any(|n| n == table) {
            return Err(Error::NotFound(format!("table {}", table)));
        }
        let foreign_keys = tables.foreign_keys()?;
        let indexes = tables.indexes(None)?;
        Ok(generate_associations(table, &foreign_keys, &names, &indexes))
    }

    pub fn suggest_validations(&self, table: &str) -> Result<Vec<ValidationSuggestion>> {
        let tables = self.store.tables();
        let schema_table = tables
            .table(table)?
            .ok_or_else(|| Error::NotFound(format!("table {}", table)))?;
        let indexes = tables.indexes(Some(table))?;
        Ok(suggest_validations(&schema_table, &indexes))
    }

    // ========== Graph ==========

    pub fn find_nodes(&self, kind: Option<NodeKind>, filter: Option<&str>, limit: usize) -> Result<Vec<GraphNode>> {
        self.store.graph().find_nodes(kind, filter, limit)
    }

    /// Resolve a node reference: a numeric id, `kind:key`, or a bare key that
    /// names exactly one node.
    pub fn resolve_node(&self, reference: &str) -> Result<GraphNode> {
        let graph = self.store.graph();
        let reference = reference.trim();

        if let Ok(id) = reference.parse::<i64>() {
            return graph
                .get_node(id)?
                .ok_or_else(|| Error::NotFound(format!("node {}", id)));
        }
        if let Some((kind, key)) = reference.split_once(':') {
            if let Ok(kind) = kind.parse::<NodeKind>() {
                return graph
                    .find_node(kind, key)?
                    .ok_or_else(|| Error::NotFound(format!("{} {}", kind, key)));
            }
        }

        let mut found = Vec::new();
        for kind in NodeKind::all() {
            if let Some(node) = graph.find_node(*kind, reference)? {
                found.push(node);
            }
        }
        match found.len() {
            0 => Err(Error::NotFound(format!("node {}", reference))),
            1 => Ok(found.remove(0)),
            _ => {
                let kinds: Vec<&str> = found.iter().map(|n| n.kind.as_str()).collect();
                Err(Error::InvalidQuery(format!(
                    "{} is ambiguous ({}); use kind:key",
                    reference,
                    kinds.join(", ")
                )))
            }
        }
    }

    pub fn neighbors(&self, reference: &str, kinds: &[EdgeKind], direction: Direction, depth: u32) -> Result<Neighborhood> {
        let start = self.resolve_node(reference)?;
        self.store.graph().neighbors(start.id, kinds, direction, depth)
    }

    /// Node detail with edge counts, direct neighbors and suggested follow-ups
    pub fn explain_node(&self, reference: &str) -> Result<NodeExplanation> {
        let node = self.resolve_node(reference)?;
        let graph = self.store.graph();
        let edge_counts = graph.edge_counts(node.id)?;
        let hood = graph.neighbors(node.id, &[], Direction::Both, 1)?;
        let neighbors: Vec<GraphNode> = hood.nodes.into_iter().filter(|n| n.id != node.id).collect();
        let next_actions = next_actions(&node, &edge_counts, &neighbors);
        let schema_error = match node.kind {
            NodeKind::Table | NodeKind::Column | NodeKind::Index => self.store.get_meta(META_SCHEMA_ERROR)?,
            _ => None,
        };

        Ok(NodeExplanation {
            node,
            edge_counts,
            neighbors,
            next_actions,
            schema_error,
        })
    }

    // ========== Status ==========

    pub fn status(&self) -> Result<IndexStatus> {
        Ok(IndexStatus {
            root: self.root.display().to_string(),
            stats: self.store.stats()?,
            schema_indexed: self.store.get_meta(META_SCHEMA_FINGERPRINT)?.is_some(),
            schema_error: self.store.get_meta(META_SCHEMA_ERROR)?,
        })
    }

    fn read_source(&self, path: &str) -> Result<String> {
        let path = normalize(path)?;
        let absolute = self.root.join(&path);
        if !absolute.is_file() {
            return Err(Error::NotFound(format!("file {}", path)));
        }
        let bytes = std::fs::read(&absolute)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Zero is rejected like `find_nodes` does, large limits are capped
fn result_limit(limit: usize) -> Result<usize> {
    if limit == 0 {
        return Err(Error::InvalidQuery("limit must be at least 1".into()));
    }
    Ok(limit.min(MAX_SEARCH_RESULTS))
}

fn score(symbol: &Symbol, category: Category, terms: &[String], whole: &str) -> i64 {
    let name = symbol.name.to_lowercase();
    let path = symbol.path.to_lowercase();
    let mut score = 0;

    for term in terms {
        if name.contains(term.as_str()) {
            score += 10;
        }
        if path.contains(term.as_str()) {
            score += 5;
        }
    }
    if !whole.is_empty() && name.contains(whole) {
        score += 20;
    }
    score += match category {
        Category::Model => 3,
        Category::Controller => 2,
        _ => 0,
    };
    score
}

fn features(symbols: &[Symbol]) -> BTreeSet<String> {
    symbols
        .iter()
        .filter(|s| !matches!(s.kind, SymbolKind::Class | SymbolKind::Module))
        .map(|s| format!("{}:{}", s.kind, s.name))
        .collect()
}

/// Relative, `/`-separated, and never leaving the root
fn normalize(path: &str) -> Result<String> {
    let candidate = Path::new(path);
    let mut parts = Vec::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(Error::InvalidQuery(format!("path must stay inside the root: {}", path))),
        }
    }
    if parts.is_empty() {
        return Err(Error::InvalidQuery("empty path".into()));
    }
    Ok(parts.join("/"))
}

fn count_of(counts: &[EdgeCount], kind: EdgeKind, direction: Direction) -> usize {
    counts
        .iter()
        .filter(|c| c.kind == kind && c.direction == direction)
        .map(|c| c.count)
        .sum()
}

fn next_actions(node: &GraphNode, counts: &[EdgeCount], neighbors: &[GraphNode]) -> Vec<NextAction> {
    let mut actions = Vec::new();

    if node.is_inferred() {
        actions.push(NextAction::new(
            "search",
            node.label.clone(),
            "only referenced so far; its definition is not indexed",
        ));
    }
    if let Some(anchor) = &node.anchor {
        actions.push(NextAction::new(
            "snippet",
            format!("{}:{}-{}", anchor.path, anchor.start_line, anchor.end_line),
            "read the definition",
        ));
    }

    match node.kind {
        NodeKind::Class | NodeKind::Module | NodeKind::File => {
            if let Some(anchor) = &node.anchor {
                actions.push(NextAction::new("tests", anchor.path.clone(), "find covering tests"));
            }
            for table in neighbors.iter().filter(|n| n.kind == NodeKind::Table) {
                if count_of(counts, EdgeKind::Backs, Direction::Out) > 0 {
                    actions.push(NextAction::new("table", table.key.clone(), "backing table columns"));
                }
            }
            let associations: usize = counts
                .iter()
                .filter(|c| c.kind.is_association())
                .map(|c| c.count)
                .sum();
            if associations > 0 {
                actions.push(NextAction::new(
                    "neighbors",
                    format!("{}:{}", node.kind, node.key),
                    format!("{} association edges", associations),
                ));
            }
            let subclasses = count_of(counts, EdgeKind::Inherits, Direction::In);
            if subclasses > 0 {
                actions.push(NextAction::new(
                    "neighbors",
                    format!("{}:{}", node.kind, node.key),
                    format!("{} subclasses", subclasses),
                ));
            }
        }
        NodeKind::Table => {
            actions.push(NextAction::new("table", node.key.clone(), "columns and indexes"));
            actions.push(NextAction::new("associations", node.key.clone(), "inferred associations"));
            actions.push(NextAction::new("validations", node.key.clone(), "suggested validations"));
            for model in neighbors.iter().filter(|n| n.kind == NodeKind::Class) {
                actions.push(NextAction::new(
                    "explain",
                    format!("class:{}", model.key),
                    "model backed by this table",
                ));
            }
        }
        NodeKind::Column | NodeKind::Index => {
            let table = node.key.split('.').next().unwrap_or(&node.key);
            for owner in neighbors.iter().filter(|n| n.kind == NodeKind::Table) {
                actions.push(NextAction::new("table", owner.key.clone(), "owning table"));
            }
            if node.kind == NodeKind::Column && count_of(counts, EdgeKind::References, Direction::Out) > 0 {
                actions.push(NextAction::new("associations", table.to_string(), "column is a foreign key"));
            }
        }
        NodeKind::Method => {
            if let Some(owner) = neighbors.iter().find(|n| matches!(n.kind, NodeKind::Class | NodeKind::Module)) {
                actions.push(NextAction::new(
                    "explain",
                    format!("{}:{}", owner.kind, owner.key),
                    "enclosing definition",
                ));
            }
        }
    }

    let mut seen = HashSet::new();
    actions.retain(|a| seen.insert((a.action.clone(), a.target.clone())));
    actions
}
