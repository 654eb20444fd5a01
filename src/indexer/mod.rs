//! Indexing Orchestrator
//!
//! Drives full and incremental runs: enumerate files, fingerprint them,
//! extract the changed ones concurrently, then persist and project each file
//! in its own transaction on a single coordinator. The schema description is
//! handled last, as one more atomic unit.

pub mod walk;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, UNIX_EPOCH};

use crossbeam::channel::Sender;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::adapter::{Category, Extractor, ParseResult, ParsedSymbol, SourceInput};
use crate::builder::{BuildSession, GraphBuilder};
use crate::config::DEFAULT_CONCURRENCY;
use crate::schema::{SchemaWarning, parse_schema};
use crate::storage::sqlite::{
    META_LAST_RUN, META_SCHEMA_ERROR, META_SCHEMA_FINGERPRINT, delete_meta, set_meta, unix_now,
};
use crate::storage::{SchemaStore, SqliteStore, SymbolStore};
use crate::symbol::Symbol;
use crate::{Error, FileStatus, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Clear everything, then index every file
    Full,
    /// Index new and changed files, drop removed ones
    Incremental,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Full => write!(f, "full"),
            RunMode::Incremental => write!(f, "incremental"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub root: PathBuf,
    /// Schema description, relative to `root`
    pub schema: Option<PathBuf>,
    pub concurrency: usize,
    pub extensions: Vec<String>,
    pub exclude: Vec<String>,
}

impl IndexOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            schema: None,
            concurrency: DEFAULT_CONCURRENCY,
            extensions: vec!["rb".to_string()],
            exclude: Vec::new(),
        }
    }

    pub fn with_schema(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema = Some(path.into());
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_excludes(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

/// What happened to the schema description during a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaSummary {
    pub path: String,
    /// False when the stored projection was still current
    pub rebuilt: bool,
    pub missing: bool,
    pub tables: usize,
    pub columns: usize,
    pub indexes: usize,
    pub foreign_keys: usize,
    pub warnings: Vec<SchemaWarning>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub mode: RunMode,
    pub considered: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub removed: usize,
    pub failures: Vec<FileFailure>,
    pub duration_ms: u64,
    pub symbols_by_kind: BTreeMap<String, usize>,
    pub nodes_by_kind: BTreeMap<String, usize>,
    pub edges_by_kind: BTreeMap<String, usize>,
    pub schema: Option<SchemaSummary>,
}

impl IndexReport {
    fn new(mode: RunMode) -> Self {
        Self {
            mode,
            considered: 0,
            indexed: 0,
            unchanged: 0,
            failed: 0,
            removed: 0,
            failures: Vec::new(),
            duration_ms: 0,
            symbols_by_kind: BTreeMap::new(),
            nodes_by_kind: BTreeMap::new(),
            edges_by_kind: BTreeMap::new(),
            schema: None,
        }
    }

    fn fail(&mut self, path: impl Into<String>, error: impl ToString) {
        self.failed += 1;
        self.failures.push(FileFailure {
            path: path.into(),
            error: error.to_string(),
        });
    }
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Index Report ({}):", self.mode)?;
        writeln!(f, "  Considered: {}", self.considered)?;
        writeln!(f, "  Indexed: {}", self.indexed)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;
        writeln!(f, "  Removed: {}", self.removed)?;
        writeln!(f, "  Failed: {}", self.failed)?;
        if let Some(schema) = &self.schema {
            writeln!(
                f,
                "  Schema: {} tables, {} columns{}",
                schema.tables,
                schema.columns,
                if schema.rebuilt { " (rebuilt)" } else { "" }
            )?;
        }
        write!(f, "  Duration: {}ms", self.duration_ms)
    }
}

/// Progress notifications for a live display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    /// Extraction is starting for `total` changed files
    Extracting { total: usize },
    FileDone { path: String, ok: bool },
    Schema,
    Finished,
}

/// A changed file waiting for extraction
struct PendingFile {
    input: SourceInput,
    fingerprint: String,
    mtime: Option<i64>,
    status: FileStatus,
}

pub struct Indexer {
    store: SqliteStore,
    extractor: Arc<dyn Extractor>,
    options: IndexOptions,
    progress: Option<Sender<IndexEvent>>,
}

impl Indexer {
    pub fn new(store: SqliteStore, extractor: Arc<dyn Extractor>, options: IndexOptions) -> Self {
        Self {
            store,
            extractor,
            options,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Sender<IndexEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn notify(&self, event: IndexEvent) {
        if let Some(progress) = &self.progress {
            // a closed display is not an indexing error
            let _ = progress.send(event);
        }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn into_store(self) -> SqliteStore {
        self.store
    }

    /// Index the whole tree under the configured root
    pub async fn run(&mut self, mode: RunMode) -> Result<IndexReport> {
        let started = Instant::now();
        let mut report = IndexReport::new(mode);
        info!("{} run over {} using {}", mode, self.options.root.display(), self.extractor.name());

        if mode == RunMode::Full {
            self.store.clear_all()?;
        }

        let files = walk::collect_files(&self.options.root, &self.options.extensions, &self.options.exclude)?;
        let known = self.store.symbols().fingerprints()?;
        let present: HashSet<&str> = files.iter().map(String::as_str).collect();
        let mut gone: Vec<String> = known
            .keys()
            .filter(|path| !present.contains(path.as_str()))
            .cloned()
            .collect();
        gone.sort();

        let mut session = BuildSession::new();
        let pending = self.read_files(&files, &known, false, &mut report).await;
        self.extract_and_commit(&mut session, pending, &mut report).await;
        self.remove_files(&mut session, &gone, &mut report);
        self.finish(&mut session, mode == RunMode::Full, started, report)
    }

    /// Re-derive an explicit list of files, regardless of fingerprints.
    /// Listed files that no longer exist are removed from the index.
    pub async fn index_paths(&mut self, paths: &[PathBuf]) -> Result<IndexReport> {
        let started = Instant::now();
        let mut report = IndexReport::new(RunMode::Incremental);
        let known = self.store.symbols().fingerprints()?;

        let mut targets = Vec::new();
        let mut gone = Vec::new();
        for path in paths {
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                self.options.root.join(path)
            };
            let Some(relative) = walk::relative_path(&self.options.root, &absolute) else {
                report.fail(path.display().to_string(), "outside the indexed root");
                continue;
            };
            if absolute.is_file() {
                targets.push(relative);
            } else if known.contains_key(&relative) {
                gone.push(relative);
            } else {
                report.fail(relative, "no such file");
            }
        }
        targets.sort();
        targets.dedup();
        gone.sort();
        gone.dedup();

        let mut session = BuildSession::new();
        let pending = self.read_files(&targets, &known, true, &mut report).await;
        self.extract_and_commit(&mut session, pending, &mut report).await;
        self.remove_files(&mut session, &gone, &mut report);
        self.finish(&mut session, false, started, report)
    }

    /// Read and fingerprint files, keeping the ones that need extraction
    async fn read_files(
        &self,
        files: &[String],
        known: &HashMap<String, String>,
        force: bool,
        report: &mut IndexReport,
    ) -> Vec<PendingFile> {
        let mut pending = Vec::new();
        for relative in files {
            report.considered += 1;
            let absolute = self.options.root.join(relative);
            let bytes = match tokio::fs::read(&absolute).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("cannot read {}: {}", relative, e);
                    report.fail(relative.clone(), e);
                    continue;
                }
            };

            let fingerprint = walk::fingerprint(&bytes);
            let status = match known.get(relative) {
                None => FileStatus::New,
                Some(stored) if *stored == fingerprint => FileStatus::Unchanged,
                Some(_) => FileStatus::Modified,
            };
            if status == FileStatus::Unchanged && !force {
                report.unchanged += 1;
                continue;
            }

            pending.push(PendingFile {
                input: SourceInput {
                    relative_path: relative.clone(),
                    absolute_path: absolute.clone(),
                    content: String::from_utf8_lossy(&bytes).into_owned(),
                },
                fingerprint,
                mtime: modified_secs(&absolute).await,
                status,
            });
        }
        pending
    }

    /// Extract concurrently; persist sequentially, one transaction per file
    async fn extract_and_commit(
        &mut self,
        session: &mut BuildSession,
        pending: Vec<PendingFile>,
        report: &mut IndexReport,
    ) {
        self.notify(IndexEvent::Extracting { total: pending.len() });
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for file in pending {
            let extractor = Arc::clone(&self.extractor);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => extractor.extract(&file.input).await,
                    Err(e) => Err(Error::Extractor(e.to_string())),
                };
                (file, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (file, extracted) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    error!("extraction task failed: {}", e);
                    report.fail("<task>", e);
                    continue;
                }
            };
            let path = file.input.relative_path.clone();

            let ok = match extracted.and_then(|parsed| self.commit_file(session, &file, parsed)) {
                Ok(symbols) => {
                    session.commit();
                    report.indexed += 1;
                    debug!("{} ({:?}): {} symbols", path, file.status, symbols);
                    true
                }
                Err(e) => {
                    session.rollback();
                    warn!("failed to index {}: {}", path, e);
                    report.fail(path.clone(), e);
                    false
                }
            };
            self.notify(IndexEvent::FileDone { path, ok });
        }
    }

    /// Persist one file's symbols and graph projection atomically
    fn commit_file(&mut self, session: &mut BuildSession, file: &PendingFile, mut parsed: ParseResult) -> Result<usize> {
        let path = file.input.relative_path.as_str();
        let category = parsed
            .category
            .as_deref()
            .and_then(|c| c.parse::<Category>().ok())
            .unwrap_or_else(|| Category::classify(path));
        let line_count = parsed
            .line_count
            .unwrap_or_else(|| file.input.content.lines().count() as u32);

        parsed.fingerprint.get_or_insert_with(|| file.fingerprint.clone());
        parsed.category = Some(category.as_str().to_string());
        parsed.line_count = Some(line_count);

        let symbols: Vec<Symbol> = parsed.symbols.iter().map(|s| to_symbol(path, s)).collect();

        self.store.write(|tx| {
            let store = SymbolStore::new(tx);
            let file_id = store.upsert_file(path, &file.fingerprint, category, line_count, file.mtime)?;
            store.replace_symbols(file_id, &symbols)?;
            GraphBuilder::new(tx).project_file(session, path, category, &parsed)?;
            Ok(symbols.len())
        })
    }

    fn remove_files(&mut self, session: &mut BuildSession, paths: &[String], report: &mut IndexReport) {
        for path in paths {
            let result = self.store.write(|tx| {
                SymbolStore::new(tx).remove_file(path)?;
                GraphBuilder::new(tx).retract_file(session, path)
            });
            match result {
                Ok(stats) => {
                    session.commit();
                    report.removed += 1;
                    info!("removed {} ({})", path, stats);
                }
                Err(e) => {
                    session.rollback();
                    warn!("failed to remove {}: {}", path, e);
                    report.fail(path.clone(), e);
                }
            }
        }
    }

    fn finish(
        &mut self,
        session: &mut BuildSession,
        full: bool,
        started: Instant,
        mut report: IndexReport,
    ) -> Result<IndexReport> {
        let files_changed = report.indexed + report.removed > 0;
        self.notify(IndexEvent::Schema);
        report.schema = self.refresh_schema(session, full, files_changed);

        self.store.set_meta(META_LAST_RUN, &unix_now().to_string())?;
        let stats = self.store.stats()?;
        report.symbols_by_kind = stats.symbols_by_kind;
        report.nodes_by_kind = stats.nodes_by_kind;
        report.edges_by_kind = stats.edges_by_kind;
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "{} run done: {} indexed, {} unchanged, {} removed, {} failed in {}ms",
            report.mode, report.indexed, report.unchanged, report.removed, report.failed, report.duration_ms
        );
        self.notify(IndexEvent::Finished);
        Ok(report)
    }

    /// Rebuild the schema projection when needed. Failures are reported in the
    /// summary and never fail the run.
    fn refresh_schema(&mut self, session: &mut BuildSession, full: bool, files_changed: bool) -> Option<SchemaSummary> {
        let relative = self.options.schema.clone()?;
        let absolute = self.options.root.join(&relative);
        let schema_path = relative.to_string_lossy().replace('\\', "/");

        if !absolute.is_file() {
            let mut summary = SchemaSummary {
                path: schema_path.clone(),
                missing: true,
                ..Default::default()
            };
            match self.retract_schema(session) {
                Ok(true) => info!("schema {} is gone, removed its projection", schema_path),
                Ok(false) => debug!("no schema at {}", schema_path),
                Err(e) => {
                    session.rollback();
                    error!("failed to remove schema projection: {}", e);
                    summary.error = Some(e.to_string());
                }
            }
            return Some(summary);
        }

        match self.rebuild_schema(session, &absolute, &schema_path, full || files_changed) {
            Ok(summary) => Some(summary),
            Err(e) => {
                session.rollback();
                error!("schema {}: {}", schema_path, e);
                if let Err(marked) = self.store.set_meta(META_SCHEMA_ERROR, &e.to_string()) {
                    warn!("could not mark schema as stale: {}", marked);
                }
                Some(SchemaSummary {
                    path: schema_path,
                    error: Some(e.to_string()),
                    ..Default::default()
                })
            }
        }
    }

    fn rebuild_schema(
        &mut self,
        session: &mut BuildSession,
        absolute: &Path,
        schema_path: &str,
        force: bool,
    ) -> Result<SchemaSummary> {
        let bytes = std::fs::read(absolute)?;
        let fingerprint = walk::fingerprint(&bytes);
        let stored = self.store.get_meta(META_SCHEMA_FINGERPRINT)?;

        if !force && stored.as_deref() == Some(fingerprint.as_str()) {
            let schema = self.store.tables().load()?;
            debug!("schema {} unchanged", schema_path);
            return Ok(SchemaSummary {
                path: schema_path.to_string(),
                rebuilt: false,
                tables: schema.tables.len(),
                columns: schema.column_count(),
                indexes: schema.indexes.len(),
                foreign_keys: schema.foreign_keys.len(),
                ..Default::default()
            });
        }

        let parsed = parse_schema(&String::from_utf8_lossy(&bytes));
        if parsed.tables.is_empty() && !parsed.warnings.is_empty() {
            return Err(Error::SchemaParse(format!(
                "no tables found in {} ({} warnings)",
                schema_path,
                parsed.warnings.len()
            )));
        }
        for warning in &parsed.warnings {
            warn!("{}:{}: {}", schema_path, warning.line, warning.message);
        }

        let stats = self.store.write(|tx| {
            SchemaStore::new(tx).replace(&parsed)?;
            let stats = GraphBuilder::new(tx).project_schema(session, &parsed)?;
            set_meta(tx, META_SCHEMA_FINGERPRINT, &fingerprint)?;
            delete_meta(tx, META_SCHEMA_ERROR)?;
            Ok(stats)
        })?;
        session.commit();
        info!("schema {}: {} tables, {}", schema_path, parsed.tables.len(), stats);

        Ok(SchemaSummary {
            path: schema_path.to_string(),
            rebuilt: true,
            missing: false,
            tables: parsed.tables.len(),
            columns: parsed.column_count(),
            indexes: parsed.indexes.len(),
            foreign_keys: parsed.foreign_keys.len(),
            warnings: parsed.warnings.clone(),
            error: None,
        })
    }

    /// Drop a previously projected schema. Returns false when there was none.
    fn retract_schema(&mut self, session: &mut BuildSession) -> Result<bool> {
        if self.store.get_meta(META_SCHEMA_FINGERPRINT)?.is_none() {
            if self.store.get_meta(META_SCHEMA_ERROR)?.is_some() {
                self.store.write(|tx| delete_meta(tx, META_SCHEMA_ERROR))?;
            }
            return Ok(false);
        }
        self.store.write(|tx| {
            SchemaStore::new(tx).clear()?;
            GraphBuilder::new(tx).retract_schema(session)?;
            delete_meta(tx, META_SCHEMA_FINGERPRINT)?;
            delete_meta(tx, META_SCHEMA_ERROR)
        })?;
        session.commit();
        Ok(true)
    }
}

fn to_symbol(path: &str, parsed: &ParsedSymbol) -> Symbol {
    let mut symbol = Symbol::new(path, parsed.kind, &parsed.name, parsed.start_line, parsed.end_line);
    symbol.enclosing_name = parsed.enclosing_name.clone();
    symbol.visibility = parsed.visibility;
    symbol.signature = parsed.signature.clone();
    symbol.documentation = parsed.documentation.clone();
    symbol
}

async fn modified_secs(path: &Path) -> Option<i64> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    let modified = metadata.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_secs() as i64)
}
