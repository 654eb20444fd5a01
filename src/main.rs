//! Repodex CLI - build and query a repository knowledge index

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use repodex::adapter::Category;
use repodex::config::{
    self, DEFAULT_CONCURRENCY, DEFAULT_SCHEMA_PATH, IndexingConfig, RepodexConfig,
};
use repodex::graph::Direction;
use repodex::indexer::{IndexOptions, IndexReport, Indexer, RunMode};
use repodex::query::{FileSummary, NodeExplanation, QueryEngine, Snippet};
use repodex::ui::{self, Icons, IndexProgress, TableBuilder};
use repodex::{EdgeKind, GraphNode, Neighborhood, NodeKind, SqliteStore};

#[derive(Parser)]
#[command(name = "repodex")]
#[command(version)]
#[command(about = "Repository knowledge index - symbols, a relationship graph and schema-inferred associations")]
#[command(long_about = r#"
Repodex indexes a Ruby/Rails source tree and its db/schema.rb into a local
SQLite database, then answers questions about it:
  • Ranked symbol search and source snippets
  • Test files for an implementation file
  • Schema tables with suggested associations and validations
  • A typed graph of classes, files, tables and their relationships

Example usage:
  repodex init
  repodex index
  repodex search "user email"
  repodex explain class:User
  repodex neighbors table:users --direction both --depth 2
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ./repodex.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file (default: <root>/.repodex/index.db)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Source tree to index (default: current directory)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Print JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default repodex.toml and ignore the index directory
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Index the source tree (incremental unless --full)
    Index {
        /// Clear the index and re-derive every file
        #[arg(long)]
        full: bool,

        /// Only re-derive these files
        paths: Vec<PathBuf>,
    },

    /// Full-text symbol search
    Search {
        query: String,

        /// Restrict to file categories (model, controller, ...)
        #[arg(short = 'C', long = "category")]
        categories: Vec<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print numbered source lines by path (path, path:start or path:start-end) or by symbol
    Snippet {
        /// File path, optionally with a line range
        target: Option<String>,

        /// Symbol name (`Owner#method` for methods)
        #[arg(short, long, conflicts_with = "target")]
        symbol: Option<String>,

        /// Restrict --symbol to one file
        #[arg(long, requires = "symbol")]
        file: Option<String>,

        #[arg(long)]
        start: Option<u32>,

        #[arg(long)]
        end: Option<u32>,
    },

    /// Find test files for an implementation file
    Tests { path: String },

    /// Summarize one indexed file: symbols by kind and require links
    Summary { path: String },

    /// Files whose methods, scopes and associations overlap a file's
    Similar {
        path: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Minimum Jaccard similarity (0 to 1)
        #[arg(long, default_value = "0.7")]
        min: f64,
    },

    /// List schema tables
    Tables,

    /// Describe one schema table
    Table { name: String },

    /// Suggest associations for a table's model
    Associations { table: String },

    /// Suggest validations for a table's model
    Validations { table: String },

    /// Search graph nodes
    Nodes {
        /// Substring of the key or label
        filter: Option<String>,

        /// Node kind (file, class, module, method, table, column, index)
        #[arg(short, long)]
        kind: Option<String>,

        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Traverse the graph from a node (id, kind:key or key)
    Neighbors {
        node: String,

        /// Edge kinds to follow (default: all)
        #[arg(short, long = "edge")]
        edges: Vec<String>,

        /// out, in or both
        #[arg(long, default_value = "out")]
        direction: String,

        /// 1 to 3
        #[arg(long, default_value = "1")]
        depth: u32,
    },

    /// Node detail, edge counts and suggested next queries
    Explain { node: String },

    /// Index statistics
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

fn emit_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Settings after merging the config file with command-line flags
struct Context {
    root: PathBuf,
    database: PathBuf,
    config: RepodexConfig,
}

impl Context {
    fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();

        let root = cli
            .root
            .clone()
            .or_else(|| config.root.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        let root = root
            .canonicalize()
            .with_context(|| format!("cannot open root {}", root.display()))?;

        let database = cli
            .database
            .clone()
            .or_else(|| config.database.as_ref().map(|db| root.join(db)))
            .unwrap_or_else(|| config::default_database_path_in(&root));

        Ok(Self { root, database, config })
    }

    /// Open an existing index for queries
    fn open_store(&self) -> anyhow::Result<SqliteStore> {
        if !self.database.exists() {
            bail!(
                "no index at {} (run `repodex index` first)",
                self.database.display()
            );
        }
        Ok(SqliteStore::open(&self.database)?)
    }

    fn index_options(&self) -> IndexOptions {
        let indexing = &self.config.indexing;
        IndexOptions::new(&self.root)
            .with_schema(self.config.schema_path())
            .with_concurrency(indexing.concurrency())
            .with_extensions(indexing.extensions())
            .with_excludes(indexing.exclude.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mode = if cli.json { OutputMode::Json } else { OutputMode::Human };

    let ctx = match &cli.command {
        Commands::Init { force } => return run_init(&cli, *force, mode),
        _ => Context::resolve(&cli)?,
    };

    match &cli.command {
        Commands::Init { .. } => {}

        Commands::Index { full, paths } => {
            config::ensure_db_dir(&ctx.database)?;
            let store = SqliteStore::open(&ctx.database)?;
            let extractor = ctx.config.extractor.build()?;
            if mode.is_human() {
                ui::header(Icons::ROCKET, &format!("Indexing {}", ctx.root.display()));
                ui::status(Icons::DATABASE, "Database", &ctx.database.display().to_string());
            }

            let (progress, events) = IndexProgress::start(mode.is_human() && !cli.verbose);
            let mut indexer = Indexer::new(store, extractor, ctx.index_options()).with_progress(events);

            let report: anyhow::Result<IndexReport> = if paths.is_empty() {
                let run = if *full { RunMode::Full } else { RunMode::Incremental };
                indexer.run(run).await.map_err(Into::into)
            } else {
                match absolute_paths(paths) {
                    Ok(paths) => indexer.index_paths(&paths).await.map_err(Into::into),
                    Err(e) => Err(e),
                }
            };
            drop(indexer);
            progress.finish();
            let report = report?;

            match mode {
                OutputMode::Json => emit_json(&report)?,
                OutputMode::Human => print_report(&report),
            }
        }

        Commands::Search { query, categories, limit } => {
            let categories = categories
                .iter()
                .map(|c| c.parse::<Category>())
                .collect::<repodex::Result<Vec<_>>>()?;
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let hits = engine.search_symbols(query, &categories, *limit)?;

            if !mode.is_human() {
                return emit_json(&hits);
            }
            ui::header(Icons::SEARCH, &format!("Searching for '{}'", query));
            if hits.is_empty() {
                ui::warn("No symbols found.");
                return Ok(());
            }
            let mut table = TableBuilder::new(&["Score", "Kind", "Symbol", "Location"]);
            for hit in &hits {
                table.add_row([
                    hit.score.to_string(),
                    hit.symbol.kind.to_string(),
                    hit.symbol.qualified_name(),
                    format!("{}:{}", hit.symbol.path, hit.symbol.start_line),
                ]);
            }
            println!("{}", table.build());
        }

        Commands::Snippet { target, symbol, file, start, end } => {
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let snippet = match (target, symbol) {
                (_, Some(name)) => engine.snippet_for_symbol(name, file.as_deref())?,
                (Some(target), None) => {
                    let (path, range_start, range_end) = parse_location(target);
                    engine.snippet(path, start.or(range_start).unwrap_or(1), end.or(range_end))?
                }
                (None, None) => bail!("give a file path or --symbol"),
            };
            match mode {
                OutputMode::Json => emit_json(&snippet)?,
                OutputMode::Human => print_snippet(&snippet),
            }
        }

        Commands::Tests { path } => {
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let tests = engine.find_tests(path)?;

            if !mode.is_human() {
                return emit_json(&tests);
            }
            if tests.is_empty() {
                ui::warn(&format!("No tests found for {}", path));
            }
            for test in &tests {
                println!("{} {}", Icons::TEST, test);
            }
        }

        Commands::Summary { path } => {
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let summary = engine.file_summary(path)?;

            match mode {
                OutputMode::Json => emit_json(&summary)?,
                OutputMode::Human => print_summary(&summary),
            }
        }

        Commands::Similar { path, limit, min } => {
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let similar = engine.similar_files(path, *limit, *min)?;

            if !mode.is_human() {
                return emit_json(&similar);
            }
            if similar.is_empty() {
                ui::warn(&format!("No files similar to {} (threshold {})", path, min));
                return Ok(());
            }
            let mut table = TableBuilder::new(&["File", "Category", "Similarity", "Shared"]);
            for file in &similar {
                table.add_row([
                    file.path.clone(),
                    file.category.to_string(),
                    format!("{:.2}", file.similarity),
                    file.shared.join(", "),
                ]);
            }
            println!("{}", table.build());
        }

        Commands::Tables => {
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let tables = engine.list_tables()?;

            if !mode.is_human() {
                return emit_json(&tables);
            }
            if tables.is_empty() {
                ui::warn("No schema tables indexed.");
                return Ok(());
            }
            let mut table = TableBuilder::new(&["Table", "Columns", "Indexes", "Primary key"]);
            for t in &tables {
                table.add_row([
                    t.name.clone(),
                    t.column_count.to_string(),
                    t.index_count.to_string(),
                    t.primary_key.join(", "),
                ]);
            }
            println!("{}", table.build());
        }

        Commands::Table { name } => {
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let description = engine.describe_table(name)?;

            if !mode.is_human() {
                return emit_json(&description);
            }
            ui::header(Icons::TABLE, &description.table.name);
            let model = match &description.model_path {
                Some(path) => format!("{} ({})", description.model, path),
                None => format!("{} {}", description.model, ui::muted("(not indexed)")),
            };
            ui::status(Icons::FILE, "Model", &model);
            if let Some(comment) = &description.table.comment {
                ui::status(Icons::INFO, "Comment", comment);
            }

            let mut columns = TableBuilder::new(&["Column", "Type", "Null", "Default", "Limit"]);
            for c in &description.table.columns {
                let name = if c.primary_key { format!("{} (pk)", c.name) } else { c.name.clone() };
                columns.add_row([
                    name,
                    c.sql_type.clone(),
                    if c.nullable { "yes" } else { "no" }.to_string(),
                    c.default.clone().unwrap_or_default(),
                    c.limit.map(|l| l.to_string()).unwrap_or_default(),
                ]);
            }
            ui::section("Columns");
            println!("{}", columns.build());

            if !description.indexes.is_empty() {
                let mut indexes = TableBuilder::new(&["Index", "Columns", "Unique"]);
                for i in &description.indexes {
                    indexes.add_row([
                        i.name.clone(),
                        i.columns.join(", "),
                        if i.unique { "yes" } else { "" }.to_string(),
                    ]);
                }
                ui::section("Indexes");
                println!("{}", indexes.build());
            }

            if !description.references.is_empty() || !description.referenced_by.is_empty() {
                ui::section("Foreign keys");
                for fk in description.references.iter().chain(&description.referenced_by) {
                    println!(
                        "  {} {}.{} -> {}.{}",
                        Icons::LINK,
                        fk.from_table,
                        fk.from_column,
                        fk.to_table,
                        fk.to_column
                    );
                }
            }
        }

        Commands::Associations { table } => {
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let associations = engine.suggest_associations(table)?;

            if !mode.is_human() {
                return emit_json(&associations);
            }
            if associations.is_empty() {
                ui::warn(&format!("No foreign keys involve {}", table));
                return Ok(());
            }
            ui::header(Icons::LINK, &format!("class {}", repodex::inflect::classify(table)));
            for association in &associations {
                println!("  {}", ui::accent(&association.to_ruby()));
                println!("    {}", ui::muted(&association.provenance.describe()));
            }
        }

        Commands::Validations { table } => {
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let validations = engine.suggest_validations(table)?;

            if !mode.is_human() {
                return emit_json(&validations);
            }
            if validations.is_empty() {
                ui::warn(&format!("Nothing to validate on {}", table));
                return Ok(());
            }
            ui::header(Icons::CHECK, &format!("class {}", repodex::inflect::classify(table)));
            for validation in &validations {
                println!("  {}", ui::accent(&validation.to_ruby()));
            }
        }

        Commands::Nodes { filter, kind, limit } => {
            let kind = kind.as_deref().map(str::parse::<NodeKind>).transpose()?;
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let nodes = engine.find_nodes(kind, filter.as_deref(), *limit)?;

            if !mode.is_human() {
                return emit_json(&nodes);
            }
            if nodes.is_empty() {
                ui::warn("No nodes found.");
                return Ok(());
            }
            println!("{}", nodes_table(&nodes));
        }

        Commands::Neighbors { node, edges, direction, depth } => {
            let kinds = edges
                .iter()
                .map(|e| e.parse::<EdgeKind>())
                .collect::<repodex::Result<Vec<_>>>()?;
            let direction: Direction = direction.parse()?;
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let hood = engine.neighbors(node, &kinds, direction, *depth)?;

            match mode {
                OutputMode::Json => emit_json(&hood)?,
                OutputMode::Human => print_neighborhood(&hood),
            }
        }

        Commands::Explain { node } => {
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let explanation = engine.explain_node(node)?;

            match mode {
                OutputMode::Json => emit_json(&explanation)?,
                OutputMode::Human => print_explanation(&explanation),
            }
        }

        Commands::Status => {
            let store = ctx.open_store()?;
            let engine = QueryEngine::new(&store, &ctx.root);
            let status = engine.status()?;

            if !mode.is_human() {
                return emit_json(&status);
            }
            ui::header(Icons::STATS, &format!("Repodex index for {}", status.root));
            ui::status(Icons::DATABASE, "Database", &ctx.database.display().to_string());
            let stats = &status.stats;
            let mut rows = vec![
                ("Files", stats.files.to_string()),
                ("Symbols", stats.symbols.to_string()),
                ("Nodes", stats.nodes.to_string()),
                ("Edges", stats.edges.to_string()),
                ("Tables", stats.tables.to_string()),
                ("Columns", stats.columns.to_string()),
                ("Foreign keys", stats.foreign_keys.to_string()),
            ];
            if !status.schema_indexed {
                rows.push(("Schema", "not indexed".to_string()));
            }
            println!("{}", ui::stats_table(&rows));
            if let Some(error) = &status.schema_error {
                ui::warn(&format!("Schema is stale, last parse failed: {}", error));
            }

            for (title, counts) in [
                ("Files by category", &stats.files_by_category),
                ("Nodes by kind", &stats.nodes_by_kind),
                ("Edges by kind", &stats.edges_by_kind),
            ] {
                if counts.is_empty() {
                    continue;
                }
                ui::section(title);
                for (key, count) in counts {
                    ui::summary_row(key, &count.to_string());
                }
            }
            if let Some(last_run) = stats.last_run {
                println!();
                ui::info("Last run (unix time)", &last_run.to_string());
            }
        }
    }

    Ok(())
}

fn run_init(cli: &Cli, force: bool, mode: OutputMode) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let root = cli.root.clone().unwrap_or_else(|| PathBuf::from("."));

    let config = RepodexConfig {
        database: Some(".repodex/index.db".to_string()),
        root: None,
        schema: Some(DEFAULT_SCHEMA_PATH.to_string()),
        extractor: Default::default(),
        indexing: IndexingConfig {
            concurrency: Some(DEFAULT_CONCURRENCY),
            extensions: vec!["rb".to_string()],
            exclude: Vec::new(),
        },
    };
    config::write_config(&config_path, &config, force)?;
    config::ensure_gitignore(&root)?;

    match mode {
        OutputMode::Json => emit_json(&serde_json::json!({
            "config": config_path.display().to_string(),
            "database": root.join(".repodex/index.db").display().to_string(),
        })),
        OutputMode::Human => {
            ui::success(&format!("Wrote {}", config_path.display()));
            ui::info("Next", "repodex index");
            Ok(())
        }
    }
}

/// Resolve command-line paths against the working directory
fn absolute_paths(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let cwd = std::env::current_dir()?;
    Ok(paths
        .iter()
        .map(|p| {
            let joined = if p.is_absolute() { p.clone() } else { cwd.join(p) };
            joined.canonicalize().unwrap_or(joined)
        })
        .collect())
}

/// Split `path:start-end` / `path:start` into its parts
fn parse_location(target: &str) -> (&str, Option<u32>, Option<u32>) {
    let Some((path, range)) = target.rsplit_once(':') else {
        return (target, None, None);
    };
    match range.split_once('-') {
        Some((start, end)) => match (start.parse().ok(), end.parse().ok()) {
            (Some(start), Some(end)) => (path, Some(start), Some(end)),
            _ => (target, None, None),
        },
        None => match range.parse().ok() {
            Some(start) => (path, Some(start), None),
            None => (target, None, None),
        },
    }
}

fn location(node: &GraphNode) -> String {
    match &node.anchor {
        Some(anchor) => format!("{}:{}", anchor.path, anchor.start_line),
        None if node.is_inferred() => ui::muted("(inferred)"),
        None => String::new(),
    }
}

fn nodes_table(nodes: &[GraphNode]) -> String {
    let mut table = TableBuilder::new(&["Id", "Kind", "Key", "Source", "Location"]);
    for node in nodes {
        table.add_row([
            node.id.to_string(),
            node.kind.to_string(),
            node.display_key(),
            node.source.to_string(),
            location(node),
        ]);
    }
    table.build()
}

fn print_report(report: &IndexReport) {
    ui::section(&format!("{} run", report.mode));
    ui::summary_row("Considered", &report.considered.to_string());
    ui::summary_row("Indexed", &report.indexed.to_string());
    ui::summary_row("Unchanged", &report.unchanged.to_string());
    ui::summary_row("Removed", &report.removed.to_string());
    ui::summary_row("Failed", &report.failed.to_string());

    for failure in &report.failures {
        ui::error(&format!("{}: {}", failure.path, failure.error));
    }

    if let Some(schema) = &report.schema {
        ui::section("Schema");
        if let Some(error) = &schema.error {
            ui::error(&format!("{}: {}", schema.path, error));
        } else if schema.missing {
            ui::summary_row(&schema.path, &ui::muted("not found"));
        } else {
            let state = if schema.rebuilt { "rebuilt" } else { "unchanged" };
            ui::summary_row(
                &schema.path,
                &format!(
                    "{} tables, {} columns, {} indexes, {} foreign keys ({})",
                    schema.tables, schema.columns, schema.indexes, schema.foreign_keys, state
                ),
            );
            for warning in &schema.warnings {
                ui::warn(&format!("{}:{}: {}", schema.path, warning.line, warning.message));
            }
        }
    }

    if !report.nodes_by_kind.is_empty() {
        ui::section("Graph");
        for (kind, count) in &report.nodes_by_kind {
            ui::summary_row(kind, &count.to_string());
        }
    }

    println!();
    if report.failed == 0 {
        ui::success("Indexing complete");
    } else {
        ui::warn(&format!("Indexing complete with {} failures", report.failed));
    }
    ui::timing(report.duration_ms);
}

fn print_snippet(snippet: &Snippet) {
    let title = match &snippet.symbol {
        Some(symbol) => format!("{} ({})", symbol.qualified_name(), symbol.kind),
        None => snippet.path.clone(),
    };
    ui::header(Icons::FILE, &title);
    println!(
        "{}",
        ui::muted(&format!(
            "{}:{}-{} of {}",
            snippet.path, snippet.start_line, snippet.end_line, snippet.total_lines
        ))
    );
    println!("{}", snippet.text);
    if snippet.truncated {
        ui::warn("Truncated; ask for a narrower range to see more.");
    }
    for other in &snippet.alternatives {
        println!("{} {}", ui::dim("also defined at"), other);
    }
}

fn print_summary(summary: &FileSummary) {
    let file = &summary.file;
    ui::header(Icons::FILE, &file.path);
    ui::info("Category", &file.category.to_string());
    ui::info("Lines", &file.line_count.to_string());

    for (kind, symbols) in &summary.symbols {
        ui::section(&format!("{} ({})", kind, symbols.len()));
        for symbol in symbols {
            println!(
                "  {} {}",
                symbol.qualified_name(),
                ui::muted(&format!("{}-{}", symbol.start_line, symbol.end_line))
            );
        }
    }
    if !summary.requires.is_empty() {
        ui::section("Requires");
        for path in &summary.requires {
            println!("  {}", path);
        }
    }
    if !summary.required_by.is_empty() {
        ui::section("Required by");
        for path in &summary.required_by {
            println!("  {}", path);
        }
    }
}

fn print_neighborhood(hood: &Neighborhood) {
    let name = |id: i64| {
        hood.node(id)
            .map(|n| format!("{}:{}", n.kind, n.display_key()))
            .unwrap_or_else(|| id.to_string())
    };

    ui::header(Icons::NODE, &format!("{} (depth {})", name(hood.start_id), hood.depth));
    println!("{}", nodes_table(&hood.nodes));

    if !hood.edges.is_empty() {
        ui::section("Edges");
        for edge in &hood.edges {
            println!("  {} {} {}", name(edge.src_id), ui::accent(&format!("-{}->", edge.kind)), name(edge.dst_id));
        }
    }
}

fn print_explanation(explanation: &NodeExplanation) {
    let node = &explanation.node;
    ui::header(Icons::NODE, &format!("{} {}", node.kind, node.display_key()));
    ui::status(Icons::INFO, "Id", &node.id.to_string());
    ui::status(Icons::INFO, "Source", node.source.as_str());
    let anchored = location(node);
    if !anchored.is_empty() {
        ui::status(Icons::FILE, "Location", &anchored);
    }
    if node.metadata.as_object().is_some_and(|m| !m.is_empty()) {
        ui::status(Icons::INFO, "Metadata", &node.metadata.to_string());
    }
    if let Some(error) = &explanation.schema_error {
        ui::warn(&format!("Schema is stale, last parse failed: {}", error));
    }

    if !explanation.edge_counts.is_empty() {
        ui::section("Edges");
        for count in &explanation.edge_counts {
            ui::summary_row(&format!("{} ({})", count.kind, count.direction), &count.count.to_string());
        }
    }
    if !explanation.neighbors.is_empty() {
        ui::section("Neighbors");
        println!("{}", nodes_table(&explanation.neighbors));
    }
    if !explanation.next_actions.is_empty() {
        ui::section("Next");
        for action in &explanation.next_actions {
            println!(
                "  {} {} {}  {}",
                Icons::HINT,
                ui::accent(&action.action),
                action.target,
                ui::muted(&action.reason)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_parse_location() {
        assert_eq!(parse_location("app/models/user.rb"), ("app/models/user.rb", None, None));
        assert_eq!(parse_location("app/models/user.rb:12"), ("app/models/user.rb", Some(12), None));
        assert_eq!(parse_location("app/models/user.rb:3-9"), ("app/models/user.rb", Some(3), Some(9)));
        assert_eq!(parse_location("weird:name.rb"), ("weird:name.rb", None, None));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["repodex", "--json", "neighbors", "table:users", "-e", "has_column", "--depth", "2"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Neighbors { node, edges, depth, .. } => {
                assert_eq!(node, "table:users");
                assert_eq!(edges, vec!["has_column"]);
                assert_eq!(depth, 2);
            }
            _ => panic!("expected neighbors"),
        }
        assert!(Cli::try_parse_from(["repodex", "snippet", "a.rb", "--symbol", "User"]).is_err());

        let cli = Cli::try_parse_from(["repodex", "similar", "app/models/post.rb", "--min", "0.5"]).unwrap();
        match cli.command {
            Commands::Similar { path, limit, min } => {
                assert_eq!(path, "app/models/post.rb");
                assert_eq!(limit, 5);
                assert_eq!(min, 0.5);
            }
            _ => panic!("expected similar"),
        }
    }

    #[test]
    fn test_database_defaults_under_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = Cli::try_parse_from([
            "repodex",
            "--config",
            dir.path().join("missing.toml").to_str().unwrap(),
            "--root",
            dir.path().to_str().unwrap(),
            "status",
        ])
        .unwrap();
        let ctx = Context::resolve(&cli).unwrap();
        assert!(ctx.database.ends_with(Path::new(".repodex/index.db")));
        assert!(ctx.open_store().is_err());
    }
}
