//! Line-oriented reader for Rails `schema.rb` files.
//!
//! Statements are joined across lines while brackets are open or a line ends
//! in a comma, then dispatched on their leading method name. Nothing here
//! aborts: statements that cannot be read become [`SchemaWarning`]s.

use super::{ForeignKey, ParsedSchema, SchemaColumn, SchemaIndex, SchemaTable, SchemaWarning};
use crate::args::{self, hash_get, Args, Value};
use crate::inflect::{pluralize, singularize};
use tracing::debug;

/// Upper bound on physical lines folded into one statement. An unbalanced
/// bracket would otherwise swallow the rest of the file.
const MAX_JOINED_LINES: usize = 64;

/// Column methods inside a table block that do not declare columns
const IGNORED_BLOCK_METHODS: &[&str] = &[
    "check_constraint",
    "exclusion_constraint",
    "unique_constraint",
    "remove",
    "remove_index",
    "remove_references",
    "remove_timestamps",
];

struct Statement {
    line: usize,
    text: String,
}

struct Block {
    line: usize,
    var: String,
    /// None when `create_table` carried no usable name; the block is skipped
    table: Option<SchemaTable>,
    /// Type of the implicit primary key column, None for `id: false`
    id_type: Option<String>,
    primary_key: Option<Vec<String>>,
    indexes: Vec<SchemaIndex>,
    foreign_keys: Vec<ForeignKey>,
}

#[derive(Default)]
struct SchemaParser {
    schema: ParsedSchema,
    block: Option<Block>,
}

/// Parse a schema description. Never fails; see [`ParsedSchema::warnings`].
pub fn parse_schema(source: &str) -> ParsedSchema {
    let mut parser = SchemaParser::default();
    for statement in statements(source) {
        parser.statement(&statement);
    }
    parser.finish()
}

fn statements(source: &str) -> Vec<Statement> {
    let mut out = Vec::new();
    let mut pending: Option<(Statement, usize)> = None;
    let mut depth = 0;

    for (idx, raw) in source.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        match pending.as_mut() {
            Some((stmt, joined)) => {
                stmt.text.push(' ');
                stmt.text.push_str(line);
                *joined += 1;
            }
            None => {
                pending = Some((
                    Statement {
                        line: idx + 1,
                        text: line.to_string(),
                    },
                    1,
                ))
            }
        }

        depth += args::open_depth(line);
        let joined = pending.as_ref().map(|(_, n)| *n).unwrap_or(0);
        let continues = (depth > 0 || line.ends_with(',')) && joined < MAX_JOINED_LINES;
        if !continues {
            if let Some((stmt, _)) = pending.take() {
                out.push(stmt);
            }
            depth = 0;
        }
    }

    if let Some((stmt, _)) = pending {
        out.push(stmt);
    }
    out
}

fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '#' => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Split `t.string "x"` into (`t.string`, ` "x"`).
fn split_head(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(text.len());
    (&text[..end], &text[end..])
}

/// Strip a trailing `do |t|` (or bare `do`). Returns the argument text, whether
/// a block was opened and the block variable.
fn strip_block_opener(text: &str) -> (&str, bool, Option<&str>) {
    let trimmed = text.trim_end();
    let (body, var) = match trimmed.strip_suffix('|') {
        Some(inner) => match inner.rfind('|') {
            Some(open) => (inner[..open].trim_end(), Some(inner[open + 1..].trim())),
            None => (trimmed, None),
        },
        None => (trimmed, None),
    };

    if body == "do" {
        return ("", true, var);
    }
    if let Some(before) = body.strip_suffix("do") {
        if before.ends_with(|c: char| c.is_whitespace() || c == ')') {
            return (before.trim_end(), true, var);
        }
    }
    (trimmed, false, None)
}

impl SchemaParser {
    fn warn(&mut self, line: usize, message: impl Into<String>) {
        self.schema.warnings.push(SchemaWarning {
            line,
            message: message.into(),
        });
    }

    fn statement(&mut self, stmt: &Statement) {
        let text = stmt.text.as_str();

        if text == "end" {
            if self.block.is_some() {
                self.close_block();
            }
            return;
        }

        let (head, rest) = split_head(text);

        if let Some(block) = self.block.as_mut() {
            if head == "create_table" {
                let line = block.line;
                let name = block.table.as_ref().map(|t| t.name.clone()).unwrap_or_default();
                self.warn(line, format!("create_table \"{}\" is missing its end", name));
                self.close_block();
            } else {
                let prefix = format!("{}.", block.var);
                match head.strip_prefix(prefix.as_str()) {
                    Some(method) => {
                        let method = method.to_string();
                        self.block_statement(&method, rest, stmt.line);
                    }
                    None => debug!(line = stmt.line, "skipping statement inside table block: {}", text),
                }
                return;
            }
        }

        match head {
            "create_table" => self.open_block(rest, stmt.line),
            "add_index" => self.add_index(rest, stmt.line),
            "add_foreign_key" => self.add_foreign_key(rest, stmt.line),
            h if h.starts_with("ActiveRecord::Schema") => {
                self.schema.version = parse_version(text);
            }
            _ => debug!(line = stmt.line, "skipping statement: {}", text),
        }
    }

    fn open_block(&mut self, rest: &str, line: usize) {
        let (arg_text, has_block, var) = strip_block_opener(rest);
        let args = Args::parse(arg_text);

        let table = match args.name_at(0) {
            Some(name) => {
                let mut table = SchemaTable::new(name);
                table.comment = args.option("comment").and_then(Value::as_str).map(str::to_string);
                Some(table)
            }
            None => {
                self.warn(line, "create_table without a table name");
                None
            }
        };

        let id_type = match args.option("id") {
            Some(Value::Bool(false)) => None,
            Some(v) => Some(v.as_str().unwrap_or("bigint").to_string()),
            None => Some("bigint".to_string()),
        };

        self.block = Some(Block {
            line,
            var: var.unwrap_or("t").to_string(),
            table,
            id_type,
            primary_key: args.option("primary_key").map(Value::as_list),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        });

        if !has_block {
            self.close_block();
        }
    }

    fn close_block(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        let Some(mut table) = block.table else {
            return;
        };

        let primary_key = match (&block.primary_key, &block.id_type) {
            (Some(cols), _) if !cols.is_empty() => cols.clone(),
            (_, Some(_)) => vec!["id".to_string()],
            _ => Vec::new(),
        };

        if let ([pk], Some(id_type)) = (primary_key.as_slice(), &block.id_type) {
            if !table.has_column(pk) {
                table.columns.insert(0, SchemaColumn::new(pk.clone(), id_type.clone()).primary());
            }
        }
        for column in table.columns.iter_mut() {
            if primary_key.contains(&column.name) {
                column.primary_key = true;
                column.nullable = false;
            }
        }
        table.primary_key = primary_key;

        if let Some(pos) = self.schema.tables.iter().position(|t| t.name == table.name) {
            self.warn(block.line, format!("table \"{}\" is defined twice", table.name));
            let name = table.name.clone();
            self.schema.tables.remove(pos);
            self.schema.indexes.retain(|i| i.table != name);
            self.schema.foreign_keys.retain(|fk| fk.from_table != name);
        }

        self.schema.tables.push(table);
        self.schema.indexes.extend(block.indexes);
        self.schema.foreign_keys.extend(block.foreign_keys);
    }

    fn block_statement(&mut self, method: &str, rest: &str, line: usize) {
        let mut warnings = Vec::new();
        if let Some(block) = self.block.as_mut() {
            if let Some(table) = block.table.as_mut() {
                let args = Args::parse(rest);
                let result = match method {
                    "timestamps" => {
                        timestamps(table, &args);
                        Ok(())
                    }
                    "references" | "belongs_to" => {
                        reference(table, &mut block.indexes, &mut block.foreign_keys, &args)
                    }
                    "index" => {
                        let columns = args.positional.first().map(Value::as_list).unwrap_or_default();
                        if columns.is_empty() {
                            Err("index without columns".to_string())
                        } else {
                            block.indexes.push(build_index(&table.name, columns, &args));
                            Ok(())
                        }
                    }
                    "column" => match (args.name_at(0), args.name_at(1)) {
                        (Some(name), Some(ty)) => {
                            push_column(table, build_column(name, ty, &args));
                            Ok(())
                        }
                        _ => Err("column statement needs a name and a type".to_string()),
                    },
                    m if IGNORED_BLOCK_METHODS.contains(&m) => Ok(()),
                    ty => {
                        let names: Vec<&str> = args.positional.iter().filter_map(Value::as_str).collect();
                        if names.is_empty() {
                            Err(format!("t.{} without a column name", ty))
                        } else {
                            for name in names {
                                push_column(table, build_column(name, ty, &args));
                            }
                            Ok(())
                        }
                    }
                };
                if let Err(message) = result {
                    warnings.push(message);
                }
            }
        }
        for message in warnings {
            self.warn(line, message);
        }
    }

    fn add_index(&mut self, rest: &str, line: usize) {
        let args = Args::parse(rest);
        let table = args.name_at(0).map(str::to_string);
        let columns = args.positional.get(1).map(Value::as_list).unwrap_or_default();

        match table {
            Some(table) if !columns.is_empty() => {
                if self.schema.table(&table).is_none() {
                    self.warn(line, format!("add_index on unknown table \"{}\"", table));
                    return;
                }
                let index = build_index(&table, columns, &args);
                self.schema.indexes.push(index);
            }
            _ => self.warn(line, "add_index needs a table and columns"),
        }
    }

    fn add_foreign_key(&mut self, rest: &str, line: usize) {
        let args = Args::parse(rest);
        let (Some(from), Some(to)) = (args.name_at(0), args.name_at(1)) else {
            self.warn(line, "add_foreign_key needs a source and a target table");
            return;
        };

        let column = args
            .option("column")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_id", singularize(to)));

        let mut fk = ForeignKey::new(from, column, to);
        if let Some(pk) = args.option("primary_key").and_then(Value::as_str) {
            fk.to_column = pk.to_string();
        }
        fk.on_delete = args.option("on_delete").and_then(Value::as_str).map(str::to_string);
        fk.on_update = args.option("on_update").and_then(Value::as_str).map(str::to_string);
        fk.name = args.option("name").and_then(Value::as_str).map(str::to_string);
        self.schema.foreign_keys.push(fk);
    }

    fn finish(mut self) -> ParsedSchema {
        if let Some(block) = &self.block {
            let line = block.line;
            let name = block.table.as_ref().map(|t| t.name.clone()).unwrap_or_default();
            self.warn(line, format!("create_table \"{}\" is missing its end", name));
            self.close_block();
        }
        self.schema
    }
}

fn parse_version(text: &str) -> Option<String> {
    let start = text.find("version:")? + "version:".len();
    let digits: String = text[start..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '_')
        .filter(|c| *c != '_')
        .collect();
    (!digits.is_empty()).then_some(digits)
}

fn push_column(table: &mut SchemaTable, column: SchemaColumn) {
    match table.columns.iter_mut().find(|c| c.name == column.name) {
        Some(existing) => *existing = column,
        None => table.columns.push(column),
    }
}

fn build_column(name: &str, sql_type: &str, args: &Args) -> SchemaColumn {
    let mut column = SchemaColumn::new(name, sql_type);
    if let Some(null) = args.option("null") {
        column.nullable = null.is_truthy();
    }
    column.default = args.option("default").and_then(Value::to_text);
    column.limit = args.option("limit").and_then(Value::as_i64);
    column.precision = args.option("precision").and_then(Value::as_i64);
    column.scale = args.option("scale").and_then(Value::as_i64);
    column.comment = args.option("comment").and_then(Value::as_str).map(str::to_string);
    column
}

fn timestamps(table: &mut SchemaTable, args: &Args) {
    for name in ["created_at", "updated_at"] {
        let mut column = SchemaColumn::new(name, "datetime").not_null();
        if let Some(null) = args.option("null") {
            column.nullable = null.is_truthy();
        }
        column.precision = args.option("precision").and_then(Value::as_i64);
        push_column(table, column);
    }
}

fn reference(
    table: &mut SchemaTable,
    indexes: &mut Vec<SchemaIndex>,
    foreign_keys: &mut Vec<ForeignKey>,
    args: &Args,
) -> Result<(), String> {
    let Some(name) = args.name_at(0) else {
        return Err("references without a name".to_string());
    };

    let id_column = format!("{}_id", name);
    let sql_type = args.option("type").and_then(Value::as_str).unwrap_or("bigint");
    let nullable = args.option("null").map(Value::is_truthy).unwrap_or(true);
    let polymorphic = args.option("polymorphic").is_some_and(Value::is_truthy);

    let mut column = SchemaColumn::new(&id_column, sql_type);
    column.nullable = nullable;
    push_column(table, column);

    let mut index_columns = vec![id_column.clone()];
    if polymorphic {
        let type_column = format!("{}_type", name);
        let mut column = SchemaColumn::new(&type_column, "string");
        column.nullable = nullable;
        push_column(table, column);
        index_columns.insert(0, type_column);
    }

    match args.option("index") {
        Some(Value::Bool(false)) | Some(Value::Nil) => {}
        Some(Value::Hash(opts)) => {
            let mut index = SchemaIndex::new(&table.name, index_columns);
            index.unique = hash_get(opts, "unique").is_some_and(Value::is_truthy);
            if let Some(n) = hash_get(opts, "name").and_then(Value::as_str) {
                index.name = n.to_string();
            }
            index.where_clause = hash_get(opts, "where").and_then(Value::as_str).map(str::to_string);
            indexes.push(index);
        }
        _ => indexes.push(SchemaIndex::new(&table.name, index_columns)),
    }

    match args.option("foreign_key") {
        Some(Value::Hash(opts)) => {
            let to_table = hash_get(opts, "to_table")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| pluralize(name));
            let mut fk = ForeignKey::new(&table.name, &id_column, to_table);
            if let Some(pk) = hash_get(opts, "primary_key").and_then(Value::as_str) {
                fk.to_column = pk.to_string();
            }
            fk.on_delete = hash_get(opts, "on_delete").and_then(Value::as_str).map(str::to_string);
            fk.on_update = hash_get(opts, "on_update").and_then(Value::as_str).map(str::to_string);
            fk.name = hash_get(opts, "name").and_then(Value::as_str).map(str::to_string);
            foreign_keys.push(fk);
        }
        Some(v) if v.is_truthy() => {
            foreign_keys.push(ForeignKey::new(&table.name, &id_column, pluralize(name)));
        }
        _ => {}
    }

    Ok(())
}

fn build_index(table: &str, columns: Vec<String>, args: &Args) -> SchemaIndex {
    let mut index = SchemaIndex::new(table, columns);
    if let Some(name) = args.option("name").and_then(Value::as_str) {
        index.name = name.to_string();
    }
    index.unique = args.option("unique").is_some_and(Value::is_truthy);
    index.where_clause = args.option("where").and_then(Value::as_str).map(str::to_string);
    index.using = args.option("using").and_then(Value::to_text);
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS_POSTS: &str = r#"
# This file is auto-generated from the current state of the database.
ActiveRecord::Schema[7.1].define(version: 2024_03_01_120000) do
  create_table "users", force: :cascade do |t|
    t.string "email", limit: 255, null: false
    t.timestamps
  end

  create_table "posts", force: :cascade do |t|
    t.bigint "user_id"
    t.string "title"
  end

  add_foreign_key "posts", "users"
end
"#;

    #[test]
    fn test_users_and_posts() {
        let schema = parse_schema(USERS_POSTS);
        assert!(schema.warnings.is_empty(), "{:?}", schema.warnings);
        assert_eq!(schema.version.as_deref(), Some("20240301120000"));
        assert_eq!(schema.tables.len(), 2);

        let users = schema.table("users").unwrap();
        assert_eq!(users.primary_key, vec!["id"]);
        let id = users.column("id").unwrap();
        assert_eq!(id.sql_type, "bigint");
        assert!(id.primary_key);
        let email = users.column("email").unwrap();
        assert!(!email.nullable);
        assert_eq!(email.limit, Some(255));
        assert_eq!(email.precision, None);
        assert!(!users.column("created_at").unwrap().nullable);
        assert_eq!(users.column("updated_at").unwrap().sql_type, "datetime");

        assert_eq!(schema.foreign_keys.len(), 1);
        let fk = &schema.foreign_keys[0];
        assert_eq!(fk.from_table, "posts");
        assert_eq!(fk.from_column, "user_id");
        assert_eq!(fk.to_table, "users");
        assert_eq!(fk.to_column, "id");
    }

    #[test]
    fn test_references_with_foreign_key_options() {
        let schema = parse_schema(
            r#"
create_table "comments" do |t|
  t.references :author, null: false, foreign_key: { to_table: :users, on_delete: :cascade }
  t.references :commentable, polymorphic: true
  t.belongs_to :post, index: false, foreign_key: true
end
"#,
        );
        let comments = schema.table("comments").unwrap();
        assert!(!comments.column("author_id").unwrap().nullable);
        assert_eq!(comments.column("commentable_type").unwrap().sql_type, "string");
        assert_eq!(comments.column("post_id").unwrap().sql_type, "bigint");

        let names: Vec<&str> = schema.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "index_comments_on_author_id",
                "index_comments_on_commentable_type_and_commentable_id"
            ]
        );

        assert_eq!(schema.foreign_keys.len(), 2);
        assert_eq!(schema.foreign_keys[0].to_table, "users");
        assert_eq!(schema.foreign_keys[0].on_delete.as_deref(), Some("cascade"));
        assert_eq!(schema.foreign_keys[1].to_table, "posts");
    }

    #[test]
    fn test_multiline_index_and_options() {
        let schema = parse_schema(
            r#"
create_table "memberships", id: :uuid do |t|
  t.uuid "user_id", null: false
  t.uuid "team_id", null: false
  t.decimal "fee", precision: 10, scale: 2, default: "0.0"
  t.datetime "joined_at", default: -> { "CURRENT_TIMESTAMP" }
  t.index ["user_id",
           "team_id"],
          name: "idx_memberships_unique", unique: true, where: "deleted_at IS NULL"
end
"#,
        );
        assert!(schema.warnings.is_empty(), "{:?}", schema.warnings);
        let table = schema.table("memberships").unwrap();
        assert_eq!(table.column("id").unwrap().sql_type, "uuid");
        let fee = table.column("fee").unwrap();
        assert_eq!((fee.precision, fee.scale), (Some(10), Some(2)));
        assert_eq!(fee.default.as_deref(), Some("0.0"));
        assert!(table.column("joined_at").unwrap().default.as_deref().unwrap().contains("CURRENT_TIMESTAMP"));

        let index = &schema.indexes[0];
        assert_eq!(index.name, "idx_memberships_unique");
        assert_eq!(index.columns, vec!["user_id", "team_id"]);
        assert!(index.unique);
        assert_eq!(index.where_clause.as_deref(), Some("deleted_at IS NULL"));
    }

    #[test]
    fn test_primary_key_options() {
        let schema = parse_schema(
            r#"
create_table "countries", primary_key: "code", id: :string do |t|
  t.string "name"
end
create_table "tags_things", id: false do |t|
  t.bigint "tag_id"
  t.bigint "thing_id"
end
create_table "pairs", primary_key: ["a", "b"] do |t|
  t.integer "a", null: false
  t.integer "b", null: false
end
"#,
        );
        let countries = schema.table("countries").unwrap();
        assert_eq!(countries.primary_key, vec!["code"]);
        assert_eq!(countries.columns[0].name, "code");
        assert_eq!(countries.columns[0].sql_type, "string");

        let join = schema.table("tags_things").unwrap();
        assert!(join.primary_key.is_empty());
        assert!(!join.has_column("id"));

        let pairs = schema.table("pairs").unwrap();
        assert_eq!(pairs.primary_key, vec!["a", "b"]);
        assert!(pairs.columns.iter().all(|c| c.primary_key));
        assert!(!pairs.has_column("id"));
    }

    #[test]
    fn test_add_index_and_foreign_key_defaults() {
        let schema = parse_schema(
            r#"
create_table "categories" do |t|
  t.string "name"
end
create_table "products" do |t|
  t.bigint "category_id"
  t.bigint "owner_id"
end
add_index "products", ["category_id"], unique: true
add_index "ghosts", ["x"]
add_foreign_key "products", "categories", on_delete: :nullify
add_foreign_key "products", "users", column: "owner_id", name: "fk_owner"
"#,
        );
        assert_eq!(schema.indexes.len(), 1);
        assert_eq!(schema.indexes[0].name, "index_products_on_category_id");
        assert_eq!(schema.warnings.len(), 1);
        assert!(schema.warnings[0].message.contains("ghosts"));

        assert_eq!(schema.foreign_keys[0].from_column, "category_id");
        assert_eq!(schema.foreign_keys[0].on_delete.as_deref(), Some("nullify"));
        assert_eq!(schema.foreign_keys[1].from_column, "owner_id");
        assert_eq!(schema.foreign_keys[1].name.as_deref(), Some("fk_owner"));
    }

    #[test]
    fn test_missing_end_closes_at_next_table() {
        let schema = parse_schema(
            r#"
create_table "a" do |t|
  t.string "x"
create_table "b" do |t|
  t.string "y"
end
create_table "c" do |t|
  t.string "z"
"#,
        );
        assert_eq!(schema.table_names(), vec!["a", "b", "c"]);
        assert!(schema.table("a").unwrap().has_column("x"));
        assert!(!schema.table("a").unwrap().has_column("y"));
        assert_eq!(schema.warnings.len(), 2);
    }

    #[test]
    fn test_malformed_statements_become_warnings() {
        let schema = parse_schema(
            r#"
create_table do |t|
  t.string "ignored"
end
create_table "ok" do |t|
  t.string
  t.column "broken"
  t.string "kept"
end
add_foreign_key "ok"
"#,
        );
        assert_eq!(schema.table_names(), vec!["ok"]);
        assert!(schema.table("ok").unwrap().has_column("kept"));
        assert_eq!(schema.warnings.len(), 4);
    }

    #[test]
    fn test_empty_input() {
        let schema = parse_schema("");
        assert!(schema.tables.is_empty());
        assert!(schema.warnings.is_empty());
    }

    #[test]
    fn test_strip_helpers() {
        assert_eq!(strip_comment(r#"t.string "a#b" # note"#), r#"t.string "a#b" "#);
        assert_eq!(strip_block_opener(r#" "users", force: :cascade do |t|"#), (r#" "users", force: :cascade"#, true, Some("t")));
        assert!(!strip_block_opener(r#" "users""#).1);
    }
}
