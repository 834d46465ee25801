//! Relational materialization of extracted records.
//!
//! Every `structured_list` rule (and the synthetic root) becomes a table whose
//! columns are its scalar children. Nested lists become child tables whose rows
//! carry the `row_id` of the row they were extracted under.
//!
//! The schema is derived and checked when the [`Materializer`] is built, so a
//! name collision is reported before any row exists.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::{Rule, RuleTree, extract_html, materialize};
//!
//! let tree = RuleTree::with_rules(
//!     "page",
//!     vec![Rule::list("links", "a", vec![Rule::text("label", ":scope"), Rule::attribute("url", ":scope", "href")])],
//! );
//! let record = extract_html(r#"<a href="/x">X</a><a href="/y">Y</a>"#, &tree).unwrap();
//!
//! let tables = materialize(&record, &tree).unwrap();
//! assert_eq!(tables[1].name, "links");
//! assert_eq!(tables[1].rows.len(), 2);
//! assert_eq!(tables[1].cell(1, "url"), Some("/y"));
//! ```

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::record::{Record, Value};
use crate::rule::{Rule, RuleKind, RuleTree};
use crate::{GleanerError, Result};

/// Synthetic primary key column.
pub const ROW_ID: &str = "row_id";
/// Synthetic reference to the parent table's `row_id`.
pub const PARENT_ROW_ID: &str = "parent_row_id";

/// Derived shape of one output table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    /// Parent table name; `None` for the root table.
    pub parent: Option<String>,
    /// Text columns, in rule order.
    pub columns: Vec<String>,
}

/// One materialized row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub row_id: u64,
    pub parent_row_id: Option<u64>,
    /// Values aligned with [`Table::columns`].
    pub values: Vec<Option<String>>,
}

/// A materialized table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub parent: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    fn empty(schema: &TableSchema) -> Self {
        Self { name: schema.name.clone(), parent: schema.parent.clone(), columns: schema.columns.clone(), rows: Vec::new() }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of `column` in the row at `row` (0-based position, not row id).
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.values.get(index)?.as_deref()
    }

    /// Serializable view of one row as a column → value map.
    pub fn row_view<'a>(&'a self, row: &'a Row) -> RowView<'a> {
        RowView { table: self, row, tagged: false }
    }

    /// Like [`Table::row_view`], with a leading `table` entry naming this table.
    pub fn tagged_row_view<'a>(&'a self, row: &'a Row) -> RowView<'a> {
        RowView { table: self, row, tagged: true }
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let rows: Vec<RowView<'_>> = self.rows.iter().map(|row| self.row_view(row)).collect();
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("parent", &self.parent)?;
        map.serialize_entry("columns", &self.columns)?;
        map.serialize_entry("rows", &rows)?;
        map.end()
    }
}

/// A row paired with its table's columns, serialized as an ordered map.
pub struct RowView<'a> {
    table: &'a Table,
    row: &'a Row,
    tagged: bool,
}

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if self.tagged {
            map.serialize_entry("table", &self.table.name)?;
        }
        map.serialize_entry(ROW_ID, &self.row.row_id)?;
        if self.table.parent.is_some() {
            map.serialize_entry(PARENT_ROW_ID, &self.row.parent_row_id)?;
        }
        for (column, value) in self.table.columns.iter().zip(&self.row.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Makes a rule name usable as a table or column identifier: characters outside
/// `[A-Za-z0-9_]` become `_`, and a leading digit gets a `_` prefix. Case is kept.
pub fn sanitize_identifier(name: &str) -> String {
    let mut out: String =
        name.trim().chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Where each piece of a record lands.
#[derive(Debug)]
struct Plan {
    table: usize,
    /// Rule name → column index, for scalar children.
    columns: Vec<(String, usize)>,
    /// Rule name → plan, for list children.
    lists: Vec<(String, Plan)>,
}

/// Derives table schemas, pre-order from the root.
fn derive(tree: &RuleTree) -> Result<(Vec<TableSchema>, Plan)> {
    let mut schemas = Vec::new();
    let plan = derive_table(&tree.name, None, &tree.rules, &mut schemas)?;
    Ok((schemas, plan))
}

fn derive_table(name: &str, parent: Option<&str>, rules: &[Rule], schemas: &mut Vec<TableSchema>) -> Result<Plan> {
    let table_name = sanitize_identifier(name);
    if let Some(existing) = schemas.iter().find(|s| s.name.eq_ignore_ascii_case(&table_name)) {
        return Err(GleanerError::SchemaConflict {
            table: table_name.clone(),
            name: name.to_string(),
            existing: existing.name.clone(),
        });
    }

    let index = schemas.len();
    schemas.push(TableSchema { name: table_name.clone(), parent: parent.map(str::to_string), columns: Vec::new() });

    let mut columns: Vec<String> = Vec::new();
    let mut column_plan = Vec::new();
    for rule in rules.iter().filter(|r| !r.is_list()) {
        let column = sanitize_identifier(&rule.name);
        let reserved = [ROW_ID, PARENT_ROW_ID].into_iter().find(|r| r.eq_ignore_ascii_case(&column));
        let clash = columns.iter().find(|c| c.eq_ignore_ascii_case(&column)).map(String::as_str);
        if let Some(existing) = reserved.or(clash) {
            return Err(GleanerError::SchemaConflict {
                table: table_name,
                name: rule.name.clone(),
                existing: existing.to_string(),
            });
        }
        column_plan.push((rule.name.clone(), columns.len()));
        columns.push(column);
    }
    schemas[index].columns = columns;

    let mut lists = Vec::new();
    for rule in rules {
        if let RuleKind::StructuredList { children } = &rule.kind {
            lists.push((rule.name.clone(), derive_table(&rule.name, Some(&table_name), children, schemas)?));
        }
    }

    Ok(Plan { table: index, columns: column_plan, lists })
}

/// Derives the table schemas of `tree` without materializing anything.
pub fn derive_schema(tree: &RuleTree) -> Result<Vec<TableSchema>> {
    derive(tree).map(|(schemas, _)| schemas)
}

/// Accumulates rows from any number of records produced by one rule tree.
///
/// Row ids start at 1 and increase monotonically per table across every
/// [`Materializer::append`] call.
#[derive(Debug)]
pub struct Materializer {
    schemas: Vec<TableSchema>,
    plan: Plan,
    tables: Vec<Table>,
    next_ids: Vec<u64>,
}

impl Materializer {
    /// Derives the schema for `tree`.
    ///
    /// # Errors
    ///
    /// Returns [`GleanerError::SchemaConflict`] when two tables, or two columns of
    /// one table, end up with the same identifier (compared case-insensitively), or
    /// a column would shadow `row_id` / `parent_row_id`.
    pub fn new(tree: &RuleTree) -> Result<Self> {
        let (schemas, plan) = derive(tree)?;
        let tables = schemas.iter().map(Table::empty).collect();
        let next_ids = vec![1; schemas.len()];
        Ok(Self { schemas, plan, tables, next_ids })
    }

    pub fn schema(&self) -> &[TableSchema] {
        &self.schemas
    }

    /// Tables accumulated so far.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Adds the rows of one document's root record, returning the root row id.
    pub fn append(&mut self, record: &Record) -> u64 {
        insert(&self.plan, record, None, &mut self.tables, &mut self.next_ids)
    }

    /// Consumes the materializer, returning tables in schema order (root first,
    /// then pre-order).
    pub fn finish(self) -> Vec<Table> {
        self.tables
    }
}

fn insert(plan: &Plan, record: &Record, parent_row_id: Option<u64>, tables: &mut [Table], next_ids: &mut [u64]) -> u64 {
    let row_id = next_ids[plan.table];
    next_ids[plan.table] += 1;

    let mut values = vec![None; tables[plan.table].columns.len()];
    for (rule_name, column) in &plan.columns {
        values[*column] = record.text(rule_name).map(str::to_string);
    }
    tables[plan.table].rows.push(Row { row_id, parent_row_id, values });

    for (rule_name, child) in &plan.lists {
        let items = match record.get(rule_name) {
            Some(Value::List(items)) => items.as_slice(),
            _ => &[],
        };
        for item in items {
            insert(child, item, Some(row_id), tables, next_ids);
        }
    }

    row_id
}

/// One-shot materialization of a single record.
pub fn materialize(record: &Record, tree: &RuleTree) -> Result<Vec<Table>> {
    let mut materializer = Materializer::new(tree)?;
    materializer.append(record);
    Ok(materializer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::extract_html;
    use rstest::rstest;

    const ORDERS: &str = r#"
        <h1>Orders</h1>
        <div class="order"><b>1001</b>
            <ul><li><i>pen</i><em>2</em></li><li><i>ink</i><em>1</em></li></ul>
        </div>
        <div class="order"><b>1002</b><ul></ul></div>
        <div class="order"><b>1003</b><ul><li><i>pad</i></li></ul></div>
    "#;

    fn orders_tree() -> RuleTree {
        RuleTree::with_rules(
            "shop",
            vec![
                Rule::text("heading", "h1"),
                Rule::list(
                    "orders",
                    "div.order",
                    vec![
                        Rule::text("number", "b"),
                        Rule::list("lines", "li", vec![Rule::text("item", "i"), Rule::text("qty", "em")]),
                    ],
                ),
            ],
        )
    }

    #[rstest]
    #[case("Name", "Name")]
    #[case("unit price", "unit_price")]
    #[case("2024", "_2024")]
    #[case("", "_")]
    #[case("a-b.c", "a_b_c")]
    fn test_sanitize_identifier(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_identifier(input), expected);
    }

    #[test]
    fn test_schema_is_pre_order() {
        let schema = derive_schema(&orders_tree()).unwrap();
        let names: Vec<(&str, Option<&str>)> = schema.iter().map(|s| (s.name.as_str(), s.parent.as_deref())).collect();

        assert_eq!(names, vec![("shop", None), ("orders", Some("shop")), ("lines", Some("orders"))]);
        assert_eq!(schema[0].columns, vec!["heading"]);
        assert_eq!(schema[2].columns, vec!["item", "qty"]);
    }

    #[test]
    fn test_child_rows_reference_parent_rows() {
        let tree = orders_tree();
        let record = extract_html(ORDERS, &tree).unwrap();
        let tables = materialize(&record, &tree).unwrap();

        let root = &tables[0];
        assert_eq!(root.rows.len(), 1);
        assert_eq!(root.cell(0, "heading"), Some("Orders"));

        let orders = &tables[1];
        let ids: Vec<u64> = orders.rows.iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(orders.rows.iter().all(|r| r.parent_row_id == Some(1)));

        let lines = &tables[2];
        let parents: Vec<Option<u64>> = lines.rows.iter().map(|r| r.parent_row_id).collect();
        assert_eq!(parents, vec![Some(1), Some(1), Some(3)]);
        assert_eq!(lines.cell(2, "item"), Some("pad"));
        assert_eq!(lines.cell(2, "qty"), None);
    }

    #[test]
    fn test_row_ids_continue_across_documents() {
        let tree = orders_tree();
        let record = extract_html(ORDERS, &tree).unwrap();

        let mut materializer = Materializer::new(&tree).unwrap();
        assert_eq!(materializer.append(&record), 1);
        assert_eq!(materializer.append(&record), 2);

        let tables = materializer.finish();
        let ids: Vec<u64> = tables[1].rows.iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(tables[1].rows[3].parent_row_id, Some(2));
    }

    #[test]
    fn test_column_collision_is_a_schema_conflict() {
        let tree =
            RuleTree::with_rules("page", vec![Rule::text("Price", ".a"), Rule::text("price", ".b")]);
        let err = Materializer::new(&tree).unwrap_err();
        assert!(matches!(err, GleanerError::SchemaConflict { ref existing, .. } if existing == "Price"));

        let tree = RuleTree::with_rules("page", vec![Rule::text("unit price", ".a"), Rule::text("unit-price", ".b")]);
        assert!(matches!(Materializer::new(&tree), Err(GleanerError::SchemaConflict { .. })));
    }

    #[test]
    fn test_reserved_and_table_collisions() {
        let tree = RuleTree::with_rules("page", vec![Rule::text("Row_Id", ".a")]);
        assert!(matches!(Materializer::new(&tree), Err(GleanerError::SchemaConflict { .. })));

        let tree = RuleTree::with_rules(
            "page",
            vec![
                Rule::list("items", "li", vec![Rule::text("a", "a")]),
                Rule::list("more", "p", vec![Rule::list("Items", "b", vec![Rule::text("b", "b")])]),
            ],
        );
        assert!(matches!(Materializer::new(&tree), Err(GleanerError::SchemaConflict { ref table, .. }) if table == "Items"));
    }

    #[test]
    fn test_row_view_serializes_in_column_order() {
        let tree = orders_tree();
        let record = extract_html(ORDERS, &tree).unwrap();
        let tables = materialize(&record, &tree).unwrap();

        let lines = &tables[2];
        let json = serde_json::to_string(&lines.tagged_row_view(&lines.rows[0])).unwrap();
        assert_eq!(json, r#"{"table":"lines","row_id":1,"parent_row_id":1,"item":"pen","qty":"2"}"#);

        let root = &tables[0];
        let json = serde_json::to_string(&root.row_view(&root.rows[0])).unwrap();
        assert_eq!(json, r#"{"row_id":1,"heading":"Orders"}"#);
    }
}
