//! Serializers for materialized tables.
//!
//! These produce text for a storage collaborator: a JSON document, JSON lines
//! (one row per line, tagged with its table), or SQL statements. No database is
//! touched here.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::config::OutputFormat;
use crate::materialize::{PARENT_ROW_ID, ROW_ID, Table, TableSchema};
use crate::Result;

/// All tables as one pretty-printed JSON array.
pub fn to_json(tables: &[Table]) -> Result<String> {
    Ok(serde_json::to_string_pretty(tables)?)
}

/// One JSON object per row, each carrying a `table` key, in table then row order.
pub fn to_jsonl(tables: &[Table]) -> Result<String> {
    let mut out = String::new();
    for table in tables {
        for row in &table.rows {
            out.push_str(&serde_json::to_string(&table.tagged_row_view(row))?);
            out.push('\n');
        }
    }
    Ok(out)
}

/// `CREATE TABLE IF NOT EXISTS` statements for a derived schema.
pub fn schema_sql(schemas: &[TableSchema]) -> String {
    let mut out = String::new();
    for schema in schemas {
        out.push_str(&create_table(&schema.name, schema.parent.as_deref(), &schema.columns));
    }
    out
}

/// DDL for every table followed by one `INSERT` per row.
pub fn to_sql(tables: &[Table]) -> String {
    let mut out = String::new();
    for table in tables {
        out.push_str(&create_table(&table.name, table.parent.as_deref(), &table.columns));
    }

    for table in tables.iter().filter(|t| !t.rows.is_empty()) {
        out.push('\n');
        let mut names = vec![quote_ident(ROW_ID)];
        if table.parent.is_some() {
            names.push(quote_ident(PARENT_ROW_ID));
        }
        names.extend(table.columns.iter().map(|c| quote_ident(c)));
        let names = names.join(", ");

        for row in &table.rows {
            let mut values = vec![row.row_id.to_string()];
            if table.parent.is_some() {
                values.push(row.parent_row_id.map_or_else(|| "NULL".to_string(), |id| id.to_string()));
            }
            values.extend(row.values.iter().map(|v| sql_literal(v.as_deref())));
            out.push_str(&format!(
                "INSERT INTO {} ({}) VALUES ({});\n",
                quote_ident(&table.name),
                names,
                values.join(", ")
            ));
        }
    }
    out
}

/// Renders `tables` in `format`.
pub fn render(tables: &[Table], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(tables),
        OutputFormat::Jsonl => to_jsonl(tables),
        OutputFormat::Sql => Ok(to_sql(tables)),
    }
}

/// Renders `tables` into `writer`.
pub fn write_tables<W: Write>(writer: &mut W, tables: &[Table], format: OutputFormat) -> Result<()> {
    writer.write_all(render(tables, format)?.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Writes `tables` to `path`, creating parent directories as needed.
pub fn write_file(path: &Path, tables: &[Table], format: OutputFormat) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    write_tables(&mut file, tables, format)?;
    tracing::info!(path = %path.display(), format = %format, tables = tables.len(), "wrote output");
    Ok(())
}

fn create_table(name: &str, parent: Option<&str>, columns: &[String]) -> String {
    let mut lines = vec![format!("    {} INTEGER PRIMARY KEY", quote_ident(ROW_ID))];
    if let Some(parent) = parent {
        lines.push(format!(
            "    {} INTEGER NOT NULL REFERENCES {} ({})",
            quote_ident(PARENT_ROW_ID),
            quote_ident(parent),
            quote_ident(ROW_ID)
        ));
    }
    lines.extend(columns.iter().map(|c| format!("    {} TEXT", quote_ident(c))));
    format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n", quote_ident(name), lines.join(",\n"))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_literal(value: Option<&str>) -> String {
    match value {
        Some(text) => format!("'{}'", text.replace('\'', "''")),
        None => "NULL".to_string(),
    }
}
