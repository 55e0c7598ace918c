use std::fs;
use std::future::Future;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Connection, Row};

use crate::config::DbConfig;

/// In-process exporter: enumerates the public schema's base tables and
/// serializes schema plus row data into a portable SQL script.
pub fn inline_backup(config: &DbConfig, out_path: &Path) -> Result<()> {
    let script = block_on(export_script(config))??;
    fs::write(out_path, script)
        .with_context(|| format!("failed to write database backup: {}", out_path.display()))
}

/// In-process importer for scripts the inline exporter produced. Statements
/// run sequentially with referential-integrity checks disabled; the first
/// failing statement aborts the restore, but the checks are re-enabled on all
/// paths.
pub fn inline_restore(config: &DbConfig, backup_path: &Path) -> Result<()> {
    let script = fs::read_to_string(backup_path).with_context(|| {
        format!(
            "database backup file not found or unreadable: {}",
            backup_path.display()
        )
    })?;
    let statements = split_statements(&script);
    if statements.is_empty() {
        return Ok(());
    }
    block_on(replay_script(config, &statements))?
}

/// The engine is strictly synchronous; sqlx futures are driven to completion
/// on a current-thread runtime.
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start database runtime")?;
    Ok(runtime.block_on(future))
}

async fn connect(config: &DbConfig) -> Result<PgConnection> {
    PgConnection::connect_with(&config.connect_options())
        .await
        .with_context(|| format!("database connection failed: {}", config.describe()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnSpec {
    pub name: String,
    pub data_type: String,
    pub udt_name: String,
    pub max_length: Option<i32>,
    pub nullable: bool,
    pub default: Option<String>,
}

async fn export_script(config: &DbConfig) -> Result<String> {
    let mut conn = connect(config).await?;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
         ORDER BY table_name",
    )
    .fetch_all(&mut conn)
    .await
    .context("failed to enumerate tables")?;

    let mut script = format!("-- inline database backup of {}\n\n", config.name);
    for table in &tables {
        let columns = fetch_columns(&mut conn, table).await?;
        let primary_key = fetch_primary_key(&mut conn, table).await?;
        script.push_str(&render_drop_table(table));
        script.push_str(&render_create_table(table, &columns, &primary_key));

        let rows = sqlx::query(&render_row_select(table, &columns))
            .fetch_all(&mut conn)
            .await
            .with_context(|| format!("failed to export rows from \"{table}\""))?;
        for row in &rows {
            let values = row_values(row, columns.len())
                .with_context(|| format!("failed to decode a row from \"{table}\""))?;
            script.push_str(&render_insert(table, &columns, &values));
        }
        script.push('\n');
    }
    Ok(script)
}

async fn fetch_columns(conn: &mut PgConnection, table: &str) -> Result<Vec<ColumnSpec>> {
    let rows = sqlx::query(
        "SELECT column_name::text, data_type::text, udt_name::text, \
                character_maximum_length::int4, is_nullable::text, column_default::text \
         FROM information_schema.columns \
         WHERE table_schema = 'public' AND table_name = $1 \
         ORDER BY ordinal_position",
    )
    .bind(table)
    .fetch_all(conn)
    .await
    .with_context(|| format!("failed to describe columns of \"{table}\""))?;

    let mut columns = Vec::new();
    for row in &rows {
        columns.push(ColumnSpec {
            name: row.try_get::<String, _>(0)?,
            data_type: row.try_get::<String, _>(1)?,
            udt_name: row.try_get::<String, _>(2)?,
            max_length: row.try_get::<Option<i32>, _>(3)?,
            nullable: row.try_get::<String, _>(4)? == "YES",
            default: row.try_get::<Option<String>, _>(5)?,
        });
    }
    Ok(columns)
}

async fn fetch_primary_key(conn: &mut PgConnection, table: &str) -> Result<Vec<String>> {
    sqlx::query_scalar(
        "SELECT kcu.column_name::text \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON kcu.constraint_name = tc.constraint_name \
          AND kcu.table_schema = tc.table_schema \
         WHERE tc.constraint_type = 'PRIMARY KEY' \
           AND tc.table_schema = 'public' AND tc.table_name = $1 \
         ORDER BY kcu.ordinal_position",
    )
    .bind(table)
    .fetch_all(conn)
    .await
    .with_context(|| format!("failed to read primary key of \"{table}\""))
}

fn row_values(row: &PgRow, column_count: usize) -> Result<Vec<Option<String>>> {
    let mut values = Vec::with_capacity(column_count);
    for index in 0..column_count {
        values.push(row.try_get::<Option<String>, _>(index)?);
    }
    Ok(values)
}

async fn replay_script(config: &DbConfig, statements: &[String]) -> Result<()> {
    let mut conn = connect(config).await?;
    sqlx::query("SET session_replication_role = replica")
        .execute(&mut conn)
        .await
        .context("failed to disable referential integrity checks")?;

    let mut failure = None;
    for (index, statement) in statements.iter().enumerate() {
        if let Err(err) = sqlx::query(statement).execute(&mut conn).await {
            failure = Some((index, err));
            break;
        }
    }

    let reenable = sqlx::query("SET session_replication_role = DEFAULT")
        .execute(&mut conn)
        .await;

    if let Some((index, err)) = failure {
        return Err(anyhow!(err))
            .with_context(|| format!("database restore aborted at statement {}", index + 1));
    }
    reenable.context("failed to re-enable referential integrity checks")?;
    Ok(())
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn sql_literal(value: Option<&str>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(value) => format!("'{}'", value.replace('\'', "''")),
    }
}

pub(crate) fn render_drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {} CASCADE;\n", quote_ident(table))
}

pub(crate) fn render_create_table(
    table: &str,
    columns: &[ColumnSpec],
    primary_key: &[String],
) -> String {
    let mut parts: Vec<String> = columns
        .iter()
        .map(|column| {
            let mut line = format!("  {} {}", quote_ident(&column.name), render_column_type(column));
            if !column.nullable {
                line.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                line.push_str(&format!(" DEFAULT {default}"));
            }
            line
        })
        .collect();
    if !primary_key.is_empty() {
        let key = primary_key
            .iter()
            .map(|column| quote_ident(column))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("  PRIMARY KEY ({key})"));
    }
    format!(
        "CREATE TABLE {} (\n{}\n);\n",
        quote_ident(table),
        parts.join(",\n")
    )
}

pub(crate) fn render_column_type(column: &ColumnSpec) -> String {
    match column.data_type.as_str() {
        "ARRAY" => format!("{}[]", column.udt_name.trim_start_matches('_')),
        "USER-DEFINED" => column.udt_name.clone(),
        "character varying" | "character" => match column.max_length {
            Some(length) => format!("{}({length})", column.data_type),
            None => column.data_type.clone(),
        },
        _ => column.data_type.clone(),
    }
}

/// Every column exported as text; Postgres coerces untyped string literals
/// back to the column type on insert.
pub(crate) fn render_row_select(table: &str, columns: &[ColumnSpec]) -> String {
    let select_list = columns
        .iter()
        .map(|column| format!("{}::text", quote_ident(&column.name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {select_list} FROM {}", quote_ident(table))
}

pub(crate) fn render_insert(
    table: &str,
    columns: &[ColumnSpec],
    values: &[Option<String>],
) -> String {
    let column_list = columns
        .iter()
        .map(|column| quote_ident(&column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let value_list = values
        .iter()
        .map(|value| sql_literal(value.as_deref()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({column_list}) VALUES ({value_list});\n",
        quote_ident(table)
    )
}

/// Statement splitter for scripts this engine produced: strips `--` line
/// comments and `/* */` block comments, and splits on `;` outside
/// single-quoted literals — exported row data legitimately contains
/// semicolons.
pub(crate) fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();
    let mut in_string = false;

    while let Some(ch) = chars.next() {
        if in_string {
            current.push(ch);
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    current.push('\'');
                } else {
                    in_string = false;
                }
            }
            continue;
        }

        match ch {
            '\'' => {
                in_string = true;
                current.push(ch);
            }
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
                current.push('\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            ';' => {
                let statement = current.trim().to_string();
                if !statement.is_empty() {
                    statements.push(statement);
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    let tail = current.trim().to_string();
    if !tail.is_empty() {
        statements.push(tail);
    }
    statements
}
