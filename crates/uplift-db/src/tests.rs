use super::*;

use std::path::Path;
use std::process::Command;

use uplift_core::{BackupStrategy, CommandOutput, CommandRunner};

use crate::backup::{build_dump_command, build_restore_command};
use crate::inline::{
    quote_ident, render_column_type, render_create_table, render_insert, render_row_select,
    split_statements, sql_literal, ColumnSpec,
};

fn sample_config() -> DbConfig {
    DbConfig::new("db.internal", 5433, "assessment", "app", "s3cret")
}

fn text_column(name: &str) -> ColumnSpec {
    ColumnSpec {
        name: name.to_string(),
        data_type: "text".to_string(),
        udt_name: "text".to_string(),
        max_length: None,
        nullable: true,
        default: None,
    }
}

struct ToolboxRunner {
    available: Vec<&'static str>,
}

impl CommandRunner for ToolboxRunner {
    fn run(&self, command: &mut Command) -> anyhow::Result<CommandOutput> {
        let program = command.get_program().to_string_lossy().into_owned();
        let success = self.available.iter().any(|name| *name == program);
        Ok(CommandOutput {
            success,
            code: Some(if success { 0 } else { 127 }),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

#[test]
fn strategy_is_cli_only_when_both_commands_resolve() {
    let both = ToolboxRunner {
        available: vec![DUMP_COMMAND, RESTORE_COMMAND],
    };
    assert_eq!(detect_strategy(&both), BackupStrategy::Cli);

    let dump_only = ToolboxRunner {
        available: vec![DUMP_COMMAND],
    };
    assert_eq!(detect_strategy(&dump_only), BackupStrategy::Inline);

    let neither = ToolboxRunner { available: vec![] };
    assert_eq!(detect_strategy(&neither), BackupStrategy::Inline);
}

#[test]
fn dump_command_targets_the_configured_database() {
    let command = build_dump_command(&sample_config(), Path::new("/backups/db-1.sql"));
    assert_eq!(command.get_program().to_string_lossy(), DUMP_COMMAND);

    let args: Vec<String> = command
        .get_args()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        args,
        vec![
            "--no-owner",
            "--no-privileges",
            "--clean",
            "--if-exists",
            "-h",
            "db.internal",
            "-p",
            "5433",
            "-U",
            "app",
            "-f",
            "/backups/db-1.sql",
            "assessment"
        ]
    );

    let has_password = command.get_envs().any(|(key, value)| {
        key.to_string_lossy() == "PGPASSWORD"
            && value.map(|v| v.to_string_lossy() == "s3cret").unwrap_or(false)
    });
    assert!(has_password);
}

#[test]
fn restore_command_feeds_the_backup_file_and_stops_on_error() {
    let command = build_restore_command(&sample_config(), Path::new("/backups/db-1.sql"));
    assert_eq!(command.get_program().to_string_lossy(), RESTORE_COMMAND);

    let args: Vec<String> = command
        .get_args()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        args,
        vec![
            "-v",
            "ON_ERROR_STOP=1",
            "-h",
            "db.internal",
            "-p",
            "5433",
            "-U",
            "app",
            "-d",
            "assessment",
            "-f",
            "/backups/db-1.sql"
        ]
    );
}

#[test]
fn restore_fails_fast_when_backup_file_is_missing() {
    let dir = tempfile::tempdir().expect("must create tempdir");
    let runner = ToolboxRunner {
        available: vec![DUMP_COMMAND, RESTORE_COMMAND],
    };
    let err = restore_database(
        &sample_config(),
        &runner,
        &dir.path().join("db-19990101_000000.sql"),
        BackupStrategy::Cli,
    )
    .expect_err("missing backup file must fail");
    assert!(err.to_string().contains("database backup file not found"));
}

#[test]
fn identifiers_and_literals_are_quoted() {
    assert_eq!(quote_ident("users"), "\"users\"");
    assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    assert_eq!(sql_literal(None), "NULL");
    assert_eq!(sql_literal(Some("plain")), "'plain'");
    assert_eq!(sql_literal(Some("it's")), "'it''s'");
}

#[test]
fn column_types_render_lengths_arrays_and_enums() {
    let mut varchar = text_column("email");
    varchar.data_type = "character varying".to_string();
    varchar.max_length = Some(255);
    assert_eq!(render_column_type(&varchar), "character varying(255)");

    let mut array = text_column("tags");
    array.data_type = "ARRAY".to_string();
    array.udt_name = "_int4".to_string();
    assert_eq!(render_column_type(&array), "int4[]");

    let mut custom = text_column("status");
    custom.data_type = "USER-DEFINED".to_string();
    custom.udt_name = "assessment_status".to_string();
    assert_eq!(render_column_type(&custom), "assessment_status");

    assert_eq!(render_column_type(&text_column("note")), "text");
}

#[test]
fn create_table_includes_constraints_and_primary_key() {
    let id = ColumnSpec {
        name: "id".to_string(),
        data_type: "integer".to_string(),
        udt_name: "int4".to_string(),
        max_length: None,
        nullable: false,
        default: Some("nextval('users_id_seq'::regclass)".to_string()),
    };
    let email = ColumnSpec {
        name: "email".to_string(),
        data_type: "text".to_string(),
        udt_name: "text".to_string(),
        max_length: None,
        nullable: false,
        default: None,
    };

    let sql = render_create_table("users", &[id, email], &["id".to_string()]);
    assert_eq!(
        sql,
        "CREATE TABLE \"users\" (\n  \"id\" integer NOT NULL DEFAULT nextval('users_id_seq'::regclass),\n  \"email\" text NOT NULL,\n  PRIMARY KEY (\"id\")\n);\n"
    );
}

#[test]
fn row_export_casts_every_column_to_text() {
    let columns = [text_column("id"), text_column("note")];
    assert_eq!(
        render_row_select("users", &columns),
        "SELECT \"id\"::text, \"note\"::text FROM \"users\""
    );
}

#[test]
fn insert_statements_preserve_nulls_and_quotes() {
    let columns = [text_column("id"), text_column("note")];
    let values = [Some("1".to_string()), None];
    assert_eq!(
        render_insert("users", &columns, &values),
        "INSERT INTO \"users\" (\"id\", \"note\") VALUES ('1', NULL);\n"
    );

    let quoted = [Some("1".to_string()), Some("it's done; really".to_string())];
    assert_eq!(
        render_insert("users", &columns, &quoted),
        "INSERT INTO \"users\" (\"id\", \"note\") VALUES ('1', 'it''s done; really');\n"
    );
}

#[test]
fn splitter_strips_comments_and_respects_literals() {
    let script = "-- header comment\nCREATE TABLE \"t\" (\"v\" text);\n/* block\ncomment */\nINSERT INTO \"t\" (\"v\") VALUES ('a; b''s');\nINSERT INTO \"t\" (\"v\") VALUES ('tail')";
    let statements = split_statements(script);
    assert_eq!(
        statements,
        vec![
            "CREATE TABLE \"t\" (\"v\" text)",
            "INSERT INTO \"t\" (\"v\") VALUES ('a; b''s')",
            "INSERT INTO \"t\" (\"v\") VALUES ('tail')"
        ]
    );
}

#[test]
fn splitter_returns_nothing_for_comment_only_scripts() {
    let statements = split_statements("-- nothing here\n/* still nothing */\n");
    assert!(statements.is_empty());
}

#[test]
fn splitter_round_trips_generated_inserts() {
    let columns = [text_column("note")];
    let insert = render_insert("t", &columns, &[Some("x; y -- not a comment".to_string())]);
    let statements = split_statements(&insert);
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains("x; y -- not a comment"));
}
