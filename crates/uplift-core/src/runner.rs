use std::process::Command;

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Narrow seam over "spawn a command and capture status/stdout/stderr" so the
/// cli/inline dual paths (database dump, git clone, zip extraction) can be
/// exercised with a fake executor in tests.
pub trait CommandRunner {
    fn run(&self, command: &mut Command) -> Result<CommandOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &mut Command) -> Result<CommandOutput> {
        let program = command.get_program().to_string_lossy().into_owned();
        let output = command
            .output()
            .with_context(|| format!("failed to launch '{program}'"))?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub fn run_checked(
    runner: &dyn CommandRunner,
    command: &mut Command,
    context_message: &str,
) -> Result<CommandOutput> {
    let output = runner
        .run(command)
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.success {
        return Ok(output);
    }

    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output
            .code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string()),
        output.stdout.trim(),
        output.stderr.trim()
    ))
}

/// Lightweight "is this executable resolvable" probe.
pub fn command_available(runner: &dyn CommandRunner, program: &str) -> bool {
    let mut command = Command::new(program);
    command.arg("--version");
    matches!(runner.run(&mut command), Ok(output) if output.success)
}
