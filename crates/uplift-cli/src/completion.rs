use std::io::Write;

use clap::CommandFactory;
use clap_complete::{generate, Shell};

pub fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut command = crate::Cli::command();
    generate(shell, &mut command, "uplift", out);
}
