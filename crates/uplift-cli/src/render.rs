use std::env;
use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::ProgressBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

pub fn current_output_style() -> OutputStyle {
    match env::var("UPLIFT_OUTPUT").ok().as_deref() {
        Some("plain") => return OutputStyle::Plain,
        Some("rich") => return OutputStyle::Rich,
        _ => {}
    }
    if std::io::stdout().is_terminal() {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => {
            let badge = match status {
                "ok" => "[OK]",
                "warn" => "[WARN]",
                "err" => "[ERR]",
                _ => "[..]",
            };
            format!("{badge} {message}")
        }
    }
}

pub fn print_status(style: OutputStyle, status: &str, message: &str) {
    println!("{}", render_status_line(style, status, message));
}

pub fn eprint_status(style: OutputStyle, status: &str, message: &str) {
    eprintln!("{}", render_status_line(style, status, message));
}

pub fn print_section(style: OutputStyle, title: &str) {
    if style == OutputStyle::Plain {
        return;
    }
    println!();
    println!("{}", colorize(section_style(), &format!("== {title} ==")));
}

/// Spinner for long blocking steps (download, clone, archive, dump); only in
/// rich mode, cleared once the step finishes.
pub fn with_spinner<T>(style: OutputStyle, label: &str, run: impl FnOnce() -> T) -> T {
    let spinner = (style == OutputStyle::Rich).then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_message(label.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    });

    let result = run();

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    result
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
