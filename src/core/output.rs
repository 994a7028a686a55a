//! Colored output and progress reporting
//!
//! Uses owo-colors for terminal colors and indicatif for spinners and
//! byte-counting bars. Status lines go to stdout, warnings and errors to stderr.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
const TICK_INTERVAL_MS: u64 = 80;
const BYTES_TEMPLATE: &str =
    "     {spinner:.cyan} [{bar:30.cyan/dim}] {bytes}/{total_bytes} ({eta})";

/// Print an action header (blue, bold)
/// Example: "==> Building fmt"
pub fn action(message: &str) {
    println!("{} {}", "==>".blue().bold(), message.bold());
}

/// Print an action with a package counter
/// Example: "(2/4) Building boost"
pub fn action_numbered(current: usize, total: usize, message: &str) {
    println!(
        "{} {}",
        format!("({}/{})", current, total).cyan(),
        message.bold()
    );
}

/// Print a stage line
/// Example: "  -> configure"
pub fn sub_action(stage: &str) {
    println!("  {} {}", "->".cyan(), stage);
}

/// Print a detail line (dimmed)
pub fn detail(message: &str) {
    println!("     {}", message.dimmed());
}

/// Print a success message (green)
pub fn success(message: &str) {
    println!("{} {}", "==>".green().bold(), message.green());
}

/// Print an info message (cyan)
pub fn info(message: &str) {
    println!("{} {}", "::".cyan(), message);
}

/// Print a warning message (yellow)
pub fn warning(message: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
}

/// Print an error message (red)
pub fn error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message.red());
}

/// Print a skip message (dimmed)
/// Example: "  -> build (up to date)"
pub fn skip(message: &str) {
    println!("  {} {}", "->".dimmed(), message.dimmed());
}

/// Spinner used while extracting or waiting on a transfer of unknown size.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("     {spinner:.cyan} {msg}") {
        pb.set_style(style.tick_chars(SPINNER_CHARS));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(TICK_INTERVAL_MS));
    pb
}

/// Switch a spinner to a byte bar once the content length is known.
pub fn upgrade_to_bytes(pb: &ProgressBar, total_bytes: u64) {
    pb.set_length(total_bytes);
    if let Ok(style) = ProgressStyle::default_bar().template(BYTES_TEMPLATE) {
        pb.set_style(style.progress_chars("━╸━"));
    }
}

/// RAII guard that clears a progress bar when dropped, including on `?` exits.
pub struct ProgressGuard(ProgressBar);

impl ProgressGuard {
    pub fn new(pb: ProgressBar) -> Self {
        Self(pb)
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.0
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.0.finish_and_clear();
    }
}
