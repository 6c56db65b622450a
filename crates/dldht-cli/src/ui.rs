//! Terminal output helpers.
//!
//! Results go to stdout; failures and hints go to stderr so piped output
//! (`get --raw`) stays clean.

use colored::Colorize;

/// Print a success message.
pub fn success(msg: &str) {
    println!("  {} {}", "\u{2714}".bright_green(), msg);
}

/// Section header: ">> Title" in cyan.
pub fn section(title: &str) {
    println!("  {} {}", ">>".bright_cyan().bold(), title.bold());
}

/// Key-value display: "  Label:       value".
pub fn kv(label: &str, value: &str) {
    println!("  {:<13}{}", format!("{label}:"), value);
}

/// Key-value with green value.
pub fn kv_ok(label: &str, value: &str) {
    println!("  {:<13}{}", format!("{label}:"), value.bright_green());
}

/// Hint line in dimmed text.
pub fn hint(msg: &str) {
    eprintln!("  {} {}", "hint:".dimmed(), msg.dimmed());
}

/// Yellow warning.
pub fn warn(msg: &str) {
    eprintln!("  {} {}", "-".bright_yellow(), msg.yellow());
}

/// Red error message.
pub fn error(msg: &str) {
    eprintln!("  {} {}", "\u{2718}".bright_red(), msg.bright_red());
}

/// Red error + yellow "fix:" suggestion.
pub fn error_with_fix(msg: &str, fix: &str) {
    error(msg);
    eprintln!("    {} {}", "fix:".bright_yellow(), fix);
}

/// Empty line.
pub fn blank() {
    println!();
}
