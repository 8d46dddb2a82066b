use colored::*;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn print_banner() {
    println!("{}", "====================================".bright_cyan());
    println!("{}", "          DASH RUNNER v0.2.0        ".bright_cyan().bold());
    println!("{}", "====================================".bright_cyan());
    println!("{}\n", " Dashboard launcher".bright_white());
}

// Utility function to ask the user a question and return their answer
pub fn ask_user(question: &str) -> String {
    print!("{question}");
    io::stdout().flush().unwrap();

    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();
    input.trim().to_string()
}

// Utility function that asks a yes/no question using ask_user
pub fn confirm(question: &str) -> bool {
    let ans = ask_user(&format!("{question} (y/n) : "));
    ans.to_lowercase().starts_with('y')
}

// ── Startup status lines ────────────────────────────────────────────────

pub fn status_ok(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn status_warn(message: &str) {
    println!("{} {}", "⚠".yellow(), message.yellow());
}

/// Fatal diagnostics go to stderr so scripts can separate them from the
/// application's own output.
pub fn status_fail(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Start a spinner animation in a background thread.
/// Returns an `Arc<AtomicBool>` — set it to `false` to stop the spinner.
pub fn start_spinner(message: &str) -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    let msg = message.to_string();

    std::thread::spawn(move || {
        let frames = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
        let mut i = 0;
        while running_clone.load(Ordering::Relaxed) {
            print!("\r{} {} ", frames[i % frames.len()].to_string().cyan(), msg.dimmed());
            let _ = io::stdout().flush();
            std::thread::sleep(std::time::Duration::from_millis(80));
            i += 1;
        }
        // Clear the spinner line
        print!("\r{}\r", " ".repeat(msg.len() + 4));
        let _ = io::stdout().flush();
    });

    running
}

/// Stop a running spinner.
pub fn stop_spinner(handle: &Arc<AtomicBool>) {
    handle.store(false, Ordering::Relaxed);
    // Give the spinner thread time to clear the line
    std::thread::sleep(std::time::Duration::from_millis(100));
}
