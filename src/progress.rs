use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner style used while a transition is running.
pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.yellow} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"])
}

pub fn ok_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.green} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn err_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.red} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Start a spinner, or a hidden bar when log lines would interleave with it.
pub fn start(message: &str, verbose: bool) -> ProgressBar {
    let pb = if verbose {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    pb.set_style(spinner_style());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Replace the spinner with a final ✔/✘ line.
///
/// Hidden bars print the line directly so the result is never lost.
pub fn finish(pb: &ProgressBar, ok: bool, message: &str) {
    if pb.is_hidden() {
        pb.finish_and_clear();
        if ok {
            println!("{} {}", "✔".green(), message);
        } else {
            eprintln!("{} {}", "✘".red(), message);
        }
        return;
    }
    if ok {
        pb.set_style(ok_style());
        pb.set_prefix("✔");
    } else {
        pb.set_style(err_style());
        pb.set_prefix("✘");
    }
    pb.finish_with_message(message.to_string());
}
