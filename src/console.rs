//! Operator-facing console output
//!
//! The job runs from a scheduler; its stdout is the operator's log. Step
//! lines carry a wall-clock timestamp, and every abort path goes through
//! the delimited banner so failures stand out in captured output.

use colored::Colorize;

/// Timestamped progress line for a pipeline step
pub fn step(message: &str) {
    let ts = chrono::Local::now().format("%H:%M:%S");
    println!("[{}] {}", ts, message);
}

/// Indented detail line under the current step
pub fn detail(message: &str) {
    println!("   {}", message);
}

const BANNER: &str = "********** ERROR MESSAGE **********";
const WARN_BANNER: &str = "********** WARNING **********";

/// Delimited, red error banner printed before the run terminates
pub fn error_banner(lines: &[String]) {
    println!();
    println!("{}", BANNER.red().bold());
    for line in lines {
        println!("{}", line.red());
    }
    println!("{}", BANNER.red().bold());
    println!();
}

/// Delimited, yellow banner for reported-but-non-fatal failures
pub fn warning_banner(lines: &[String]) {
    println!();
    println!("{}", WARN_BANNER.yellow().bold());
    for line in lines {
        println!("{}", line.yellow());
    }
    println!("{}", WARN_BANNER.yellow().bold());
    println!();
}
