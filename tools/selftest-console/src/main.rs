//! Host-side stand-in for the kernel's serial command loop.
//!
//! Reads one command per line from stdin and answers each with a result
//! line on stdout, exactly as the kernel does over its serial port:
//!
//! ```text
//! $ printf 'kmm_reuse\nkheap_split\n' | selftest-console
//! PASSED
//! PASSED
//! ```
//!
//! `--list` prints the known commands instead. Allocator logging goes to
//! stderr; set `SELFTEST_LOG=debug` (or `trace`) to see it.

mod logger;

use logger::StderrLogger;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

fn main() -> io::Result<ExitCode> {
    if let Err(e) = StderrLogger::from_env().init() {
        eprintln!("selftest-console: {e}");
    }

    let mut out = io::stdout().lock();
    match std::env::args().nth(1).as_deref() {
        None => {}
        Some("--list") => {
            for test in kernel_selftest::iter() {
                writeln!(out, "{}", test.name)?;
            }
            return Ok(ExitCode::SUCCESS);
        }
        Some(other) => {
            eprintln!("usage: selftest-console [--list]  (unexpected argument {other:?})");
            return Ok(ExitCode::from(2));
        }
    }

    let mut all_passed = true;
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match kernel_selftest::dispatch(&line) {
            Some(outcome) => {
                all_passed &= outcome.passed();
                writeln!(out, "{outcome}")?;
            }
            None => writeln!(out, "Unknown command: {}", line.trim())?,
        }
        out.flush()?;
    }

    Ok(if all_passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
