//! `omniloop doctor`: show how the oracle would be resolved.

use std::env;
use std::path::Path;

use anyhow::Result;

use crate::Invocation;

/// Print oracle resolution diagnostics. Never invokes the oracle.
pub fn run(invocation: &Invocation) -> Result<()> {
    println!("=== omniloop doctor ===");
    println!();
    println!("omniloop version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("--- Loop Policy ---");
    let config = &invocation.config;
    println!("  Baseline stride:   {}", config.bad_stride);
    println!("  Optimized stride:  {}", config.good_stride);
    println!("  Instruction count: {}", config.instruction_count);
    println!("  Threshold:         {} cycles", config.threshold);
    if let Err(e) = config.validate() {
        println!("  Problem:           {e}");
    }
    println!();

    println!("--- Oracle ---");
    let oracle = &invocation.oracle;
    match &oracle.working_dir {
        Some(dir) => println!(
            "  Working dir: {} ({})",
            dir.display(),
            if dir.is_dir() { "found" } else { "missing" }
        ),
        None => println!("  Working dir: (inherited)"),
    }
    println!(
        "  Program:     {} ({})",
        oracle.program,
        if program_available(&oracle.program) {
            "found"
        } else {
            "not found"
        }
    );
    println!("  Command:     {}", oracle.display_for(&invocation.descriptor));
    match oracle.timeout {
        Some(timeout) => println!("  Timeout:     {}s", timeout.as_secs()),
        None => println!("  Timeout:     none"),
    }
    println!();

    println!("--- Descriptor ---");
    println!("  Location: {}", invocation.descriptor.display());
    let parent_ok = invocation
        .descriptor
        .parent()
        .map(|p| p.as_os_str().is_empty() || p.is_dir())
        .unwrap_or(false);
    println!(
        "  Parent directory: {}",
        if parent_ok { "exists" } else { "missing" }
    );

    Ok(())
}

/// Whether `program` is a path to a file or resolvable on `PATH`.
fn program_available(program: &str) -> bool {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file();
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}
