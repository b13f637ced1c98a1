//! Default command: run the feedback loop once.

use anyhow::{Context, Result};
use omniloop_core::{FeedbackController, LoopOutcome, SubprocessOracle};
use tracing::info;

use crate::Invocation;

/// Run the loop against the subprocess oracle and print the report to stdout.
pub fn run(invocation: &Invocation) -> Result<()> {
    let outcome = execute(invocation)?;
    println!("{}", render(&outcome, invocation.json)?);
    Ok(())
}

/// Run the loop and return its outcome without printing.
pub fn execute(invocation: &Invocation) -> Result<LoopOutcome> {
    info!(
        descriptor = %invocation.descriptor.display(),
        oracle = %invocation.oracle.program,
        "starting feedback loop"
    );
    let oracle = SubprocessOracle::new(invocation.oracle.clone());
    let mut controller =
        FeedbackController::new(invocation.config, oracle, &invocation.descriptor);

    controller.run().with_context(|| {
        format!(
            "feedback loop aborted in state {} (oracle: {})",
            controller.state(),
            invocation.oracle.display_for(&invocation.descriptor)
        )
    })
}

fn render(outcome: &LoopOutcome, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(&outcome.to_json())?)
    } else {
        Ok(outcome.to_string().trim_end().to_string())
    }
}
