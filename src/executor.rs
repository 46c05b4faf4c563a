//! Plan execution.
//!
//! Steps run strictly in order. Nothing is rolled back on failure: disk
//! operations at this level are not reliably reversible, so the first
//! failing utility aborts the run and the next invocation re-plans from
//! the new on-disk state.

use crate::errors::ExecError;
use crate::planner::{Plan, PlanStep};
use crate::probe::lsblk;
use crate::runner::CommandRunner;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Every step ran and the kernel observed every change.
    Completed,
    /// Partition tables were rewritten on disk but the running kernel did
    /// not adopt them; the operator must reboot and rerun the same
    /// command.
    RebootRequired,
}

pub fn execute(runner: &dyn CommandRunner, plan: &Plan) -> Result<ExecOutcome, ExecError> {
    let mut pending_reboot = false;

    for step in &plan.steps {
        // Partition-table edits keep working against the on-disk table,
        // so one reboot covers all of them. Everything else needs the
        // kernel's view and must wait.
        if pending_reboot && !step.requires_reread() {
            return Ok(ExecOutcome::RebootRequired);
        }

        run_step(runner, step)?;

        if step.requires_reread() && !kernel_adopted(runner, step) {
            pending_reboot = true;
        }
    }

    if pending_reboot {
        Ok(ExecOutcome::RebootRequired)
    } else {
        Ok(ExecOutcome::Completed)
    }
}

fn run_step(runner: &dyn CommandRunner, step: &PlanStep) -> Result<(), ExecError> {
    for (argv, line) in step.commands().iter().zip(step.render()) {
        let args: Vec<&str> = argv[1..].iter().map(String::as_str).collect();
        let output = runner.run(&argv[0], &args).map_err(|e| ExecError {
            step: line.clone(),
            stderr: e.to_string(),
        })?;
        if !output.success() {
            return Err(ExecError {
                step: line,
                stderr: output.stderr.trim().to_string(),
            });
        }
    }
    Ok(())
}

/// Whether the kernel now reports the partition this step created or
/// resized, at its planned geometry. A disk that can't be re-probed counts
/// as not adopted.
fn kernel_adopted(runner: &dyn CommandRunner, step: &PlanStep) -> bool {
    let (Some(disk), Some((device, size))) = (step.disk(), step.expected_device()) else {
        return true;
    };
    let disk = disk.to_string_lossy();
    let Ok(tree) = lsblk::disk_tree(runner, &disk) else {
        return false;
    };
    let device = device.to_string_lossy();
    tree.find_by_path(&device).is_some_and(|node| node.size == size)
}

/// Verify every utility the plan invokes resolves on PATH before touching
/// anything.
pub fn preflight(plan: &Plan) -> anyhow::Result<()> {
    let mut programs: BTreeSet<String> = BTreeSet::new();
    for step in &plan.steps {
        for argv in step.commands() {
            programs.insert(argv[0].clone());
        }
    }
    // The executor re-probes through lsblk after table edits.
    if plan.steps.iter().any(|s| s.requires_reread()) {
        programs.insert("lsblk".to_string());
    }

    let missing: Vec<String> = programs
        .into_iter()
        .filter(|p| which::which(p).is_err())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("required utilities not found on PATH: {}", missing.join(", "))
    }
}
