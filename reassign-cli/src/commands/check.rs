//! Check Command
//!
//! Validates an existing plan against a reassignment request.

use crate::commands::propose::read_input;
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use reassign_core::{check_plan, OptimizerConfig, PlanCheck, ReassignmentPlan, SpecBuilder};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

/// Check configuration
pub struct CheckConfig {
    pub input: PathBuf,
    pub plan: PathBuf,
}

/// Run check command
pub fn run(settings: &OptimizerConfig, config: CheckConfig) -> Result<()> {
    let doc = read_input(Some(config.input.as_path()))?;
    let spec = SpecBuilder::from_document(&doc, settings.balance_factors())?.build()?;

    let file = File::open(&config.plan)
        .with_context(|| format!("Failed to open plan {}", config.plan.display()))?;
    let plan = ReassignmentPlan::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse plan {}", config.plan.display()))?;

    let check = check_plan(&spec, &plan);
    print_check(&check);

    if !check.is_valid() {
        anyhow::bail!(
            "Plan violates {} constraint(s)",
            check.violations.len()
        );
    }
    Ok(())
}

fn print_check(check: &PlanCheck) {
    println!("{}", style("Plan Check").bold().underlined());
    println!();
    println!("  Movements:           {}", style(check.movement.weighted_moves).cyan());
    println!("  Replicas added:      {}", style(check.movement.replicas_added).cyan());
    println!("  Replicas removed:    {}", style(check.movement.replicas_removed).cyan());
    println!("  Partitions changed:  {}", style(check.movement.partitions_changed).cyan());
    println!();

    if check.is_valid() {
        println!("{} Plan satisfies every constraint", style(symbols::CHECK).green());
        return;
    }
    println!(
        "{} {} violation(s):",
        style(symbols::CROSS).red(),
        check.violations.len()
    );
    for violation in &check.violations {
        println!("  {} {}", style(symbols::ARROW).dim(), violation);
    }
}
