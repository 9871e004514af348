use std::path::Path;

use anyhow::Result;

/// Execute the `check` command: parse, validate, and plan without running.
pub fn execute(pipeline_path: &Path) -> Result<()> {
    let app = super::deploy_pipeline(pipeline_path)?;
    println!("Pipeline structure: OK");

    for stage in &app.plan().stages {
        println!(
            "  {:10} {} ({})",
            format!("[{}]", stage.role.as_str()),
            stage.name,
            stage.plugin
        );
    }

    println!("\nAll checks passed.");
    Ok(())
}
