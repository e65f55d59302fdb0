use super::types::SessionResults;
use anyhow::{Context, Result};
use std::path::Path;

/// Write `results.json` into `output_dir`
pub fn write_report(results: &SessionResults, output_dir: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    let path = output_dir.join("results.json");
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("    Generated JSON report: {}", path.display());
    Ok(())
}

/// Read back a previously written results file
pub fn read_report(path: &Path) -> Result<SessionResults> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}
