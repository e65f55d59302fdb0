pub mod json;
pub mod junit;
pub mod types;

use anyhow::Result;
use std::path::Path;

/// Write every report format into `output_dir`
pub fn write_reports(results: &types::SessionResults, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    json::write_report(results, output_dir)?;
    junit::write_report(results, output_dir)?;
    Ok(())
}

/// Re-render an existing `results.json` as the given format
pub fn generate_report(results_path: &Path, format: &str, output_dir: &Path) -> Result<()> {
    let results = json::read_report(results_path)?;
    std::fs::create_dir_all(output_dir)?;

    match format {
        "json" => json::write_report(&results, output_dir),
        "junit" => junit::write_report(&results, output_dir),
        _ => anyhow::bail!("Unknown format: {}", format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::SessionResults;

    #[test]
    fn test_generate_report_from_results_file() {
        let dir = tempfile::tempdir().unwrap();
        let results = SessionResults::new("s1", vec![], Some(0));
        write_reports(&results, dir.path()).unwrap();

        let out = dir.path().join("regenerated");
        generate_report(&dir.path().join("results.json"), "junit", &out).unwrap();
        assert!(out.join("junit.xml").exists());

        let err = generate_report(&dir.path().join("results.json"), "html", &out).unwrap_err();
        assert!(err.to_string().contains("Unknown format"));
    }
}
