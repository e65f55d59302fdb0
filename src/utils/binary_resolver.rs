use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::driver::traits::BrowserEngine;

/// Locate the executable for `engine`.
///
/// Order: an explicit path (from `LUMI_BROWSER_PATH` or config), the
/// install directory `~/.lumi-automation/browsers`, well-known system
/// locations, then the system PATH.
pub fn find_browser(engine: BrowserEngine, explicit: Option<&str>) -> Result<PathBuf> {
    let mut checked_paths = Vec::new();

    if let Some(explicit) = explicit {
        let path = PathBuf::from(explicit);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("Configured browser path does not exist: {}", path.display());
    }

    if let Some(home) = dirs::home_dir() {
        let install_dir = home.join(".lumi-automation").join("browsers");
        for name in engine.binary_names() {
            let candidate = install_dir.join(executable_name(name));
            checked_paths.push(format!("Install Dir: {:?}", candidate));
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }

    for path in engine.known_paths() {
        let candidate = Path::new(path);
        checked_paths.push(format!("System: {:?}", candidate));
        if candidate.exists() {
            return Ok(candidate.to_path_buf());
        }
    }

    for name in engine.binary_names() {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
        checked_paths.push(format!("PATH: {}", name));
    }

    Err(anyhow::anyhow!(
        "Could not find a {} browser. Checked paths:\n{}",
        engine,
        checked_paths.join("\n")
    ))
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("my-chrome");
        std::fs::write(&fake, "").unwrap();

        let found = find_browser(BrowserEngine::Chrome, fake.to_str()).unwrap();
        assert_eq!(found, fake);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = find_browser(BrowserEngine::Edge, missing.to_str()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
