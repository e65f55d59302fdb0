/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Keep running after any failed command
    pub continue_on_failure: bool,

    /// Pause between commands (ms)
    pub command_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            continue_on_failure: false,
            command_delay_ms: 0,
        }
    }
}

/// Browser launcher configuration
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,

    /// How long to wait for the DevTools endpoint after launch (ms)
    pub ready_timeout_ms: u64,

    /// Explicit browser binary, overrides discovery
    pub browser_path: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            ready_timeout_ms: 10_000,
            browser_path: None,
        }
    }
}

impl BrowserConfig {
    /// Defaults overridden by `LUMI_HEADLESS` and `LUMI_BROWSER_PATH`
    pub fn from_env() -> Self {
        let headless = std::env::var("LUMI_HEADLESS")
            .map(|v| is_truthy(&v))
            .unwrap_or(false);
        let browser_path = std::env::var("LUMI_BROWSER_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty());

        Self {
            headless,
            browser_path,
            ..Self::default()
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse a `KEY=VALUE` pair from the command line
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}
