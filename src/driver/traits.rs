use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

/// Browser family a session is launched with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrowserEngine {
    #[default]
    Chrome,
    Edge,
    Chromium,
}

impl BrowserEngine {
    pub const OPTIONS: &'static [&'static str] = &["Chrome", "Edge", "Chromium"];

    /// Map an "Engine Type" option to its engine
    pub fn from_option(option: &str) -> Option<Self> {
        match option {
            "Chrome" => Some(Self::Chrome),
            "Edge" => Some(Self::Edge),
            "Chromium" => Some(Self::Chromium),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Chrome => "Chrome",
            Self::Edge => "Edge",
            Self::Chromium => "Chromium",
        }
    }

    /// Executable names looked up on PATH
    pub fn binary_names(&self) -> &'static [&'static str] {
        match self {
            Self::Chrome => &["google-chrome", "google-chrome-stable", "chrome"],
            Self::Edge => &["microsoft-edge", "microsoft-edge-stable", "msedge"],
            Self::Chromium => &["chromium", "chromium-browser"],
        }
    }

    /// Well-known install locations
    pub fn known_paths(&self) -> &'static [&'static str] {
        match self {
            Self::Chrome => &[
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                "/usr/bin/google-chrome",
                "/usr/bin/google-chrome-stable",
                "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
            ],
            Self::Edge => &[
                "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
                "/usr/bin/microsoft-edge",
                "/usr/bin/microsoft-edge-stable",
                "C:\\Program Files (x86)\\Microsoft\\Edge\\Application\\msedge.exe",
            ],
            Self::Chromium => &[
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/snap/bin/chromium",
            ],
        }
    }
}

impl fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a browser should be started
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub engine: BrowserEngine,
    pub headless: bool,
    pub maximized: bool,
    /// Extra command line switches, passed through as given
    pub extra_args: Vec<String>,
    /// Attach to (or launch on) this remote debugging port
    pub debugging_port: Option<u16>,
}

/// Starts browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>>;
}

/// A live browser the script can drive
#[async_trait]
pub trait BrowserSession: Send + Sync {
    fn engine(&self) -> BrowserEngine;

    /// DevTools HTTP endpoint, e.g. `http://127.0.0.1:9222`
    fn endpoint(&self) -> &str;

    async fn navigate(&self, url: &str) -> Result<()>;

    /// Shut the browser down (or detach from it). Safe to call twice.
    async fn close(&self) -> Result<()>;
}
