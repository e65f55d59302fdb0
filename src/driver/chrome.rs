use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::traits::{BrowserEngine, BrowserLauncher, BrowserSession, LaunchOptions};
use crate::utils::binary_resolver::find_browser;
use crate::utils::config::BrowserConfig;

/// Launches Chromium-family browsers with remote debugging enabled and
/// drives them through the DevTools HTTP endpoint.
pub struct ChromeLauncher {
    config: BrowserConfig,
    client: reqwest::Client,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn is_ready(&self, endpoint: &str) -> bool {
        match self
            .client
            .get(format!("{}/json/version", endpoint))
            .timeout(Duration::from_millis(500))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn wait_ready(&self, endpoint: &str, child: &mut Child) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(self.config.ready_timeout_ms);
        loop {
            if self.is_ready(endpoint).await {
                return Ok(());
            }
            if let Some(status) = child.try_wait()? {
                anyhow::bail!("browser exited before DevTools became available ({})", status);
            }
            if Instant::now() >= deadline {
                anyhow::bail!(
                    "DevTools endpoint {} not ready after {}ms",
                    endpoint,
                    self.config.ready_timeout_ms
                );
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    fn build_args(&self, options: &LaunchOptions, port: u16, profile_dir: &std::path::Path) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", port),
            format!("--user-data-dir={}", profile_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-default-apps".to_string(),
        ];
        if options.headless || self.config.headless {
            args.push("--headless=new".to_string());
        }
        if options.maximized {
            args.push("--start-maximized".to_string());
        }
        args.extend(options.extra_args.iter().cloned());
        args.push("about:blank".to_string());
        args
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>> {
        if let Some(port) = options.debugging_port {
            let endpoint = endpoint_for(port);
            if self.is_ready(&endpoint).await {
                log::info!("attaching to running browser at {}", endpoint);
                return Ok(Box::new(ChromeSession::attached(
                    options.engine,
                    endpoint,
                    self.client.clone(),
                )));
            }
        }

        let binary = find_browser(options.engine, self.config.browser_path.as_deref())?;
        let port = match options.debugging_port {
            Some(port) => port,
            None => free_port()?,
        };
        let profile_dir = std::env::temp_dir().join(format!("lumi-automation-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&profile_dir)
            .with_context(|| format!("Failed to create profile dir {}", profile_dir.display()))?;

        let args = self.build_args(options, port, &profile_dir);
        log::info!("launching {} from {}", options.engine, binary.display());
        log::debug!("browser args: {:?}", args);

        let mut cmd = Command::new(&binary);
        cmd.args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        // Own process group so a Ctrl-C aimed at us does not reach the browser
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", binary.display()))?;

        let endpoint = endpoint_for(port);
        if let Err(e) = self.wait_ready(&endpoint, &mut child).await {
            let _ = child.kill().await;
            let _ = std::fs::remove_dir_all(&profile_dir);
            return Err(e);
        }
        log::info!("{} ready at {} (pid {:?})", options.engine, endpoint, child.id());

        Ok(Box::new(ChromeSession {
            engine: options.engine,
            endpoint,
            client: self.client.clone(),
            child: Mutex::new(Some(child)),
            profile_dir: Some(profile_dir),
            current_target: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }
}

/// A browser reachable through its DevTools endpoint.
///
/// Launched sessions own the process and its profile directory; attached
/// sessions only own the tabs they opened.
pub struct ChromeSession {
    engine: BrowserEngine,
    endpoint: String,
    client: reqwest::Client,
    child: Mutex<Option<Child>>,
    profile_dir: Option<PathBuf>,
    current_target: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl ChromeSession {
    fn attached(engine: BrowserEngine, endpoint: String, client: reqwest::Client) -> Self {
        Self {
            engine,
            endpoint,
            client,
            child: Mutex::new(None),
            profile_dir: None,
            current_target: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    async fn close_target(&self, id: &str) -> Result<()> {
        self.client
            .get(format!("{}/json/close/{}", self.endpoint, id))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    fn engine(&self) -> BrowserEngine {
        self.engine
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("browser session at {} is closed", self.endpoint);
        }

        let target: serde_json::Value = self
            .client
            .put(new_target_url(&self.endpoint, url)?)
            .send()
            .await
            .with_context(|| format!("Failed to reach DevTools at {}", self.endpoint))?
            .error_for_status()?
            .json()
            .await?;

        let id = target
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("DevTools did not return a target id"))?;

        let previous = self.current_target.lock().await.replace(id);
        if let Some(previous) = previous {
            if let Err(e) = self.close_target(&previous).await {
                log::debug!("could not close previous tab {}: {:#}", previous, e);
            }
        }
        log::debug!("navigated to {}", url);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Holding the child lock serializes concurrent closes
        let mut child = self.child.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        match child.as_mut() {
            Some(process) => {
                process.kill().await.context("Failed to stop browser process")?;
                child.take();
                if let Some(dir) = &self.profile_dir {
                    if let Err(e) = std::fs::remove_dir_all(dir) {
                        log::debug!("could not remove profile dir {}: {}", dir.display(), e);
                    }
                }
            }
            None => {
                // Attached: leave the browser running, drop our tab
                let mut target = self.current_target.lock().await;
                if let Some(id) = target.as_deref() {
                    self.close_target(id).await?;
                }
                target.take();
            }
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// `/json/new` takes the page URL as the raw query; encode it so `#` and
/// spaces survive.
fn new_target_url(endpoint: &str, url: &str) -> Result<reqwest::Url> {
    let mut target = reqwest::Url::parse(&format!("{}/json/new", endpoint))
        .with_context(|| format!("Invalid DevTools endpoint: {}", endpoint))?;
    target.set_query(Some(url));
    Ok(target)
}

fn endpoint_for(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

fn free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").context("No free local port")?;
    Ok(listener.local_addr()?.port())
}
