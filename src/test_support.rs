//! Fakes shared by unit tests.

use anyhow::Result;
use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::commands::{command_accessors, CommandConfig, CommandDescriptor, PropertyDescriptor, ScriptCommand};
use crate::driver::traits::{BrowserEngine, BrowserLauncher, BrowserSession, LaunchOptions};
use crate::error::CommandError;
use crate::runner::cancel::CancelToken;
use crate::runner::context::ExecutionContext;
use crate::runner::instances::{InstanceHandle, ResourceHandle};

/// Resource handle that only remembers whether it was closed
pub(crate) struct FakeHandle {
    label: String,
    fail_on_close: bool,
    closed: AtomicBool,
}

impl FakeHandle {
    pub fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            fail_on_close: false,
            closed: AtomicBool::new(false),
        })
    }

    pub fn failing(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            fail_on_close: true,
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn label_of(handle: &InstanceHandle) -> String {
        handle
            .as_any()
            .downcast_ref::<FakeHandle>()
            .map(|h| h.label.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResourceHandle for FakeHandle {
    fn kind(&self) -> &str {
        "fake"
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_on_close {
            anyhow::bail!("{} refused to close", self.label);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// What a fake browser session saw
#[derive(Default)]
pub(crate) struct FakeSessionState {
    navigated: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl FakeSessionState {
    pub fn navigated(&self) -> Vec<String> {
        self.navigated.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeSession {
    engine: BrowserEngine,
    state: Arc<FakeSessionState>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    fn engine(&self) -> BrowserEngine {
        self.engine
    }

    fn endpoint(&self) -> &str {
        "http://127.0.0.1:0"
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        if self.state.is_closed() {
            anyhow::bail!("session closed");
        }
        self.state.navigated.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher that hands out in-memory sessions
#[derive(Default)]
pub(crate) struct FakeLauncher {
    fail: bool,
    launches: Mutex<Vec<LaunchOptions>>,
    sessions: Mutex<Vec<Arc<FakeSessionState>>>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn launches(&self) -> Vec<LaunchOptions> {
        self.launches.lock().unwrap().clone()
    }

    pub fn session(&self, index: usize) -> Arc<FakeSessionState> {
        self.sessions.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>> {
        self.launches.lock().unwrap().push(options.clone());
        if self.fail {
            anyhow::bail!("no browser installed");
        }
        let state = Arc::new(FakeSessionState::default());
        self.sessions.lock().unwrap().push(state.clone());
        Ok(Box::new(FakeSession {
            engine: options.engine,
            state,
        }))
    }
}

/// Records the step index of every run; optionally cancels a token
pub(crate) struct RecordingCommand {
    config: CommandConfig,
    visits: Arc<Mutex<Vec<usize>>>,
    cancel: Option<CancelToken>,
}

impl RecordingCommand {
    pub const DESCRIPTOR: CommandDescriptor = CommandDescriptor {
        name: "recordStep",
        display_label: "Record Step",
        group: "Test Commands",
        description: "",
        uses_notes: "",
        implementation_notes: "",
        properties: &[PropertyDescriptor {
            optional: true,
            ..PropertyDescriptor::text("tag", "Tag")
        }],
    };

    pub fn new(visits: &Arc<Mutex<Vec<usize>>>) -> Box<dyn ScriptCommand> {
        Box::new(Self {
            config: CommandConfig::from_descriptor(&Self::DESCRIPTOR),
            visits: visits.clone(),
            cancel: None,
        })
    }

    pub fn cancelling(visits: &Arc<Mutex<Vec<usize>>>, token: &CancelToken) -> Box<dyn ScriptCommand> {
        Box::new(Self {
            config: CommandConfig::from_descriptor(&Self::DESCRIPTOR),
            visits: visits.clone(),
            cancel: Some(token.clone()),
        })
    }

    pub fn with_config(visits: &Arc<Mutex<Vec<usize>>>, config: CommandConfig) -> Box<dyn ScriptCommand> {
        Box::new(Self {
            config,
            visits: visits.clone(),
            cancel: None,
        })
    }
}

#[async_trait]
impl ScriptCommand for RecordingCommand {
    command_accessors!();

    fn display_value(&self) -> String {
        format!("Record Step [{}]", self.config.get("tag"))
    }

    async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        self.visits.lock().unwrap().push(ctx.step());
        if let Some(token) = &self.cancel {
            token.cancel();
        }
        Ok(())
    }
}
