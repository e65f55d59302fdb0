//! Browser commands: create a named browser instance, drive it, close it.
//!
//! `browserCreate` registers the launched session in the instance registry
//! under its instance name; the tier comes from the "Instance Tracking"
//! option. Later commands find it again by name.

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use super::{
    command_accessors, CommandConfig, CommandDescriptor, PropertyDescriptor, ScriptCommand, UiControl,
};
use crate::driver::traits::{BrowserEngine, BrowserLauncher, BrowserSession, LaunchOptions};
use crate::error::{CommandError, RegistryError};
use crate::runner::context::ExecutionContext;
use crate::runner::instances::{
    InstanceHandle, ResourceHandle, Tier, FORGET_INSTANCE, KEEP_INSTANCE_ALIVE,
};

const REPLACE: &str = "Replace";
const CLOSE_AND_REPLACE: &str = "Close And Replace";
const FAIL: &str = "Fail";

/// Registry handle for a browser session
pub struct BrowserInstance {
    session: Box<dyn BrowserSession>,
}

impl BrowserInstance {
    pub fn new(session: Box<dyn BrowserSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &dyn BrowserSession {
        self.session.as_ref()
    }

    /// Downcast a registry handle, failing if it holds something else
    pub fn from_handle<'h>(name: &str, handle: &'h InstanceHandle) -> Result<&'h BrowserInstance, CommandError> {
        handle
            .as_any()
            .downcast_ref::<BrowserInstance>()
            .ok_or_else(|| {
                CommandError::failed(format!(
                    "instance '{}' is a {} instance, not a browser",
                    name,
                    handle.kind()
                ))
            })
    }
}

#[async_trait]
impl ResourceHandle for BrowserInstance {
    fn kind(&self) -> &str {
        "browser"
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.session.close().await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

const INSTANCE_NAME: PropertyDescriptor = PropertyDescriptor {
    input_spec: "Enter a unique name that will represent the browser instance.",
    sample_usage: "**myInstance** or **seleniumInstance**",
    remarks: "This unique name allows you to refer to the instance by name in future commands, ensuring that the commands you specify run against the correct browser.",
    default: Some("default"),
    ..PropertyDescriptor::text("instanceName", "Browser Instance Name")
};

/// Launches a browser and registers it under an instance name
pub struct BrowserCreateCommand {
    config: CommandConfig,
    launcher: Arc<dyn BrowserLauncher>,
}

impl BrowserCreateCommand {
    pub const DESCRIPTOR: CommandDescriptor = CommandDescriptor {
        name: "browserCreate",
        display_label: "Create Browser",
        group: "Web Browser Automation Commands",
        description: "Create a new web browser session.",
        uses_notes: "Use this command to create a browser session that later browser commands refer to by instance name.",
        implementation_notes: "Starts a Chromium-family browser with remote debugging and registers it in the instance registry.",
        properties: &[
            INSTANCE_NAME,
            PropertyDescriptor {
                input_spec: "Select the browser engine to launch.",
                sample_usage: "**Chrome**",
                control: UiControl::ComboBox,
                helpers: &[],
                options: BrowserEngine::OPTIONS,
                default: Some("Chrome"),
                ..PropertyDescriptor::text("engineType", "Browser Engine Type")
            },
            PropertyDescriptor {
                input_spec: "Specify whether the browser should outlive this script.",
                sample_usage: "**Forget Instance** or **Keep Instance Alive**",
                remarks: "Kept instances stay open for later scripts in the same process until they are closed or the process exits.",
                control: UiControl::ComboBox,
                helpers: &[],
                options: &[FORGET_INSTANCE, KEEP_INSTANCE_ALIVE],
                default: Some(FORGET_INSTANCE),
                ..PropertyDescriptor::text("instanceTracking", "Instance Tracking (after task ends)")
            },
            PropertyDescriptor {
                input_spec: "Select the window state the browser starts in.",
                sample_usage: "**Normal** or **Maximize**",
                optional: true,
                control: UiControl::ComboBox,
                helpers: &[],
                options: &["Normal", "Maximize"],
                default: Some("Normal"),
                ..PropertyDescriptor::text("windowState", "Window State")
            },
            PropertyDescriptor {
                input_spec: "Extra command line switches, separated by spaces.",
                sample_usage: "**--lang=en --incognito**",
                optional: true,
                ..PropertyDescriptor::text("browserOptions", "Browser Options")
            },
            PropertyDescriptor {
                input_spec: "Attach to a browser already listening on this port, or launch one on it.",
                sample_usage: "**9222**",
                optional: true,
                ..PropertyDescriptor::text("debuggingPort", "Remote Debugging Port")
            },
            PropertyDescriptor {
                input_spec: "What to do if the instance name is already registered.",
                sample_usage: "**Replace**",
                remarks: "Replace leaves the previous browser running. Close And Replace closes it first. Fail stops the step.",
                control: UiControl::ComboBox,
                helpers: &[],
                options: &[REPLACE, CLOSE_AND_REPLACE, FAIL],
                default: Some(REPLACE),
                ..PropertyDescriptor::text("existingInstance", "If Instance Exists")
            },
        ],
    };

    pub fn new(config: CommandConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { config, launcher }
    }

    fn launch_options(&self, ctx: &ExecutionContext<'_>) -> Result<LaunchOptions, CommandError> {
        let engine_option = self.resolved(ctx, "engineType")?;
        let engine = BrowserEngine::from_option(&engine_option)
            .ok_or_else(|| CommandError::failed(format!("unsupported browser engine '{}'", engine_option)))?;

        let port = self.resolved(ctx, "debuggingPort")?;
        let debugging_port = match port.trim() {
            "" => None,
            port => Some(
                port.parse::<u16>()
                    .map_err(|_| CommandError::failed(format!("'{}' is not a valid port", port)))?,
            ),
        };

        Ok(LaunchOptions {
            engine,
            headless: false,
            maximized: self.resolved(ctx, "windowState")? == "Maximize",
            extra_args: self
                .resolved(ctx, "browserOptions")?
                .split_whitespace()
                .map(|s| s.to_string())
                .collect(),
            debugging_port,
        })
    }
}

#[async_trait]
impl ScriptCommand for BrowserCreateCommand {
    command_accessors!();

    fn display_value(&self) -> String {
        format!(
            "Create {} Browser - [Instance Name: '{}', Instance Tracking: {}]",
            self.config.get("engineType"),
            self.config.get("instanceName"),
            self.config.get("instanceTracking")
        )
    }

    async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        let name = self.resolved(ctx, "instanceName")?;
        let tracking = self.resolved(ctx, "instanceTracking")?;
        let tier = Tier::from_tracking_option(&tracking)
            .ok_or_else(|| CommandError::failed(format!("unsupported instance tracking '{}'", tracking)))?;
        let policy = self.resolved(ctx, "existingInstance")?;
        let options = self.launch_options(ctx)?;

        if policy == FAIL && ctx.instances().get(tier, &name).is_ok() {
            return Err(RegistryError::DuplicateReplace { tier, name }.into());
        }

        let session = self.launcher.launch(&options).await?;
        let handle: InstanceHandle = Arc::new(BrowserInstance::new(session));

        match policy.as_str() {
            FAIL => {
                if let Err(e) = ctx.instances_mut().put_new(tier, &name, handle.clone()) {
                    handle.close().await?;
                    return Err(e.into());
                }
            }
            CLOSE_AND_REPLACE => {
                if let Some(previous) = ctx.instances_mut().put(tier, &name, handle)? {
                    if let Err(e) = previous.close().await {
                        log::warn!("failed to close replaced browser '{}': {:#}", name, e);
                    }
                }
            }
            _ => {
                // The superseded browser, if any, is left running
                ctx.instances_mut().put(tier, &name, handle)?;
            }
        }

        ctx.log(format!("{} browser '{}' created ({})", options.engine, name, tier));
        Ok(())
    }
}

/// Opens a URL in a named browser instance
pub struct BrowserNavigateCommand {
    config: CommandConfig,
}

impl BrowserNavigateCommand {
    pub const DESCRIPTOR: CommandDescriptor = CommandDescriptor {
        name: "browserNavigate",
        display_label: "Navigate to URL",
        group: "Web Browser Automation Commands",
        description: "Navigate a browser instance to a URL.",
        uses_notes: "Use this command to open a page in a browser created earlier.",
        implementation_notes: "Opens a new target on the DevTools endpoint and closes the previous one.",
        properties: &[
            INSTANCE_NAME,
            PropertyDescriptor {
                input_spec: "The full URL to open.",
                sample_usage: "**https://example.com** or **${site}**",
                ..PropertyDescriptor::text("url", "URL to navigate to")
            },
        ],
    };

    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ScriptCommand for BrowserNavigateCommand {
    command_accessors!();

    fn display_value(&self) -> String {
        format!(
            "{} - [Instance Name: '{}', URL: '{}']",
            self.display_label(),
            self.config.get("instanceName"),
            self.config.get("url")
        )
    }

    async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        let name = self.resolved(ctx, "instanceName")?;
        let url = self.resolved(ctx, "url")?;

        let (_, handle) = ctx.instances().lookup(&name)?;
        let browser = BrowserInstance::from_handle(&name, &handle)?;
        browser.session().navigate(&url).await?;

        ctx.log(format!("'{}' navigated to {}", name, url));
        Ok(())
    }
}

/// Closes a named browser instance and removes it from the registry
pub struct BrowserCloseCommand {
    config: CommandConfig,
}

impl BrowserCloseCommand {
    pub const DESCRIPTOR: CommandDescriptor = CommandDescriptor {
        name: "browserClose",
        display_label: "Close Browser",
        group: "Web Browser Automation Commands",
        description: "Close a browser instance.",
        uses_notes: "Use this command to close a browser, including one kept alive by an earlier script.",
        implementation_notes: "Removes the instance from whichever tier holds it, then closes it.",
        properties: &[INSTANCE_NAME],
    };

    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ScriptCommand for BrowserCloseCommand {
    command_accessors!();

    fn display_value(&self) -> String {
        format!(
            "{} - [Instance Name: '{}']",
            self.display_label(),
            self.config.get("instanceName")
        )
    }

    async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        let name = self.resolved(ctx, "instanceName")?;

        let (_, handle) = ctx.instances().lookup(&name)?;
        BrowserInstance::from_handle(&name, &handle)?;

        let (tier, handle) = ctx.instances_mut().release(&name)?;
        handle.close().await?;

        ctx.log(format!("browser '{}' closed ({})", name, tier));
        Ok(())
    }
}
