pub mod chrome;
pub mod traits;

pub use chrome::ChromeLauncher;
pub use traits::{BrowserEngine, BrowserLauncher, BrowserSession, LaunchOptions};
