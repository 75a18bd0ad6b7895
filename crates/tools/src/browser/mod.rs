//! Headless browser session.
//!
//! - `driver`: trait seam between the session and a concrete automation backend
//! - `cdp` / `launcher`: Chrome DevTools Protocol backend over WebSocket
//! - `session`: lazily initialized single-page session shared by every tool

pub mod cdp;
pub mod driver;
pub mod launcher;
pub mod session;

pub use driver::{BrowserDriver, ContextOptions, LaunchOptions, WaitUntil};
pub use launcher::{find_browser_binary, CdpDriver};
pub use session::{BrowserSession, NavigationOutcome, SessionOptions};
