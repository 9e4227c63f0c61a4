//! Opening URLs in the user's default browser.

use std::io;
use std::process::{Command, Stdio};

pub trait BrowserLauncher {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Hands the URL to the platform opener and returns without waiting for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        let mut cmd = opener_command(url);
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        cmd.spawn()?;
        tracing::debug!(url, "opened browser");
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn opener_command(url: &str) -> Command {
    let mut c = Command::new("open");
    c.arg(url);
    c
}

#[cfg(target_os = "windows")]
fn opener_command(url: &str) -> Command {
    // empty title argument so `start` does not treat the url as one
    let mut c = Command::new("cmd");
    c.args(["/C", "start", ""]).arg(url);
    c
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener_command(url: &str) -> Command {
    let mut c = Command::new("xdg-open");
    c.arg(url);
    c
}

/// Does nothing; for headless hosts that print the URL instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn open(&self, _url: &str) -> io::Result<()> {
        Ok(())
    }
}
