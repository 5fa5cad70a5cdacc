use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info};

use crate::error::ExecError;

/// The browser capability the executor drives. One implementation wraps a
/// live Chrome session; tests drive a scripted mock.
pub trait BrowserControl: Send {
    fn navigate(&mut self, url: &str) -> Result<(), ExecError>;

    /// Wait until the element is present (bounded by `timeout`), clear its
    /// content, then type the value into it.
    fn find_and_type(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), ExecError>;

    /// Wait until the element is clickable (bounded by `timeout`), then click.
    fn find_and_click(&mut self, selector: &str, timeout: Duration) -> Result<(), ExecError>;

    fn current_url(&self) -> Option<String>;

    fn page_source(&self) -> Option<String>;

    fn screenshot(&mut self, path: &Path) -> Result<(), ExecError>;
}

/// Live Chrome session driven over the DevTools protocol. State (current URL,
/// DOM, cookies) persists for the lifetime of the session, so re-executing a
/// revised plan continues from wherever the failed attempt left the browser.
pub struct BrowserSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(headless: bool) -> Result<Self, ExecError> {
        info!(headless, "launching Chrome");

        let options = LaunchOptions {
            headless,
            sandbox: false,
            window_size: Some((1920, 1080)),
            args: vec![OsStr::new("--disable-dev-shm-usage")],
            idle_browser_timeout: Duration::from_secs(60),
            ..Default::default()
        };

        let browser = Browser::new(options).map_err(|e| ExecError::Browser(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| ExecError::Browser(e.to_string()))?;
        tab.navigate_to("about:blank")
            .map_err(|e| ExecError::Browser(e.to_string()))?;

        debug!("Chrome ready");
        Ok(Self {
            _browser: browser,
            tab,
        })
    }
}

impl BrowserControl for BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<(), ExecError> {
        self.tab
            .navigate_to(url)
            .map_err(|e| ExecError::Browser(e.to_string()))?;
        Ok(())
    }

    fn find_and_type(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), ExecError> {
        let element = self
            .tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|_| ExecError::ElementNotFound {
                selector: selector.to_string(),
            })?;
        element
            .click()
            .map_err(|e| ExecError::Browser(e.to_string()))?;

        // Clear any existing content before typing.
        self.tab
            .evaluate(
                &format!("document.querySelector({}).value = ''", js_string(selector)),
                false,
            )
            .map_err(|e| ExecError::Browser(e.to_string()))?;
        self.tab
            .type_str(value)
            .map_err(|e| ExecError::Browser(e.to_string()))?;
        Ok(())
    }

    fn find_and_click(&mut self, selector: &str, timeout: Duration) -> Result<(), ExecError> {
        let element = self
            .tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|_| ExecError::ElementNotClickable {
                selector: selector.to_string(),
            })?;
        element.click().map_err(|_| ExecError::ElementNotClickable {
            selector: selector.to_string(),
        })?;
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        Some(self.tab.get_url())
    }

    fn page_source(&self) -> Option<String> {
        self.tab.get_content().ok()
    }

    fn screenshot(&mut self, path: &Path) -> Result<(), ExecError> {
        let png = self
            .tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| ExecError::Screenshot(e.to_string()))?;
        std::fs::write(path, png).map_err(|e| ExecError::Screenshot(e.to_string()))?;
        Ok(())
    }
}

/// Encode a selector as a JSON string literal, which is also a valid JS
/// string literal, so arbitrary selector content cannot break the snippet.
fn js_string(raw: &str) -> String {
    serde_json::Value::String(raw.to_owned()).to_string()
}
