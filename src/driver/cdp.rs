//! ChromiumOxide driver
//!
//! Production implementation of the driver capability set on top of the
//! Chrome DevTools Protocol. One launched Chromium process hosts many
//! isolated browser contexts; each context carries its own cookies, storage,
//! proxy, and fingerprint overrides and maps to one session.

use super::{BrowserDriver, ProcessConfig, ProcessHandle, SessionHandle, SessionOptions};
use crate::error::{Error, PoolError, Result, SessionError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Chromium launch arguments tuned for high-concurrency headless serving
const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-default-apps",
    "--disable-sync",
    "--disable-translate",
    "--metrics-recording-only",
    "--mute-audio",
    "--no-first-run",
    "--safebrowsing-disable-auto-update",
];

/// How often `wait_for` re-checks the selector
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// CDP-backed [`BrowserDriver`]
#[derive(Debug, Default)]
pub struct CdpDriver;

impl CdpDriver {
    /// Create the driver
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserDriver for CdpDriver {
    #[instrument(skip(self, config))]
    async fn launch(&self, config: &ProcessConfig) -> Result<Box<dyn ProcessHandle>> {
        let mut builder = CdpBrowserConfig::builder();

        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.arg("--no-sandbox");
        }
        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        for arg in LAUNCH_ARGS {
            builder = builder.arg(*arg);
        }

        let cdp_config = builder
            .build()
            .map_err(|e| Error::Pool(PoolError::LaunchFailed(e)))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| Error::Pool(PoolError::LaunchFailed(e.to_string())))?;

        // Drive the CDP event loop for this process's lifetime
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("browser handler event error");
                    break;
                }
            }
            debug!("browser handler finished");
        });

        debug!("browser process launched");

        Ok(Box::new(CdpProcess {
            browser: Arc::new(Mutex::new(browser)),
            handler: Mutex::new(Some(handler_task)),
        }))
    }
}

/// One launched Chromium process
pub struct CdpProcess {
    browser: Arc<Mutex<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl ProcessHandle for CdpProcess {
    #[instrument(skip(self, opts))]
    async fn new_session(&self, opts: SessionOptions) -> Result<Box<dyn SessionHandle>> {
        let mut ctx_params = CreateBrowserContextParams::default();
        if let Some(ref proxy) = opts.proxy {
            ctx_params.proxy_server = Some(proxy.server());
            if proxy.has_credentials() {
                // CDP context proxies authenticate via the request-paused
                // flow; credentialed proxies should terminate auth upstream.
                warn!(proxy = %proxy, "proxy credentials are not forwarded to the browser context");
            }
        }

        let (ctx_id, page) = {
            let mut browser = self.browser.lock().await;
            let ctx_id: BrowserContextId = browser
                .create_browser_context(ctx_params)
                .await
                .map_err(|e| Error::Session(SessionError::CreationFailed(e.to_string())))?;

            let target = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(ctx_id.clone())
                .build()
                .map_err(|e| Error::Session(SessionError::CreationFailed(e)))?;

            let page = browser
                .new_page(target)
                .await
                .map_err(|e| Error::Session(SessionError::CreationFailed(e.to_string())))?;
            (ctx_id, page)
        };

        apply_fingerprint(&page, &opts).await?;

        Ok(Box::new(CdpSession {
            page,
            browser: Arc::clone(&self.browser),
            ctx_id,
        }))
    }

    #[instrument(skip(self))]
    async fn close(&self) -> Result<()> {
        self.browser
            .lock()
            .await
            .close()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        if let Some(handler) = self.handler.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handler).await;
        }
        debug!("browser process closed");
        Ok(())
    }
}

/// Apply fingerprint overrides and stealth init scripts to a fresh page
async fn apply_fingerprint(page: &Page, opts: &SessionOptions) -> Result<()> {
    let fp = &opts.fingerprint;

    let ua = SetUserAgentOverrideParams::builder()
        .user_agent(fp.user_agent.clone())
        .build()
        .map_err(Error::cdp)?;
    page.execute(ua).await.map_err(|e| Error::cdp(e.to_string()))?;

    let metrics = SetDeviceMetricsOverrideParams::builder()
        .width(fp.viewport.0 as i64)
        .height(fp.viewport.1 as i64)
        .device_scale_factor(1.0)
        .mobile(false)
        .build()
        .map_err(Error::cdp)?;
    page.execute(metrics)
        .await
        .map_err(|e| Error::cdp(e.to_string()))?;

    let tz = SetTimezoneOverrideParams::builder()
        .timezone_id(fp.timezone.clone())
        .build()
        .map_err(Error::cdp)?;
    page.execute(tz).await.map_err(|e| Error::cdp(e.to_string()))?;

    let mut locale = SetLocaleOverrideParams::default();
    locale.locale = Some(fp.locale.clone());
    page.execute(locale)
        .await
        .map_err(|e| Error::cdp(e.to_string()))?;

    let stealth = AddScriptToEvaluateOnNewDocumentParams::builder()
        .source(fp.init_script())
        .build()
        .map_err(Error::cdp)?;
    page.execute(stealth)
        .await
        .map_err(|e| Error::cdp(e.to_string()))?;

    Ok(())
}

/// One isolated CDP session (browser context + page)
pub struct CdpSession {
    page: Page,
    browser: Arc<Mutex<Browser>>,
    ctx_id: BrowserContextId,
}

#[async_trait]
impl SessionHandle for CdpSession {
    #[instrument(skip(self))]
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| Error::Session(SessionError::Timeout(timeout.as_millis() as u64)))?
            .map_err(|e| {
                Error::Session(SessionError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            })?;

        // Settle: load event plus a short network-quiet window
        let ready = r#"
            new Promise(resolve => {
                if (document.readyState === 'complete') {
                    setTimeout(() => resolve(true), 500);
                } else {
                    window.addEventListener('load', () => {
                        setTimeout(() => resolve(true), 500);
                    });
                }
            })
        "#;
        tokio::time::timeout(timeout, self.page.evaluate(ready))
            .await
            .map_err(|_| Error::Session(SessionError::Timeout(timeout.as_millis() as u64)))?
            .map_err(|e| Error::Session(SessionError::Script(e.to_string())))?;

        Ok(())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let script = format!(
            "document.querySelector('{}') !== null",
            selector.replace('\'', "\\'")
        );
        let result = self
            .page
            .evaluate(script.as_str())
            .await
            .map_err(|e| Error::Session(SessionError::Script(e.to_string())))?;
        Ok(result.into_value::<bool>().unwrap_or(false))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| Error::Session(SessionError::Script(e.to_string())))?;
        element
            .click()
            .await
            .map_err(|e| Error::Session(SessionError::Script(e.to_string())))?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| Error::Session(SessionError::Script(e.to_string())))?;
        element
            .click()
            .await
            .map_err(|e| Error::Session(SessionError::Script(e.to_string())))?;
        element
            .type_str(text)
            .await
            .map_err(|e| Error::Session(SessionError::Script(e.to_string())))?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| Error::Session(SessionError::Script(e.to_string())))?;
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.exists(selector).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    #[instrument(skip(self))]
    async fn close(&self) -> Result<()> {
        // Disposing the context tears down its targets, page included
        self.browser
            .lock()
            .await
            .dispose_browser_context(self.ctx_id.clone())
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;
        debug!("session context disposed");
        Ok(())
    }
}
