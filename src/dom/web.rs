//! Live document backed by a Playwright browser page.
//!
//! Replay operations run small scripts against
//! `document.querySelectorAll(selector)[index]`. Capture injects a
//! capture-phase listener script that queues raw events in the page; a polling
//! task drains that queue into the recorder's sink.

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use playwright::api::{Browser, BrowserContext, Page, Viewport};
use playwright::Playwright;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::error::DomError;
use super::path::CapturedEvent;
use super::traits::{CaptureHost, KeyStroke, LiveDocument, StyleProperty, TextInputState};

/// Web browser type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BrowserType {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserType {
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "firefox" => BrowserType::Firefox,
            "webkit" => BrowserType::Webkit,
            _ => BrowserType::Chromium,
        }
    }
}

/// Browser launch configuration
#[derive(Debug, Clone)]
pub struct WebDocumentConfig {
    pub browser_type: BrowserType,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// CDP endpoint to connect to an existing browser (e.g. http://localhost:9222)
    pub cdp_endpoint: Option<String>,
    /// How often the capture queue in the page is drained
    pub capture_poll_interval: Duration,
}

impl Default for WebDocumentConfig {
    fn default() -> Self {
        let headless = std::env::var("LUMI_HEADLESS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            browser_type: BrowserType::Chromium,
            headless,
            viewport_width: 1280,
            viewport_height: 720,
            cdp_endpoint: std::env::var("LUMI_CDP_ENDPOINT").ok(),
            capture_poll_interval: Duration::from_millis(50),
        }
    }
}

/// Handle to the `index`-th match of `selector` in the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebElement {
    pub selector: String,
    pub index: usize,
}

#[derive(Serialize)]
struct ElementArg<'a, E: Serialize> {
    selector: &'a str,
    index: usize,
    extra: E,
}

#[derive(Serialize)]
struct KeyArg<'a> {
    key: &'a str,
    #[serde(rename = "keyCode")]
    key_code: u32,
    code: &'a str,
}

#[derive(Serialize, serde::Deserialize)]
struct InputArg {
    value: String,
    caret: Option<usize>,
}

const INSTALL_CAPTURE_JS: &str = r#"() => {
    if (window.__lumiRecorder) return;
    const describe = (node) => {
        const nodes = [];
        let cur = node && node.nodeType === 9 ? node.documentElement : node;
        while (cur && cur.nodeType === 1) {
            const parent = cur.parentElement;
            const siblings = parent ? Array.from(parent.children) : [cur];
            nodes.push({
                tag: cur.tagName.toLowerCase(),
                id: cur.id || null,
                classes: Array.from(cur.classList || []),
                position: siblings.indexOf(cur) + 1,
            });
            cur = parent;
        }
        return nodes;
    };
    const queue = [];
    const handlers = {
        click: (e) => queue.push({
            type: 'click',
            pointerId: typeof e.pointerId === 'number' ? e.pointerId : 1,
            target: describe(e.target),
        }),
        keydown: (e) => queue.push({
            type: 'keydown',
            key: e.key,
            keyCode: e.keyCode || 0,
            code: e.code || '',
            target: describe(e.target),
        }),
        scroll: (e) => {
            const t = e.target && e.target.nodeType === 9 ? e.target.documentElement : e.target;
            queue.push({
                type: 'scroll',
                target: describe(t),
                elementOffset: { x: (t && t.scrollLeft) || 0, y: (t && t.scrollTop) || 0 },
                windowOffset: { x: window.scrollX, y: window.scrollY },
            });
        },
    };
    document.addEventListener('click', handlers.click, { capture: true });
    document.addEventListener('keydown', handlers.keydown, { capture: true });
    document.addEventListener('scroll', handlers.scroll, { capture: true, passive: true });
    window.__lumiRecorder = { queue, handlers };
}"#;

/// Removes the listeners and returns whatever is still queued
const REMOVE_CAPTURE_JS: &str = r#"() => {
    const rec = window.__lumiRecorder;
    if (!rec) return [];
    document.removeEventListener('click', rec.handlers.click, { capture: true });
    document.removeEventListener('keydown', rec.handlers.keydown, { capture: true });
    document.removeEventListener('scroll', rec.handlers.scroll, { capture: true });
    const pending = rec.queue.splice(0);
    delete window.__lumiRecorder;
    return pending;
}"#;

const DRAIN_CAPTURE_JS: &str =
    "() => (window.__lumiRecorder ? window.__lumiRecorder.queue.splice(0) : [])";

/// Live document using a Playwright page
pub struct WebDocument {
    #[allow(dead_code)]
    playwright: Arc<Playwright>,
    #[allow(dead_code)]
    browser: Arc<Browser>,
    #[allow(dead_code)]
    context: Arc<BrowserContext>,
    page: Arc<Mutex<Page>>,
    config: WebDocumentConfig,
    capture: Mutex<Option<CapturePoller>>,
}

impl WebDocument {
    /// Launch (or connect to) a browser and open a page
    pub async fn launch(config: WebDocumentConfig) -> Result<Self> {
        let playwright = Playwright::initialize()
            .await
            .context("Failed to initialize Playwright")?;

        let browser = match config.browser_type {
            BrowserType::Chromium => {
                let chromium = playwright.chromium();
                match config.cdp_endpoint {
                    Some(ref endpoint) => {
                        println!(
                            "{} Connecting to browser at: {}",
                            "🔌".blue(),
                            endpoint
                        );
                        chromium
                            .connect_over_cdp_builder(endpoint)
                            .connect_over_cdp()
                            .await
                            .with_context(|| format!("Failed to connect to {}", endpoint))?
                    }
                    None => launch_chromium_browser(&chromium, &config).await?,
                }
            }
            BrowserType::Firefox => {
                playwright
                    .firefox()
                    .launcher()
                    .headless(config.headless)
                    .launch()
                    .await?
            }
            BrowserType::Webkit => {
                playwright
                    .webkit()
                    .launcher()
                    .headless(config.headless)
                    .launch()
                    .await?
            }
        };

        let context = browser.context_builder().build().await?;
        let page = context.new_page().await?;
        page.set_viewport_size(Viewport {
            width: config.viewport_width as i32,
            height: config.viewport_height as i32,
        })
        .await?;

        Ok(Self {
            playwright: Arc::new(playwright),
            browser: Arc::new(browser),
            context: Arc::new(context),
            page: Arc::new(Mutex::new(page)),
            config,
            capture: Mutex::new(None),
        })
    }

    /// Navigate the page to `url`
    pub async fn goto(&self, url: &str) -> Result<()> {
        let page = self.page.lock().await;
        page.goto_builder(url)
            .goto()
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        Ok(())
    }

    async fn eval<A: Serialize + Send + Sync, T: DeserializeOwned>(
        &self,
        script: &str,
        arg: A,
    ) -> Result<T, DomError> {
        let page = self.page.lock().await;
        page.evaluate::<A, T>(script, arg)
            .await
            .map_err(|e| DomError::Browser(e.to_string()))
    }

    /// Run `body` with `el` bound to the element and `extra` to the argument
    async fn eval_on<E: Serialize + Send + Sync, T: DeserializeOwned>(
        &self,
        element: &WebElement,
        body: &str,
        extra: E,
    ) -> Result<T, DomError> {
        let script = format!(
            "({{ selector, index, extra }}) => {{
                const el = document.querySelectorAll(selector)[index];
                if (!el) throw new Error('stale element: ' + selector);
                {}
            }}",
            body
        );
        self.eval(
            &script,
            ElementArg {
                selector: &element.selector,
                index: element.index,
                extra,
            },
        )
        .await
    }
}

#[async_trait]
impl LiveDocument for WebDocument {
    type Element = WebElement;

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<WebElement>, DomError> {
        let count: usize = self
            .eval(
                "(selector) => document.querySelectorAll(selector).length",
                selector,
            )
            .await
            .map_err(|e| match e {
                DomError::Browser(reason) if reason.contains("not a valid selector") => {
                    DomError::invalid_selector(selector, reason)
                }
                other => other,
            })?;
        Ok((0..count)
            .map(|index| WebElement {
                selector: selector.to_string(),
                index,
            })
            .collect())
    }

    async fn is_viewport(&self, element: &WebElement) -> Result<bool, DomError> {
        self.eval_on(
            element,
            "return el === document.documentElement || el === document.body;",
            (),
        )
        .await
    }

    async fn inline_style(
        &self,
        element: &WebElement,
        property: StyleProperty,
    ) -> Result<String, DomError> {
        self.eval_on(
            element,
            "return el.style.getPropertyValue(extra) || '';",
            property.css_name(),
        )
        .await
    }

    async fn set_inline_style(
        &self,
        element: &WebElement,
        property: StyleProperty,
        value: &str,
    ) -> Result<(), DomError> {
        self.eval_on(
            element,
            "el.style.setProperty(extra[0], extra[1]);",
            (property.css_name(), value),
        )
        .await
    }

    async fn click(&self, element: &WebElement) -> Result<(), DomError> {
        self.eval_on(
            element,
            "if (typeof el.click === 'function') el.click();",
            (),
        )
        .await
    }

    async fn dispatch_key_down(
        &self,
        element: &WebElement,
        stroke: &KeyStroke,
    ) -> Result<(), DomError> {
        self.eval_on(
            element,
            "el.dispatchEvent(new KeyboardEvent('keydown', {
                key: extra.key, keyCode: extra.keyCode, code: extra.code,
                bubbles: true, cancelable: true,
            }));",
            KeyArg {
                key: &stroke.key,
                key_code: stroke.key_code,
                code: &stroke.code,
            },
        )
        .await
    }

    async fn text_input_state(
        &self,
        element: &WebElement,
    ) -> Result<Option<TextInputState>, DomError> {
        let state: Option<InputArg> = self
            .eval_on(
                element,
                "if (el.tagName !== 'INPUT' && el.tagName !== 'TEXTAREA') return null;
                 let caret = null;
                 try { caret = el.selectionStart; } catch (_) { caret = null; }
                 if (caret === null && el.tagName === 'INPUT') return null;
                 return { value: el.value || '', caret };",
                (),
            )
            .await?;
        Ok(state.map(|s| TextInputState {
            value: s.value,
            caret: s.caret,
        }))
    }

    async fn set_text_input_state(
        &self,
        element: &WebElement,
        state: &TextInputState,
    ) -> Result<(), DomError> {
        self.eval_on(
            element,
            "el.value = extra.value;
             if (extra.caret !== null) { try { el.setSelectionRange(extra.caret, extra.caret); } catch (_) {} }",
            InputArg {
                value: state.value.clone(),
                caret: state.caret,
            },
        )
        .await
    }

    async fn dispatch_input(&self, element: &WebElement) -> Result<(), DomError> {
        self.eval_on(
            element,
            "el.dispatchEvent(new Event('input', { bubbles: true }));",
            (),
        )
        .await
    }

    async fn scroll_window_to(&self, x: f64, y: f64, smooth: bool) -> Result<(), DomError> {
        self.eval(
            "([left, top, smooth]) => window.scrollTo({ left, top, behavior: smooth ? 'smooth' : 'auto' })",
            (x, y, smooth),
        )
        .await
    }

    async fn set_scroll_offsets(&self, element: &WebElement, x: f64, y: f64) -> Result<(), DomError> {
        self.eval_on(
            element,
            "el.scrollLeft = extra[0]; el.scrollTop = extra[1];",
            (x, y),
        )
        .await
    }
}

#[async_trait]
impl CaptureHost for WebDocument {
    async fn attach_capture(
        &self,
        sink: mpsc::UnboundedSender<CapturedEvent>,
    ) -> Result<(), DomError> {
        self.eval::<(), ()>(INSTALL_CAPTURE_JS, ()).await?;

        let mut capture = self.capture.lock().await;
        if let Some(previous) = capture.take() {
            previous.finish().await;
        }

        let page = self.page.clone();
        let drain = move || {
            let page = page.clone();
            async move {
                let page = page.lock().await;
                page.evaluate::<(), Vec<CapturedEvent>>(DRAIN_CAPTURE_JS, ())
                    .await
                    .map_err(|e| DomError::Browser(e.to_string()))
            }
        };
        *capture = Some(CapturePoller::spawn(
            drain,
            sink,
            self.config.capture_poll_interval,
        ));
        Ok(())
    }

    /// Stops polling, then hands events still queued in the page to the sink
    /// before it is dropped.
    async fn detach_capture(&self) -> Result<(), DomError> {
        let sink = match self.capture.lock().await.take() {
            Some(poller) => Some(poller.finish().await),
            None => None,
        };
        let pending: Vec<CapturedEvent> = self.eval(REMOVE_CAPTURE_JS, ()).await?;
        if let Some(sink) = sink {
            forward_events(&sink, pending);
        }
        Ok(())
    }
}

/// Background task moving queued page events into the recorder's sink
struct CapturePoller {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    sink: mpsc::UnboundedSender<CapturedEvent>,
}

impl CapturePoller {
    fn spawn<F, Fut>(
        drain: F,
        sink: mpsc::UnboundedSender<CapturedEvent>,
        interval: Duration,
    ) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<CapturedEvent>, DomError>> + Send,
    {
        let (shutdown, mut stop) = watch::channel(false);
        let task_sink = sink.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop.changed() => break,
                }
                if task_sink.is_closed() {
                    break;
                }
                match drain().await {
                    Ok(events) => {
                        if !forward_events(&task_sink, events) {
                            break;
                        }
                    }
                    // The page may be mid-navigation; keep polling.
                    Err(e) => log::warn!("failed to drain capture queue: {}", e),
                }
            }
        });
        Self {
            shutdown,
            task,
            sink,
        }
    }

    /// Stop after any in-flight drain has been forwarded; returns the sink
    async fn finish(self) -> mpsc::UnboundedSender<CapturedEvent> {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            log::warn!("capture poller ended abnormally: {}", e);
        }
        self.sink
    }
}

/// Returns false once the receiving side is gone
fn forward_events(sink: &mpsc::UnboundedSender<CapturedEvent>, events: Vec<CapturedEvent>) -> bool {
    for event in events {
        if sink.send(event).is_err() {
            log::debug!("capture sink closed, dropping remaining events");
            return false;
        }
    }
    true
}

/// Launch a new Chromium browser, preferring an explicitly configured or system executable
async fn launch_chromium_browser(
    chromium: &playwright::api::BrowserType,
    config: &WebDocumentConfig,
) -> Result<Browser> {
    let mut launcher = chromium.launcher();
    launcher = launcher.headless(config.headless);

    let env_path = std::env::var("PLAYWRIGHT_CHROMIUM_EXECUTABLE_PATH")
        .ok()
        .map(std::path::PathBuf::from);

    if let Some(path) = env_path.or_else(find_system_browser) {
        println!("{} Using browser: {}", "🌐".blue(), path.display());
        launcher = launcher.executable(&path);
        let args: Vec<String> = [
            "--no-sandbox",
            "--disable-setuid-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        launcher = launcher.args(&args);
        return Ok(launcher.launch().await?);
    }

    println!(
        "{} No browser executable found. Attempting default launch...",
        "ℹ".blue()
    );
    Ok(launcher.launch().await?)
}

fn find_system_browser() -> Option<std::path::PathBuf> {
    let common_paths = [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    common_paths
        .iter()
        .map(std::path::Path::new)
        .find(|p| p.exists())
        .map(|p| p.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{CaptureKind, ElementPath, NodeDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn click(id: &str) -> CapturedEvent {
        CapturedEvent {
            target: ElementPath::new(vec![NodeDescriptor::new("button", 1).with_id(id)]),
            kind: CaptureKind::Click { pointer_id: 1 },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_keeps_events_from_in_flight_drain() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let drain = move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                // slower than the poll interval, so shutdown lands mid-drain
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, DomError>(vec![click("late")])
            }
        };

        let poller = CapturePoller::spawn(drain, tx, Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let sink = poller.finish().await;
        let event = rx.try_recv().unwrap();
        assert_eq!(event.target.nodes[0].id.as_deref(), Some("late"));
        assert!(rx.try_recv().is_err());

        // events returned by the page at removal still reach the recorder
        assert!(forward_events(&sink, vec![click("queued")]));
        drop(sink);
        assert_eq!(
            rx.recv().await.unwrap().target.nodes[0].id.as_deref(),
            Some("queued")
        );
        assert!(rx.recv().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_stops_when_recorder_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let poller = CapturePoller::spawn(
            || async { Ok::<_, DomError>(vec![click("a")]) },
            tx,
            Duration::from_millis(50),
        );
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(poller.task.is_finished());
        let sink = poller.finish().await;
        assert!(!forward_events(&sink, vec![click("b")]));
    }
}
