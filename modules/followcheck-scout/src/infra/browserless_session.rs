use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use browserless_client::{BrowserlessClient, BrowserlessError};
use followcheck_common::PageError;

use crate::traits::{PageAccessor, Snapshot, WaitCondition};

/// Puppeteer routine replayed on every render: open the page, scroll the list
/// container `depth` times with a settle pause after each scroll, dump the DOM.
const REPLAY_SCRIPT: &str = r#"
export default async function ({ page, context }) {
  if (context.cookie) {
    const host = new URL(context.url).hostname.replace(/^www\./, '');
    await page.setCookie({ name: 'sessionid', value: context.cookie, domain: '.' + host, path: '/' });
  }
  await page.goto(context.url, { waitUntil: 'networkidle2' });
  for (let i = 0; i < context.depth; i++) {
    await page.evaluate((selectors) => {
      for (const selector of selectors) {
        const el = document.querySelector(selector);
        if (el) { el.scrollTop = el.scrollHeight; return; }
      }
      window.scrollTo(0, document.body.scrollHeight);
    }, context.selectors);
    await new Promise((resolve) => setTimeout(resolve, context.settleMs));
  }
  return { data: await page.content(), type: 'text/html' };
}
"#;

/// Network failures in a row before the endpoint is declared unusable.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Delay between polls inside `wait_for`.
const POLL_INTERVAL: Duration = Duration::from_millis(1_500);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplayContext<'a> {
    url: &'a str,
    depth: u32,
    selectors: Vec<&'a str>,
    settle_ms: u64,
    cookie: Option<&'a str>,
}

#[derive(Default)]
struct SessionState {
    url: Option<String>,
    depth: u32,
    hint: Option<String>,
    /// Last render and the scroll depth it was taken at.
    cached: Option<(u32, String)>,
    consecutive_failures: u32,
}

/// `PageAccessor` over the stateless Browserless API.
///
/// Browserless keeps no browser between requests, so the session lives here:
/// the current URL, how many times the list has been scrolled and which
/// container to scroll. Each render replays that history inside one
/// `/function` call.
pub struct BrowserlessSession {
    client: BrowserlessClient,
    cookie: Option<String>,
    fallback_selectors: Vec<String>,
    scroll_settle: Duration,
    state: Mutex<SessionState>,
}

impl BrowserlessSession {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        cookie: Option<&str>,
        fallback_selectors: Vec<String>,
        scroll_settle: Duration,
    ) -> Result<Self, PageError> {
        let client = BrowserlessClient::new(base_url, token)
            .map_err(|e| PageError::SessionLost(e.to_string()))?;
        info!(base_url, "Using BrowserlessSession");
        Ok(Self {
            client,
            cookie: cookie.map(String::from),
            fallback_selectors,
            scroll_settle,
            state: Mutex::new(SessionState::default()),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SessionState>, PageError> {
        self.state
            .lock()
            .map_err(|_| PageError::SessionLost("session state poisoned".into()))
    }

    /// Cached render of the current page, if it was taken at the current
    /// scroll depth.
    fn cached_frame(&self) -> Result<Option<Snapshot>, PageError> {
        let state = self.lock()?;
        Ok(match (&state.url, &state.cached) {
            (Some(url), Some((depth, html))) if *depth == state.depth => {
                Some(Snapshot::new(url.clone(), html.clone()))
            }
            _ => None,
        })
    }

    /// Render the current page at the current scroll depth and cache it.
    async fn render(&self) -> Result<Snapshot, PageError> {
        let (url, depth, hint) = {
            let state = self.lock()?;
            let url = state
                .url
                .clone()
                .ok_or_else(|| PageError::Transient("no page loaded".into()))?;
            (url, state.depth, state.hint.clone())
        };

        let html = self.replay(&url, depth, hint.as_deref(), false).await?;
        self.lock()?.cached = Some((depth, html.clone()));
        Ok(Snapshot::new(url, html))
    }

    /// One `/function` call: load `url` with the session cookie and scroll it
    /// `depth` times.
    async fn replay(
        &self,
        url: &str,
        depth: u32,
        hint: Option<&str>,
        navigating: bool,
    ) -> Result<String, PageError> {
        let mut selectors: Vec<&str> = Vec::with_capacity(self.fallback_selectors.len() + 1);
        if let Some(hint) = hint {
            selectors.push(hint);
        }
        selectors.extend(
            self.fallback_selectors
                .iter()
                .map(String::as_str)
                .filter(|s| Some(*s) != hint),
        );

        let context = ReplayContext {
            url,
            depth,
            selectors,
            settle_ms: self.scroll_settle.as_millis() as u64,
            cookie: self.cookie.as_deref(),
        };

        debug!(url, depth, "Rendering page");
        match self.client.function(REPLAY_SCRIPT, &context).await {
            Ok(html) => {
                self.lock()?.consecutive_failures = 0;
                Ok(html)
            }
            Err(e) => Err(self.classify(e, url, navigating)?),
        }
    }

    /// Map a client error onto the page error taxonomy, escalating to
    /// `SessionLost` once the endpoint has failed too many times in a row.
    fn classify(
        &self,
        err: BrowserlessError,
        url: &str,
        navigating: bool,
    ) -> Result<PageError, PageError> {
        if err.is_unauthorized() {
            return Ok(PageError::SessionLost(err.to_string()));
        }

        let mut state = self.lock()?;
        state.consecutive_failures += 1;
        if state.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            warn!(
                failures = state.consecutive_failures,
                "Browserless endpoint keeps failing, giving up on session"
            );
            return Ok(PageError::SessionLost(format!(
                "{} consecutive failures, last: {err}",
                state.consecutive_failures
            )));
        }

        Ok(match err {
            BrowserlessError::Api { status, message } if navigating && status < 500 => {
                PageError::Navigation {
                    url: url.to_string(),
                    message: format!("status {status}: {message}"),
                }
            }
            other => PageError::Transient(other.to_string()),
        })
    }
}

#[async_trait]
impl PageAccessor for BrowserlessSession {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let parsed = url::Url::parse(url).map_err(|e| PageError::Navigation {
            url: url.to_string(),
            message: format!("invalid URL: {e}"),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(PageError::Navigation {
                url: url.to_string(),
                message: format!("only http/https URLs are allowed, got: {}", parsed.scheme()),
            });
        }

        info!(url, "Navigating");
        let html = self.replay(url, 0, None, true).await?;

        let mut state = self.lock()?;
        state.url = Some(url.to_string());
        state.depth = 0;
        state.hint = None;
        state.cached = Some((0, html));
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot, PageError> {
        match self.cached_frame()? {
            Some(snapshot) => Ok(snapshot),
            None => self.render().await,
        }
    }

    async fn scroll_to_bottom(&self, container_hint: Option<&str>) -> Result<(), PageError> {
        let mut state = self.lock()?;
        if state.url.is_none() {
            return Err(PageError::Transient("scroll requested before navigation".into()));
        }
        state.depth += 1;
        if let Some(hint) = container_hint {
            state.hint = Some(hint.to_string());
        }
        Ok(())
    }

    async fn wait_for(
        &self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<bool, PageError> {
        if let Some(snapshot) = self.cached_frame()? {
            if condition.is_met(&snapshot) {
                return Ok(true);
            }
        }

        let started = Instant::now();
        loop {
            match self.render().await {
                Ok(snapshot) if condition.is_met(&snapshot) => return Ok(true),
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!(error = %e, "Render failed while waiting"),
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL.min(timeout - elapsed)).await;
        }
    }
}
