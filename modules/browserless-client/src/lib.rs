pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

/// Upper bound on a single Browserless request. Scripted scroll replays can be
/// long, so this is deliberately looser than a plain page fetch would need.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct FunctionRequest<'a, C: Serialize> {
    code: &'a str,
    context: &'a C,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BrowserlessError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}/{path}", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// Run a puppeteer routine via the /function endpoint and return its raw output.
    ///
    /// `code` must be an ES module whose default export receives `{ page, context }`
    /// and returns `{ data, type }`; `context` is serialized as-is.
    pub async fn function<C: Serialize>(&self, code: &str, context: &C) -> Result<String> {
        let body = FunctionRequest { code, context };
        self.post_text(&self.endpoint("function"), &body).await
    }

    async fn post_text<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<String> {
        let resp = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Browserless request rejected");
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}
