use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Document, LoadState, Locator};
use crate::error::DomError;

const READY_POLL: Duration = Duration::from_millis(250);
const NETWORK_QUIET: Duration = Duration::from_millis(500);

const TEXT_CONTENT_JS: &str = "function() { return this.textContent; }";
const IS_VISIBLE_JS: &str = "function() {
    const style = window.getComputedStyle(this);
    const rect = this.getBoundingClientRect();
    return style.visibility !== 'hidden' && style.display !== 'none'
        && rect.width > 0 && rect.height > 0;
}";

/// One Chromium tab driven over CDP.
///
/// The CDP event handler runs on its own task and is aborted on drop,
/// otherwise it would outlive the browser.
pub struct ChromeDocument {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    timeout: Duration,
}

impl ChromeDocument {
    pub async fn launch(headed: bool, timeout: Duration) -> Result<Self, DomError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(timeout)
            .window_size(1920, 1080);
        if headed {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(DomError::Browser)?;

        info!(headed, "Launching browser");
        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler event error: {}", e);
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        Ok(ChromeDocument {
            browser,
            handler,
            page,
            timeout,
        })
    }

    /// Sign in through the site's login form.
    pub async fn login(&self, login_url: &str, email: &str, password: &str) -> Result<(), DomError> {
        info!(login_url, "Logging in");
        self.navigate(login_url, self.timeout).await?;
        self.page
            .find_element("#email")
            .await?
            .click()
            .await?
            .type_str(email)
            .await?;
        self.page
            .find_element("#password")
            .await?
            .click()
            .await?
            .type_str(password)
            .await?;
        self.page.find_element("#loginButton").await?.click().await?;
        self.wait_for(LoadState::NetworkIdle).await
    }

    pub async fn close(&mut self) -> Result<(), DomError> {
        self.browser.close().await?;
        Ok(())
    }

    async fn call_on(&self, node: &Element, function: &str) -> Result<serde_json::Value, DomError> {
        let returns = node.call_js_fn(function, false).await?;
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }

    async fn filter_text(
        &self,
        nodes: Vec<Element>,
        locator: &Locator,
    ) -> Result<Vec<Element>, DomError> {
        if locator.has_text.is_none() {
            return Ok(nodes);
        }
        let mut kept = Vec::with_capacity(nodes.len());
        for node in nodes {
            if locator.accepts_text(&self.text(&node).await?) {
                kept.push(node);
            }
        }
        Ok(kept)
    }
}

impl Drop for ChromeDocument {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait(?Send)]
impl Document for ChromeDocument {
    type Node = Element;

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DomError> {
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| DomError::Timeout(timeout))?
            .map_err(|e| DomError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn wait_for(&self, state: LoadState) -> Result<(), DomError> {
        let accepted: &[&str] = match state {
            LoadState::DomReady => &["interactive", "complete"],
            LoadState::NetworkIdle => {
                self.page.wait_for_navigation().await?;
                &["complete"]
            }
        };

        let deadline = Instant::now() + self.timeout;
        loop {
            let ready = self.evaluate("document.readyState").await?;
            if ready.as_str().is_some_and(|s| accepted.contains(&s)) {
                break;
            }
            if Instant::now() >= deadline {
                return Err(DomError::Timeout(self.timeout));
            }
            tokio::time::sleep(READY_POLL).await;
        }

        if state == LoadState::NetworkIdle {
            tokio::time::sleep(NETWORK_QUIET).await;
        }
        Ok(())
    }

    async fn query_one(&self, locator: &Locator) -> Result<Option<Element>, DomError> {
        Ok(self.query_all(locator).await?.into_iter().next())
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<Element>, DomError> {
        let nodes = self.page.find_elements(locator.css.as_str()).await?;
        self.filter_text(nodes, locator).await
    }

    async fn find(&self, scope: &Element, locator: &Locator) -> Result<Option<Element>, DomError> {
        Ok(self.find_all(scope, locator).await?.into_iter().next())
    }

    async fn find_all(&self, scope: &Element, locator: &Locator) -> Result<Vec<Element>, DomError> {
        let nodes = scope.find_elements(locator.css.as_str()).await?;
        self.filter_text(nodes, locator).await
    }

    async fn text(&self, node: &Element) -> Result<String, DomError> {
        let value = self.call_on(node, TEXT_CONTENT_JS).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn inner_markup(&self, node: &Element) -> Result<String, DomError> {
        Ok(node.inner_html().await?.unwrap_or_default())
    }

    async fn attribute(&self, node: &Element, name: &str) -> Result<Option<String>, DomError> {
        Ok(node.attribute(name).await?)
    }

    async fn is_visible(&self, node: &Element) -> Result<bool, DomError> {
        let value = self.call_on(node, IS_VISIBLE_JS).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, node: &Element) -> Result<(), DomError> {
        node.click().await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DomError> {
        let result = self.page.evaluate(script).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn current_url(&self) -> Result<String, DomError> {
        Ok(self.page.url().await?.unwrap_or_default())
    }
}
