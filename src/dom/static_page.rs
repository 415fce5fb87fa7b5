use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::{Document, LoadState, Locator};
use crate::error::DomError;

const USER_AGENT: &str = concat!("exam_crawler/", env!("CARGO_PKG_VERSION"));
const CLICK_TIMEOUT: Duration = Duration::from_secs(60);

enum PageSource {
    Http(reqwest::Client),
    Memory(HashMap<String, String>),
}

struct LoadedPage {
    url: String,
    html: Html,
}

/// Node handle into the page that was loaded when it was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticNode {
    id: NodeId,
    generation: u64,
}

/// HTML-only backend: pages are fetched (or looked up in memory) and parsed
/// with `scraper`. No script runs, so it only suits server-rendered pages.
pub struct StaticDocument {
    source: PageSource,
    page: RefCell<Option<LoadedPage>>,
    generation: Cell<u64>,
}

impl StaticDocument {
    pub fn http() -> Result<Self, DomError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::with_source(PageSource::Http(client)))
    }

    /// Serve pages from a `url -> html` map. Unknown URLs fail to navigate.
    pub fn in_memory<I, K, V>(pages: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let pages = pages
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::with_source(PageSource::Memory(pages))
    }

    /// A single page that is already loaded, e.g. a saved HTML file.
    pub fn from_html(url: &str, html: &str) -> Self {
        let doc = Self::in_memory([(url, html)]);
        doc.load(url, html);
        doc
    }

    fn with_source(source: PageSource) -> Self {
        StaticDocument {
            source,
            page: RefCell::new(None),
            generation: Cell::new(0),
        }
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, DomError> {
        match &self.source {
            PageSource::Memory(pages) => {
                pages.get(url).cloned().ok_or_else(|| DomError::Navigation {
                    url: url.to_string(),
                    reason: "page not found".into(),
                })
            }
            PageSource::Http(client) => {
                let request = async {
                    client
                        .get(url)
                        .send()
                        .await?
                        .error_for_status()?
                        .text()
                        .await
                };
                tokio::time::timeout(timeout, request)
                    .await
                    .map_err(|_| DomError::Timeout(timeout))?
                    .map_err(|e| DomError::Navigation {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
            }
        }
    }

    fn load(&self, url: &str, body: &str) {
        self.generation.set(self.generation.get() + 1);
        *self.page.borrow_mut() = Some(LoadedPage {
            url: url.to_string(),
            html: Html::parse_document(body),
        });
        debug!(url, generation = self.generation.get(), "page loaded");
    }

    fn with_element<T>(
        &self,
        node: &StaticNode,
        f: impl FnOnce(ElementRef<'_>) -> T,
    ) -> Result<T, DomError> {
        let page = self.page.borrow();
        let page = page.as_ref().ok_or(DomError::NoPage)?;
        if node.generation != self.generation.get() {
            return Err(DomError::StaleNode);
        }
        let element = page
            .html
            .tree
            .get(node.id)
            .and_then(ElementRef::wrap)
            .ok_or(DomError::StaleNode)?;
        Ok(f(element))
    }

    fn matching<'a>(
        &self,
        candidates: impl Iterator<Item = ElementRef<'a>>,
        locator: &Locator,
    ) -> Vec<StaticNode> {
        let generation = self.generation.get();
        candidates
            .filter(|el| locator.accepts_text(&el.text().collect::<String>()))
            .map(|el| StaticNode {
                id: el.id(),
                generation,
            })
            .collect()
    }
}

fn selector(locator: &Locator) -> Result<Selector, DomError> {
    Selector::parse(&locator.css).map_err(|e| DomError::Locator {
        css: locator.css.clone(),
        reason: e.to_string(),
    })
}

fn hides(el: &scraper::node::Element) -> bool {
    if el.attr("hidden").is_some() || el.classes().any(|c| c == "d-none") {
        return true;
    }
    el.attr("style").is_some_and(|style| {
        let style: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        style.contains("display:none") || style.contains("visibility:hidden")
    })
}

#[async_trait(?Send)]
impl Document for StaticDocument {
    type Node = StaticNode;

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DomError> {
        let body = self.fetch(url, timeout).await?;
        self.load(url, &body);
        Ok(())
    }

    async fn wait_for(&self, _state: LoadState) -> Result<(), DomError> {
        // A fetched page is complete; there is nothing further to settle.
        match self.page.borrow().as_ref() {
            Some(_) => Ok(()),
            None => Err(DomError::NoPage),
        }
    }

    async fn query_one(&self, locator: &Locator) -> Result<Option<StaticNode>, DomError> {
        Ok(self.query_all(locator).await?.into_iter().next())
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<StaticNode>, DomError> {
        let sel = selector(locator)?;
        let page = self.page.borrow();
        let page = page.as_ref().ok_or(DomError::NoPage)?;
        Ok(self.matching(page.html.select(&sel), locator))
    }

    async fn find(
        &self,
        scope: &StaticNode,
        locator: &Locator,
    ) -> Result<Option<StaticNode>, DomError> {
        Ok(self.find_all(scope, locator).await?.into_iter().next())
    }

    async fn find_all(
        &self,
        scope: &StaticNode,
        locator: &Locator,
    ) -> Result<Vec<StaticNode>, DomError> {
        let sel = selector(locator)?;
        self.with_element(scope, |el| self.matching(el.select(&sel), locator))
    }

    async fn text(&self, node: &StaticNode) -> Result<String, DomError> {
        self.with_element(node, |el| el.text().collect())
    }

    async fn inner_markup(&self, node: &StaticNode) -> Result<String, DomError> {
        self.with_element(node, |el| el.inner_html())
    }

    async fn attribute(&self, node: &StaticNode, name: &str) -> Result<Option<String>, DomError> {
        self.with_element(node, |el| el.value().attr(name).map(str::to_string))
    }

    async fn is_visible(&self, node: &StaticNode) -> Result<bool, DomError> {
        self.with_element(node, |el| {
            let hidden = std::iter::once(el)
                .chain(el.ancestors().filter_map(ElementRef::wrap))
                .any(|e| hides(e.value()));
            !hidden
        })
    }

    async fn click(&self, node: &StaticNode) -> Result<(), DomError> {
        let href = self
            .attribute(node, "href")
            .await?
            .ok_or_else(|| DomError::Click("node has no href to follow".into()))?;
        let base = self.current_url().await?;
        let target = Url::parse(&base)
            .and_then(|b| b.join(&href))
            .map_err(|e| DomError::Click(format!("cannot resolve `{href}` against {base}: {e}")))?;
        self.navigate(target.as_str(), CLICK_TIMEOUT).await
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DomError> {
        let page = self.page.borrow();
        match script.trim().trim_end_matches(';') {
            "document.readyState" => Ok(match page.as_ref() {
                Some(_) => "complete".into(),
                None => "loading".into(),
            }),
            "location.href" | "window.location.href" | "document.location.href" => page
                .as_ref()
                .map(|p| p.url.clone().into())
                .ok_or(DomError::NoPage),
            other => Err(DomError::Unsupported(other.to_string())),
        }
    }

    async fn current_url(&self) -> Result<String, DomError> {
        self.page
            .borrow()
            .as_ref()
            .map(|p| p.url.clone())
            .ok_or(DomError::NoPage)
    }
}
