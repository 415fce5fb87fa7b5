pub mod card;

use std::time::Duration;

use indicatif::ProgressBar;
use tracing::{debug, error, info, warn};

use crate::dom::{Document, LoadState, Locator};
use crate::error::DomError;
use crate::model::QuestionRecord;

const DEFAULT_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_NAV_TIMEOUT: Duration = Duration::from_secs(60);

/// Strategies for the "next page" control, tried in order. First visible
/// match wins.
pub fn default_next_locators() -> Vec<Locator> {
    vec![
        Locator::css("a.btn.btn-success").with_text("Next Questions"),
        Locator::css("a").with_text("Next Questions"),
        Locator::css(".page-navigation-bar a.pull-right"),
        Locator::css("a[href*='/view/']").with_text("Next"),
        Locator::css(".pagination .next:not(.disabled) a"),
        Locator::css("a.next-page"),
    ]
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub start_url: String,
    /// Pause after each page transition.
    pub delay: Duration,
    pub nav_timeout: Duration,
    pub max_pages: Option<usize>,
    pub next_locators: Vec<Locator>,
}

impl CrawlOptions {
    pub fn new(start_url: impl Into<String>) -> Self {
        CrawlOptions {
            start_url: start_url.into(),
            delay: DEFAULT_DELAY,
            nav_timeout: DEFAULT_NAV_TIMEOUT,
            max_pages: None,
            next_locators: default_next_locators(),
        }
    }
}

#[derive(Debug)]
pub enum StopReason {
    /// No next-page control was found (or it could not be followed).
    LastPage,
    PageLimit,
    NavigationFailed(DomError),
}

#[derive(Debug)]
pub struct CrawlReport {
    /// Every extracted record, in page-visit order.
    pub records: Vec<QuestionRecord>,
    pub pages: usize,
    pub stop: StopReason,
}

enum CrawlState<N> {
    Init,
    /// `navigate_to` is `None` when the click already loaded the page.
    PageReady { navigate_to: Option<String> },
    Extracted,
    NextFound(N),
    NextAbsent,
    Failed(DomError),
}

/// Walks the paginated question list one page at a time.
pub struct Crawler<'a, D: Document> {
    doc: &'a D,
    options: CrawlOptions,
    progress: ProgressBar,
}

impl<'a, D: Document> Crawler<'a, D> {
    pub fn new(doc: &'a D, options: CrawlOptions) -> Self {
        Crawler {
            doc,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self) -> CrawlReport {
        let mut records: Vec<QuestionRecord> = Vec::new();
        let mut pages = 0usize;
        let mut state = CrawlState::Init;

        loop {
            state = match state {
                CrawlState::Init => {
                    if self.options.max_pages == Some(0) {
                        info!("Page limit is 0, nothing to crawl");
                        return self.finish(records, pages, StopReason::PageLimit);
                    }
                    info!("Navigating to: {}", self.options.start_url);
                    CrawlState::PageReady {
                        navigate_to: Some(self.options.start_url.clone()),
                    }
                }
                CrawlState::PageReady { navigate_to } => {
                    match self.load_page(navigate_to.as_deref()).await {
                        Ok(()) => {
                            pages += 1;
                            let found = card::extract_page(self.doc).await;
                            info!(
                                "Page {}: scraped {} questions ({} total)",
                                pages,
                                found.len(),
                                records.len() + found.len()
                            );
                            records.extend(found);
                            self.progress
                                .set_message(format!("page {}, {} questions", pages, records.len()));
                            self.progress.tick();
                            CrawlState::Extracted
                        }
                        Err(e) => CrawlState::Failed(e),
                    }
                }
                CrawlState::Extracted => {
                    if self.options.max_pages.is_some_and(|max| pages >= max) {
                        info!("Page limit of {} reached", pages);
                        return self.finish(records, pages, StopReason::PageLimit);
                    }
                    match self.find_next().await {
                        Some(node) => CrawlState::NextFound(node),
                        None => CrawlState::NextAbsent,
                    }
                }
                CrawlState::NextFound(node) => match self.follow(&node).await {
                    Ok(()) => {
                        tokio::time::sleep(self.options.delay).await;
                        CrawlState::PageReady { navigate_to: None }
                    }
                    Err(e) => {
                        warn!("Could not follow next page control: {}", e);
                        CrawlState::NextAbsent
                    }
                },
                CrawlState::NextAbsent => {
                    info!("No next page control found; page {} is the last page", pages);
                    return self.finish(records, pages, StopReason::LastPage);
                }
                CrawlState::Failed(e) => {
                    error!("Page load failed, stopping crawl: {}", e);
                    return self.finish(records, pages, StopReason::NavigationFailed(e));
                }
            };
        }
    }

    async fn load_page(&self, navigate_to: Option<&str>) -> Result<(), DomError> {
        if let Some(url) = navigate_to {
            self.doc.navigate(url, self.options.nav_timeout).await?;
        }
        self.doc.wait_for(LoadState::DomReady).await
    }

    async fn find_next(&self) -> Option<D::Node> {
        for locator in &self.options.next_locators {
            match self.visible_match(locator).await {
                Ok(Some(node)) => {
                    debug!(%locator, "next page control found");
                    return Some(node);
                }
                Ok(None) => {}
                Err(e) => warn!(%locator, "Next page locator failed: {}", e),
            }
        }
        None
    }

    async fn visible_match(&self, locator: &Locator) -> Result<Option<D::Node>, DomError> {
        let Some(node) = self.doc.query_one(locator).await? else {
            return Ok(None);
        };
        if self.doc.is_visible(&node).await? {
            Ok(Some(node))
        } else {
            Ok(None)
        }
    }

    async fn follow(&self, node: &D::Node) -> Result<(), DomError> {
        self.doc.click(node).await?;
        self.doc.wait_for(LoadState::NetworkIdle).await
    }

    fn finish(&self, records: Vec<QuestionRecord>, pages: usize, stop: StopReason) -> CrawlReport {
        self.progress.finish_and_clear();
        info!(
            "Crawl finished: {} pages, {} questions",
            pages,
            records.len()
        );
        CrawlReport {
            records,
            pages,
            stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::static_page::StaticDocument;

    const BASE: &str = "https://site.test/exams/az-104/view";

    fn page(numbers: &[u32], next: &str) -> String {
        let cards: String = numbers
            .iter()
            .map(|n| {
                format!(
                    r#"<div class="exam-question-card"><div class="card-header">Question #{n}
                       <span class="question-title-topic">Topic 1</span></div></div>"#
                )
            })
            .collect();
        format!("<html><body>{cards}{next}</body></html>")
    }

    fn options(start: &str) -> CrawlOptions {
        CrawlOptions {
            delay: Duration::ZERO,
            ..CrawlOptions::new(start)
        }
    }

    fn numbers(report: &CrawlReport) -> Vec<String> {
        report
            .records
            .iter()
            .map(|r| r.question_number.clone())
            .collect()
    }

    #[tokio::test]
    async fn follows_next_until_absent() {
        let doc = StaticDocument::in_memory([
            (
                format!("{BASE}/1/"),
                page(&[1, 2], r#"<a class="btn btn-success" href="../2/">Next Questions</a>"#),
            ),
            (
                format!("{BASE}/2/"),
                page(&[3, 4], r#"<a class="btn btn-success" href="/exams/az-104/view/3/">Next Questions</a>"#),
            ),
            (format!("{BASE}/3/"), page(&[5], "")),
        ]);
        let report = Crawler::new(&doc, options(&format!("{BASE}/1/"))).run().await;

        assert_eq!(report.pages, 3);
        assert!(matches!(report.stop, StopReason::LastPage));
        assert_eq!(
            numbers(&report),
            vec!["Question #1", "Question #2", "Question #3", "Question #4", "Question #5"]
        );
        assert_eq!(report.records[4].url, format!("{BASE}/3/"));
    }

    #[tokio::test]
    async fn hidden_next_control_ends_crawl() {
        let doc = StaticDocument::in_memory([
            (
                format!("{BASE}/1/"),
                page(&[1], r#"<a class="next-page" href="../2/">more</a>"#),
            ),
            (
                format!("{BASE}/2/"),
                page(&[2], r#"<div hidden><a class="next-page" href="../3/">more</a></div>"#),
            ),
            (format!("{BASE}/3/"), page(&[3], "")),
        ]);
        let report = Crawler::new(&doc, options(&format!("{BASE}/1/"))).run().await;

        assert_eq!(report.pages, 2);
        assert_eq!(numbers(&report), vec!["Question #1", "Question #2"]);
    }

    #[tokio::test]
    async fn later_strategies_are_tried() {
        let next = r#"<ul class="pagination"><li class="next disabled"><a href="../9/">x</a></li>
                      <li class="next"><a href="../2/">&raquo;</a></li></ul>"#;
        let doc = StaticDocument::in_memory([
            (format!("{BASE}/1/"), page(&[1], next)),
            (format!("{BASE}/2/"), page(&[2], "")),
        ]);
        let mut opts = options(&format!("{BASE}/1/"));
        // A broken strategy is logged and skipped.
        opts.next_locators.insert(0, Locator::css("a..next"));
        let report = Crawler::new(&doc, opts).run().await;

        assert_eq!(numbers(&report), vec!["Question #1", "Question #2"]);
    }

    #[tokio::test]
    async fn failed_click_keeps_results() {
        let doc = StaticDocument::in_memory([(
            format!("{BASE}/1/"),
            page(&[1, 2], r#"<a class="next-page" href="../missing/">more</a>"#),
        )]);
        let report = Crawler::new(&doc, options(&format!("{BASE}/1/"))).run().await;

        assert!(matches!(report.stop, StopReason::LastPage));
        assert_eq!(report.pages, 1);
        assert_eq!(report.records.len(), 2);
    }

    #[tokio::test]
    async fn start_navigation_failure_is_fatal() {
        let doc = StaticDocument::in_memory([(format!("{BASE}/1/"), page(&[1], ""))]);
        let report = Crawler::new(&doc, options("https://site.test/nowhere")).run().await;

        assert!(matches!(report.stop, StopReason::NavigationFailed(DomError::Navigation { .. })));
        assert_eq!(report.pages, 0);
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn page_limit_stops_early() {
        let doc = StaticDocument::in_memory([
            (format!("{BASE}/1/"), page(&[1], r#"<a class="next-page" href="../2/">more</a>"#)),
            (format!("{BASE}/2/"), page(&[2], "")),
        ]);
        let mut opts = options(&format!("{BASE}/1/"));
        opts.max_pages = Some(1);
        let report = Crawler::new(&doc, opts).run().await;

        assert!(matches!(report.stop, StopReason::PageLimit));
        assert_eq!(numbers(&report), vec!["Question #1"]);
    }

    #[tokio::test]
    async fn zero_page_limit_visits_nothing() {
        let doc = StaticDocument::in_memory([(format!("{BASE}/1/"), page(&[1], ""))]);
        let mut opts = options(&format!("{BASE}/1/"));
        opts.max_pages = Some(0);
        let report = Crawler::new(&doc, opts).run().await;

        assert!(matches!(report.stop, StopReason::PageLimit));
        assert_eq!(report.pages, 0);
        assert!(report.records.is_empty());
        assert!(matches!(doc.current_url().await, Err(DomError::NoPage)));
    }

    #[tokio::test]
    async fn wrapped_next_label_still_matches() {
        let doc = StaticDocument::in_memory([
            (
                format!("{BASE}/1/"),
                page(&[1], "<a class=\"btn btn-success\" href=\"../2/\">\n  Next\n  questions\n</a>"),
            ),
            (format!("{BASE}/2/"), page(&[2], "")),
        ]);
        let mut opts = options(&format!("{BASE}/1/"));
        opts.next_locators.truncate(1);
        let report = Crawler::new(&doc, opts).run().await;

        assert_eq!(numbers(&report), vec!["Question #1", "Question #2"]);
    }
}
