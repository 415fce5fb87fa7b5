//! Document access capability.
//!
//! The crawler never touches a browser or an HTML parser directly. It talks to
//! a [`Document`]: something that can load a page, answer locator queries and
//! read nodes. Two backends exist:
//! - [`chrome::ChromeDocument`] drives a real Chromium tab over CDP,
//! - [`static_page::StaticDocument`] parses fetched (or in-memory) HTML.

pub mod chrome;
pub mod static_page;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DomError;

/// Load milestones a caller can wait for after navigating or clicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomReady,
    NetworkIdle,
}

/// A CSS selector, optionally narrowed to nodes whose text contains a needle.
///
/// The text filter stands in for the `:has-text()` pseudo-class browser
/// automation tools offer on top of plain CSS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub css: String,
    pub has_text: Option<String>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Locator {
            css: css.into(),
            has_text: None,
        }
    }

    pub fn with_text(mut self, needle: impl Into<String>) -> Self {
        self.has_text = Some(needle.into());
        self
    }

    /// Whether a node's text passes the optional text filter. Matching is
    /// case-insensitive and treats any whitespace run as one space.
    pub fn accepts_text(&self, text: &str) -> bool {
        match &self.has_text {
            Some(needle) => fold_text(text).contains(&fold_text(needle)),
            None => true,
        }
    }
}

fn fold_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.has_text {
            Some(needle) => write!(f, "{}:has-text('{}')", self.css, needle),
            None => f.write_str(&self.css),
        }
    }
}

#[async_trait(?Send)]
pub trait Document {
    /// Handle to a node of the currently loaded page.
    type Node;

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DomError>;

    async fn wait_for(&self, state: LoadState) -> Result<(), DomError>;

    async fn query_one(&self, locator: &Locator) -> Result<Option<Self::Node>, DomError>;

    async fn query_all(&self, locator: &Locator) -> Result<Vec<Self::Node>, DomError>;

    /// First descendant of `scope` matching `locator`.
    async fn find(
        &self,
        scope: &Self::Node,
        locator: &Locator,
    ) -> Result<Option<Self::Node>, DomError>;

    async fn find_all(
        &self,
        scope: &Self::Node,
        locator: &Locator,
    ) -> Result<Vec<Self::Node>, DomError>;

    /// Concatenated text content of the node and its descendants.
    async fn text(&self, node: &Self::Node) -> Result<String, DomError>;

    async fn inner_markup(&self, node: &Self::Node) -> Result<String, DomError>;

    async fn attribute(&self, node: &Self::Node, name: &str) -> Result<Option<String>, DomError>;

    async fn is_visible(&self, node: &Self::Node) -> Result<bool, DomError>;

    async fn click(&self, node: &Self::Node) -> Result<(), DomError>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DomError>;

    async fn current_url(&self) -> Result<String, DomError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_display_mirrors_has_text_syntax() {
        let plain = Locator::css("a.next-page");
        assert_eq!(plain.to_string(), "a.next-page");

        let filtered = Locator::css("a").with_text("Next Questions");
        assert_eq!(filtered.to_string(), "a:has-text('Next Questions')");
    }

    #[test]
    fn text_filter() {
        let locator = Locator::css("a").with_text("Next");
        assert!(locator.accepts_text("  Next Questions "));
        assert!(!locator.accepts_text("Previous"));
        assert!(Locator::css("a").accepts_text(""));
    }

    #[test]
    fn text_filter_folds_case_and_wrapped_whitespace() {
        let locator = Locator::css("a").with_text("Next Questions");
        assert!(locator.accepts_text("\n  Next\n  Questions\n"));
        assert!(locator.accepts_text("NEXT\tquestions"));
        assert!(!locator.accepts_text("NextQuestions"));
    }
}
