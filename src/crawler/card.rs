//! Question card extraction.
//!
//! A page holds a list of `.exam-question-card` nodes. Each card is read
//! independently; a card that fails to read is logged and skipped so the rest
//! of the page still comes through.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::dom::{Document, Locator};
use crate::error::DomError;
use crate::model::{AnswerOption, DiscussionEntry, QuestionRecord, VotedAnswer};

const CARD: &str = ".exam-question-card";
const HEADER: &str = ".card-header";
const TOPIC: &str = ".question-title-topic";
const BODY: &str = ".question-body";
const PROMPT: &str = ".card-text";
const VOTE_ISLAND: &str = "script[type='application/json']";
const OPTION: &str = ".multi-choice-item";
const OPTION_LETTER: &str = ".multi-choice-letter";
const CORRECT_MARKER: &str = "correct-hidden";
const CORRECT_ANSWER: &str = ".correct-answer";
const DESCRIPTION: &str = ".answer-description";
const DISCUSSION_BADGE: &str = ".question-discussion-button .badge";
const DISCUSSION_POST: &str = ".discussion-post";

/// One entry of the embedded voting JSON.
#[derive(Debug, Deserialize)]
struct VoteIslandEntry {
    voted_answers: String,
    vote_count: u32,
    is_most_voted: bool,
}

/// Extract every question card on the loaded page, in document order.
pub async fn extract_page<D: Document>(doc: &D) -> Vec<QuestionRecord> {
    let cards = match doc.query_all(&Locator::css(CARD)).await {
        Ok(cards) => cards,
        Err(e) => {
            warn!("Error finding question cards: {}", e);
            return Vec::new();
        }
    };
    if cards.is_empty() {
        warn!("No question cards found; the page may require login or has a different structure");
        return Vec::new();
    }
    debug!(count = cards.len(), "question cards found");

    let mut records = Vec::with_capacity(cards.len());
    for (i, card) in cards.iter().enumerate() {
        match extract_card(doc, card).await {
            Ok(record) => {
                debug!(number = %record.question_number, topic = %record.topic, "parsed card");
                records.push(record);
            }
            Err(e) => warn!(card = i + 1, "Skipping question card: {}", e),
        }
    }
    records
}

pub async fn extract_card<D: Document>(doc: &D, card: &D::Node) -> Result<QuestionRecord, DomError> {
    let mut record = QuestionRecord::default();

    if let Some(header) = doc.find(card, &Locator::css(HEADER)).await? {
        record.question_number = first_line(&doc.text(&header).await?);
        if let Some(topic) = doc.find(&header, &Locator::css(TOPIC)).await? {
            record.topic = doc.text(&topic).await?.trim().to_string();
        }
    }

    if let Some(body) = doc.find(card, &Locator::css(BODY)).await? {
        record.data_id = doc.attribute(&body, "data-id").await?.unwrap_or_default();
    }

    if let Some(prompt) = doc.find(card, &Locator::css(PROMPT)).await? {
        record.question_text = doc.inner_markup(&prompt).await?;
    }

    if let Some(island) = doc.find(card, &Locator::css(VOTE_ISLAND)).await? {
        record.voted_answers = parse_vote_island(&doc.text(&island).await?);
    }

    for item in doc.find_all(card, &Locator::css(OPTION)).await? {
        record.options.push(extract_option(doc, &item).await?);
    }

    if let Some(answer) = doc.find(card, &Locator::css(CORRECT_ANSWER)).await? {
        record.legacy.correct_answer = correct_answer(doc, &answer).await?;
    }

    if let Some(description) = doc.find(card, &Locator::css(DESCRIPTION)).await? {
        record.answer_description = doc.inner_markup(&description).await?;
    }

    if let Some(badge) = doc.find(card, &Locator::css(DISCUSSION_BADGE)).await? {
        record.discussion_count = doc.text(&badge).await?.trim().parse().unwrap_or(0);
    }

    for post in doc.find_all(card, &Locator::css(DISCUSSION_POST)).await? {
        record.discussions.push(DiscussionEntry {
            user: child_text(doc, &post, ".user").await?,
            content: child_text(doc, &post, ".content").await?,
            timestamp: child_text(doc, &post, ".timestamp").await?,
        });
    }

    record.url = doc.current_url().await?;
    Ok(record)
}

async fn extract_option<D: Document>(doc: &D, item: &D::Node) -> Result<AnswerOption, DomError> {
    let letter = match doc.find(item, &Locator::css(OPTION_LETTER)).await? {
        Some(span) => doc
            .attribute(&span, "data-choice-letter")
            .await?
            .unwrap_or_default(),
        None => String::new(),
    };

    let raw = doc.text(item).await?;
    let text = strip_letter_prefix(raw.trim(), &letter).trim().to_string();

    let is_correct = doc
        .attribute(item, "class")
        .await?
        .is_some_and(|class| class.split_whitespace().any(|c| c == CORRECT_MARKER));

    Ok(AnswerOption {
        letter,
        text,
        is_correct,
    })
}

/// Image answers become a legacy `[IMAGE: <src>]` marker, anything else is
/// taken as trimmed text.
async fn correct_answer<D: Document>(doc: &D, answer: &D::Node) -> Result<String, DomError> {
    if let Some(img) = doc.find(answer, &Locator::css("img")).await? {
        if let Some(src) = doc.attribute(&img, "src").await? {
            return Ok(format!("[IMAGE: {}]", src));
        }
    }
    Ok(doc.text(answer).await?.trim().to_string())
}

async fn child_text<D: Document>(doc: &D, scope: &D::Node, css: &str) -> Result<String, DomError> {
    match doc.find(scope, &Locator::css(css)).await? {
        Some(node) => Ok(doc.text(&node).await?.trim().to_string()),
        None => Ok(String::new()),
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn strip_letter_prefix<'a>(text: &'a str, letter: &str) -> &'a str {
    if letter.is_empty() {
        return text;
    }
    text.strip_prefix(letter)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(text)
}

fn parse_vote_island(json: &str) -> Vec<VotedAnswer> {
    if json.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<VoteIslandEntry>>(json.trim()) {
        Ok(entries) => entries
            .into_iter()
            .map(|e| VotedAnswer {
                answer: e.voted_answers,
                vote_count: e.vote_count,
                is_most_voted: e.is_most_voted,
            })
            .collect(),
        Err(e) => {
            warn!("Error parsing voted answers JSON: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::dom::static_page::{StaticDocument, StaticNode};
    use crate::dom::LoadState;

    const PAGE_URL: &str = "https://www.examtopics.com/exams/microsoft/az-104/view/1/";

    fn fixture_doc() -> StaticDocument {
        let html = std::fs::read_to_string("tests/fixtures/exam_page.html").unwrap();
        StaticDocument::from_html(PAGE_URL, &html)
    }

    #[tokio::test]
    async fn text_answer_card() {
        let records = extract_page(&fixture_doc()).await;
        assert_eq!(records.len(), 3);

        let q = &records[0];
        assert_eq!(q.question_number, "Question #1");
        assert_eq!(q.topic, "Topic 1");
        assert_eq!(q.data_id, "812345");
        assert!(q.question_text.contains("Which city is the capital of France?"));
        assert!(q.question_text.contains(r#"src="/assets/media/exam-media/04223/0000100001.png""#));
        assert_eq!(q.legacy.correct_answer, "B");
        assert_eq!(q.answer_description, "Paris has been the capital since <b>987</b>.");
        assert_eq!(q.discussion_count, 17);
        assert_eq!(q.url, PAGE_URL);

        let letters: Vec<_> = q.options.iter().map(|o| o.letter.as_str()).collect();
        assert_eq!(letters, vec!["A", "B", "C"]);
        assert_eq!(q.options[0].text, "Rome");
        assert!(q.options[1].text.starts_with("Paris"));
        assert!(q.options[1].is_correct);
        assert!(!q.options[0].is_correct);
    }

    #[tokio::test]
    async fn vote_island_and_discussions() {
        let records = extract_page(&fixture_doc()).await;
        let q = &records[0];
        assert_eq!(
            q.voted_answers,
            vec![
                VotedAnswer {
                    answer: "B".into(),
                    vote_count: 42,
                    is_most_voted: true
                },
                VotedAnswer {
                    answer: "A".into(),
                    vote_count: 3,
                    is_most_voted: false
                },
            ]
        );
        assert_eq!(q.discussions.len(), 2);
        assert_eq!(q.discussions[0].user, "alice");
        assert_eq!(q.discussions[0].timestamp, "1 year, 2 months ago");
        assert_eq!(q.discussions[1].content, "Agree with B");
    }

    #[tokio::test]
    async fn image_answer_and_broken_island() {
        let records = extract_page(&fixture_doc()).await;
        let q = &records[1];
        assert_eq!(
            q.legacy.correct_answer,
            "[IMAGE: /assets/media/exam-media/04223/0000200002.png]"
        );
        assert!(q.legacy.correct_answer_image_url.is_none());
        assert!(q.voted_answers.is_empty());
        assert_eq!(q.discussion_count, 0);
        assert!(q.options.is_empty());
    }

    #[tokio::test]
    async fn only_leading_letter_prefix_is_stripped() {
        let records = extract_page(&fixture_doc()).await;
        let q = &records[2];
        assert_eq!(q.topic, "Topic 2");
        assert_eq!(q.options[0].text, "Alpha A.1");
        assert_eq!(q.options[1].letter, "D");
        assert!(q.options.iter().all(|o| o.is_correct));
        assert_eq!(q.legacy.correct_answer, "AD");
    }

    #[tokio::test]
    async fn glued_badge_is_removed_by_normalize() {
        let html = r#"<div class="exam-question-card">
            <div class="card-header">Question #4 <span class="question-title-topic">Topic 1</span></div>
            <ul><li class="multi-choice-item correct-hidden"><span class="multi-choice-letter" data-choice-letter="B">B.</span> Paris<span class="badge">Most Voted</span></li></ul>
            </div>"#;
        let doc = StaticDocument::from_html(PAGE_URL, html);
        let mut records = extract_page(&doc).await;
        assert_eq!(records[0].options[0].text, "ParisMost Voted");

        crate::normalize::Normalizer::default().normalize(&mut records[0]);
        assert_eq!(records[0].options[0].text, "Paris");
        assert!(records[0].options[0].is_correct);
    }

    #[tokio::test]
    async fn page_without_cards_is_empty() {
        let doc = StaticDocument::from_html(PAGE_URL, "<html><body><p>Please log in</p></body></html>");
        assert!(extract_page(&doc).await.is_empty());
    }

    #[test]
    fn helpers() {
        assert_eq!(first_line("\n   Question #9\n Topic 3\n"), "Question #9");
        assert_eq!(first_line("  "), "");
        assert_eq!(strip_letter_prefix("A. Foo", "A"), " Foo");
        assert_eq!(strip_letter_prefix("Apple", "A"), "Apple");
        assert_eq!(strip_letter_prefix("B. Foo", ""), "B. Foo");
        assert!(parse_vote_island("   ").is_empty());
        assert!(parse_vote_island("[{\"voted_answers\": 1}]").is_empty());
    }

    /// Delegates to a static page but fails to read any node whose text
    /// contains `BOOM`.
    struct Sabotaged(StaticDocument);

    #[async_trait(?Send)]
    impl Document for Sabotaged {
        type Node = StaticNode;

        async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DomError> {
            self.0.navigate(url, timeout).await
        }
        async fn wait_for(&self, state: LoadState) -> Result<(), DomError> {
            self.0.wait_for(state).await
        }
        async fn query_one(&self, locator: &Locator) -> Result<Option<StaticNode>, DomError> {
            self.0.query_one(locator).await
        }
        async fn query_all(&self, locator: &Locator) -> Result<Vec<StaticNode>, DomError> {
            self.0.query_all(locator).await
        }
        async fn find(
            &self,
            scope: &StaticNode,
            locator: &Locator,
        ) -> Result<Option<StaticNode>, DomError> {
            self.0.find(scope, locator).await
        }
        async fn find_all(
            &self,
            scope: &StaticNode,
            locator: &Locator,
        ) -> Result<Vec<StaticNode>, DomError> {
            self.0.find_all(scope, locator).await
        }
        async fn text(&self, node: &StaticNode) -> Result<String, DomError> {
            let text = self.0.text(node).await?;
            if text.contains("BOOM") {
                return Err(DomError::Browser("node detached".into()));
            }
            Ok(text)
        }
        async fn inner_markup(&self, node: &StaticNode) -> Result<String, DomError> {
            self.0.inner_markup(node).await
        }
        async fn attribute(&self, node: &StaticNode, name: &str) -> Result<Option<String>, DomError> {
            self.0.attribute(node, name).await
        }
        async fn is_visible(&self, node: &StaticNode) -> Result<bool, DomError> {
            self.0.is_visible(node).await
        }
        async fn click(&self, node: &StaticNode) -> Result<(), DomError> {
            self.0.click(node).await
        }
        async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DomError> {
            self.0.evaluate(script).await
        }
        async fn current_url(&self) -> Result<String, DomError> {
            self.0.current_url().await
        }
    }

    #[tokio::test]
    async fn failing_card_is_skipped() {
        let cards: String = (1..=5)
            .map(|i| {
                let marker = if i == 3 { " BOOM" } else { "" };
                format!(
                    r#"<div class="exam-question-card"><div class="card-header">Question #{i}{marker}</div></div>"#
                )
            })
            .collect();
        let doc = Sabotaged(StaticDocument::from_html(PAGE_URL, &cards));

        let numbers: Vec<_> = extract_page(&doc)
            .await
            .into_iter()
            .map(|r| r.question_number)
            .collect();
        assert_eq!(
            numbers,
            vec!["Question #1", "Question #2", "Question #4", "Question #5"]
        );
    }
}
