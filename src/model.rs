use serde::{Deserialize, Serialize};

/// One exam question as exported to `exam.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuestionRecord {
    pub question_number: String,
    pub topic: String,
    pub data_id: String,
    pub question_text: String,
    pub options: Vec<AnswerOption>,

    #[serde(flatten)]
    pub legacy: LegacyAnswer,
    #[serde(flatten)]
    pub current: CurrentAnswer,

    pub answer_description: String,
    pub discussion_count: u32,
    pub voted_answers: Vec<VotedAnswer>,
    pub discussions: Vec<DiscussionEntry>,
    pub url: String,

    pub original_order: usize,
    pub topic_question_number: usize,

    // Passthrough for the downstream database sync.
    pub exam_topics_id: Option<String>,
    pub appeared_in_real_exam: bool,
    pub is_unofficial: bool,
}

/// First-generation answer slot. `correct_answer` may still hold an
/// `[IMAGE: <url>]` marker until the record is migrated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyAnswer {
    pub correct_answer: String,
    pub correct_answer_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CurrentAnswer {
    pub original_answer: String,
    pub precio_answer: String,
    pub original_answer_image_url: Option<String>,
    pub precio_answer_image_url: Option<String>,
    pub is_precio_verified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnswerOption {
    pub letter: String,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VotedAnswer {
    pub answer: String,
    pub vote_count: u32,
    pub is_most_voted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussionEntry {
    pub user: String,
    pub content: String,
    pub timestamp: String,
}
