use std::collections::HashMap;

use crate::model::QuestionRecord;

pub const UNKNOWN_TOPIC: &str = "Unknown";

/// Stamp `original_order` and `topic_question_number` in crawl order.
/// Returns the number of distinct topics seen.
pub fn assign_order(records: &mut [QuestionRecord]) -> usize {
    let mut topic_counters: HashMap<String, usize> = HashMap::new();

    for (i, record) in records.iter_mut().enumerate() {
        record.original_order = i + 1;

        let topic = if record.topic.is_empty() {
            UNKNOWN_TOPIC
        } else {
            record.topic.as_str()
        };
        let counter = topic_counters.entry(topic.to_string()).or_insert(0);
        *counter += 1;
        record.topic_question_number = *counter;
    }

    topic_counters.len()
}
