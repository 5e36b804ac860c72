use artalk_storage::MessageRecord;

use crate::aggregator::PLACEHOLDER_ANSWER;

/// Renders the in-memory history (stored most-recent-first) as alternating
/// `Human:`/`Bot:` turns, oldest first. A message whose answer is still the
/// placeholder contributes an empty `Bot:` turn.
pub fn build_prompt(messages: &[MessageRecord]) -> String {
    let mut lines = Vec::with_capacity(messages.len() * 2);

    for message in messages.iter().rev() {
        lines.push(format!("Human:{}", message.question.trim()));
        if message.answer == PLACEHOLDER_ANSWER {
            lines.push("Bot:".to_string());
        } else {
            lines.push(format!("Bot:{}", message.answer.trim()));
        }
    }

    lines.join("\n")
}
