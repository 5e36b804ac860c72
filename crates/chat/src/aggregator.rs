use artalk_backend::FAILURE_ANSWER;

/// Provisional answer shown while a response streams in.
pub const PLACEHOLDER_ANSWER: &str = "Let me thinking...";

/// Final answer substituted when the stream closes without usable text.
pub const FALLBACK_ANSWER: &str = "Désolé, je n'ai pas de réponse pour le moment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

/// Accumulates streamed fragments into one growing answer.
///
/// One aggregator serves exactly one send: it starts in `Idle`, enters
/// `Streaming` via [`AnswerAggregator::begin`], and lands in one of the three
/// terminal phases. The next send constructs a fresh aggregator, which is how
/// every terminal phase converges back to `Idle`.
#[derive(Debug)]
pub struct AnswerAggregator {
    answer: String,
    phase: StreamPhase,
}

impl Default for AnswerAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerAggregator {
    pub fn new() -> Self {
        Self {
            answer: String::new(),
            phase: StreamPhase::Idle,
        }
    }

    pub fn begin() -> Self {
        Self {
            answer: String::new(),
            phase: StreamPhase::Streaming,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Appends the fragment (no separator) and returns the trimmed
    /// accumulation to republish. Returns `None` once the aggregator has
    /// left `Streaming`; the fragment is discarded, not appended.
    pub fn on_fragment(&mut self, fragment: &str) -> Option<String> {
        if self.phase != StreamPhase::Streaming {
            return None;
        }

        self.answer.push_str(fragment);
        Some(self.answer.trim().to_string())
    }

    /// Requests early termination. Fragments already accumulated stay; any
    /// that arrive afterwards are discarded by [`AnswerAggregator::on_fragment`].
    pub fn cancel(&mut self) {
        if self.phase == StreamPhase::Streaming {
            self.phase = StreamPhase::Cancelled;
        }
    }

    /// Records a transport failure. The accumulated text is abandoned in
    /// favor of the fixed failure answer; there is no retry. A failure
    /// reported after cancellation is ignored, the cancelled answer stands.
    pub fn fail(&mut self) {
        if self.phase == StreamPhase::Streaming {
            self.phase = StreamPhase::Failed;
        }
    }

    /// Decides the terminal answer once the fragment sequence has ended.
    pub fn finish(&mut self) -> String {
        match self.phase {
            StreamPhase::Failed => FAILURE_ANSWER.to_string(),
            StreamPhase::Cancelled => final_or_fallback(&self.answer),
            _ => {
                self.phase = StreamPhase::Completed;
                final_or_fallback(&self.answer)
            }
        }
    }
}

fn final_or_fallback(answer: &str) -> String {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        FALLBACK_ANSWER.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_concatenate_without_separator() {
        let mut aggregator = AnswerAggregator::begin();

        assert_eq!(aggregator.on_fragment("Hello").as_deref(), Some("Hello"));
        assert_eq!(aggregator.on_fragment(", ").as_deref(), Some("Hello,"));
        assert_eq!(
            aggregator.on_fragment("world").as_deref(),
            Some("Hello, world")
        );
        assert_eq!(aggregator.finish(), "Hello, world");
        assert_eq!(aggregator.phase(), StreamPhase::Completed);
    }

    #[test]
    fn published_answer_is_trimmed_of_surrounding_whitespace() {
        let mut aggregator = AnswerAggregator::begin();

        assert_eq!(aggregator.on_fragment("  bonjour").as_deref(), Some("bonjour"));
        assert_eq!(
            aggregator.on_fragment(" madame  ").as_deref(),
            Some("bonjour madame")
        );
    }

    #[test]
    fn empty_sequence_finishes_with_fallback() {
        let mut aggregator = AnswerAggregator::begin();
        assert_eq!(aggregator.finish(), FALLBACK_ANSWER);
    }

    #[test]
    fn blank_fragments_finish_with_fallback() {
        let mut aggregator = AnswerAggregator::begin();
        aggregator.on_fragment("   ");
        aggregator.on_fragment("\n\t");

        assert_eq!(aggregator.finish(), FALLBACK_ANSWER);
    }

    #[test]
    fn fragments_after_cancellation_are_discarded() {
        let mut aggregator = AnswerAggregator::begin();
        aggregator.on_fragment("A");
        aggregator.cancel();

        assert_eq!(aggregator.on_fragment("B"), None);
        assert_eq!(aggregator.finish(), "A");
        assert_eq!(aggregator.phase(), StreamPhase::Cancelled);
    }

    #[test]
    fn cancellation_before_any_fragment_falls_back() {
        let mut aggregator = AnswerAggregator::begin();
        aggregator.cancel();

        assert_eq!(aggregator.on_fragment("late"), None);
        assert_eq!(aggregator.finish(), FALLBACK_ANSWER);
    }

    #[test]
    fn failure_replaces_accumulated_text_with_the_fixed_answer() {
        let mut aggregator = AnswerAggregator::begin();
        aggregator.on_fragment("partial ans");
        aggregator.fail();

        assert_eq!(aggregator.finish(), FAILURE_ANSWER);
        assert_eq!(aggregator.phase(), StreamPhase::Failed);
    }

    #[test]
    fn failure_after_cancellation_keeps_the_cancelled_answer() {
        let mut aggregator = AnswerAggregator::begin();
        aggregator.on_fragment("A");
        aggregator.cancel();
        aggregator.fail();

        assert_eq!(aggregator.finish(), "A");
        assert_eq!(aggregator.phase(), StreamPhase::Cancelled);
    }

    #[test]
    fn idle_aggregator_discards_fragments() {
        let mut aggregator = AnswerAggregator::new();
        assert_eq!(aggregator.on_fragment("nope"), None);
        assert_eq!(aggregator.phase(), StreamPhase::Idle);
    }
}
