use refinery_common::{Signal, TopicMemory};

use crate::verdict::{stance, Stance};

/// What one evaluator sees for one signal.
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    pub signal: &'a Signal,
    /// This evaluator's last output on the same topic, if any.
    pub prior_output: Option<&'a str>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(signal: &'a Signal, memory: &'a TopicMemory, evaluator_id: &str) -> Self {
        Self {
            signal,
            prior_output: memory.prior(&signal.topic_id, evaluator_id),
        }
    }

    /// Description of the prior stance, injected so the evaluator can say whether it moved.
    pub fn drift_context(&self) -> Option<String> {
        let prior = self.prior_output?;
        let label = match stance(prior) {
            Stance::Bullish => "bullish".to_string(),
            Stance::Bearish => "bearish".to_string(),
            Stance::Neutral => "neutral".to_string(),
            Stance::Other(line) => line,
        };
        Some(format!(
            "Earlier this period you concluded on this topic: \"{}\" (stance: {label}). \
             If your view has changed, state the new stance plainly.",
            prior.trim()
        ))
    }

    /// The user prompt sent to the model.
    pub fn render(&self) -> String {
        let s = self.signal;
        let mut prompt = format!(
            "Source: {}\nCategory: {}\nTopic: {}\nObserved: {}\n\n{}\n",
            s.source_type,
            s.category,
            s.topic_id,
            s.timestamp.format("%Y-%m-%d %H:%M UTC"),
            s.canonical_text
        );
        if !s.tags.is_empty() {
            prompt.push_str(&format!("Tags: {}\n", s.tags.join(", ")));
        }
        if let Some(drift) = self.drift_context() {
            prompt.push('\n');
            prompt.push_str(&drift);
            prompt.push('\n');
        }
        prompt.push_str("\nRespond as:\nThought: <your reasoning>\nOutput: <your conclusion>\n");
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use refinery_common::{AuditRecord, SourceType};

    fn signal() -> Signal {
        Signal::new(SourceType::Market, "market:fed:cut", "title=Fed\nquestion=Cut?")
            .with_topic("market:fed")
            .with_category("Finance")
    }

    #[test]
    fn first_time_topic_has_no_drift_context() {
        let s = signal();
        let memory = TopicMemory::default();
        let ctx = EvaluationContext::new(&s, &memory, "skeptic");
        assert!(ctx.drift_context().is_none());
        let prompt = ctx.render();
        assert!(prompt.contains("question=Cut?"));
        assert!(prompt.contains("Output:"));
        assert!(!prompt.contains("Earlier this period"));
    }

    #[test]
    fn prior_opinion_is_injected() {
        let s = signal();
        let mut memory = TopicMemory::default();
        memory.remember(&AuditRecord {
            fingerprint: s.fingerprint.clone(),
            topic_id: "market:fed".into(),
            evaluator_id: "skeptic".into(),
            source_type: SourceType::Market,
            thought: String::new(),
            output: "Bullish on a cut".into(),
            drift_flag: false,
            prior_output: None,
            timestamp: Utc::now(),
        });

        let ctx = EvaluationContext::new(&s, &memory, "skeptic");
        assert_eq!(ctx.prior_output, Some("Bullish on a cut"));
        assert!(ctx.render().contains("(stance: bullish)"));

        let other = EvaluationContext::new(&s, &memory, "optimist");
        assert!(other.prior_output.is_none());
    }
}
