//! What evaluators already said this period, rebuilt from the ledger at startup.

use std::collections::{HashMap, HashSet};

use crate::fingerprint::Fingerprint;
use crate::types::AuditRecord;

/// topic_id → evaluator_id → last output.
#[derive(Debug, Clone, Default)]
pub struct TopicMemory {
    opinions: HashMap<String, HashMap<String, String>>,
}

impl TopicMemory {
    pub fn prior(&self, topic_id: &str, evaluator_id: &str) -> Option<&str> {
        self.opinions
            .get(topic_id)
            .and_then(|by_eval| by_eval.get(evaluator_id))
            .map(String::as_str)
    }

    /// Later records overwrite earlier ones.
    pub fn remember(&mut self, record: &AuditRecord) {
        self.opinions
            .entry(record.topic_id.clone())
            .or_default()
            .insert(record.evaluator_id.clone(), record.output.clone());
    }

    pub fn topics(&self) -> usize {
        self.opinions.len()
    }
}

/// (fingerprint, evaluator_id) pairs already audited this period.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    pairs: HashSet<(Fingerprint, String)>,
}

impl SeenSet {
    pub fn contains(&self, fingerprint: &Fingerprint, evaluator_id: &str) -> bool {
        self.pairs
            .contains(&(fingerprint.clone(), evaluator_id.to_string()))
    }

    pub fn insert(&mut self, fingerprint: Fingerprint, evaluator_id: impl Into<String>) -> bool {
        self.pairs.insert((fingerprint, evaluator_id.into()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Seen set plus topic memory, both derived from ledger records in file order.
#[derive(Debug, Clone, Default)]
pub struct LedgerMemory {
    pub seen: SeenSet,
    pub topics: TopicMemory,
}

impl LedgerMemory {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AuditRecord>) -> Self {
        let mut memory = Self::default();
        memory.absorb(records);
        memory
    }

    pub fn absorb<'a>(&mut self, records: impl IntoIterator<Item = &'a AuditRecord>) {
        for record in records {
            self.seen
                .insert(record.fingerprint.clone(), record.evaluator_id.clone());
            self.topics.remember(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceType;
    use chrono::Utc;

    fn record(text: &str, topic: &str, evaluator: &str, output: &str) -> AuditRecord {
        AuditRecord {
            fingerprint: Fingerprint::of_text(text),
            topic_id: topic.into(),
            evaluator_id: evaluator.into(),
            source_type: SourceType::Market,
            thought: String::new(),
            output: output.into(),
            drift_flag: false,
            prior_output: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn later_records_win_topic_memory() {
        let memory = LedgerMemory::from_records(&[
            record("a", "market:fed", "skeptic", "Bullish"),
            record("b", "market:fed", "skeptic", "Bearish"),
            record("b", "market:fed", "optimist", "Bullish"),
        ]);
        assert_eq!(memory.topics.prior("market:fed", "skeptic"), Some("Bearish"));
        assert_eq!(memory.topics.prior("market:fed", "optimist"), Some("Bullish"));
        assert_eq!(memory.topics.prior("market:gold", "skeptic"), None);
        assert_eq!(memory.seen.len(), 3);
        assert!(memory.seen.contains(&Fingerprint::of_text("a"), "skeptic"));
        assert!(!memory.seen.contains(&Fingerprint::of_text("a"), "optimist"));
    }
}
