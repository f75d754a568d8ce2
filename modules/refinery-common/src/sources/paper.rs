use serde_json::Value;

use super::{num_field, str_field, string_list, Extracted};
use crate::error::RefineryError;

/// Research paper. Canonical fields: title, journal, kind, url. Citation counts
/// move daily and stay out of the canonical text.
pub fn extract(raw: &Value) -> Result<Extracted, RefineryError> {
    let Some(title) = str_field(raw, "title") else {
        return Err(RefineryError::validation("paper record has no title"));
    };

    let journal = str_field(raw, "journal").unwrap_or_default();
    let kind = str_field(raw, "type")
        .or_else(|| str_field(raw, "signal_type"))
        .unwrap_or_else(|| "General".to_string());
    let key = format!("paper:{}", title.to_lowercase());

    let empty = Value::Null;
    let metrics = raw.get("metrics").unwrap_or(&empty);

    let mut ex = Extracted {
        canonical: vec![
            ("title", title),
            ("journal", journal.clone()),
            ("kind", kind.clone()),
            ("url", str_field(raw, "url").unwrap_or_default()),
        ],
        dedup_key: Some(key.clone()),
        topic_id: Some(key),
        tags: string_list(raw, "strategies"),
        category: kind,
        author: journal,
        ..Extracted::default()
    };
    ex.metrics
        .insert("citations".into(), num_field(metrics, "citations"));
    ex.metrics
        .insert("impact_factor".into(), num_field(metrics, "impact_factor"));

    Ok(ex)
}

#[cfg(test)]
mod tests {
    use crate::ingest::normalize;
    use crate::types::SourceType;
    use serde_json::json;

    #[test]
    fn title_keys_dedup_case_insensitively() {
        let a = normalize(
            &json!({"title": "Room-Temperature Superconductor", "journal": "Nature", "type": "NUCLEAR",
                    "metrics": {"citations": 10, "impact_factor": 49.9}}),
            SourceType::Paper,
        )
        .unwrap();
        let b = normalize(
            &json!({"title": "room-temperature superconductor", "journal": "arXiv"}),
            SourceType::Paper,
        )
        .unwrap();
        assert_eq!(a.dedup_key, b.dedup_key);
        assert_ne!(a.fingerprint, b.fingerprint);
        assert_eq!(a.category, "NUCLEAR");
        assert_eq!(b.category, "General");
        assert_eq!(a.metric("impact_factor"), 49.9);
    }

    #[test]
    fn citations_do_not_change_fingerprint() {
        let mk = |c: u32| {
            normalize(
                &json!({"title": "Scaling laws revisited", "journal": "ICML", "metrics": {"citations": c}}),
                SourceType::Paper,
            )
            .unwrap()
        };
        assert_eq!(mk(1).fingerprint, mk(900).fingerprint);
    }
}
