use serde_json::Value;

use super::{fmt_num, num_field, str_field, string_list, Extracted};
use crate::error::RefineryError;

/// Trending code repository. Canonical fields: name, stars, topics, description.
pub fn extract(raw: &Value) -> Result<Extracted, RefineryError> {
    let Some(name) = str_field(raw, "name").or_else(|| str_field(raw, "repo_name")) else {
        return Err(RefineryError::validation("repository record has no name"));
    };

    let stars = num_field(raw, "stars");
    let mut topics = string_list(raw, "tags");
    if topics.is_empty() {
        topics = string_list(raw, "topics");
    }
    let primary = topics
        .first()
        .cloned()
        .unwrap_or_else(|| "Uncategorized".to_string());

    let mut ex = Extracted {
        canonical: vec![
            ("name", name.clone()),
            ("stars", fmt_num(stars)),
            ("topics", topics.join(",")),
            ("description", str_field(raw, "reason").unwrap_or_default()),
        ],
        dedup_key: Some(format!("repository:{}", name.to_lowercase())),
        tags: topics,
        category: primary.clone(),
        author: primary,
        ..Extracted::default()
    };
    ex.metrics.insert("stars".into(), stars);

    Ok(ex)
}

#[cfg(test)]
mod tests {
    use crate::ingest::normalize;
    use crate::types::SourceType;
    use serde_json::json;

    #[test]
    fn first_tag_is_category_and_group() {
        let s = normalize(
            &json!({
                "name": "Tokio-RS/tokio",
                "url": "https://github.com/tokio-rs/tokio",
                "stars": "27,000",
                "reason": "Runtime release",
                "tags": ["rust", "async"]
            }),
            SourceType::Repository,
        )
        .unwrap();
        assert_eq!(s.dedup_key, "repository:tokio-rs/tokio");
        assert_eq!(s.category, "rust");
        assert_eq!(s.author, "rust");
        assert_eq!(s.metric("stars"), 27_000.0);
        assert_eq!(
            s.canonical_text,
            "name=Tokio-RS/tokio\nstars=27000\ntopics=rust,async\ndescription=Runtime release"
        );
    }

    #[test]
    fn untagged_repo_is_uncategorized() {
        let s = normalize(&json!({"name": "someone/tool", "stars": 5}), SourceType::Repository)
            .unwrap();
        assert_eq!(s.category, "Uncategorized");
    }
}
