use serde_json::Value;

use super::{num_field, parse_timestamp, str_field, string_list, Extracted, SECTORS};
use crate::error::RefineryError;

const ENGAGEMENT: [&str; 6] = ["likes", "retweets", "replies", "quotes", "bookmarks", "views"];
const GROWTH: [&str; 4] = ["views", "likes", "retweets", "replies"];

/// Social post. Canonical fields: author handle, text, url. Engagement and
/// growth counters only land in metrics.
pub fn extract(raw: &Value) -> Result<Extracted, RefineryError> {
    let Some(text) = str_field(raw, "fullText").or_else(|| str_field(raw, "full_text")) else {
        return Err(RefineryError::validation("post record has no fullText"));
    };

    let empty = Value::Null;
    let user = raw.get("user").unwrap_or(&empty);
    let screen_name = str_field(user, "screenName")
        .or_else(|| str_field(raw, "screen_name"))
        .unwrap_or_default();
    let url = str_field(raw, "tweetUrl").or_else(|| str_field(raw, "tweet_url"));
    let tags = string_list(raw, "tags");

    let category = tags
        .iter()
        .find_map(|t| SECTORS.iter().find(|s| s.eq_ignore_ascii_case(t)))
        .map(|s| s.to_string())
        .or_else(|| tags.first().cloned())
        .unwrap_or_else(|| "General".to_string());

    let mut ex = Extracted {
        canonical: vec![
            ("author", screen_name.clone()),
            ("text", text),
            ("url", url.clone().unwrap_or_default()),
        ],
        dedup_key: url.map(|u| format!("post:{u}")),
        tags,
        category,
        author: screen_name,
        timestamp: str_field(raw, "createdAt").as_deref().and_then(parse_timestamp),
        ..Extracted::default()
    };

    let metrics = raw.get("metrics").unwrap_or(&empty);
    for name in ENGAGEMENT {
        ex.metrics.insert(name.to_string(), num_field(metrics, name));
    }
    let growth = raw.get("growth").unwrap_or(&empty);
    for name in GROWTH {
        ex.metrics
            .insert(format!("growth_{name}"), num_field(growth, name));
    }
    ex.metrics
        .insert("followers".to_string(), num_field(user, "followersCount"));

    Ok(ex)
}
