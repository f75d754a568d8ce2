//! Parsing evaluator responses and comparing stances across runs.

use std::sync::LazyLock;

use ai_client::strip_code_blocks;
use regex::Regex;

static RE_OUTPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\boutput\s*[:：]").expect("valid output marker regex"));
static RE_THOUGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\W*thought\s*[:：]").expect("valid thought marker regex"));

const BULLISH: &[&str] = &[
    "bullish", "bull", "buy", "long", "positive", "optimistic", "overweight", "看涨", "看多", "利好",
];
const BEARISH: &[&str] = &[
    "bearish", "bear", "sell", "short", "negative", "pessimistic", "underweight", "看跌", "看空",
    "利空",
];
const NEUTRAL: &[&str] = &[
    "neutral", "hold", "wait", "mixed", "uncertain", "unclear", "sideways", "中性", "观望",
];
/// A lexicon word right after one of these reads as its opposite.
const NEGATIONS: &[&str] = &["not", "no", "never", "isn", "aren", "don", "doesn"];

/// An evaluator's reasoning and its conclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub thought: String,
    pub output: String,
}

/// Split a response on its `Output:` marker. Without one, the whole response is the output.
pub fn parse_verdict(text: &str) -> Verdict {
    let body = strip_code_blocks(text);
    let tidy = |s: &str| s.trim().trim_matches('*').trim().to_string();

    match RE_OUTPUT.find(body) {
        Some(m) => {
            let head = &body[..m.start()];
            let thought = match RE_THOUGHT.find(head) {
                Some(t) => &head[t.end()..],
                None => head,
            };
            Verdict {
                thought: tidy(thought),
                output: tidy(&body[m.end()..]),
            }
        }
        None => Verdict {
            thought: String::new(),
            output: tidy(body),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stance {
    Bullish,
    Bearish,
    Neutral,
    /// No lexicon hit: the normalized first line.
    Other(String),
}

/// Canonical stance of an output, read from its first non-empty line.
///
/// "not bullish" is Bearish and "not bearish" is Bullish; a negated neutral
/// term is skipped.
pub fn stance(output: &str) -> Stance {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let words: Vec<String> = line
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    for (i, word) in words.iter().enumerate() {
        let negated = is_negated(&words[..i]);
        let found = if matches_any(word, BULLISH) {
            Some((Stance::Bullish, negated || negated_cjk(word, BULLISH)))
        } else if matches_any(word, BEARISH) {
            Some((Stance::Bearish, negated || negated_cjk(word, BEARISH)))
        } else if matches_any(word, NEUTRAL) {
            Some((Stance::Neutral, negated || negated_cjk(word, NEUTRAL)))
        } else {
            None
        };
        match found {
            Some((Stance::Bullish, true)) => return Stance::Bearish,
            Some((Stance::Bearish, true)) => return Stance::Bullish,
            Some((Stance::Neutral, true)) => continue,
            Some((stance, _)) => return stance,
            None => {}
        }
    }
    Stance::Other(words.join(" "))
}

/// Whether the word after `preceding` is negated. Contractions split into
/// `don` `t`, so a trailing `t` looks one word further back.
fn is_negated(preceding: &[String]) -> bool {
    match preceding {
        [.., neg, t] if t == "t" => NEGATIONS.contains(&neg.as_str()),
        [.., prev] => NEGATIONS.contains(&prev.as_str()),
        [] => false,
    }
}

/// `不看涨` style: a CJK term directly preceded by 不.
fn negated_cjk(word: &str, lexicon: &[&str]) -> bool {
    lexicon
        .iter()
        .filter(|term| !term.is_ascii())
        .any(|term| word.contains(&format!("不{term}")))
}

/// ASCII terms match whole words; CJK terms match inside a run.
fn matches_any(word: &str, lexicon: &[&str]) -> bool {
    lexicon.iter().any(|term| {
        if term.is_ascii() {
            word == *term
        } else {
            word.contains(term)
        }
    })
}

/// Drift: a prior opinion exists and the stance changed.
pub fn is_drift(prior: Option<&str>, output: &str) -> bool {
    prior.is_some_and(|p| stance(p) != stance(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_thought_and_output() {
        let v = parse_verdict("Thought: volume is surging.\nOutput: Bullish, expect follow-through");
        assert_eq!(v.thought, "volume is surging.");
        assert_eq!(v.output, "Bullish, expect follow-through");
    }

    #[test]
    fn marker_is_case_insensitive_and_tolerates_markdown() {
        let v = parse_verdict("```\n**Thought:** thin book\n**OUTPUT:** Neutral\n```");
        assert_eq!(v.thought, "thin book");
        assert_eq!(v.output, "Neutral");
    }

    #[test]
    fn missing_marker_means_whole_response_is_output() {
        let v = parse_verdict("  Bearish: rates stay higher  ");
        assert_eq!(v.thought, "");
        assert_eq!(v.output, "Bearish: rates stay higher");
    }

    #[test]
    fn stance_uses_lexicon_then_first_line() {
        assert_eq!(stance("Bullish. Breakout confirmed."), Stance::Bullish);
        assert_eq!(stance("\n  I'd SELL into strength"), Stance::Bearish);
        assert_eq!(stance("结论：看涨"), Stance::Bullish);
        assert_eq!(stance("Hold for now"), Stance::Neutral);
        assert_eq!(
            stance("Rotation into  Value!\nsecond line"),
            Stance::Other("rotation into value".into())
        );
        assert_eq!(stance(""), Stance::Other(String::new()));
    }

    #[test]
    fn negated_lexicon_word_flips_the_stance() {
        assert_eq!(stance("Not bullish at these levels"), Stance::Bearish);
        assert_eq!(stance("I am no bear here"), Stance::Bullish);
        assert_eq!(stance("Don't sell yet"), Stance::Bullish);
        assert_eq!(stance("不看涨"), Stance::Bearish);
        assert_eq!(stance("Not uncertain: buy"), Stance::Bullish);
        assert!(is_drift(Some("Bullish"), "not bullish anymore"));
    }

    #[test]
    fn drift_requires_a_prior_and_a_change() {
        assert!(is_drift(Some("bullish"), "Bearish now"));
        assert!(!is_drift(Some("Bullish"), "still bullish, adding"));
        assert!(!is_drift(None, "Bearish"));
    }
}
