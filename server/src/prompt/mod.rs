//! Prompt templates and reply parsing for every pipeline stage.
//!
//! Replies come back as prose-wrapped JSON more often than not; all parsing
//! goes through `llm::extract` and degrades per-row instead of failing the
//! call.

use indoc::{formatdoc, indoc};
use serde_json::Value;

use crate::{
    llm::extract,
    model::{faq::AdaptedRow, staging_message::Direction},
    server_config::cfg,
    util,
};

const SNIPPET_CHARS: usize = 160;

// ============================================================================
// Classification
// ============================================================================

const CLASSIFY_INSTRUCTIONS: &str = indoc! {r#"
    Classify every email line below.
    Judge the sender's intent from the direction, sender, subject and snippet.
    Use only categories from the taxonomy.
    "requires_reply" is whether the business owner needs to write back.
    "confidence" is a float between 0 and 1.
    Respond with a JSON array only, one object per input line:
    [{"index": 0, "category": "...", "requires_reply": true, "confidence": 0.9}]
    Keep the "index" of each input line unchanged. Do not provide explanations."#
};

pub fn classification_system_prompt() -> String {
    let taxonomy = cfg
        .categories
        .iter()
        .map(|c| format!("• \"{}\": {}", c.name, c.description))
        .collect::<Vec<_>>()
        .join("\n");

    formatdoc! {r#"
        You are an email classification engine for a small business.

        Taxonomy (authoritative):
        {taxonomy}

        {CLASSIFY_INSTRUCTIONS}"#
    }
}

/// One compact line per email: `index|direction|from|subject|snippet`.
pub fn classification_batch_line(
    index: usize,
    direction: Direction,
    from: Option<&str>,
    subject: Option<&str>,
    snippet: Option<&str>,
) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        index,
        direction,
        util::single_line(from.unwrap_or("")),
        util::single_line(subject.unwrap_or("")),
        util::truncate_chars(&util::single_line(snippet.unwrap_or("")), SNIPPET_CHARS),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationItem {
    pub index: usize,
    pub category: String,
    pub requires_reply: bool,
    pub confidence: f32,
    pub entities: Option<Value>,
}

/// Map a model reply back to per-line classifications. Rows the model
/// skipped or mangled simply have no entry; the caller falls back for them.
pub fn parse_classification_reply(content: &str) -> Vec<ClassificationItem> {
    let Some(items) = extract::extract_json_array(content) else {
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| {
            let index = item.get("index")?.as_u64()? as usize;
            let category = item.get("category")?.as_str()?.to_lowercase();
            let requires_reply = item
                .get("requires_reply")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let confidence = item
                .get("confidence")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0) as f32;
            let entities = item.get("entities").filter(|v| !v.is_null()).cloned();
            Some(ClassificationItem {
                index,
                category,
                requires_reply,
                confidence,
                entities,
            })
        })
        .collect()
}

// ============================================================================
// FAQ consolidation
// ============================================================================

pub fn faq_filter_system_prompt(business_name: &str, business_type: &str, services: &str) -> String {
    formatdoc! {r#"
        You review FAQ entries scraped from competitors of this business:
        Name: {business_name}
        Type: {business_type}
        Services: {services}

        Keep only entries a customer of THIS business could plausibly ask about.
        Drop entries about services the business does not offer, other locations,
        or competitor-specific policies.
        Respond with a JSON array of the ids to KEEP, e.g. [3, 17, 42].
        Do not provide explanations."#
    }
}

pub fn faq_filter_user_prompt(rows: &[(i32, &str, &str)]) -> String {
    rows.iter()
        .map(|(id, question, answer)| {
            format!(
                "{}|{}|{}",
                id,
                util::single_line(question),
                util::truncate_chars(&util::single_line(answer), SNIPPET_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse_kept_ids(content: &str) -> Option<Vec<i32>> {
    let items = extract::extract_json_array(content)?;
    Some(
        items
            .into_iter()
            .filter_map(|v| v.as_i64().map(|n| n as i32))
            .collect(),
    )
}

const DEDUP_INSTRUCTIONS: &str = indoc! {r#"
    Merge the new entries into the topic list.
    Near-duplicate questions collapse into one topic; keep the most complete
    answer seen so far.
    Respond with the FULL merged topic list as a JSON array:
    [{"topic": "short-slug", "question": "...", "answer": "..."}]
    Do not provide explanations."#
};

pub fn faq_dedup_system_prompt() -> String {
    formatdoc! {r#"
        You deduplicate FAQ entries for a small business.

        {DEDUP_INSTRUCTIONS}"#
    }
}

pub fn faq_dedup_user_prompt(topics: &[AdaptedRow], rows: &[(i32, &str, &str)]) -> String {
    let current = if topics.is_empty() {
        "(none yet)".to_string()
    } else {
        serde_json::to_string(topics).unwrap_or_else(|_| "[]".to_string())
    };
    let new_entries = rows
        .iter()
        .map(|(id, q, a)| format!("{}|{}|{}", id, util::single_line(q), util::single_line(a)))
        .collect::<Vec<_>>()
        .join("\n");

    formatdoc! {r#"
        Current topics:
        {current}

        New entries:
        {new_entries}"#
    }
}

pub fn parse_topics(content: &str) -> Option<Vec<AdaptedRow>> {
    let items = extract::extract_json_array(content)?;
    let topics: Vec<AdaptedRow> = items
        .into_iter()
        .filter_map(|v| {
            Some(AdaptedRow {
                topic: v.get("topic")?.as_str()?.to_string(),
                question: v.get("question")?.as_str()?.to_string(),
                answer: v.get("answer")?.as_str()?.to_string(),
            })
        })
        .collect();
    Some(topics)
}

pub fn faq_adapt_system_prompt(
    business_name: &str,
    services: &str,
    tone: Option<&str>,
    style_notes: Option<&str>,
) -> String {
    let voice = match (tone, style_notes) {
        (Some(t), Some(s)) => format!("Tone: {}\nStyle: {}", t, s),
        (Some(t), None) => format!("Tone: {}", t),
        (None, Some(s)) => format!("Style: {}", s),
        (None, None) => "Tone: friendly and professional".to_string(),
    };

    formatdoc! {r#"
        Rewrite the given FAQ entry as if {business_name} wrote it.
        Services offered: {services}

        Owner's writing voice:
        {voice}

        Keep the factual content generic enough to be true for this business;
        never invent prices, hours or policies.
        Respond with a JSON object: {{"question": "...", "answer": "..."}}
        Do not provide explanations."#
    }
}

pub fn parse_adapted(content: &str, topic: &str) -> Option<AdaptedRow> {
    let obj = extract::extract_json_object(content)?;
    Some(AdaptedRow {
        topic: topic.to_string(),
        question: obj.get("question")?.as_str()?.to_string(),
        answer: obj.get("answer")?.as_str()?.to_string(),
    })
}

// ============================================================================
// Voice learning & drafting
// ============================================================================

pub fn voice_system_prompt() -> String {
    indoc! {r#"
        You analyze how a business owner writes email.
        From the samples, summarize their voice.
        Respond with a JSON object:
        {"tone": "...", "style_notes": "...", "common_phrases": ["...", "..."]}
        Do not provide explanations."#
    }
    .to_string()
}

pub fn voice_user_prompt(samples: &[String]) -> String {
    samples
        .iter()
        .enumerate()
        .map(|(i, body)| {
            format!(
                "--- sample {} ---\n{}",
                i + 1,
                util::truncate_chars(body, 1_500)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn draft_system_prompt(
    business_name: &str,
    tone: Option<&str>,
    style_notes: Option<&str>,
    faqs: &[(String, String)],
) -> String {
    let voice = match (tone, style_notes) {
        (Some(t), Some(s)) => format!("Tone: {}\nStyle: {}", t, s),
        (Some(t), None) => format!("Tone: {}", t),
        (None, Some(s)) => format!("Style: {}", s),
        (None, None) => "Tone: friendly and professional".to_string(),
    };
    let faq_block = if faqs.is_empty() {
        "(none)".to_string()
    } else {
        faqs.iter()
            .map(|(q, a)| format!("Q: {}\nA: {}", q, a))
            .collect::<Vec<_>>()
            .join("\n")
    };

    formatdoc! {r#"
        You draft a reply on behalf of {business_name}.

        Owner's writing voice:
        {voice}

        Known FAQ answers you may draw on:
        {faq_block}

        Write the reply body only: no subject line, no signature placeholders,
        no explanations. If you do not know a fact, leave a [..] gap for the
        owner to fill in rather than inventing it."#
    }
}

pub fn draft_user_prompt(conversation: &[(Direction, String)]) -> String {
    let thread = conversation
        .iter()
        .map(|(direction, body)| {
            let who = match direction {
                Direction::Inbound => "Customer",
                Direction::Outbound => "Owner",
            };
            format!("{}: {}", who, util::truncate_chars(body, 1_200))
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    formatdoc! {r#"
        Conversation so far, oldest first:

        {thread}

        Draft the owner's next reply."#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_line_shape() {
        let line = classification_batch_line(
            3,
            Direction::Inbound,
            Some("Jo Customer <jo@example.com>"),
            Some("Booking\nquestion"),
            Some("Hi, do you   have space on Friday?"),
        );
        assert_eq!(
            line,
            "3|inbound|Jo Customer <jo@example.com>|Booking question|Hi, do you have space on Friday?"
        );
    }

    #[test]
    fn test_batch_line_truncates_snippet() {
        let long = "word ".repeat(100);
        let line = classification_batch_line(0, Direction::Outbound, None, None, Some(&long));
        assert!(line.chars().count() < 200);
        assert!(line.ends_with('…'));
    }

    #[test]
    fn test_parse_classification_reply() {
        let reply = r#"[
            {"index": 0, "category": "Inquiry", "requires_reply": true, "confidence": 0.92},
            {"index": 1, "category": "spam", "confidence": 0.99}
        ]"#;
        let items = parse_classification_reply(reply);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].category, "inquiry");
        assert!(items[0].requires_reply);
        // omitted requires_reply reads as false
        assert!(!items[1].requires_reply);
    }

    #[test]
    fn test_parse_classification_skips_mangled_rows() {
        let reply = r#"[{"index": 0, "category": "inquiry", "confidence": 0.8}, {"category": "no-index"}]"#;
        let items = parse_classification_reply(reply);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_parse_kept_ids_from_fenced_reply() {
        let reply = "```json\n[3, 17, 42]\n```";
        assert_eq!(parse_kept_ids(reply), Some(vec![3, 17, 42]));
    }

    #[test]
    fn test_parse_topics() {
        let reply = r#"[{"topic":"hours","question":"When are you open?","answer":"Mon-Fri."}]"#;
        let topics = parse_topics(reply).unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic, "hours");
    }

    #[test]
    fn test_parse_adapted_carries_topic() {
        let reply = r#"{"question":"Do you deliver?","answer":"Yes, locally."}"#;
        let row = parse_adapted(reply, "delivery").unwrap();
        assert_eq!(row.topic, "delivery");
        assert_eq!(row.question, "Do you deliver?");
    }
}
