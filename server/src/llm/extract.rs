//! Best-effort JSON extraction from model prose.
//!
//! The fallback chain is: strict parse → markdown-fence strip → bracketed
//! slice → brace-scanning salvage of individual objects. Callers that get
//! `None` back flag the affected rows rather than aborting the run.

use serde_json::Value;

/// Extract a JSON array of objects from a model reply.
pub fn extract_json_array(content: &str) -> Option<Vec<Value>> {
    let trimmed = content.trim();

    // Strict parse first: the happy path when the model obeyed.
    if let Some(arr) = parse_array(trimmed) {
        return Some(arr);
    }

    // Reply wrapped in ```json fences, possibly with surrounding prose.
    let unfenced = strip_fences(trimmed);
    if let Some(arr) = parse_array(&unfenced) {
        return Some(arr);
    }

    // Take the outermost [...] slice; tolerates leading/trailing prose.
    if let Some(slice) = bracketed_slice(&unfenced, '[', ']') {
        if let Some(arr) = parse_array(slice) {
            return Some(arr);
        }
    }

    // Last resort: scan for balanced {...} objects one at a time. Saves
    // the parseable part of a truncated or comma-broken array.
    let salvaged = salvage_objects(&unfenced);
    if !salvaged.is_empty() {
        return Some(salvaged);
    }

    None
}

/// Extract a single JSON object from a model reply, same fallback chain.
pub fn extract_json_object(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(Value::Object(map));
    }

    let unfenced = strip_fences(trimmed);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&unfenced) {
        return Some(Value::Object(map));
    }

    if let Some(slice) = bracketed_slice(&unfenced, '{', '}') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(slice) {
            return Some(Value::Object(map));
        }
    }

    salvage_objects(&unfenced).into_iter().next()
}

fn parse_array(s: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

/// Drop markdown code fences, keeping whatever is between the first pair.
fn strip_fences(s: &str) -> String {
    if !s.contains("```") {
        return s.to_string();
    }
    let mut out = Vec::new();
    let mut in_fence = false;
    for line in s.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            out.push(line);
        }
    }
    if out.is_empty() {
        // Fences present but nothing between them; strip the markers only.
        s.replace("```json", "").replace("```", "")
    } else {
        out.join("\n")
    }
}

fn bracketed_slice(s: &str, open: char, close: char) -> Option<&str> {
    let start = s.find(open)?;
    let end = s.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&s[start..=end])
}

/// Collect every balanced top-level `{...}` that parses as an object.
/// Brace depth tracking skips braces inside string literals.
fn salvage_objects(s: &str) -> Vec<Value> {
    let mut results = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }

        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;

        for (j, &b) in bytes.iter().enumerate().skip(i) {
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(j);
                        break;
                    }
                }
                _ => {}
            }
        }

        match end {
            Some(j) => {
                if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(&s[i..=j]) {
                    results.push(v);
                }
                i = j + 1;
            }
            // Unbalanced tail, nothing more to salvage.
            None => break,
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = r#"[{"index":0,"category":"inquiry"},{"index":1,"category":"spam"}]"#;

    #[test]
    fn test_strict_array() {
        let arr = extract_json_array(RAW).unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["category"], "inquiry");
    }

    #[test]
    fn test_fenced_array_matches_raw() {
        let fenced = format!("```json\n{}\n```", RAW);
        assert_eq!(extract_json_array(&fenced), extract_json_array(RAW));
    }

    #[test]
    fn test_array_with_trailing_prose() {
        let wrapped = format!(
            "Here are the classifications you asked for:\n{}\nLet me know if you need anything else!",
            RAW
        );
        assert_eq!(extract_json_array(&wrapped), extract_json_array(RAW));
    }

    #[test]
    fn test_salvage_from_truncated_array() {
        let truncated = r#"[{"index":0,"category":"inquiry"},{"index":1,"cat"#;
        let arr = extract_json_array(truncated).unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["index"], 0);
    }

    #[test]
    fn test_salvage_skips_braces_in_strings() {
        let tricky = r#"noise {"a":"open { brace"} noise {"b":2}"#;
        let arr = extract_json_array(tricky).unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["a"], "open { brace");
    }

    #[test]
    fn test_total_garbage_is_none() {
        assert!(extract_json_array("I could not classify these emails.").is_none());
        assert!(extract_json_array("").is_none());
    }

    #[test]
    fn test_object_extraction() {
        let fenced = "```json\n{\"tone\":\"friendly\"}\n```";
        let obj = extract_json_object(fenced).unwrap();
        assert_eq!(obj["tone"], "friendly");
    }

    #[test]
    fn test_object_with_prose() {
        let wrapped = "Sure! {\"tone\":\"casual\",\"style_notes\":\"short sentences\"} Hope that helps.";
        let obj = extract_json_object(wrapped).unwrap();
        assert_eq!(obj["tone"], "casual");
    }
}
