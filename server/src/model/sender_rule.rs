//! Deterministic sender-rule matching.
//!
//! A matching rule classifies an email at confidence 1.0 without touching
//! the model. Precedence: exact address > domain > wildcard pattern.

use regex::Regex;

use crate::{db_core::prelude::*, error::AppResult};

pub struct SenderRules {
    rules: Vec<sender_rule::Model>,
}

impl SenderRules {
    pub fn new(rules: Vec<sender_rule::Model>) -> Self {
        Self { rules }
    }

    pub async fn for_workspace(conn: &DatabaseConnection, workspace_id: i32) -> AppResult<Self> {
        let rules = SenderRule::find()
            .filter(sender_rule::Column::WorkspaceId.eq(workspace_id))
            .filter(sender_rule::Column::Active.eq(true))
            .all(conn)
            .await?;
        Ok(Self::new(rules))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Match a sender address against the rule set.
    pub fn match_sender(&self, from: &str) -> Option<&sender_rule::Model> {
        let address = extract_address(from);

        // Exact address beats domain beats wildcard.
        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| !is_domain_pattern(&r.pattern) && !is_wildcard_pattern(&r.pattern)
                && r.pattern.eq_ignore_ascii_case(&address))
        {
            return Some(rule);
        }

        if let Some(domain) = address.rsplit('@').next().filter(|_| address.contains('@')) {
            if let Some(rule) = self.rules.iter().find(|r| {
                is_domain_pattern(&r.pattern)
                    && r.pattern[1..].eq_ignore_ascii_case(domain)
            }) {
                return Some(rule);
            }
        }

        self.rules
            .iter()
            .find(|r| is_wildcard_pattern(&r.pattern) && wildcard_matches(&r.pattern, &address))
    }
}

fn is_domain_pattern(pattern: &str) -> bool {
    pattern.starts_with('@') && !pattern.contains('*')
}

fn is_wildcard_pattern(pattern: &str) -> bool {
    pattern.contains('*')
}

/// Pull the bare address out of a `Display Name <addr>` header value.
pub fn extract_address(from: &str) -> String {
    if let (Some(start), Some(end)) = (from.find('<'), from.rfind('>')) {
        if start < end {
            return from[start + 1..end].trim().to_lowercase();
        }
    }
    from.trim().to_lowercase()
}

fn wildcard_matches(pattern: &str, address: &str) -> bool {
    let escaped = regex::escape(&pattern.to_lowercase()).replace(r"\*", ".*");
    match Regex::new(&format!("^{}$", escaped)) {
        Ok(re) => re.is_match(address),
        Err(e) => {
            tracing::warn!("bad sender rule pattern {:?}: {}", pattern, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util;

    fn rule(id: i32, pattern: &str, category: &str) -> sender_rule::Model {
        sender_rule::Model {
            id,
            workspace_id: 1,
            pattern: pattern.to_string(),
            category: category.to_string(),
            requires_reply: false,
            active: true,
            created_at: util::now_fixed(),
        }
    }

    #[test]
    fn test_exact_beats_domain_beats_wildcard() {
        let rules = SenderRules::new(vec![
            rule(1, "*@*", "wildcard"),
            rule(2, "@shop.example.com", "domain"),
            rule(3, "orders@shop.example.com", "exact"),
        ]);

        assert_eq!(
            rules.match_sender("orders@shop.example.com").unwrap().category,
            "exact"
        );
        assert_eq!(
            rules.match_sender("billing@shop.example.com").unwrap().category,
            "domain"
        );
        assert_eq!(rules.match_sender("a@b.com").unwrap().category, "wildcard");
    }

    #[test]
    fn test_display_name_header_is_unwrapped() {
        let rules = SenderRules::new(vec![rule(1, "no-reply@notify.example.com", "notification")]);
        let matched = rules
            .match_sender("Example Notifications <No-Reply@notify.example.com>")
            .unwrap();
        assert_eq!(matched.category, "notification");
    }

    #[test]
    fn test_wildcard_subdomains() {
        let rules = SenderRules::new(vec![rule(1, "*@*.mailer.example.com", "newsletter")]);
        assert!(rules.match_sender("x@eu.mailer.example.com").is_some());
        assert!(rules.match_sender("x@mailer.example.com").is_none());
    }

    #[test]
    fn test_no_match_returns_none() {
        let rules = SenderRules::new(vec![rule(1, "@example.com", "c")]);
        assert!(rules.match_sender("someone@elsewhere.org").is_none());
    }
}
