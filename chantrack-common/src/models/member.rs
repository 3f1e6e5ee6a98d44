//! Member identities and their internal/external classification

use serde::{Deserialize, Serialize};

/// Annotation appended to external bot and application accounts
pub const BOT_SUFFIX: &str = " (bot)";

/// Membership category derived from the email domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberCategory {
    Internal,
    External,
}

/// A resolved member identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Raw member identifier the record was resolved from
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub category: MemberCategory,
    /// Bot or application account
    pub is_bot: bool,
}

impl MemberRecord {
    /// Build a record, classifying it by `internal_domain`
    ///
    /// A member is internal iff its email ends with `@<internal_domain>`
    /// (case-insensitive). Missing emails are external.
    pub fn classify(
        id: impl Into<String>,
        display_name: impl Into<String>,
        email: Option<String>,
        is_bot: bool,
        internal_domain: &str,
    ) -> Self {
        let category = match email.as_deref() {
            Some(email) if is_internal_email(email, internal_domain) => MemberCategory::Internal,
            _ => MemberCategory::External,
        };

        Self {
            id: id.into(),
            display_name: display_name.into(),
            email,
            category,
            is_bot,
        }
    }

    /// Name as listed in the members view
    pub fn label(&self) -> String {
        if self.category == MemberCategory::External && self.is_bot {
            format!("{}{}", self.display_name, BOT_SUFFIX)
        } else {
            self.display_name.clone()
        }
    }
}

fn is_internal_email(email: &str, internal_domain: &str) -> bool {
    let domain = internal_domain.trim().trim_start_matches('@');
    if domain.is_empty() {
        return false;
    }
    let suffix = format!("@{}", domain.to_ascii_lowercase());
    email.trim().to_ascii_lowercase().ends_with(&suffix)
}

/// Member names split by category, each sorted case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMembers {
    pub internal: Vec<String>,
    pub external: Vec<String>,
}

impl ResolvedMembers {
    pub fn from_records(records: impl IntoIterator<Item = MemberRecord>) -> Self {
        let mut internal = Vec::new();
        let mut external = Vec::new();

        for record in records {
            match record.category {
                MemberCategory::Internal => internal.push(record),
                MemberCategory::External => external.push(record),
            }
        }

        Self {
            internal: sorted_labels(internal),
            external: sorted_labels(external),
        }
    }

    pub fn total(&self) -> usize {
        self.internal.len() + self.external.len()
    }
}

// Sort on the display name, not the annotated label, so "C (bot)" sits with "C".
fn sorted_labels(mut records: Vec<MemberRecord>) -> Vec<String> {
    records.sort_by_cached_key(|r| r.display_name.to_lowercase());
    records.iter().map(MemberRecord::label).collect()
}
