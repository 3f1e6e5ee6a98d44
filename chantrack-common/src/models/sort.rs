//! Stable table ordering for entity snapshots

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

use super::entity::Entity;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Created,
    MessageCount,
    LastMessage,
    MemberCount,
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "name" => Ok(SortKey::Name),
            "created" => Ok(SortKey::Created),
            "message_count" | "messages" => Ok(SortKey::MessageCount),
            "last_message" => Ok(SortKey::LastMessage),
            "member_count" | "members" => Ok(SortKey::MemberCount),
            other => Err(Error::InvalidInput(format!("Unknown sort key: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(Error::InvalidInput(format!("Unknown sort direction: {}", other))),
        }
    }
}

/// Sort entities in place
///
/// The sort is stable: ties keep their existing relative order, so sorting the
/// same list twice by the same key and direction yields the same ordering.
/// Entities without a value for the key (pending or unavailable) always sort
/// last, whatever the direction.
pub fn sort_entities(entities: &mut [Entity], key: SortKey, direction: SortDirection) {
    entities.sort_by(|a, b| compare(a, b, key, direction));
}

fn compare(a: &Entity, b: &Entity, key: SortKey, direction: SortDirection) -> Ordering {
    let ordered = |ord: Ordering| match direction {
        SortDirection::Ascending => ord,
        SortDirection::Descending => ord.reverse(),
    };

    match key {
        SortKey::Name => ordered(a.name.to_lowercase().cmp(&b.name.to_lowercase())),
        SortKey::Created => compare_present(a.created, b.created, ordered),
        SortKey::MessageCount => compare_present(
            a.messages.loaded().map(|s| s.message_count),
            b.messages.loaded().map(|s| s.message_count),
            ordered,
        ),
        SortKey::LastMessage => compare_present(
            a.messages.loaded().and_then(|s| s.last_message),
            b.messages.loaded().and_then(|s| s.last_message),
            ordered,
        ),
        SortKey::MemberCount => compare_present(
            a.members.loaded().map(|s| s.member_count),
            b.members.loaded().map(|s| s.member_count),
            ordered,
        ),
    }
}

fn compare_present<T: Ord>(
    a: Option<T>,
    b: Option<T>,
    ordered: impl Fn(Ordering) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => ordered(a.cmp(&b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
