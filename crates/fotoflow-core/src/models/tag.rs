use serde::{Deserialize, Serialize};

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Entry in the shared tag vocabulary. Intake resolves tag names against this
/// vocabulary and silently drops unknown names; it never creates entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct Tag {
    pub id: i64,
    pub name: String,
}
