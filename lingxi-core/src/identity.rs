//! Identity types for Lingxi entities
//!
//! The backend hands out auto-increment integer keys. Each entity kind gets
//! its own newtype so a chapter id can never be passed where a note id is
//! expected.

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Declare a transparent integer identifier newtype.
///
/// # Example
/// ```ignore
/// define_id!(ChapterId, "Identifier of a notes chapter.");
/// ```
macro_rules! define_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

define_id!(UserId, "Identifier of an authenticated user.");
define_id!(CategoryId, "Identifier of a subject category.");
define_id!(ChapterId, "Identifier of a notes chapter.");
define_id!(NoteId, "Identifier of a single note inside a chapter.");
define_id!(QuestionListId, "Identifier of a mistaken-question collection.");
define_id!(QuestionId, "Identifier of a mistaken question.");
define_id!(PlanId, "Identifier of a study plan entry.");
define_id!(ChatListId, "Identifier of a chat conversation.");
define_id!(ChatDetailId, "Identifier of one message inside a conversation.");
define_id!(KnowledgeGraphId, "Identifier of a chapter's generated knowledge graph.");
define_id!(KnowledgeItemId, "Identifier of one concept node in a knowledge graph.");
