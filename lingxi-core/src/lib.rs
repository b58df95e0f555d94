//! Lingxi Core - Entity Types
//!
//! Pure data structures shared by the client crates: typed identifiers,
//! entity records as the backend returns them, aggregate counters, the
//! response-envelope adapter and the error taxonomy. No I/O lives here.

pub mod counter;
pub mod entities;
pub mod envelope;
pub mod error;
pub mod identity;

pub use counter::AggregateCount;
pub use entities::*;
pub use envelope::{Envelope, ErrorBody, PlanListing, SuccessRule};
pub use error::{ApiError, ApiResult, FailureKind};
pub use identity::{
    CategoryId, ChapterId, ChatDetailId, ChatListId, KnowledgeGraphId, KnowledgeItemId, NoteId,
    PlanId, QuestionId, QuestionListId, Timestamp, UserId,
};
