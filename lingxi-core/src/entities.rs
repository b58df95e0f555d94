//! Entity records exchanged with the study backend.
//!
//! Field names follow the backend's JSON. Fields the backend omits or sends
//! as `null` fall back to their defaults at the boundary so the stores never
//! see a half-shaped record.

use crate::counter::AggregateCount;
use crate::identity::{
    CategoryId, ChapterId, ChatDetailId, ChatListId, KnowledgeGraphId, KnowledgeItemId, NoteId,
    PlanId, QuestionId, QuestionListId, UserId,
};
use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_category() -> String {
    UNCATEGORIZED.to_string()
}

/// Category label the backend assigns to chapters without one.
pub const UNCATEGORIZED: &str = "未分类";

// ============================================================================
// NOTES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: CategoryId,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_deleted: bool,
}

/// Coarse subject bucket derived from a category name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Chinese,
    Math,
    English,
    Other,
}

impl Category {
    pub fn subject_kind(&self) -> SubjectKind {
        let name = self.name.to_lowercase();
        if name.contains("语文") {
            SubjectKind::Chinese
        } else if name.contains("数学") {
            SubjectKind::Math
        } else if name.contains("英语") {
            SubjectKind::English
        } else {
            SubjectKind::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter_id: ChapterId,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub note_count: AggregateCount,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChapter {
    pub name: String,
    pub category: String,
}

/// How well the learner understands a note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComprehensionLevel {
    #[default]
    #[serde(rename = "理解")]
    Understood,
    #[serde(rename = "模糊")]
    Vague,
    #[serde(rename = "不理解")]
    NotUnderstood,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub note_id: NoteId,
    pub chapter_id: ChapterId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub words: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comprehension_level: ComprehensionLevel,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_image: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_deleted: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNote {
    pub chapter_id: ChapterId,
    pub words: String,
    #[serde(default)]
    pub comprehension_level: ComprehensionLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEdit {
    pub words: String,
    #[serde(default)]
    pub comprehension_level: ComprehensionLevel,
}

/// Per-chapter note totals broken down by comprehension level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteStatistics {
    pub notes_count: AggregateCount,
    pub clear_notes_count: AggregateCount,
    pub vague_notes_count: AggregateCount,
    pub unclear_notes_count: AggregateCount,
}

impl NoteStatistics {
    /// Recount from scratch over the notes that are not soft-deleted.
    pub fn from_notes(notes: &[Note]) -> Self {
        let mut stats = Self::default();
        for note in notes.iter().filter(|n| !n.is_deleted) {
            stats.notes_count.increment();
            stats.level_counter(note.comprehension_level).increment();
        }
        stats
    }

    /// Remove one note of the given level from the per-level breakdown.
    pub fn forget_level(&mut self, level: ComprehensionLevel) {
        self.level_counter(level).decrement();
    }

    fn level_counter(&mut self, level: ComprehensionLevel) -> &mut AggregateCount {
        match level {
            ComprehensionLevel::Understood => &mut self.clear_notes_count,
            ComprehensionLevel::Vague => &mut self.vague_notes_count,
            ComprehensionLevel::NotUnderstood => &mut self.unclear_notes_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingSummary {
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: KnowledgeItemId,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

/// Directed edge between two items of the same graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeRelation {
    pub id: i64,
    pub source: KnowledgeItemId,
    pub target: KnowledgeItemId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relation_type: String,
}

/// Concept map the backend extracts from a chapter's notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub knowledge_graph_id: KnowledgeGraphId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<KnowledgeItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relations: Vec<KnowledgeRelation>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl KnowledgeGraph {
    pub fn item(&self, id: KnowledgeItemId) -> Option<&KnowledgeItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Relations as `(source name, relation, target name)`, skipping edges
    /// whose endpoints are not in `items`.
    pub fn named_relations(&self) -> Vec<(&str, &str, &str)> {
        self.relations
            .iter()
            .filter_map(|rel| {
                let source = self.item(rel.source)?;
                let target = self.item(rel.target)?;
                Some((source.name.as_str(), rel.relation_type.as_str(), target.name.as_str()))
            })
            .collect()
    }
}

// ============================================================================
// MISTAKEN QUESTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionList {
    pub question_list_id: QuestionListId,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub count: AggregateCount,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuestionList {
    pub name: String,
}

/// Which in-flight generations are currently writing into a question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationFlags {
    pub answer: bool,
    pub similar_question: bool,
    pub similar_answer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: QuestionId,
    pub question_list_id: QuestionListId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub answer: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_image: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub similar_question: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub similar_answer: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_favorite: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(skip)]
    pub generating: GenerationFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub question_list_id: QuestionListId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub is_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

/// Partial edit of a question. Only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionEdit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Base64 image replacing the question's picture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_image: Option<bool>,
}

impl QuestionEdit {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    /// Attach a new picture; the question becomes an image question.
    pub fn with_image(mut self, base64: impl Into<String>) -> Self {
        self.image = Some(base64.into());
        self.is_image = Some(true);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map_or(true, str::is_empty)
            && self.image.is_none()
            && self.is_image.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteState {
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionStatistics {
    pub total_count: AggregateCount,
    pub image_count: AggregateCount,
    pub favorite_count: AggregateCount,
}

impl QuestionStatistics {
    pub fn from_questions(questions: &[Question]) -> Self {
        let count = |pred: fn(&Question) -> bool| {
            AggregateCount::new(questions.iter().filter(|q| pred(q)).count() as u64)
        };
        Self {
            total_count: AggregateCount::new(questions.len() as u64),
            image_count: count(|q| q.is_image),
            favorite_count: count(|q| q.is_favorite),
        }
    }
}

// ============================================================================
// PLANS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanLevel {
    #[serde(rename = "紧急")]
    Urgent,
    #[default]
    #[serde(rename = "非紧急")]
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: PlanId,
    pub todo: String,
    pub deadline: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub level: PlanLevel,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlan {
    pub todo: String,
    pub deadline: String,
    #[serde(default)]
    pub level: PlanLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingAdvice {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: String,
}

// ============================================================================
// CHAT HISTORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatList {
    pub chat_history_list_id: ChatListId,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub chat_count: AggregateCount,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub chat_history_detail_id: Option<ChatDetailId>,
    pub role: ChatRole,
    #[serde(default, deserialize_with = "null_as_default")]
    pub words: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_image: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, words: impl Into<String>) -> Self {
        Self {
            chat_history_detail_id: None,
            role,
            words: words.into(),
            is_image: false,
            image_url: None,
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedChat {
    pub chat_history_list_id: ChatListId,
    #[serde(default)]
    pub name: String,
}

// ============================================================================
// USERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub token_balance: i64,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub remember: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: UserId,
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub token_balance: i64,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

impl LoginResponse {
    pub fn into_parts(self) -> (UserIdentity, TokenPair) {
        (
            UserIdentity {
                user_id: self.user_id,
                username: self.username,
                token_balance: self.token_balance,
                profile_picture: self.profile_picture,
            },
            TokenPair {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshedToken {
    pub access_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(level: ComprehensionLevel, deleted: bool) -> Note {
        Note {
            note_id: NoteId::new(1),
            chapter_id: ChapterId::new(1),
            words: String::new(),
            comprehension_level: level,
            is_image: false,
            image_url: None,
            is_deleted: deleted,
            created_at: None,
        }
    }

    #[test]
    fn note_without_level_defaults_to_understood() {
        let note: Note =
            serde_json::from_str(r#"{"note_id":3,"chapter_id":1,"comprehension_level":null}"#)
                .unwrap();
        assert_eq!(note.comprehension_level, ComprehensionLevel::Understood);
        assert_eq!(note.words, "");
    }

    #[test]
    fn comprehension_level_uses_backend_labels() {
        let level: ComprehensionLevel = serde_json::from_str("\"不理解\"").unwrap();
        assert_eq!(level, ComprehensionLevel::NotUnderstood);
    }

    #[test]
    fn statistics_skip_deleted_notes() {
        let notes = vec![
            note(ComprehensionLevel::Understood, false),
            note(ComprehensionLevel::Vague, false),
            note(ComprehensionLevel::Vague, true),
            note(ComprehensionLevel::NotUnderstood, false),
        ];
        let stats = NoteStatistics::from_notes(&notes);
        assert_eq!(stats.notes_count.get(), 3);
        assert_eq!(stats.clear_notes_count.get(), 1);
        assert_eq!(stats.vague_notes_count.get(), 1);
        assert_eq!(stats.unclear_notes_count.get(), 1);
    }

    #[test]
    fn subject_kind_matches_name_fragments() {
        let category = Category {
            category_id: CategoryId::new(1),
            name: "高中数学".to_string(),
            is_deleted: false,
        };
        assert_eq!(category.subject_kind(), SubjectKind::Math);
    }

    #[test]
    fn question_edit_sends_only_set_fields() {
        let edit = QuestionEdit::content("已知 f(x)=x²");
        assert_eq!(
            serde_json::to_value(&edit).unwrap(),
            serde_json::json!({"content": "已知 f(x)=x²"})
        );

        let edit = QuestionEdit::default().with_image("aGk=");
        assert_eq!(
            serde_json::to_value(&edit).unwrap(),
            serde_json::json!({"image": "aGk=", "is_image": true})
        );
        assert!(QuestionEdit::content("").is_empty());
    }

    #[test]
    fn knowledge_graph_names_relations_by_item() {
        let graph: KnowledgeGraph = serde_json::from_str(
            r#"{
                "knowledge_graph_id": 4,
                "items": [
                    {"id": 10, "name": "导数", "description": null},
                    {"id": 11, "name": "极值", "description": "局部最值"}
                ],
                "relations": [
                    {"id": 1, "source": 10, "target": 11, "relation_type": "用于求"},
                    {"id": 2, "source": 10, "target": 99, "relation_type": "悬空"}
                ],
                "created_at": "2026-10-01T08:00:00"
            }"#,
        )
        .unwrap();
        assert_eq!(graph.items[0].description, "");
        assert_eq!(graph.named_relations(), vec![("导数", "用于求", "极值")]);
    }

    #[test]
    fn chapter_without_category_is_uncategorized() {
        let chapter: Chapter = serde_json::from_str(r#"{"chapter_id":1,"name":"a"}"#).unwrap();
        assert_eq!(chapter.category, UNCATEGORIZED);
        assert_eq!(chapter.note_count, AggregateCount::ZERO);
    }
}
