//! The remote study backend as the stores see it.
//!
//! [`crate::api_client::RestClient`] implements this over HTTP; tests use an
//! in-memory implementation. Every method returns typed records already
//! checked against the endpoint's success rule.

use crate::stream::{StreamTarget, TextStream};
use async_trait::async_trait;
use lingxi_core::{
    ApiResult, Category, Chapter, ChapterId, ChatList, ChatListId, ChatMessage, CreatedChat,
    ExistingAdvice, ExistingSummary, FavoriteState, KnowledgeGraph, LoginRequest, LoginResponse,
    NewChapter, NewNote, NewPlan, NewQuestion, NewQuestionList, Note, NoteEdit, NoteId, Plan,
    PlanId, Question, QuestionEdit, QuestionId, QuestionList, QuestionListId,
};

/// Question field filled by an AI generation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionField {
    Answer,
    SimilarQuestion,
    SimilarAnswer,
}

impl QuestionField {
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Answer => "update_answer",
            Self::SimilarQuestion => "update_similar_question",
            Self::SimilarAnswer => "update_similar_answer",
        }
    }

    pub fn target(self, question_id: QuestionId) -> StreamTarget {
        match self {
            Self::Answer => StreamTarget::Answer(question_id),
            Self::SimilarQuestion => StreamTarget::SimilarQuestion(question_id),
            Self::SimilarAnswer => StreamTarget::SimilarAnswer(question_id),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Answer => "answer",
            Self::SimilarQuestion => "similar question",
            Self::SimilarAnswer => "similar answer",
        }
    }
}

#[async_trait]
pub trait StudyBackend: Send + Sync {
    // Auth
    async fn login(&self, request: &LoginRequest) -> ApiResult<LoginResponse>;

    // Notes
    async fn list_categories(&self) -> ApiResult<Vec<Category>>;
    async fn list_chapters(&self) -> ApiResult<Vec<Chapter>>;
    async fn create_chapter(&self, chapter: &NewChapter) -> ApiResult<()>;
    async fn update_chapter(&self, chapter_id: ChapterId, chapter: &NewChapter) -> ApiResult<()>;
    async fn delete_chapter(&self, chapter_id: ChapterId) -> ApiResult<()>;
    async fn list_notes(&self, chapter_id: ChapterId) -> ApiResult<Vec<Note>>;
    async fn create_note(&self, note: &NewNote) -> ApiResult<()>;
    async fn update_note(&self, note_id: NoteId, edit: &NoteEdit) -> ApiResult<()>;
    async fn delete_note(&self, note_id: NoteId) -> ApiResult<()>;
    async fn existing_summary(&self, chapter_id: ChapterId) -> ApiResult<Option<ExistingSummary>>;
    async fn summary_stream(&self, chapter_id: ChapterId) -> ApiResult<TextStream>;
    async fn knowledge_graph(&self, chapter_id: ChapterId) -> ApiResult<Option<KnowledgeGraph>>;
    /// Rebuild the chapter's graph; the call blocks until generation ends.
    async fn generate_knowledge_graph(&self, chapter_id: ChapterId) -> ApiResult<KnowledgeGraph>;

    // Mistaken questions
    async fn list_question_lists(&self) -> ApiResult<Vec<QuestionList>>;
    async fn create_question_list(&self, list: &NewQuestionList) -> ApiResult<()>;
    async fn update_question_list(
        &self,
        list_id: QuestionListId,
        list: &NewQuestionList,
    ) -> ApiResult<()>;
    async fn delete_question_list(&self, list_id: QuestionListId) -> ApiResult<()>;
    async fn list_questions(&self, list_id: QuestionListId) -> ApiResult<Vec<Question>>;
    async fn create_question(&self, question: &NewQuestion) -> ApiResult<()>;
    async fn update_question(&self, question_id: QuestionId, edit: &QuestionEdit) -> ApiResult<()>;
    async fn delete_question(&self, question_id: QuestionId) -> ApiResult<()>;
    async fn toggle_favorite(&self, question_id: QuestionId) -> ApiResult<FavoriteState>;
    async fn question_stream(
        &self,
        field: QuestionField,
        question_id: QuestionId,
    ) -> ApiResult<TextStream>;

    // Chat history
    async fn list_chats(&self) -> ApiResult<Vec<ChatList>>;
    async fn chat_detail(&self, list_id: ChatListId) -> ApiResult<Vec<ChatMessage>>;
    async fn create_chat(&self, name: &str) -> ApiResult<CreatedChat>;
    async fn delete_chat(&self, list_id: ChatListId) -> ApiResult<()>;

    // Plans
    async fn list_plans(&self) -> ApiResult<Vec<Plan>>;
    async fn create_plan(&self, plan: &NewPlan) -> ApiResult<()>;
    async fn update_plan(&self, plan_id: PlanId, plan: &NewPlan) -> ApiResult<()>;
    async fn delete_plan(&self, plan_id: PlanId) -> ApiResult<()>;
    async fn existing_plan_advice(&self) -> ApiResult<Option<ExistingAdvice>>;
    async fn plan_advice_stream(&self) -> ApiResult<TextStream>;

    // Users
    async fn user_advice_stream(&self) -> ApiResult<TextStream>;
}
