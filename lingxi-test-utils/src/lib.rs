//! Lingxi Test Utilities
//!
//! Shared test infrastructure for the Lingxi workspace:
//! - An in-memory [`StudyBackend`] with scripted failures and streams
//! - A manually advanced clock for cache expiry tests
//! - Fixtures for common records
//! - Proptest generators for streamed responses

pub use lingxi_client::cache::Clock;
pub use lingxi_client::stream::{StreamTarget, TextStream};
pub use lingxi_client::{QuestionField, StudyBackend};
pub use lingxi_core::{
    AggregateCount, ApiError, ApiResult, Category, CategoryId, Chapter, ChapterId, ChatList,
    ChatListId, ChatMessage, ChatRole, ComprehensionLevel, CreatedChat, ExistingAdvice,
    ExistingSummary, FavoriteState, KnowledgeGraph, KnowledgeGraphId, KnowledgeItem,
    KnowledgeItemId, KnowledgeRelation, LoginRequest, LoginResponse, NewChapter, NewNote, NewPlan,
    NewQuestion, NewQuestionList, Note, NoteEdit, NoteId, Plan, PlanId, PlanLevel, Question,
    QuestionEdit, QuestionId, QuestionList, QuestionListId, UserId,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// MOCK BACKEND
// ============================================================================

/// One [`StudyBackend`] method, for failure scripting and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Login,
    ListCategories,
    ListChapters,
    CreateChapter,
    UpdateChapter,
    DeleteChapter,
    ListNotes,
    CreateNote,
    UpdateNote,
    DeleteNote,
    ExistingSummary,
    SummaryStream,
    KnowledgeGraph,
    GenerateKnowledgeGraph,
    ListQuestionLists,
    CreateQuestionList,
    UpdateQuestionList,
    DeleteQuestionList,
    ListQuestions,
    CreateQuestion,
    UpdateQuestion,
    DeleteQuestion,
    ToggleFavorite,
    QuestionStream,
    ListChats,
    ChatDetail,
    CreateChat,
    DeleteChat,
    ListPlans,
    CreatePlan,
    UpdatePlan,
    DeletePlan,
    ExistingPlanAdvice,
    PlanAdviceStream,
    UserAdviceStream,
}

/// Server-side records held by [`MockBackend`].
#[derive(Debug, Clone, Default)]
pub struct MockData {
    pub login: Option<LoginResponse>,
    pub categories: Vec<Category>,
    pub chapters: Vec<Chapter>,
    pub notes: Vec<Note>,
    pub summaries: HashMap<ChapterId, ExistingSummary>,
    pub knowledge_graphs: HashMap<ChapterId, KnowledgeGraph>,
    pub question_lists: Vec<QuestionList>,
    pub questions: Vec<Question>,
    pub chats: Vec<ChatList>,
    pub chat_details: HashMap<ChatListId, Vec<ChatMessage>>,
    pub plans: Vec<Plan>,
    pub plan_advice: Option<ExistingAdvice>,
}

/// In-memory backend. Mutations change [`MockData`] the way the real
/// server would; failures and streams are scripted per call.
#[derive(Default)]
pub struct MockBackend {
    data: Mutex<MockData>,
    failures: Mutex<HashMap<MockOp, VecDeque<ApiError>>>,
    streams: Mutex<HashMap<StreamTarget, VecDeque<TextStream>>>,
    calls: Mutex<HashMap<MockOp, usize>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: MockData) -> Self {
        Self {
            data: Mutex::new(data),
            ..Self::default()
        }
    }

    /// Edit the server-side records.
    pub fn seed(&self, f: impl FnOnce(&mut MockData)) {
        f(&mut lock(&self.data));
    }

    /// Inspect the server-side records.
    pub fn data<R>(&self, f: impl FnOnce(&MockData) -> R) -> R {
        f(&lock(&self.data))
    }

    /// Make the next call of `op` fail with `err`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, op: MockOp, err: ApiError) {
        lock(&self.failures).entry(op).or_default().push_back(err);
    }

    /// Queue a stream for the next request writing into `target`.
    pub fn script_stream(&self, target: StreamTarget, stream: TextStream) {
        lock(&self.streams)
            .entry(target)
            .or_default()
            .push_back(stream);
    }

    /// Queue a stream that delivers `chunks` one by one and closes.
    pub fn script_chunks<I, S>(&self, target: StreamTarget, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script_stream(target, chunk_stream(chunks));
    }

    /// How many times `op` was called, failed calls included.
    pub fn calls(&self, op: MockOp) -> usize {
        lock(&self.calls).get(&op).copied().unwrap_or(0)
    }

    fn enter(&self, op: MockOp) -> ApiResult<()> {
        *lock(&self.calls).entry(op).or_default() += 1;
        match lock(&self.failures).get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn take_stream(&self, op: MockOp, target: StreamTarget) -> ApiResult<TextStream> {
        self.enter(op)?;
        lock(&self.streams)
            .get_mut(&target)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| ApiError::InvalidResponse(format!("no stream scripted for {target:?}")))
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::Status {
        status: 404,
        message: format!("{what} not found"),
    }
}

fn next_id(ids: impl Iterator<Item = i64>) -> i64 {
    ids.max().unwrap_or(0) + 1
}

#[async_trait]
impl StudyBackend for MockBackend {
    async fn login(&self, request: &LoginRequest) -> ApiResult<LoginResponse> {
        self.enter(MockOp::Login)?;
        let configured = self.data(|d| d.login.clone());
        Ok(configured.unwrap_or_else(|| fixtures::login_response(&request.username)))
    }

    async fn list_categories(&self) -> ApiResult<Vec<Category>> {
        self.enter(MockOp::ListCategories)?;
        Ok(self.data(|d| d.categories.clone()))
    }

    async fn list_chapters(&self) -> ApiResult<Vec<Chapter>> {
        self.enter(MockOp::ListChapters)?;
        Ok(self.data(|d| d.chapters.clone()))
    }

    async fn create_chapter(&self, chapter: &NewChapter) -> ApiResult<()> {
        self.enter(MockOp::CreateChapter)?;
        let mut data = lock(&self.data);
        let id = next_id(data.chapters.iter().map(|c| c.chapter_id.get()));
        data.chapters.push(Chapter {
            chapter_id: ChapterId::new(id),
            name: chapter.name.clone(),
            category: chapter.category.clone(),
            note_count: AggregateCount::ZERO,
            created_at: None,
        });
        Ok(())
    }

    async fn update_chapter(&self, chapter_id: ChapterId, chapter: &NewChapter) -> ApiResult<()> {
        self.enter(MockOp::UpdateChapter)?;
        let mut data = lock(&self.data);
        let existing = data
            .chapters
            .iter_mut()
            .find(|c| c.chapter_id == chapter_id)
            .ok_or_else(|| not_found("chapter"))?;
        existing.name = chapter.name.clone();
        existing.category = chapter.category.clone();
        Ok(())
    }

    async fn delete_chapter(&self, chapter_id: ChapterId) -> ApiResult<()> {
        self.enter(MockOp::DeleteChapter)?;
        let mut data = lock(&self.data);
        data.chapters.retain(|c| c.chapter_id != chapter_id);
        data.notes.retain(|n| n.chapter_id != chapter_id);
        Ok(())
    }

    async fn list_notes(&self, chapter_id: ChapterId) -> ApiResult<Vec<Note>> {
        self.enter(MockOp::ListNotes)?;
        Ok(self.data(|d| {
            d.notes
                .iter()
                .filter(|n| n.chapter_id == chapter_id)
                .cloned()
                .collect()
        }))
    }

    async fn create_note(&self, note: &NewNote) -> ApiResult<()> {
        self.enter(MockOp::CreateNote)?;
        let mut data = lock(&self.data);
        let id = next_id(data.notes.iter().map(|n| n.note_id.get()));
        let mut created = fixtures::note(id, note.chapter_id.get(), note.comprehension_level);
        created.words = note.words.clone();
        data.notes.push(created);
        if let Some(chapter) = data.chapters.iter_mut().find(|c| c.chapter_id == note.chapter_id) {
            chapter.note_count.increment();
        }
        Ok(())
    }

    async fn update_note(&self, note_id: NoteId, edit: &NoteEdit) -> ApiResult<()> {
        self.enter(MockOp::UpdateNote)?;
        let mut data = lock(&self.data);
        let note = data
            .notes
            .iter_mut()
            .find(|n| n.note_id == note_id)
            .ok_or_else(|| not_found("note"))?;
        note.words = edit.words.clone();
        note.comprehension_level = edit.comprehension_level;
        Ok(())
    }

    async fn delete_note(&self, note_id: NoteId) -> ApiResult<()> {
        self.enter(MockOp::DeleteNote)?;
        let mut data = lock(&self.data);
        let Some(idx) = data.notes.iter().position(|n| n.note_id == note_id) else {
            return Err(not_found("note"));
        };
        let note = data.notes.remove(idx);
        if let Some(chapter) = data.chapters.iter_mut().find(|c| c.chapter_id == note.chapter_id) {
            chapter.note_count.decrement();
        }
        Ok(())
    }

    async fn existing_summary(&self, chapter_id: ChapterId) -> ApiResult<Option<ExistingSummary>> {
        self.enter(MockOp::ExistingSummary)?;
        Ok(self.data(|d| d.summaries.get(&chapter_id).cloned()))
    }

    async fn summary_stream(&self, chapter_id: ChapterId) -> ApiResult<TextStream> {
        self.take_stream(MockOp::SummaryStream, StreamTarget::ChapterSummary(chapter_id))
    }

    async fn knowledge_graph(&self, chapter_id: ChapterId) -> ApiResult<Option<KnowledgeGraph>> {
        self.enter(MockOp::KnowledgeGraph)?;
        Ok(self.data(|d| d.knowledge_graphs.get(&chapter_id).cloned()))
    }

    /// Builds one item per live note, chained in note order.
    async fn generate_knowledge_graph(&self, chapter_id: ChapterId) -> ApiResult<KnowledgeGraph> {
        self.enter(MockOp::GenerateKnowledgeGraph)?;
        let mut data = lock(&self.data);
        if !data.chapters.iter().any(|c| c.chapter_id == chapter_id) {
            return Err(not_found("chapter"));
        }
        let words: Vec<String> = data
            .notes
            .iter()
            .filter(|n| n.chapter_id == chapter_id && !n.is_deleted)
            .map(|n| n.words.clone())
            .collect();
        if words.is_empty() {
            return Err(ApiError::from_status(400, "该章节没有笔记内容"));
        }
        let graph_id = next_id(
            data.knowledge_graphs
                .values()
                .map(|g| g.knowledge_graph_id.get()),
        );
        let graph = fixtures::knowledge_graph(graph_id, &words);
        data.knowledge_graphs.insert(chapter_id, graph.clone());
        Ok(graph)
    }

    async fn list_question_lists(&self) -> ApiResult<Vec<QuestionList>> {
        self.enter(MockOp::ListQuestionLists)?;
        Ok(self.data(|d| d.question_lists.clone()))
    }

    async fn create_question_list(&self, list: &NewQuestionList) -> ApiResult<()> {
        self.enter(MockOp::CreateQuestionList)?;
        let mut data = lock(&self.data);
        let id = next_id(data.question_lists.iter().map(|l| l.question_list_id.get()));
        data.question_lists
            .push(fixtures::question_list(id, &list.name, 0));
        Ok(())
    }

    async fn update_question_list(
        &self,
        list_id: QuestionListId,
        list: &NewQuestionList,
    ) -> ApiResult<()> {
        self.enter(MockOp::UpdateQuestionList)?;
        let mut data = lock(&self.data);
        let existing = data
            .question_lists
            .iter_mut()
            .find(|l| l.question_list_id == list_id)
            .ok_or_else(|| not_found("question list"))?;
        existing.name = list.name.clone();
        Ok(())
    }

    async fn delete_question_list(&self, list_id: QuestionListId) -> ApiResult<()> {
        self.enter(MockOp::DeleteQuestionList)?;
        let mut data = lock(&self.data);
        data.question_lists.retain(|l| l.question_list_id != list_id);
        data.questions.retain(|q| q.question_list_id != list_id);
        Ok(())
    }

    async fn list_questions(&self, list_id: QuestionListId) -> ApiResult<Vec<Question>> {
        self.enter(MockOp::ListQuestions)?;
        Ok(self.data(|d| {
            d.questions
                .iter()
                .filter(|q| q.question_list_id == list_id)
                .cloned()
                .collect()
        }))
    }

    async fn create_question(&self, question: &NewQuestion) -> ApiResult<()> {
        self.enter(MockOp::CreateQuestion)?;
        let mut data = lock(&self.data);
        let id = next_id(data.questions.iter().map(|q| q.question_id.get()));
        let mut created = fixtures::question(id, question.question_list_id.get());
        created.content = question.content.clone();
        created.is_image = question.is_image;
        created.image_url = question.image.clone();
        created.answer = question.answer.clone().unwrap_or_default();
        data.questions.push(created);
        if let Some(list) = data
            .question_lists
            .iter_mut()
            .find(|l| l.question_list_id == question.question_list_id)
        {
            list.count.increment();
        }
        Ok(())
    }

    async fn update_question(&self, question_id: QuestionId, edit: &QuestionEdit) -> ApiResult<()> {
        self.enter(MockOp::UpdateQuestion)?;
        let mut data = lock(&self.data);
        let question = data
            .questions
            .iter_mut()
            .find(|q| q.question_id == question_id)
            .ok_or_else(|| not_found("question"))?;
        if let Some(content) = edit.content.as_ref().filter(|c| !c.is_empty()) {
            question.content = content.clone();
        }
        if let Some(is_image) = edit.is_image {
            question.is_image = is_image;
        }
        if edit.image.is_some() {
            question.is_image = true;
            question.image_url = Some(format!("https://images.lingxi.test/questions/{question_id}.png"));
        }
        Ok(())
    }

    async fn delete_question(&self, question_id: QuestionId) -> ApiResult<()> {
        self.enter(MockOp::DeleteQuestion)?;
        let mut data = lock(&self.data);
        let Some(idx) = data.questions.iter().position(|q| q.question_id == question_id) else {
            return Err(not_found("question"));
        };
        let question = data.questions.remove(idx);
        if let Some(list) = data
            .question_lists
            .iter_mut()
            .find(|l| l.question_list_id == question.question_list_id)
        {
            list.count.decrement();
        }
        Ok(())
    }

    async fn toggle_favorite(&self, question_id: QuestionId) -> ApiResult<FavoriteState> {
        self.enter(MockOp::ToggleFavorite)?;
        let mut data = lock(&self.data);
        let question = data
            .questions
            .iter_mut()
            .find(|q| q.question_id == question_id)
            .ok_or_else(|| not_found("question"))?;
        question.is_favorite = !question.is_favorite;
        Ok(FavoriteState {
            is_favorite: question.is_favorite,
        })
    }

    async fn question_stream(
        &self,
        field: QuestionField,
        question_id: QuestionId,
    ) -> ApiResult<TextStream> {
        self.take_stream(MockOp::QuestionStream, field.target(question_id))
    }

    async fn list_chats(&self) -> ApiResult<Vec<ChatList>> {
        self.enter(MockOp::ListChats)?;
        Ok(self.data(|d| d.chats.clone()))
    }

    async fn chat_detail(&self, list_id: ChatListId) -> ApiResult<Vec<ChatMessage>> {
        self.enter(MockOp::ChatDetail)?;
        Ok(self.data(|d| d.chat_details.get(&list_id).cloned().unwrap_or_default()))
    }

    async fn create_chat(&self, name: &str) -> ApiResult<CreatedChat> {
        self.enter(MockOp::CreateChat)?;
        let mut data = lock(&self.data);
        let id = next_id(data.chats.iter().map(|c| c.chat_history_list_id.get()));
        let name = if name.is_empty() { "新对话" } else { name };
        data.chats.push(fixtures::chat_list(id, name));
        Ok(CreatedChat {
            chat_history_list_id: ChatListId::new(id),
            name: name.to_string(),
        })
    }

    async fn delete_chat(&self, list_id: ChatListId) -> ApiResult<()> {
        self.enter(MockOp::DeleteChat)?;
        let mut data = lock(&self.data);
        data.chats.retain(|c| c.chat_history_list_id != list_id);
        data.chat_details.remove(&list_id);
        Ok(())
    }

    async fn list_plans(&self) -> ApiResult<Vec<Plan>> {
        self.enter(MockOp::ListPlans)?;
        Ok(self.data(|d| d.plans.clone()))
    }

    async fn create_plan(&self, plan: &NewPlan) -> ApiResult<()> {
        self.enter(MockOp::CreatePlan)?;
        let mut data = lock(&self.data);
        let id = next_id(data.plans.iter().map(|p| p.plan_id.get()));
        data.plans.push(Plan {
            plan_id: PlanId::new(id),
            todo: plan.todo.clone(),
            deadline: plan.deadline.clone(),
            level: plan.level,
            created_at: None,
        });
        Ok(())
    }

    async fn update_plan(&self, plan_id: PlanId, plan: &NewPlan) -> ApiResult<()> {
        self.enter(MockOp::UpdatePlan)?;
        let mut data = lock(&self.data);
        let existing = data
            .plans
            .iter_mut()
            .find(|p| p.plan_id == plan_id)
            .ok_or_else(|| not_found("plan"))?;
        existing.todo = plan.todo.clone();
        existing.deadline = plan.deadline.clone();
        existing.level = plan.level;
        Ok(())
    }

    async fn delete_plan(&self, plan_id: PlanId) -> ApiResult<()> {
        self.enter(MockOp::DeletePlan)?;
        lock(&self.data).plans.retain(|p| p.plan_id != plan_id);
        Ok(())
    }

    async fn existing_plan_advice(&self) -> ApiResult<Option<ExistingAdvice>> {
        self.enter(MockOp::ExistingPlanAdvice)?;
        Ok(self.data(|d| d.plan_advice.clone()))
    }

    async fn plan_advice_stream(&self) -> ApiResult<TextStream> {
        self.take_stream(MockOp::PlanAdviceStream, StreamTarget::PlanAdvice)
    }

    async fn user_advice_stream(&self) -> ApiResult<TextStream> {
        self.take_stream(MockOp::UserAdviceStream, StreamTarget::UserAdvice)
    }
}

// ============================================================================
// STREAMS
// ============================================================================

/// A stream that yields `chunks` in order and closes.
pub fn chunk_stream<I, S>(chunks: I) -> TextStream
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let chunks: Vec<ApiResult<String>> = chunks.into_iter().map(|c| Ok(c.into())).collect();
    stream::iter(chunks).boxed()
}

/// A stream that yields `chunks` and then fails with `err`.
pub fn failing_stream<I, S>(chunks: I, err: ApiError) -> TextStream
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    chunk_stream(chunks).chain(stream::once(async move { Err(err) })).boxed()
}

/// Control side of [`gated_stream`].
#[derive(Debug)]
pub struct StreamGate {
    reached: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl StreamGate {
    /// Wait until the consumer has taken every chunk before the gate.
    pub async fn reached(&mut self) {
        let _ = (&mut self.reached).await;
    }

    /// Let the chunks after the gate through.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// A stream that yields `before`, holds until the gate is released, then
/// yields `after` and closes.
pub fn gated_stream<S: Into<String>>(before: Vec<S>, after: Vec<S>) -> (TextStream, StreamGate) {
    let (reached_tx, reached_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let after: Vec<ApiResult<String>> = after.into_iter().map(|c| Ok(c.into())).collect();
    let tail = stream::once(async move {
        let _ = reached_tx.send(());
        let _ = release_rx.await;
        stream::iter(after)
    })
    .flatten();
    let stream = chunk_stream(before).chain(tail).boxed();
    (
        stream,
        StreamGate {
            reached: reached_rx,
            release: release_tx,
        },
    )
}

/// Render payloads as `data:` lines, optionally terminated by the sentinel.
pub fn sse_body<S: AsRef<str>>(payloads: &[S], done: bool) -> String {
    let mut body = String::new();
    for payload in payloads {
        body.push_str("data: ");
        body.push_str(payload.as_ref());
        body.push('\n');
    }
    if done {
        body.push_str("data: [DONE]\n");
    }
    body
}

/// Cut `body` at the given character offsets.
pub fn split_at_chars(body: &str, cuts: &[usize]) -> Vec<String> {
    let boundaries: Vec<usize> = body.char_indices().map(|(idx, _)| idx).collect();
    let mut offsets: Vec<usize> = cuts
        .iter()
        .filter_map(|cut| boundaries.get(*cut).copied())
        .filter(|offset| *offset > 0)
        .collect();
    offsets.sort_unstable();
    offsets.dedup();

    let mut chunks = Vec::with_capacity(offsets.len() + 1);
    let mut start = 0;
    for offset in offsets {
        chunks.push(body[start..offset].to_string());
        start = offset;
    }
    chunks.push(body[start..].to_string());
    chunks
}

// ============================================================================
// CLOCK
// ============================================================================

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: chrono::Duration) {
        *lock(&self.now) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// A payload as the backend sends it: no surrounding whitespace, no
    /// newline, never bracketed like a control line.
    pub fn arb_payload() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9\u{4e00}-\u{4e20}，。]{1,12}"
    }

    pub fn arb_payloads() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_payload(), 0..12)
    }

    pub fn arb_comprehension_level() -> impl Strategy<Value = ComprehensionLevel> {
        prop_oneof![
            Just(ComprehensionLevel::Understood),
            Just(ComprehensionLevel::Vague),
            Just(ComprehensionLevel::NotUnderstood),
        ]
    }

    /// Payloads plus a chunking of their terminated body.
    pub fn arb_chunked_body() -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
        (arb_payloads(), prop::collection::vec(0usize..400, 0..10)).prop_map(|(payloads, cuts)| {
            let body = sse_body(&payloads, true);
            let chunks = split_at_chars(&body, &cuts);
            (payloads, chunks)
        })
    }

    pub fn arb_note(chapter_id: i64) -> impl Strategy<Value = Note> {
        (1i64..10_000, arb_comprehension_level(), any::<bool>()).prop_map(
            move |(id, level, deleted)| {
                let mut note = fixtures::note(id, chapter_id, level);
                note.is_deleted = deleted;
                note
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    pub fn category(id: i64, name: &str) -> Category {
        Category {
            category_id: CategoryId::new(id),
            name: name.to_string(),
            is_deleted: false,
        }
    }

    pub fn chapter(id: i64, note_count: u64) -> Chapter {
        Chapter {
            chapter_id: ChapterId::new(id),
            name: format!("第{id}章"),
            category: "1".to_string(),
            note_count: AggregateCount::new(note_count),
            created_at: None,
        }
    }

    pub fn note(id: i64, chapter_id: i64, level: ComprehensionLevel) -> Note {
        Note {
            note_id: NoteId::new(id),
            chapter_id: ChapterId::new(chapter_id),
            words: format!("note {id}"),
            comprehension_level: level,
            is_image: false,
            image_url: None,
            is_deleted: false,
            created_at: None,
        }
    }

    pub fn question_list(id: i64, name: &str, count: u64) -> QuestionList {
        QuestionList {
            question_list_id: QuestionListId::new(id),
            name: name.to_string(),
            count: AggregateCount::new(count),
            created_at: None,
        }
    }

    pub fn question(id: i64, list_id: i64) -> Question {
        Question {
            question_id: QuestionId::new(id),
            question_list_id: QuestionListId::new(list_id),
            content: format!("question {id}"),
            answer: String::new(),
            is_image: false,
            image_url: None,
            similar_question: String::new(),
            similar_answer: String::new(),
            is_favorite: false,
            created_at: None,
            generating: Default::default(),
        }
    }

    pub fn chat_list(id: i64, name: &str) -> ChatList {
        ChatList {
            chat_history_list_id: ChatListId::new(id),
            name: name.to_string(),
            chat_count: AggregateCount::ZERO,
            created_at: None,
        }
    }

    pub fn plan(id: i64, todo: &str) -> Plan {
        Plan {
            plan_id: PlanId::new(id),
            todo: todo.to_string(),
            deadline: "2026-12-31".to_string(),
            level: PlanLevel::Normal,
            created_at: None,
        }
    }

    /// A graph with one item per name, each linked to the next.
    pub fn knowledge_graph<S: AsRef<str>>(id: i64, names: &[S]) -> KnowledgeGraph {
        let items: Vec<KnowledgeItem> = names
            .iter()
            .zip(1i64..)
            .map(|(name, item_id)| KnowledgeItem {
                id: KnowledgeItemId::new(id * 100 + item_id),
                name: name.as_ref().to_string(),
                description: String::new(),
            })
            .collect();
        let relations = items
            .windows(2)
            .zip(1i64..)
            .map(|(pair, relation_id)| KnowledgeRelation {
                id: relation_id,
                source: pair[0].id,
                target: pair[1].id,
                relation_type: "相关".to_string(),
            })
            .collect();
        KnowledgeGraph {
            knowledge_graph_id: KnowledgeGraphId::new(id),
            items,
            relations,
            created_at: None,
        }
    }

    pub fn login_response(username: &str) -> LoginResponse {
        LoginResponse {
            access_token: "access-token".to_string(),
            refresh_token: "refresh-token".to_string(),
            user_id: UserId::new(1),
            username: username.to_string(),
            token_balance: 1000,
            profile_picture: None,
        }
    }

    /// Two chapters, the first selected with two loaded notes.
    pub fn two_chapters() -> MockData {
        MockData {
            categories: vec![category(1, "数学")],
            chapters: vec![chapter(1, 2), chapter(2, 3)],
            notes: vec![
                note(1, 1, ComprehensionLevel::Understood),
                note(2, 1, ComprehensionLevel::Vague),
            ],
            ..MockData::default()
        }
    }
}
