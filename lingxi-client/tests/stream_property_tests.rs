use lingxi_client::auth::SessionHandle;
use lingxi_client::notifications::NotificationLevel;
use lingxi_client::stores::{NoteStore, PlanStore, QuestionStore, StoreContext, UserStore};
use lingxi_client::stream::{StreamIngestor, StreamTarget};
use lingxi_test_utils::generators::arb_chunked_body;
use lingxi_test_utils::{
    chunk_stream, failing_stream, fixtures, gated_stream, ApiError, ChapterId, MockBackend,
    MockData, MockOp, QuestionId, QuestionListId,
};
use proptest::prelude::*;
use std::sync::Arc;

const QUESTION: QuestionId = QuestionId::new(1);

fn question_backend() -> Arc<MockBackend> {
    Arc::new(MockBackend::with_data(MockData {
        question_lists: vec![fixtures::question_list(1, "几何", 1)],
        questions: vec![fixtures::question(1, 1)],
        ..MockData::default()
    }))
}

async fn loaded_questions(ctx: &StoreContext) -> QuestionStore {
    let store = QuestionStore::new(ctx.clone());
    store.fetch_questions(QuestionListId::new(1)).await.unwrap();
    store
}

fn answer_of(store: &QuestionStore) -> (String, bool) {
    let state = store.state();
    let question = state.question(QUESTION).unwrap();
    (question.answer.clone(), question.generating.answer)
}

#[tokio::test]
async fn answer_stream_fills_field_and_clears_flag() {
    let backend = question_backend();
    backend.script_chunks(
        StreamTarget::Answer(QUESTION),
        ["data: 先求", "导\ndata: [TOKENS:12]\n", "data: 再代入\ndata: [DONE]\n"],
    );
    let ctx = StoreContext::new(backend.clone());
    let store = loaded_questions(&ctx).await;

    let answer = store.generate_answer(QUESTION).await.unwrap();

    assert_eq!(answer, "先求导再代入");
    assert_eq!(answer_of(&store), ("先求导再代入".to_string(), false));
    assert_eq!(ctx.streams.active_count(), 0);
}

#[tokio::test]
async fn newer_request_silences_older_stream() {
    let backend = question_backend();
    let (old, mut gate) = gated_stream(vec!["data: 旧\n"], vec!["data: 旧的续\n", "data: [DONE]\n"]);
    backend.script_stream(StreamTarget::Answer(QUESTION), old);
    backend.script_chunks(StreamTarget::Answer(QUESTION), ["data: 新\n", "data: [DONE]\n"]);
    let ctx = StoreContext::new(backend.clone());
    let store = loaded_questions(&ctx).await;

    let first = {
        let store = store.clone();
        tokio::spawn(async move { store.generate_answer(QUESTION).await })
    };
    gate.reached().await;
    assert_eq!(answer_of(&store), ("旧".to_string(), true));

    let second = store.generate_answer(QUESTION).await.unwrap();
    assert_eq!(second, "新");

    gate.release();
    let superseded = first.await.unwrap().unwrap();
    assert_eq!(superseded, "旧");
    assert_eq!(answer_of(&store), ("新".to_string(), false));
    assert_eq!(ctx.streams.active_count(), 0);
}

#[tokio::test]
async fn failed_stream_keeps_partial_text_and_clears_flag() {
    let backend = question_backend();
    backend.script_stream(
        StreamTarget::Answer(QUESTION),
        failing_stream(["data: 部分\n"], ApiError::Network("reset".to_string())),
    );
    let ctx = StoreContext::new(backend.clone());
    let store = loaded_questions(&ctx).await;

    let result = store.generate_answer(QUESTION).await;

    assert_eq!(result, Err(ApiError::Network("reset".to_string())));
    assert_eq!(answer_of(&store), ("部分".to_string(), false));
    let levels: Vec<_> = ctx.notifier.drain().into_iter().map(|n| n.level).collect();
    assert_eq!(levels, vec![NotificationLevel::Error]);
}

#[tokio::test]
async fn quota_error_on_open_is_reported() {
    let backend = question_backend();
    backend.fail_next(
        MockOp::QuestionStream,
        ApiError::from_status(403, "余额不足"),
    );
    let ctx = StoreContext::new(backend.clone());
    let store = loaded_questions(&ctx).await;

    let result = store.generate_similar_question(QUESTION).await;

    assert!(matches!(result, Err(ApiError::QuotaExceeded { .. })));
    let state = store.state();
    assert!(!state.question(QUESTION).unwrap().generating.similar_question);
    assert_eq!(ctx.notifier.pending(), 1);
}

#[tokio::test]
async fn unknown_question_is_rejected_before_streaming() {
    let backend = question_backend();
    let ctx = StoreContext::new(backend.clone());
    let store = loaded_questions(&ctx).await;

    assert!(store.generate_similar_answer(QuestionId::new(42)).await.is_err());
    assert_eq!(backend.calls(MockOp::QuestionStream), 0);
}

#[tokio::test]
async fn summary_is_rebuilt_from_whole_response() {
    let backend = Arc::new(MockBackend::with_data(fixtures::two_chapters()));
    let chapter = ChapterId::new(1);
    backend.script_chunks(
        StreamTarget::ChapterSummary(chapter),
        ["data: 第一", "段\ndata: 第二段\n", "data: [DONE]\ndata: 多余\n"],
    );
    let store = NoteStore::new(StoreContext::new(backend.clone()));

    let summary = store.generate_summary(chapter).await.unwrap();

    assert_eq!(summary, "第一段第二段");
    assert_eq!(store.summary(chapter).as_deref(), Some("第一段第二段"));
    assert!(!store.is_summarizing(chapter));
}

#[tokio::test]
async fn summaries_track_progress_per_chapter() {
    let backend = Arc::new(MockBackend::with_data(fixtures::two_chapters()));
    let (first, second) = (ChapterId::new(1), ChapterId::new(2));
    let (slow, mut gate) = gated_stream(vec!["data: 慢\n"], vec!["data: 完\n", "data: [DONE]\n"]);
    backend.script_stream(StreamTarget::ChapterSummary(first), slow);
    backend.script_chunks(StreamTarget::ChapterSummary(second), ["data: 快\n", "data: [DONE]\n"]);
    let store = NoteStore::new(StoreContext::new(backend.clone()));

    let pending = {
        let store = store.clone();
        tokio::spawn(async move { store.generate_summary(first).await })
    };
    gate.reached().await;
    assert!(store.is_summarizing(first));

    assert_eq!(store.generate_summary(second).await.unwrap(), "快");
    assert!(!store.is_summarizing(second));
    assert!(store.is_summarizing(first));

    gate.release();
    assert_eq!(pending.await.unwrap().unwrap(), "慢完");
    assert!(!store.is_summarizing(first));
    assert!(store.state().summarizing.is_empty());
}

#[tokio::test]
async fn plan_advice_reports_progress() {
    let backend = Arc::new(MockBackend::new());
    backend.script_chunks(
        StreamTarget::PlanAdvice,
        ["data: 先复习\n", "data: 再刷题\n", "data: [DONE]\n"],
    );
    let store = PlanStore::new(StoreContext::new(backend.clone()));

    let mut seen = Vec::new();
    let progress: &mut dyn FnMut(&str) = &mut |text| seen.push(text.to_string());
    let advice = store.ai_advice(Some(progress)).await.unwrap();

    assert_eq!(advice, "先复习再刷题");
    assert_eq!(seen, vec!["先复习".to_string(), "先复习再刷题".to_string()]);
    assert_eq!(store.advice(), advice);
    assert!(!store.state().advice_in_progress);
}

#[tokio::test]
async fn user_advice_skips_usage_lines() {
    let backend = Arc::new(MockBackend::new());
    backend.script_stream(
        StreamTarget::UserAdvice,
        chunk_stream(["data: 多做", "题\ndata: [TOKENS:42]\n", "data: 少熬夜\ndata: [DONE]\n"]),
    );
    let store = UserStore::new(StoreContext::new(backend.clone()), SessionHandle::ephemeral(None));

    let advice = store.user_advice().await.unwrap();

    assert_eq!(advice, "多做题少熬夜");
    assert_eq!(store.advice(), advice);
}

#[tokio::test]
async fn login_signs_in_and_logout_clears() {
    let backend = Arc::new(MockBackend::new());
    let session = SessionHandle::ephemeral(None);
    let store = UserStore::new(StoreContext::new(backend.clone()), session.clone());

    let user = store.login("li", "secret", false).await.unwrap();
    assert_eq!(user.username, "li");
    assert!(session.is_signed_in());
    assert_eq!(session.access_token().as_deref(), Some("access-token"));

    store.logout();
    assert!(!store.is_signed_in());
}

#[tokio::test]
async fn rejected_login_shows_server_reason() {
    let backend = Arc::new(MockBackend::new());
    backend.fail_next(
        MockOp::Login,
        ApiError::Status {
            status: 401,
            message: "用户名或密码错误".to_string(),
        },
    );
    let session = SessionHandle::ephemeral(None);
    let ctx = StoreContext::new(backend.clone());
    let store = UserStore::new(ctx.clone(), session.clone());

    let result = store.login("li", "wrong", false).await;

    assert_eq!(result.unwrap_err().status(), Some(401));
    assert!(!session.is_signed_in());
    let shown: Vec<_> = ctx.notifier.drain().into_iter().map(|n| n.message).collect();
    assert_eq!(shown, vec!["用户名或密码错误".to_string()]);
}

proptest! {
    #[test]
    fn chunking_never_changes_incremental_text((payloads, chunks) in arb_chunked_body()) {
        let mut ingestor = StreamIngestor::incremental();
        for chunk in &chunks {
            ingestor.push(chunk, |_| {});
        }
        ingestor.finish(|_| {});
        prop_assert!(ingestor.is_done());
        prop_assert_eq!(ingestor.text(), payloads.concat());
    }

    #[test]
    fn chunking_never_changes_cumulative_text((payloads, chunks) in arb_chunked_body()) {
        let mut ingestor = StreamIngestor::cumulative();
        let mut buffer = String::new();
        for chunk in &chunks {
            buffer.push_str(chunk);
            ingestor.push(&buffer, |_| {});
        }
        ingestor.finish(|_| {});
        prop_assert_eq!(ingestor.text(), payloads.concat());
    }
}
