//! Chat history lists and their cached message details.

use super::StoreContext;
use crate::cache::{CachePolicy, ReadThroughCache};
use crate::optimistic::{MutationOutcome, OptimisticMutator, RollbackPolicy, Snapshotable, StateCell};
use lingxi_core::{ApiResult, ChatList, ChatListId, ChatMessage, ChatRole};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    pub lists: Vec<ChatList>,
    pub current_chat: Option<ChatListId>,
}

impl ChatState {
    fn remove_chat(&mut self, list_id: ChatListId) {
        self.lists.retain(|c| c.chat_history_list_id != list_id);
        if self.current_chat == Some(list_id) {
            self.current_chat = None;
        }
    }
}

impl Snapshotable for ChatState {
    type Snapshot = ChatState;

    fn snapshot(&self) -> ChatState {
        self.clone()
    }

    fn restore(&mut self, snapshot: ChatState) {
        *self = snapshot;
    }
}

#[derive(Clone)]
pub struct ChatStore {
    ctx: StoreContext,
    state: StateCell<ChatState>,
    details: Arc<ReadThroughCache<ChatListId, Vec<ChatMessage>>>,
}

impl ChatStore {
    pub fn new(ctx: StoreContext) -> Self {
        let details = ReadThroughCache::new(CachePolicy::Ttl(ctx.chat_detail_ttl), ctx.clock.clone());
        Self {
            ctx,
            state: StateCell::default(),
            details: Arc::new(details),
        }
    }

    pub fn lists(&self) -> Vec<ChatList> {
        self.state.read(|s| s.lists.clone())
    }

    pub fn current_chat(&self) -> Option<ChatListId> {
        self.state.read(|s| s.current_chat)
    }

    pub fn set_current_chat(&self, list_id: Option<ChatListId>) {
        self.state.write(|s| s.current_chat = list_id);
    }

    pub async fn fetch_lists(&self) -> ApiResult<Vec<ChatList>> {
        let lists = self
            .ctx
            .backend
            .list_chats()
            .await
            .inspect_err(|err| tracing::error!(error = %err, "Failed to fetch chat lists"))?;
        self.state.write(|s| s.lists = lists.clone());
        Ok(lists)
    }

    /// Create a conversation and return its id. An empty name gets the
    /// default one.
    pub async fn create_chat(&self, name: &str) -> ApiResult<ChatListId> {
        let created = self
            .ctx
            .backend
            .create_chat(name)
            .await
            .inspect_err(|err| tracing::error!(error = %err, "Failed to create chat"))?;
        self.fetch_lists().await?;
        Ok(created.chat_history_list_id)
    }

    /// Messages of a conversation, served from cache while fresh.
    pub async fn chat_details(&self, list_id: ChatListId) -> ApiResult<Vec<ChatMessage>> {
        let backend = self.ctx.backend.clone();
        let read = self
            .details
            .get(list_id, || async move { backend.chat_detail(list_id).await })
            .await
            .inspect_err(|err| tracing::error!(%list_id, error = %err, "Failed to fetch chat details"))?;
        Ok(read.into_value())
    }

    /// Replace the cached messages, e.g. after a streamed reply completed.
    pub fn update_chat_details(&self, list_id: ChatListId, messages: Vec<ChatMessage>) {
        self.details.insert(list_id, messages);
    }

    /// Append to a loaded conversation. Conversations not in cache are
    /// left alone; the next read fetches them whole.
    pub fn add_message(&self, list_id: ChatListId, message: ChatMessage) {
        if !self.details.update(&list_id, |messages| messages.push(message)) {
            tracing::debug!(%list_id, "Conversation not cached, message not appended");
        }
    }

    /// Rewrite the trailing reply while it streams in. Does nothing unless
    /// the last message is the system's.
    pub fn update_last_message(&self, list_id: ChatListId, content: &str) {
        self.details.update(&list_id, |messages| {
            if let Some(last) = messages.last_mut() {
                if last.role == ChatRole::System {
                    last.words = content.to_string();
                }
            }
        });
    }

    pub fn clear_chat_cache(&self, list_id: ChatListId) {
        self.details.invalidate(&list_id);
    }

    pub fn clear_all_cache(&self) {
        self.details.invalidate_all();
    }

    /// Remove a conversation and its cached messages at once. A server
    /// failure is returned and the removal stays.
    pub async fn delete_chat(&self, list_id: ChatListId) -> MutationOutcome<()> {
        let details = Arc::clone(&self.details);
        OptimisticMutator::new("delete_chat", RollbackPolicy::Propagate)
            .run(
                &self.state,
                |s| {
                    s.remove_chat(list_id);
                    details.invalidate(&list_id);
                },
                self.ctx.backend.delete_chat(list_id),
            )
            .await
    }
}
