//! Per-domain state containers.
//!
//! Each store owns its state in a [`crate::optimistic::StateCell`] and talks to the backend
//! through the [`StudyBackend`] seam. Stores are cheap to clone and are
//! passed explicitly to whatever needs them.

pub mod chats;
pub mod notes;
pub mod plans;
pub mod questions;
pub mod user;

pub use chats::{ChatState, ChatStore};
pub use notes::{ChapterDeleteSnapshot, NoteState, NoteStore};
pub use plans::{PlanState, PlanStore};
pub use questions::{QuestionState, QuestionStore};
pub use user::UserStore;

use crate::backend::StudyBackend;
use crate::cache::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::notifications::Notifier;
use crate::stream::{
    cumulative, pump, DeliveryMode, SessionRegistry, StreamEnd, StreamIngestor, StreamSession,
    StreamTarget, TextStream,
};
use lingxi_core::ApiResult;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Collaborators shared by every store.
#[derive(Clone)]
pub struct StoreContext {
    pub backend: Arc<dyn StudyBackend>,
    pub notifier: Notifier,
    pub streams: SessionRegistry,
    pub clock: Arc<dyn Clock>,
    pub chat_detail_ttl: Duration,
    pub plan_list_ttl: Duration,
}

impl StoreContext {
    pub fn new(backend: Arc<dyn StudyBackend>) -> Self {
        Self {
            backend,
            notifier: Notifier::new(),
            streams: SessionRegistry::new(),
            clock: Arc::new(SystemClock),
            chat_detail_ttl: DEFAULT_TTL,
            plan_list_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_config(mut self, config: &ClientConfig) -> Self {
        self.chat_detail_ttl = config.chat_detail_ttl();
        self.plan_list_ttl = config.plan_list_ttl();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Claim `target`, open the stream, and feed it through an ingestor in
    /// `mode`, handing every change of the accumulated text to `publish`.
    ///
    /// Returns the final text. A superseded session returns what it had
    /// when it stopped. A failed one keeps its partial text published,
    /// notifies the user and returns the error.
    pub(crate) async fn stream_into<O, F>(
        &self,
        target: StreamTarget,
        mode: DeliveryMode,
        open: O,
        failure_message: &str,
        publish: F,
    ) -> ApiResult<String>
    where
        O: Future<Output = ApiResult<TextStream>>,
        F: FnMut(&str),
    {
        let ticket = self.streams.begin(target);
        let stream = match open.await {
            Ok(stream) => stream,
            Err(err) => {
                self.streams.end(&ticket);
                tracing::error!(?target, error = %err, "Failed to open stream");
                self.notifier.error(err.user_message(failure_message));
                return Err(err);
            }
        };
        let stream = match mode {
            DeliveryMode::Incremental => stream,
            DeliveryMode::Cumulative | DeliveryMode::Recompute => cumulative(stream),
        };

        let mut session = StreamSession::new(ticket, StreamIngestor::new(mode));
        match pump(&mut session, &self.streams, stream, publish).await {
            StreamEnd::Completed => Ok(session.into_text()),
            StreamEnd::Superseded => {
                tracing::debug!(?target, "Stream superseded by a newer request");
                Ok(session.into_text())
            }
            StreamEnd::Failed(err) => {
                self.notifier.error(err.user_message(failure_message));
                Err(err)
            }
        }
    }
}

/// Build every store over one context.
#[derive(Clone)]
pub struct Stores {
    pub notes: NoteStore,
    pub questions: QuestionStore,
    pub chats: ChatStore,
    pub plans: PlanStore,
}

impl Stores {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            notes: NoteStore::new(ctx.clone()),
            questions: QuestionStore::new(ctx.clone()),
            chats: ChatStore::new(ctx.clone()),
            plans: PlanStore::new(ctx),
        }
    }
}
