//! Streaming sessions and supersession.
//!
//! Starting a session for a target replaces whatever session was current
//! for that target. The old transport is not aborted; its pump notices on
//! the next delivery that its ticket is stale and stops writing.

use super::ingestor::{StreamIngestor, StreamUpdate};
use super::TextStream;
use futures_util::StreamExt;
use lingxi_core::{ApiError, ChapterId, QuestionId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// The logical field a stream writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamTarget {
    Answer(QuestionId),
    SimilarQuestion(QuestionId),
    SimilarAnswer(QuestionId),
    ChapterSummary(ChapterId),
    PlanAdvice,
    UserAdvice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    pub target: StreamTarget,
    pub id: Uuid,
}

/// Tracks which ticket currently owns each target.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    current: Arc<RwLock<HashMap<StreamTarget, Uuid>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `target`, superseding any session already writing to it.
    pub fn begin(&self, target: StreamTarget) -> SessionTicket {
        let ticket = SessionTicket {
            target,
            id: Uuid::now_v7(),
        };
        if let Ok(mut current) = self.current.write() {
            if let Some(previous) = current.insert(target, ticket.id) {
                tracing::debug!(?target, %previous, "Superseding stream session");
            }
        }
        ticket
    }

    pub fn is_current(&self, ticket: &SessionTicket) -> bool {
        self.current
            .read()
            .map(|current| current.get(&ticket.target) == Some(&ticket.id))
            .unwrap_or(false)
    }

    /// Run `f` if `ticket` still owns its target, holding the registry so a
    /// concurrent [`SessionRegistry::begin`] waits until `f` returns. `f`
    /// must not call back into the registry. Returns whether `f` ran.
    pub fn with_current<F: FnOnce()>(&self, ticket: &SessionTicket, f: F) -> bool {
        let Ok(current) = self.current.read() else {
            return false;
        };
        if current.get(&ticket.target) != Some(&ticket.id) {
            return false;
        }
        f();
        true
    }

    /// Release `target` if `ticket` still owns it.
    pub fn end(&self, ticket: &SessionTicket) {
        if let Ok(mut current) = self.current.write() {
            if current.get(&ticket.target) == Some(&ticket.id) {
                current.remove(&ticket.target);
            }
        }
    }

    /// Whether any session currently owns `target`.
    pub fn is_active(&self, target: StreamTarget) -> bool {
        self.current
            .read()
            .map(|current| current.contains_key(&target))
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.current.read().map(|current| current.len()).unwrap_or(0)
    }
}

/// One in-flight streaming request.
#[derive(Debug)]
pub struct StreamSession {
    ticket: SessionTicket,
    ingestor: StreamIngestor,
    last_error: Option<ApiError>,
}

impl StreamSession {
    pub fn new(ticket: SessionTicket, ingestor: StreamIngestor) -> Self {
        Self {
            ticket,
            ingestor,
            last_error: None,
        }
    }

    pub fn ticket(&self) -> &SessionTicket {
        &self.ticket
    }

    pub fn accumulated_text(&self) -> &str {
        self.ingestor.text()
    }

    pub fn into_text(self) -> String {
        self.ingestor.into_text()
    }

    pub fn raw_buffer_length(&self) -> usize {
        self.ingestor.raw_len()
    }

    pub fn is_done(&self) -> bool {
        self.ingestor.is_done()
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    /// End the session on a failure, keeping the text received so far.
    pub fn abort(&mut self, err: ApiError) {
        self.ingestor.abort();
        self.last_error = Some(err);
    }
}

/// How a pumped session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Sentinel seen or transport closed cleanly.
    Completed,
    /// A newer session claimed the target; nothing further was written.
    Superseded,
    /// The transport failed mid-stream. Text so far is retained.
    Failed(ApiError),
}

/// Drive `stream` through `session`, calling `publish` with the accumulated
/// text after every appended payload while the session still owns its
/// target. Ownership is checked under the registry lock for each publish.
pub async fn pump<F>(
    session: &mut StreamSession,
    registry: &SessionRegistry,
    mut stream: TextStream,
    mut publish: F,
) -> StreamEnd
where
    F: FnMut(&str),
{
    let ticket = session.ticket;
    while let Some(item) = stream.next().await {
        if !registry.is_current(&ticket) {
            tracing::warn!(target = ?ticket.target, "Dropping deliveries for superseded stream");
            session.ingestor.abort();
            return StreamEnd::Superseded;
        }
        match item {
            Ok(delivery) => {
                let mut lost_target = false;
                session.ingestor.push(&delivery, |update| {
                    if let StreamUpdate::Text { accumulated, .. } = update {
                        lost_target |= !registry.with_current(&ticket, || publish(accumulated));
                    }
                });
                if lost_target {
                    tracing::warn!(target = ?ticket.target, "Stream superseded while publishing");
                    session.ingestor.abort();
                    return StreamEnd::Superseded;
                }
                if session.ingestor.is_done() {
                    tracing::debug!(target = ?ticket.target, bytes = session.raw_buffer_length(), "Stream completed");
                    registry.end(&ticket);
                    return StreamEnd::Completed;
                }
            }
            Err(err) => {
                tracing::error!(target = ?ticket.target, error = %err, "Stream failed");
                session.abort(err.clone());
                registry.end(&ticket);
                return StreamEnd::Failed(err);
            }
        }
    }

    if !registry.is_current(&ticket) {
        session.ingestor.abort();
        return StreamEnd::Superseded;
    }
    let mut lost_target = false;
    session.ingestor.finish(|update| {
        if let StreamUpdate::Text { accumulated, .. } = update {
            lost_target |= !registry.with_current(&ticket, || publish(accumulated));
        }
    });
    if lost_target {
        session.ingestor.abort();
        return StreamEnd::Superseded;
    }
    tracing::debug!(target = ?ticket.target, bytes = session.raw_buffer_length(), "Stream closed");
    registry.end(&ticket);
    StreamEnd::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(items: Vec<Result<&str, ApiError>>) -> TextStream {
        stream::iter(
            items
                .into_iter()
                .map(|item| item.map(str::to_string))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }

    #[test]
    fn newer_ticket_supersedes_older() {
        let registry = SessionRegistry::new();
        let target = StreamTarget::Answer(QuestionId::new(7));
        let first = registry.begin(target);
        let second = registry.begin(target);
        assert!(!registry.is_current(&first));
        assert!(registry.is_current(&second));

        registry.end(&first);
        assert!(registry.is_current(&second));
        registry.end(&second);
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn pump_publishes_every_append() {
        let registry = SessionRegistry::new();
        let ticket = registry.begin(StreamTarget::UserAdvice);
        let mut session = StreamSession::new(ticket, StreamIngestor::incremental());
        let mut seen = Vec::new();
        let end = pump(
            &mut session,
            &registry,
            chunks(vec![Ok("data: 多"), Ok("做题\ndata: 少熬夜\n"), Ok("data: [DONE]\n")]),
            |text| seen.push(text.to_string()),
        )
        .await;
        assert_eq!(end, StreamEnd::Completed);
        assert_eq!(seen, vec!["多做题", "多做题少熬夜"]);
        assert!(session.is_done());
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn failure_keeps_partial_text() {
        let registry = SessionRegistry::new();
        let ticket = registry.begin(StreamTarget::PlanAdvice);
        let mut session = StreamSession::new(ticket, StreamIngestor::incremental());
        let end = pump(
            &mut session,
            &registry,
            chunks(vec![Ok("data: partial\n"), Err(ApiError::Timeout)]),
            |_| {},
        )
        .await;
        assert_eq!(end, StreamEnd::Failed(ApiError::Timeout));
        assert_eq!(session.accumulated_text(), "partial");
        assert_eq!(session.last_error(), Some(&ApiError::Timeout));
    }

    #[tokio::test]
    async fn superseded_session_stops_writing() {
        let registry = SessionRegistry::new();
        let target = StreamTarget::ChapterSummary(ChapterId::new(3));
        let stale = registry.begin(target);
        let _fresh = registry.begin(target);
        let mut session = StreamSession::new(stale, StreamIngestor::incremental());
        let mut writes = 0;
        let end = pump(
            &mut session,
            &registry,
            chunks(vec![Ok("data: old\n")]),
            |_| writes += 1,
        )
        .await;
        assert_eq!(end, StreamEnd::Superseded);
        assert_eq!(writes, 0);
        assert_eq!(session.accumulated_text(), "");
    }

    #[tokio::test]
    async fn supersession_mid_stream_drops_later_deliveries() {
        let registry = SessionRegistry::new();
        let target = StreamTarget::Answer(QuestionId::new(5));
        let ticket = registry.begin(target);
        let mut session = StreamSession::new(ticket, StreamIngestor::incremental());
        let rival = registry.clone();
        let stream = chunks(vec![Ok("data: 第一\n"), Ok("data: 第二\n")])
            .enumerate()
            .map(move |(idx, item)| {
                if idx == 1 {
                    rival.begin(target);
                }
                item
            })
            .boxed();
        let mut seen = Vec::new();
        let end = pump(&mut session, &registry, stream, |text| seen.push(text.to_string())).await;
        assert_eq!(end, StreamEnd::Superseded);
        assert_eq!(seen, vec!["第一"]);
        assert!(registry.is_active(target));
    }

    #[test]
    fn with_current_skips_stale_ticket() {
        let registry = SessionRegistry::new();
        let stale = registry.begin(StreamTarget::PlanAdvice);
        let fresh = registry.begin(StreamTarget::PlanAdvice);
        let mut ran = Vec::new();
        assert!(!registry.with_current(&stale, || ran.push("stale")));
        assert!(registry.with_current(&fresh, || ran.push("fresh")));
        assert_eq!(ran, vec!["fresh"]);
    }

    #[test]
    fn begin_waits_for_an_in_flight_publish() {
        use std::sync::{mpsc, Mutex};
        use std::time::Duration;

        let registry = SessionRegistry::new();
        let ticket = registry.begin(StreamTarget::UserAdvice);
        let log = Arc::new(Mutex::new(Vec::new()));
        let (inside_tx, inside_rx) = mpsc::channel();

        let publisher = {
            let registry = registry.clone();
            let log = log.clone();
            std::thread::spawn(move || {
                registry.with_current(&ticket, || {
                    inside_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(50));
                    log.lock().unwrap().push("publish");
                })
            })
        };
        inside_rx.recv().unwrap();
        registry.begin(StreamTarget::UserAdvice);
        log.lock().unwrap().push("begin");

        assert!(publisher.join().unwrap());
        assert_eq!(*log.lock().unwrap(), vec!["publish", "begin"]);
        assert!(!registry.is_current(&ticket));
    }
}
