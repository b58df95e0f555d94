//! Line-level reduction of stream deliveries into accumulated text.

use super::{classify_line, LineEvent};

/// How deliveries relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Every delivery is the full response so far.
    Cumulative,
    /// Every delivery carries only the newly arrived text.
    Incremental,
    /// Cumulative deliveries; the text is rebuilt from the whole buffer
    /// each time instead of appended to.
    Recompute,
}

/// Notification emitted while a delivery is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamUpdate<'a> {
    /// The accumulated text changed. `fragment` is the payload just added
    /// (empty in recompute mode).
    Text { fragment: &'a str, accumulated: &'a str },
    /// The session reached its terminal state. Emitted exactly once.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Open,
    Done,
}

/// Reduces deliveries into one monotonically growing text.
///
/// Only newline-terminated lines are consumed. The unterminated tail of a
/// delivery is kept as `pending`: in incremental mode it is prefixed onto the
/// next delivery, in cumulative mode the next delivery carries it again and
/// the offset is simply not advanced past it. [`StreamIngestor::finish`]
/// consumes whatever tail remains when the transport closes.
#[derive(Debug, Clone)]
pub struct StreamIngestor {
    mode: DeliveryMode,
    /// Bytes of the cumulative buffer consumed as complete lines.
    processed_len: usize,
    /// Total bytes seen on the wire.
    raw_len: usize,
    pending: String,
    accumulated: String,
    done: bool,
}

impl StreamIngestor {
    pub fn new(mode: DeliveryMode) -> Self {
        Self {
            mode,
            processed_len: 0,
            raw_len: 0,
            pending: String::new(),
            accumulated: String::new(),
            done: false,
        }
    }

    pub fn cumulative() -> Self {
        Self::new(DeliveryMode::Cumulative)
    }

    pub fn incremental() -> Self {
        Self::new(DeliveryMode::Incremental)
    }

    pub fn recompute() -> Self {
        Self::new(DeliveryMode::Recompute)
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn text(&self) -> &str {
        &self.accumulated
    }

    pub fn into_text(self) -> String {
        self.accumulated
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn raw_len(&self) -> usize {
        self.raw_len
    }

    /// Process one delivery, publishing every change to `observer` as it
    /// happens. Deliveries after the terminal state are ignored.
    pub fn push<F>(&mut self, delivery: &str, mut observer: F) -> IngestStatus
    where
        F: FnMut(StreamUpdate<'_>),
    {
        if self.done {
            return IngestStatus::Done;
        }
        match self.mode {
            DeliveryMode::Cumulative => self.push_cumulative(delivery, &mut observer),
            DeliveryMode::Incremental => self.push_incremental(delivery, &mut observer),
            DeliveryMode::Recompute => self.push_recompute(delivery, &mut observer),
        }
        self.status()
    }

    /// The transport closed: consume the unterminated tail and mark the
    /// session done.
    pub fn finish<F>(&mut self, mut observer: F) -> IngestStatus
    where
        F: FnMut(StreamUpdate<'_>),
    {
        if self.done {
            return IngestStatus::Done;
        }
        match self.mode {
            DeliveryMode::Cumulative | DeliveryMode::Incremental => {
                let tail = std::mem::take(&mut self.pending);
                self.consume_line(&tail, &mut observer);
            }
            DeliveryMode::Recompute => {}
        }
        self.mark_done(&mut observer);
        IngestStatus::Done
    }

    /// Stop without consuming anything else. The text so far is kept.
    pub fn abort(&mut self) {
        self.pending.clear();
        self.done = true;
    }

    fn status(&self) -> IngestStatus {
        if self.done {
            IngestStatus::Done
        } else {
            IngestStatus::Open
        }
    }

    fn push_cumulative(&mut self, delivery: &str, observer: &mut dyn FnMut(StreamUpdate<'_>)) {
        self.raw_len = delivery.len();
        let Some(fresh) = delivery.get(self.processed_len..) else {
            tracing::warn!(
                processed = self.processed_len,
                delivered = delivery.len(),
                "Cumulative delivery does not extend the previous one, skipping"
            );
            return;
        };
        let complete_end = fresh.rfind('\n').map_or(0, |idx| idx + 1);
        self.processed_len += complete_end;
        self.pending = fresh[complete_end..].to_string();
        self.consume_lines(&fresh[..complete_end], observer);
    }

    fn push_incremental(&mut self, delivery: &str, observer: &mut dyn FnMut(StreamUpdate<'_>)) {
        self.raw_len += delivery.len();
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.push_str(delivery);
        let complete_end = buffer.rfind('\n').map_or(0, |idx| idx + 1);
        self.pending = buffer[complete_end..].to_string();
        self.consume_lines(&buffer[..complete_end], observer);
    }

    fn push_recompute(&mut self, delivery: &str, observer: &mut dyn FnMut(StreamUpdate<'_>)) {
        self.raw_len = delivery.len();
        let (text, saw_done) = recompute_from_buffer(delivery);
        if text != self.accumulated {
            self.accumulated = text;
            observer(StreamUpdate::Text {
                fragment: "",
                accumulated: &self.accumulated,
            });
        }
        if saw_done {
            self.mark_done(observer);
        }
    }

    fn consume_lines(&mut self, block: &str, observer: &mut dyn FnMut(StreamUpdate<'_>)) {
        for line in block.split_terminator('\n') {
            self.consume_line(line, observer);
            if self.done {
                self.pending.clear();
                break;
            }
        }
    }

    fn consume_line(&mut self, line: &str, observer: &mut dyn FnMut(StreamUpdate<'_>)) {
        match classify_line(line) {
            LineEvent::Payload(payload) => {
                self.accumulated.push_str(payload);
                observer(StreamUpdate::Text {
                    fragment: payload,
                    accumulated: &self.accumulated,
                });
            }
            LineEvent::Metadata(meta) => {
                tracing::debug!(metadata = meta, "Skipping stream metadata line");
            }
            LineEvent::Done => self.mark_done(observer),
            LineEvent::Ignored => {}
        }
    }

    fn mark_done(&mut self, observer: &mut dyn FnMut(StreamUpdate<'_>)) {
        if !self.done {
            self.done = true;
            observer(StreamUpdate::Done);
        }
    }
}

/// Rebuild the text from a complete buffer: concatenate every data payload
/// up to the sentinel, skipping metadata. A pure function of `buffer`.
///
/// Returns the text and whether the sentinel was seen.
pub fn recompute_from_buffer(buffer: &str) -> (String, bool) {
    let mut text = String::new();
    for line in buffer.split('\n') {
        match classify_line(line) {
            LineEvent::Payload(payload) => text.push_str(payload),
            LineEvent::Done => return (text, true),
            LineEvent::Metadata(_) | LineEvent::Ignored => {}
        }
    }
    (text, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Collects every update so tests can inspect what observers saw.
    #[derive(Default)]
    struct Recorder {
        snapshots: Vec<String>,
        done_marks: usize,
    }

    impl Recorder {
        fn observe(&mut self) -> impl FnMut(StreamUpdate<'_>) + '_ {
            move |update: StreamUpdate<'_>| match update {
                StreamUpdate::Text { accumulated, .. } => {
                    self.snapshots.push(accumulated.to_string())
                }
                StreamUpdate::Done => self.done_marks += 1,
            }
        }
    }

    #[test]
    fn cumulative_partial_lines_self_correct() {
        let mut recorder = Recorder::default();
        let mut ingestor = StreamIngestor::cumulative();
        ingestor.push("data: Hel", recorder.observe());
        ingestor.push("data: Hello", recorder.observe());
        ingestor.push("data: Hello world\n[DONE]", recorder.observe());
        ingestor.finish(recorder.observe());

        assert_eq!(ingestor.text(), "Hello world");
        assert_eq!(recorder.done_marks, 1);
        assert!(ingestor.is_done());
    }

    #[test]
    fn cumulative_only_processes_new_suffix() {
        let mut recorder = Recorder::default();
        let mut ingestor = StreamIngestor::cumulative();
        ingestor.push("data: a\n", recorder.observe());
        ingestor.push("data: a\ndata: b\n", recorder.observe());
        ingestor.push("data: a\ndata: b\ndata: c\n", recorder.observe());
        assert_eq!(ingestor.text(), "abc");
        assert_eq!(recorder.snapshots, vec!["a", "ab", "abc"]);
        assert_eq!(ingestor.raw_len(), "data: a\ndata: b\ndata: c\n".len());
    }

    #[test]
    fn incremental_buffers_partial_line() {
        let mut recorder = Recorder::default();
        let mut ingestor = StreamIngestor::incremental();
        ingestor.push("data: Hel", recorder.observe());
        assert_eq!(ingestor.text(), "");
        ingestor.push("lo\ndata: wor", recorder.observe());
        assert_eq!(ingestor.text(), "Hello");
        ingestor.push("ld\n\ndata: [DONE]\n", recorder.observe());
        assert_eq!(ingestor.text(), "Helloworld");
        assert_eq!(recorder.done_marks, 1);
    }

    #[test]
    fn sentinel_stops_current_and_later_deliveries() {
        let mut recorder = Recorder::default();
        let mut ingestor = StreamIngestor::incremental();
        let status = ingestor.push("data: a\ndata: [DONE]\ndata: b\n", recorder.observe());
        assert_eq!(status, IngestStatus::Done);
        ingestor.push("data: c\n", recorder.observe());
        ingestor.finish(recorder.observe());
        assert_eq!(ingestor.text(), "a");
        assert_eq!(recorder.done_marks, 1);
    }

    #[test]
    fn metadata_lines_are_not_appended() {
        let mut ingestor = StreamIngestor::incremental();
        ingestor.push("data: study\ndata: [TOKENS:42]\ndata: hard\n", |_| {});
        assert_eq!(ingestor.text(), "studyhard");
    }

    #[test]
    fn finish_consumes_unterminated_tail() {
        let mut ingestor = StreamIngestor::incremental();
        ingestor.push("data: one\ndata: two", |_| {});
        assert_eq!(ingestor.text(), "one");
        ingestor.finish(|_| {});
        assert_eq!(ingestor.text(), "onetwo");
    }

    #[test]
    fn abort_keeps_accumulated_text() {
        let mut ingestor = StreamIngestor::incremental();
        ingestor.push("data: kept\ndata: lost", |_| {});
        ingestor.abort();
        ingestor.finish(|_| {});
        assert_eq!(ingestor.text(), "kept");
        assert!(ingestor.is_done());
    }

    #[test]
    fn recompute_mode_rebuilds_from_whole_buffer() {
        let mut recorder = Recorder::default();
        let mut ingestor = StreamIngestor::recompute();
        ingestor.push("data: 第一", recorder.observe());
        ingestor.push("data: 第一章\n\ndata: 总结", recorder.observe());
        ingestor.push("data: 第一章\n\ndata: 总结\n\ndata: [DONE]\n\n", recorder.observe());
        assert_eq!(ingestor.text(), "第一章总结");
        assert_eq!(recorder.done_marks, 1);
        assert_eq!(
            recorder.snapshots,
            vec!["第一", "第一章总结"]
        );
    }

    #[test]
    fn recompute_is_idempotent_on_replay() {
        let buffer = "data: a\n\ndata: [TOKENS:3]\ndata: b\ndata: [DONE]\ndata: c\n";
        let first = recompute_from_buffer(buffer);
        let second = recompute_from_buffer(buffer);
        assert_eq!(first, ("ab".to_string(), true));
        assert_eq!(first, second);
    }

    fn payload() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9]{1,8}"
    }

    /// One server event, possibly preceded by keep-alive noise.
    fn event_line() -> impl Strategy<Value = (String, Option<String>)> {
        prop_oneof![
            4 => payload().prop_map(|p| (format!("data: {p}\n"), Some(p))),
            1 => Just((": ping\n".to_string(), None)),
            1 => Just(("\n".to_string(), None)),
            1 => (0u32..500).prop_map(|n| (format!("data: [TOKENS:{n}]\n"), None)),
        ]
    }

    proptest! {
        #[test]
        fn cumulative_text_is_concatenation_of_payloads(
            events in proptest::collection::vec(event_line(), 0..30),
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let body: String = events.iter().map(|(line, _)| line.as_str()).collect();
            let expected: String = events.iter().filter_map(|(_, p)| p.clone()).collect();

            let mut boundaries: Vec<usize> = cuts.iter().map(|i| i.index(body.len() + 1)).collect();
            boundaries.push(body.len());
            boundaries.sort_unstable();

            let mut ingestor = StreamIngestor::cumulative();
            for end in boundaries {
                ingestor.push(&body[..end], |_| {});
            }
            ingestor.finish(|_| {});
            prop_assert_eq!(ingestor.text(), expected.as_str());
        }

        #[test]
        fn incremental_and_cumulative_agree(
            events in proptest::collection::vec(event_line(), 0..30),
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let body: String = events.iter().map(|(line, _)| line.as_str()).collect();
            let mut boundaries: Vec<usize> = cuts.iter().map(|i| i.index(body.len() + 1)).collect();
            boundaries.push(body.len());
            boundaries.sort_unstable();

            let mut cumulative = StreamIngestor::cumulative();
            let mut incremental = StreamIngestor::incremental();
            let mut start = 0;
            for end in boundaries {
                cumulative.push(&body[..end], |_| {});
                incremental.push(&body[start..end], |_| {});
                start = end;
            }
            cumulative.finish(|_| {});
            incremental.finish(|_| {});
            prop_assert_eq!(cumulative.text(), incremental.text());
        }

        #[test]
        fn nothing_after_sentinel_is_appended(
            before in proptest::collection::vec(payload(), 0..10),
            after in proptest::collection::vec(payload(), 1..10),
        ) {
            let mut body = String::new();
            for p in &before {
                body.push_str(&format!("data: {p}\n"));
            }
            body.push_str("data: [DONE]\n");
            let mut later = String::new();
            for p in &after {
                later.push_str(&format!("data: {p}\n"));
            }

            let mut done_marks = 0;
            let mut ingestor = StreamIngestor::cumulative();
            ingestor.push(&format!("{body}{later}"), |u| {
                if u == StreamUpdate::Done {
                    done_marks += 1;
                }
            });
            ingestor.push(&format!("{body}{later}{later}"), |_| {});
            prop_assert_eq!(ingestor.text(), before.concat());
            prop_assert_eq!(done_marks, 1);
        }

        #[test]
        fn recompute_is_a_pure_function_of_the_buffer(
            events in proptest::collection::vec(event_line(), 0..30),
        ) {
            let body: String = events.iter().map(|(line, _)| line.as_str()).collect();
            let mut once = StreamIngestor::recompute();
            once.push(&body, |_| {});
            let mut twice = StreamIngestor::recompute();
            twice.push(&body, |_| {});
            twice.push(&body, |_| {});
            prop_assert_eq!(once.text(), twice.text());
            let rebuilt = recompute_from_buffer(&body).0;
            prop_assert_eq!(once.text(), rebuilt.as_str());
        }
    }
}
