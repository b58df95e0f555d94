//! Chapters, notes, categories and chapter summaries.

use super::StoreContext;
use crate::cache::{CachePolicy, ReadThroughCache};
use crate::optimistic::{MutationOutcome, OptimisticMutator, RollbackPolicy, Snapshotable, StateCell};
use crate::stream::{DeliveryMode, StreamTarget};
use lingxi_core::{
    ApiResult, Category, Chapter, ChapterId, ExistingSummary, KnowledgeGraph, NewChapter, NewNote,
    Note, NoteEdit, NoteId, NoteStatistics,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A chapter delete that fails with this status still went through on the
/// server side often enough that the local removal is kept.
pub const CHAPTER_DELETE_BENIGN_STATUS: u16 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteState {
    pub categories: Vec<Category>,
    pub chapters: Vec<Chapter>,
    pub current_chapter: Option<ChapterId>,
    /// Notes of the chapter last fetched.
    pub notes: Vec<Note>,
    pub statistics: NoteStatistics,
    pub summaries: HashMap<ChapterId, String>,
    /// Chapters with a summary stream still writing.
    pub summarizing: HashSet<ChapterId>,
    pub knowledge_graphs: HashMap<ChapterId, KnowledgeGraph>,
    /// Chapters waiting on a knowledge graph rebuild.
    pub graphs_in_progress: HashSet<ChapterId>,
}

impl NoteState {
    pub fn chapter(&self, chapter_id: ChapterId) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.chapter_id == chapter_id)
    }

    fn chapter_mut(&mut self, chapter_id: ChapterId) -> Option<&mut Chapter> {
        self.chapters.iter_mut().find(|c| c.chapter_id == chapter_id)
    }

    pub fn is_summarizing(&self, chapter_id: ChapterId) -> bool {
        self.summarizing.contains(&chapter_id)
    }

    /// The newest chapter matching a creation request.
    fn created_chapter(&self, chapter: &NewChapter) -> Option<ChapterId> {
        self.chapters
            .iter()
            .filter(|c| c.name == chapter.name && c.category == chapter.category)
            .map(|c| c.chapter_id)
            .max()
    }

    pub fn category_name(&self, category: &str) -> String {
        category
            .parse::<i64>()
            .ok()
            .and_then(|id| self.categories.iter().find(|c| c.category_id.get() == id))
            .map(|c| c.name.clone())
            .unwrap_or_else(|| lingxi_core::UNCATEGORIZED.to_string())
    }

    fn recompute_statistics(&mut self) {
        self.statistics = NoteStatistics::from_notes(&self.notes);
    }

    /// Optimistic part of a chapter delete.
    fn remove_chapter(&mut self, chapter_id: ChapterId) {
        let removed = self
            .chapters
            .iter()
            .position(|c| c.chapter_id == chapter_id)
            .map(|idx| self.chapters.remove(idx));

        let levels: Vec<_> = self
            .notes
            .iter()
            .filter(|n| n.chapter_id == chapter_id)
            .map(|n| n.comprehension_level)
            .collect();

        if self.current_chapter == Some(chapter_id) {
            self.current_chapter = None;
            self.notes.clear();
        }

        if let Some(chapter) = removed {
            self.statistics
                .notes_count
                .decrement_by(chapter.note_count.get());
            for level in levels {
                self.statistics.forget_level(level);
            }
        }
    }

    /// Optimistic part of a note delete.
    fn remove_note(&mut self, note_id: NoteId) {
        let Some(idx) = self.notes.iter().position(|n| n.note_id == note_id) else {
            return;
        };
        let note = self.notes.remove(idx);
        self.recompute_statistics();
        if let Some(chapter) = self.chapter_mut(note.chapter_id) {
            chapter.note_count.decrement();
        }
    }
}

/// Everything a chapter delete touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDeleteSnapshot {
    pub chapters: Vec<Chapter>,
    pub notes: Vec<Note>,
    pub statistics: NoteStatistics,
    pub current_chapter: Option<ChapterId>,
}

impl Snapshotable for NoteState {
    type Snapshot = ChapterDeleteSnapshot;

    fn snapshot(&self) -> ChapterDeleteSnapshot {
        ChapterDeleteSnapshot {
            chapters: self.chapters.clone(),
            notes: self.notes.clone(),
            statistics: self.statistics,
            current_chapter: self.current_chapter,
        }
    }

    fn restore(&mut self, snapshot: ChapterDeleteSnapshot) {
        self.chapters = snapshot.chapters;
        self.notes = snapshot.notes;
        self.statistics = snapshot.statistics;
        self.current_chapter = snapshot.current_chapter;
    }
}

#[derive(Clone)]
pub struct NoteStore {
    ctx: StoreContext,
    state: StateCell<NoteState>,
    chapter_cache: Arc<ReadThroughCache<(), Vec<Chapter>>>,
}

impl NoteStore {
    pub fn new(ctx: StoreContext) -> Self {
        // Chapters carry counters other views mutate; never trust a cached copy.
        let chapter_cache = ReadThroughCache::new(CachePolicy::AlwaysRefetch, ctx.clock.clone());
        Self {
            ctx,
            state: StateCell::default(),
            chapter_cache: Arc::new(chapter_cache),
        }
    }

    pub fn state(&self) -> NoteState {
        self.state.cloned()
    }

    pub fn chapters(&self) -> Vec<Chapter> {
        self.state.read(|s| s.chapters.clone())
    }

    pub fn notes(&self) -> Vec<Note> {
        self.state.read(|s| s.notes.clone())
    }

    pub fn statistics(&self) -> NoteStatistics {
        self.state.read(|s| s.statistics)
    }

    pub fn current_chapter(&self) -> Option<Chapter> {
        self.state
            .read(|s| s.current_chapter.and_then(|id| s.chapter(id).cloned()))
    }

    pub fn summary(&self, chapter_id: ChapterId) -> Option<String> {
        self.state.read(|s| s.summaries.get(&chapter_id).cloned())
    }

    pub fn is_summarizing(&self, chapter_id: ChapterId) -> bool {
        self.state.read(|s| s.is_summarizing(chapter_id))
    }

    /// The last knowledge graph loaded or generated for a chapter.
    pub fn knowledge_graph(&self, chapter_id: ChapterId) -> Option<KnowledgeGraph> {
        self.state
            .read(|s| s.knowledge_graphs.get(&chapter_id).cloned())
    }

    pub fn set_current_chapter(&self, chapter_id: Option<ChapterId>) {
        self.state.write(|s| s.current_chapter = chapter_id);
    }

    /// Live categories, refreshed from the backend.
    pub async fn categories(&self) -> ApiResult<Vec<Category>> {
        let categories = self.ctx.backend.list_categories().await.inspect_err(|err| {
            tracing::error!(error = %err, "Failed to fetch categories");
            self.ctx
                .notifier
                .error(err.user_message("Failed to fetch categories"));
        })?;
        let live: Vec<_> = categories.iter().filter(|c| !c.is_deleted).cloned().collect();
        self.state.write(|s| s.categories = categories);
        Ok(live)
    }

    pub async fn fetch_chapters(&self) -> ApiResult<Vec<Chapter>> {
        if self.state.read(|s| s.categories.is_empty()) {
            self.categories().await?;
        }
        let backend = self.ctx.backend.clone();
        let chapters = self
            .chapter_cache
            .get((), || async move { backend.list_chapters().await })
            .await
            .inspect_err(|err| tracing::error!(error = %err, "Failed to fetch chapters"))?
            .into_value();
        self.state.write(|s| s.chapters = chapters.clone());
        Ok(chapters)
    }

    /// Create a chapter and select it once it shows up in the refetched list.
    pub async fn create_chapter(&self, chapter: NewChapter) -> ApiResult<()> {
        match self.ctx.backend.create_chapter(&chapter).await {
            Ok(()) => {
                self.fetch_chapters().await?;
                let created = self.state.write(|s| {
                    let created = s.created_chapter(&chapter)?;
                    if s.current_chapter != Some(created) {
                        s.current_chapter = Some(created);
                        s.notes.clear();
                        s.recompute_statistics();
                    }
                    Some(created)
                });
                if created.is_none() {
                    tracing::warn!(name = %chapter.name, "Created chapter missing from refetched list");
                }
                self.ctx.notifier.success("Chapter created");
                Ok(())
            }
            Err(err) => Err(self.report(err, "Failed to create chapter")),
        }
    }

    pub async fn update_chapter(&self, chapter_id: ChapterId, chapter: NewChapter) -> ApiResult<()> {
        match self.ctx.backend.update_chapter(chapter_id, &chapter).await {
            Ok(()) => {
                self.fetch_chapters().await?;
                self.ctx.notifier.success("Chapter updated");
                Ok(())
            }
            Err(err) => Err(self.report(err, "Failed to update chapter")),
        }
    }

    /// Remove a chapter at once; restore everything unless the server
    /// fails with the benign status.
    pub async fn delete_chapter(&self, chapter_id: ChapterId) -> MutationOutcome<()> {
        let mutator = OptimisticMutator::new(
            "delete_chapter",
            RollbackPolicy::RollbackUnlessBenign {
                benign_status: CHAPTER_DELETE_BENIGN_STATUS,
            },
        );
        let outcome = mutator
            .run(
                &self.state,
                |s| s.remove_chapter(chapter_id),
                self.ctx.backend.delete_chapter(chapter_id),
            )
            .await;

        let notifier = &self.ctx.notifier;
        match &outcome {
            MutationOutcome::Confirmed(()) => notifier.success("Chapter deleted"),
            MutationOutcome::SoftAccepted(_) => notifier.warning(
                "Chapter removed locally but the server did not confirm; it may reappear after a refresh",
            ),
            MutationOutcome::RolledBack(_) | MutationOutcome::Failed(_) => {
                notifier.error("Failed to delete chapter, changes restored")
            }
        }
        outcome
    }

    /// Load a chapter's notes and recompute statistics.
    pub async fn fetch_notes(&self, chapter_id: ChapterId) -> ApiResult<Vec<Note>> {
        let notes = self
            .ctx
            .backend
            .list_notes(chapter_id)
            .await
            .inspect_err(|err| tracing::error!(%chapter_id, error = %err, "Failed to fetch notes"))?;
        self.state.write(|s| {
            s.notes = notes.clone();
            s.recompute_statistics();
        });
        Ok(notes)
    }

    pub async fn create_note(&self, note: NewNote) -> ApiResult<()> {
        if let Err(err) = self.ctx.backend.create_note(&note).await {
            return Err(self.report(err, "Failed to create note"));
        }
        self.fetch_notes(note.chapter_id).await?;
        self.state.write(|s| {
            if let Some(chapter) = s.chapter_mut(note.chapter_id) {
                chapter.note_count.increment();
            }
        });
        self.ctx.notifier.success("Note created");
        Ok(())
    }

    pub async fn update_note(&self, note_id: NoteId, edit: NoteEdit) -> ApiResult<()> {
        if let Err(err) = self.ctx.backend.update_note(note_id, &edit).await {
            return Err(self.report(err, "Failed to update note"));
        }
        if let Some(chapter_id) = self.state.read(|s| s.current_chapter) {
            self.fetch_notes(chapter_id).await?;
        }
        self.ctx.notifier.success("Note updated");
        Ok(())
    }

    /// Remove a note locally and keep it removed whatever the server says.
    pub async fn delete_note(&self, note_id: NoteId) -> MutationOutcome<()> {
        let outcome = OptimisticMutator::new("delete_note", RollbackPolicy::KeepOnFailure)
            .run(
                &self.state,
                |s| s.remove_note(note_id),
                self.ctx.backend.delete_note(note_id),
            )
            .await;
        if let MutationOutcome::Confirmed(()) = outcome {
            self.ctx.notifier.success("Note deleted");
        }
        outcome
    }

    pub async fn existing_summary(&self, chapter_id: ChapterId) -> ApiResult<Option<ExistingSummary>> {
        let summary = self.ctx.backend.existing_summary(chapter_id).await?;
        if let Some(existing) = &summary {
            self.state
                .write(|s| s.summaries.insert(chapter_id, existing.summary.clone()));
        }
        Ok(summary)
    }

    /// Stream a fresh summary for a chapter. The text is rebuilt from the
    /// whole response on every delivery.
    pub async fn generate_summary(&self, chapter_id: ChapterId) -> ApiResult<String> {
        self.state.write(|s| {
            s.summarizing.insert(chapter_id);
            s.summaries.insert(chapter_id, String::new());
        });
        let state = self.state.clone();
        let result = self
            .ctx
            .stream_into(
                StreamTarget::ChapterSummary(chapter_id),
                DeliveryMode::Recompute,
                self.ctx.backend.summary_stream(chapter_id),
                "Failed to generate summary, please retry later",
                |text| {
                    state.write(|s| s.summaries.insert(chapter_id, text.to_string()));
                },
            )
            .await;
        if !self
            .ctx
            .streams
            .is_active(StreamTarget::ChapterSummary(chapter_id))
        {
            self.state.write(|s| s.summarizing.remove(&chapter_id));
        }
        result
    }

    /// Load the chapter's stored knowledge graph, if it has one.
    pub async fn fetch_knowledge_graph(&self, chapter_id: ChapterId) -> ApiResult<Option<KnowledgeGraph>> {
        let graph = self
            .ctx
            .backend
            .knowledge_graph(chapter_id)
            .await
            .map_err(|err| self.report(err, "Failed to fetch knowledge graph"))?;
        match &graph {
            Some(graph) => {
                self.state
                    .write(|s| s.knowledge_graphs.insert(chapter_id, graph.clone()));
            }
            None => {
                self.state.write(|s| s.knowledge_graphs.remove(&chapter_id));
                self.ctx
                    .notifier
                    .info("This chapter has no knowledge graph yet");
            }
        }
        Ok(graph)
    }

    /// Rebuild the chapter's knowledge graph. The previous graph stays
    /// visible until the new one arrives and is kept if generation fails.
    pub async fn generate_knowledge_graph(&self, chapter_id: ChapterId) -> ApiResult<KnowledgeGraph> {
        self.state.write(|s| s.graphs_in_progress.insert(chapter_id));
        let result = self.ctx.backend.generate_knowledge_graph(chapter_id).await;
        self.state.write(|s| {
            s.graphs_in_progress.remove(&chapter_id);
            if let Ok(graph) = &result {
                s.knowledge_graphs.insert(chapter_id, graph.clone());
            }
        });
        match result {
            Ok(graph) => {
                tracing::info!(
                    %chapter_id,
                    items = graph.items.len(),
                    relations = graph.relations.len(),
                    "Knowledge graph generated"
                );
                self.ctx.notifier.success("Knowledge graph generated");
                Ok(graph)
            }
            Err(err) => Err(self.report(err, "Failed to generate knowledge graph")),
        }
    }

    fn report(&self, err: lingxi_core::ApiError, message: &str) -> lingxi_core::ApiError {
        tracing::error!(error = %err, "{message}");
        self.ctx.notifier.error(err.user_message(message));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingxi_core::{AggregateCount, ComprehensionLevel};

    fn chapter(id: i64, notes: u64) -> Chapter {
        Chapter {
            chapter_id: ChapterId::new(id),
            name: format!("chapter {id}"),
            category: "1".to_string(),
            note_count: AggregateCount::new(notes),
            created_at: None,
        }
    }

    fn note(id: i64, chapter: i64, level: ComprehensionLevel) -> Note {
        Note {
            note_id: NoteId::new(id),
            chapter_id: ChapterId::new(chapter),
            words: String::new(),
            comprehension_level: level,
            is_image: false,
            image_url: None,
            is_deleted: false,
            created_at: None,
        }
    }

    fn loaded() -> NoteState {
        let notes = vec![
            note(1, 1, ComprehensionLevel::Understood),
            note(2, 1, ComprehensionLevel::Vague),
        ];
        let mut state = NoteState {
            chapters: vec![chapter(1, 2), chapter(2, 5)],
            current_chapter: Some(ChapterId::new(1)),
            notes,
            ..Default::default()
        };
        state.recompute_statistics();
        state
    }

    #[test]
    fn removing_selected_chapter_clears_notes_and_counts() {
        let mut state = loaded();
        state.remove_chapter(ChapterId::new(1));
        assert_eq!(state.chapters.len(), 1);
        assert_eq!(state.current_chapter, None);
        assert!(state.notes.is_empty());
        assert_eq!(state.statistics, NoteStatistics::default());
    }

    #[test]
    fn removing_other_chapter_clamps_total() {
        let mut state = loaded();
        state.remove_chapter(ChapterId::new(2));
        assert_eq!(state.current_chapter, Some(ChapterId::new(1)));
        assert_eq!(state.notes.len(), 2);
        assert_eq!(state.statistics.notes_count, AggregateCount::ZERO);
        assert_eq!(state.statistics.clear_notes_count, AggregateCount::new(1));
    }

    #[test]
    fn removing_note_updates_chapter_count() {
        let mut state = loaded();
        state.remove_note(NoteId::new(2));
        assert_eq!(state.notes.len(), 1);
        assert_eq!(state.chapters[0].note_count, AggregateCount::new(1));
        assert_eq!(state.statistics.vague_notes_count, AggregateCount::ZERO);
    }

    #[test]
    fn snapshot_round_trip_restores_touched_fields() {
        let mut state = loaded();
        let snapshot = state.snapshot();
        state.remove_chapter(ChapterId::new(1));
        state.restore(snapshot);
        assert_eq!(state, loaded());
    }

    #[test]
    fn created_chapter_prefers_newest_match() {
        let mut state = loaded();
        let mut twin = chapter(7, 0);
        twin.name = "chapter 1".to_string();
        state.chapters.push(twin);
        let request = NewChapter {
            name: "chapter 1".to_string(),
            category: "1".to_string(),
        };
        assert_eq!(state.created_chapter(&request), Some(ChapterId::new(7)));

        let other_category = NewChapter {
            category: "2".to_string(),
            ..request
        };
        assert_eq!(state.created_chapter(&other_category), None);
    }

    #[test]
    fn category_name_falls_back() {
        let state = NoteState::default();
        assert_eq!(state.category_name("3"), lingxi_core::UNCATEGORIZED);
    }
}
