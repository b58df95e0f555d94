//! Mistaken-question collections and AI-generated answers.

use super::StoreContext;
use crate::backend::QuestionField;
use crate::optimistic::{MutationOutcome, OptimisticMutator, RollbackPolicy, Snapshotable, StateCell};
use crate::stream::DeliveryMode;
use lingxi_core::{
    ApiError, ApiResult, NewQuestion, NewQuestionList, Question, QuestionEdit, QuestionId,
    QuestionList, QuestionListId, QuestionStatistics,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionState {
    pub lists: Vec<QuestionList>,
    pub current_list: Option<QuestionListId>,
    /// Questions of the list last fetched.
    pub questions: Vec<Question>,
    pub statistics: QuestionStatistics,
}

impl QuestionState {
    pub fn question(&self, question_id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }

    fn question_mut(&mut self, question_id: QuestionId) -> Option<&mut Question> {
        self.questions
            .iter_mut()
            .find(|q| q.question_id == question_id)
    }

    fn list_mut(&mut self, list_id: QuestionListId) -> Option<&mut QuestionList> {
        self.lists.iter_mut().find(|l| l.question_list_id == list_id)
    }

    fn recompute_statistics(&mut self) {
        self.statistics = QuestionStatistics::from_questions(&self.questions);
    }

    fn remove_question(&mut self, question_id: QuestionId) {
        let Some(idx) = self
            .questions
            .iter()
            .position(|q| q.question_id == question_id)
        else {
            return;
        };
        let question = self.questions.remove(idx);
        if let Some(list) = self.list_mut(question.question_list_id) {
            list.count.decrement();
        }
        self.recompute_statistics();
    }

    fn set_field(&mut self, question_id: QuestionId, field: QuestionField, text: &str) {
        if let Some(question) = self.question_mut(question_id) {
            let slot = match field {
                QuestionField::Answer => &mut question.answer,
                QuestionField::SimilarQuestion => &mut question.similar_question,
                QuestionField::SimilarAnswer => &mut question.similar_answer,
            };
            slot.clear();
            slot.push_str(text);
        }
    }

    fn set_generating(&mut self, question_id: QuestionId, field: QuestionField, on: bool) {
        if let Some(question) = self.question_mut(question_id) {
            let flag = match field {
                QuestionField::Answer => &mut question.generating.answer,
                QuestionField::SimilarQuestion => &mut question.generating.similar_question,
                QuestionField::SimilarAnswer => &mut question.generating.similar_answer,
            };
            *flag = on;
        }
    }
}

impl Snapshotable for QuestionState {
    type Snapshot = QuestionState;

    fn snapshot(&self) -> QuestionState {
        self.clone()
    }

    fn restore(&mut self, snapshot: QuestionState) {
        *self = snapshot;
    }
}

#[derive(Clone)]
pub struct QuestionStore {
    ctx: StoreContext,
    state: StateCell<QuestionState>,
}

impl QuestionStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            ctx,
            state: StateCell::default(),
        }
    }

    pub fn state(&self) -> QuestionState {
        self.state.cloned()
    }

    pub fn lists(&self) -> Vec<QuestionList> {
        self.state.read(|s| s.lists.clone())
    }

    pub fn questions(&self) -> Vec<Question> {
        self.state.read(|s| s.questions.clone())
    }

    pub fn statistics(&self) -> QuestionStatistics {
        self.state.read(|s| s.statistics)
    }

    pub fn current_list(&self) -> Option<QuestionList> {
        self.state.read(|s| {
            let id = s.current_list?;
            s.lists.iter().find(|l| l.question_list_id == id).cloned()
        })
    }

    pub fn set_current_list(&self, list_id: Option<QuestionListId>) {
        self.state.write(|s| s.current_list = list_id);
    }

    pub async fn fetch_lists(&self) -> ApiResult<Vec<QuestionList>> {
        let lists = self
            .ctx
            .backend
            .list_question_lists()
            .await
            .inspect_err(|err| tracing::error!(error = %err, "Failed to fetch question lists"))?;
        self.state.write(|s| s.lists = lists.clone());
        Ok(lists)
    }

    pub async fn create_list(&self, list: NewQuestionList) -> ApiResult<()> {
        if let Err(err) = self.ctx.backend.create_question_list(&list).await {
            return Err(self.report(err, "Failed to create question list"));
        }
        self.fetch_lists().await?;
        self.ctx.notifier.success("Question list created");
        Ok(())
    }

    /// Rename a list and reload the lists.
    pub async fn update_list(&self, list_id: QuestionListId, list: NewQuestionList) -> ApiResult<()> {
        if let Err(err) = self.ctx.backend.update_question_list(list_id, &list).await {
            return Err(self.report(err, "Failed to update question list"));
        }
        self.fetch_lists().await?;
        self.ctx.notifier.success("Question list updated");
        Ok(())
    }

    pub async fn delete_list(&self, list_id: QuestionListId) -> ApiResult<()> {
        if let Err(err) = self.ctx.backend.delete_question_list(list_id).await {
            return Err(self.report(err, "Failed to delete question list"));
        }
        self.state.write(|s| {
            s.lists.retain(|l| l.question_list_id != list_id);
            if s.current_list == Some(list_id) {
                s.current_list = None;
                s.questions.clear();
            }
            s.recompute_statistics();
        });
        Ok(())
    }

    /// Load a list's questions and make it the current list.
    pub async fn fetch_questions(&self, list_id: QuestionListId) -> ApiResult<Vec<Question>> {
        let questions = self
            .ctx
            .backend
            .list_questions(list_id)
            .await
            .inspect_err(|err| tracing::error!(%list_id, error = %err, "Failed to fetch questions"))?;
        self.state.write(|s| {
            s.current_list = Some(list_id);
            s.questions = questions.clone();
            s.recompute_statistics();
        });
        Ok(questions)
    }

    pub async fn create_question(&self, question: NewQuestion) -> ApiResult<()> {
        if let Err(err) = self.ctx.backend.create_question(&question).await {
            return Err(self.report(err, "Failed to create question"));
        }
        let list_id = question.question_list_id;
        self.state.write(|s| {
            if let Some(list) = s.list_mut(list_id) {
                list.count.increment();
            }
        });
        if self.state.read(|s| s.current_list) == Some(list_id) {
            self.fetch_questions(list_id).await?;
        }
        self.ctx.notifier.success("Question created");
        Ok(())
    }

    /// Edit a question, then reload the current list so the server's
    /// rendition (uploaded image, recognized text) replaces the local one.
    pub async fn update_question(&self, question_id: QuestionId, edit: QuestionEdit) -> ApiResult<()> {
        if edit.is_empty() {
            tracing::debug!(%question_id, "Skipping empty question edit");
            return Ok(());
        }
        if let Err(err) = self.ctx.backend.update_question(question_id, &edit).await {
            return Err(self.report(err, "Failed to update question"));
        }
        if let Some(list_id) = self.state.read(|s| s.current_list) {
            self.fetch_questions(list_id).await?;
        }
        self.ctx.notifier.success("Question updated");
        Ok(())
    }

    /// Remove a question at once. A server failure is returned to the
    /// caller and the removal stays.
    pub async fn delete_question(&self, question_id: QuestionId) -> MutationOutcome<()> {
        let outcome = OptimisticMutator::new("delete_question", RollbackPolicy::Propagate)
            .run(
                &self.state,
                |s| s.remove_question(question_id),
                self.ctx.backend.delete_question(question_id),
            )
            .await;
        match &outcome {
            MutationOutcome::Confirmed(()) => self.state.write(QuestionState::recompute_statistics),
            other => {
                if let Some(err) = other.error() {
                    self.ctx
                        .notifier
                        .error(err.user_message("Failed to delete question"));
                }
            }
        }
        outcome
    }

    /// Flip the favorite flag; the server's answer is the new value.
    pub async fn toggle_favorite(&self, question_id: QuestionId) -> ApiResult<bool> {
        let favorite = self
            .ctx
            .backend
            .toggle_favorite(question_id)
            .await
            .map_err(|err| self.report(err, "Failed to toggle favorite"))?;
        self.state.write(|s| {
            if let Some(question) = s.question_mut(question_id) {
                question.is_favorite = favorite.is_favorite;
            }
            s.recompute_statistics();
        });
        Ok(favorite.is_favorite)
    }

    pub async fn generate_answer(&self, question_id: QuestionId) -> ApiResult<String> {
        self.generate(question_id, QuestionField::Answer).await
    }

    pub async fn generate_similar_question(&self, question_id: QuestionId) -> ApiResult<String> {
        self.generate(question_id, QuestionField::SimilarQuestion)
            .await
    }

    pub async fn generate_similar_answer(&self, question_id: QuestionId) -> ApiResult<String> {
        self.generate(question_id, QuestionField::SimilarAnswer)
            .await
    }

    async fn generate(&self, question_id: QuestionId, field: QuestionField) -> ApiResult<String> {
        let known = self.state.write(|s| {
            if s.question(question_id).is_none() {
                return false;
            }
            s.set_field(question_id, field, "");
            s.set_generating(question_id, field, true);
            true
        });
        if !known {
            tracing::warn!(%question_id, field = field.label(), "Generation requested for unknown question");
            return Err(ApiError::InvalidResponse(format!(
                "question {question_id} is not loaded"
            )));
        }

        let state = self.state.clone();
        let failure = format!("Failed to generate {}", field.label());
        let result = self
            .ctx
            .stream_into(
                field.target(question_id),
                DeliveryMode::Cumulative,
                self.ctx.backend.question_stream(field, question_id),
                &failure,
                |text| state.write(|s| s.set_field(question_id, field, text)),
            )
            .await;

        if !self.ctx.streams.is_active(field.target(question_id)) {
            self.state
                .write(|s| s.set_generating(question_id, field, false));
        }
        result
    }

    fn report(&self, err: ApiError, message: &str) -> ApiError {
        tracing::error!(error = %err, "{message}");
        self.ctx.notifier.error(err.user_message(message));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingxi_core::AggregateCount;

    fn question(id: i64, list: i64, favorite: bool) -> Question {
        Question {
            question_id: QuestionId::new(id),
            question_list_id: QuestionListId::new(list),
            content: format!("q{id}"),
            answer: String::new(),
            is_image: id % 2 == 0,
            image_url: None,
            similar_question: String::new(),
            similar_answer: String::new(),
            is_favorite: favorite,
            created_at: None,
            generating: Default::default(),
        }
    }

    #[test]
    fn removing_question_clamps_list_count() {
        let mut state = QuestionState {
            lists: vec![QuestionList {
                question_list_id: QuestionListId::new(1),
                name: "algebra".to_string(),
                count: AggregateCount::ZERO,
                created_at: None,
            }],
            current_list: Some(QuestionListId::new(1)),
            questions: vec![question(1, 1, true), question(2, 1, false)],
            statistics: QuestionStatistics::default(),
        };
        state.remove_question(QuestionId::new(1));
        assert_eq!(state.lists[0].count, AggregateCount::ZERO);
        assert_eq!(state.statistics.total_count, AggregateCount::new(1));
        assert_eq!(state.statistics.favorite_count, AggregateCount::ZERO);
        assert_eq!(state.statistics.image_count, AggregateCount::new(1));
    }

    #[test]
    fn set_field_replaces_text() {
        let mut state = QuestionState {
            questions: vec![question(4, 1, false)],
            ..Default::default()
        };
        state.set_field(QuestionId::new(4), QuestionField::SimilarAnswer, "x = 2");
        state.set_field(QuestionId::new(4), QuestionField::SimilarAnswer, "x = 2, y = 3");
        assert_eq!(state.questions[0].similar_answer, "x = 2, y = 3");
        assert_eq!(state.questions[0].answer, "");
    }
}
