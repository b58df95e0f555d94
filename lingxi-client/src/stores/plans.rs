//! Study plans and AI planning advice.

use super::StoreContext;
use crate::cache::{CachePolicy, ReadThroughCache};
use crate::optimistic::StateCell;
use crate::stream::{DeliveryMode, StreamTarget};
use lingxi_core::{ApiError, ApiResult, ExistingAdvice, NewPlan, Plan, PlanId};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanState {
    pub plans: Vec<Plan>,
    pub advice: String,
    pub advice_in_progress: bool,
}

#[derive(Clone)]
pub struct PlanStore {
    ctx: StoreContext,
    state: StateCell<PlanState>,
    listing: Arc<ReadThroughCache<(), Vec<Plan>>>,
}

impl PlanStore {
    pub fn new(ctx: StoreContext) -> Self {
        let listing = ReadThroughCache::new(CachePolicy::Ttl(ctx.plan_list_ttl), ctx.clock.clone());
        Self {
            ctx,
            state: StateCell::default(),
            listing: Arc::new(listing),
        }
    }

    pub fn state(&self) -> PlanState {
        self.state.cloned()
    }

    pub fn advice(&self) -> String {
        self.state.read(|s| s.advice.clone())
    }

    /// All plans, from cache while fresh.
    pub async fn plans(&self) -> ApiResult<Vec<Plan>> {
        let backend = self.ctx.backend.clone();
        let plans = self
            .listing
            .get((), || async move { backend.list_plans().await })
            .await
            .map_err(|err| self.report(err, "Failed to fetch plans"))?
            .into_value();
        self.state.write(|s| s.plans = plans.clone());
        Ok(plans)
    }

    pub async fn create_plan(&self, plan: NewPlan) -> ApiResult<()> {
        let result = self.ctx.backend.create_plan(&plan).await;
        self.reconcile(result, "Failed to create plan").await
    }

    pub async fn update_plan(&self, plan_id: PlanId, plan: NewPlan) -> ApiResult<()> {
        let result = self.ctx.backend.update_plan(plan_id, &plan).await;
        self.reconcile(result, "Failed to update plan").await
    }

    pub async fn delete_plan(&self, plan_id: PlanId) -> ApiResult<()> {
        let result = self.ctx.backend.delete_plan(plan_id).await;
        self.reconcile(result, "Failed to delete plan").await
    }

    pub async fn existing_advice(&self) -> ApiResult<Option<ExistingAdvice>> {
        let advice = self.ctx.backend.existing_plan_advice().await?;
        if let Some(existing) = &advice {
            self.state.write(|s| s.advice = existing.content.clone());
        }
        Ok(advice)
    }

    /// Stream fresh advice. `progress`, if given, sees the accumulated text
    /// after every appended fragment.
    pub async fn ai_advice(
        &self,
        mut progress: Option<&mut dyn FnMut(&str)>,
    ) -> ApiResult<String> {
        self.state.write(|s| {
            s.advice_in_progress = true;
            s.advice.clear();
        });
        let state = self.state.clone();
        let result = self
            .ctx
            .stream_into(
                StreamTarget::PlanAdvice,
                DeliveryMode::Incremental,
                self.ctx.backend.plan_advice_stream(),
                "Failed to get AI advice",
                |text| {
                    state.write(|s| s.advice = text.to_string());
                    if let Some(callback) = progress.as_deref_mut() {
                        callback(text);
                    }
                },
            )
            .await;
        if !self.ctx.streams.is_active(StreamTarget::PlanAdvice) {
            self.state.write(|s| s.advice_in_progress = false);
        }
        result
    }

    /// Any mutation makes the cached listing unusable; refetch on success.
    async fn reconcile(&self, result: ApiResult<()>, message: &str) -> ApiResult<()> {
        self.listing.invalidate(&());
        match result {
            Ok(()) => {
                self.plans().await?;
                Ok(())
            }
            Err(err) => Err(self.report(err, message)),
        }
    }

    fn report(&self, err: ApiError, message: &str) -> ApiError {
        tracing::error!(error = %err, "{message}");
        self.ctx.notifier.error(err.user_message(message));
        err
    }
}
