//! Sign-in state and personal study advice.

use super::StoreContext;
use crate::auth::SessionHandle;
use crate::optimistic::StateCell;
use crate::stream::{DeliveryMode, StreamTarget};
use lingxi_core::{ApiResult, LoginRequest, UserIdentity};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserState {
    pub advice: String,
    pub advice_in_progress: bool,
}

#[derive(Clone)]
pub struct UserStore {
    ctx: StoreContext,
    session: SessionHandle,
    state: StateCell<UserState>,
}

impl UserStore {
    pub fn new(ctx: StoreContext, session: SessionHandle) -> Self {
        Self {
            ctx,
            session,
            state: StateCell::default(),
        }
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.session.user()
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_signed_in()
    }

    pub fn advice(&self) -> String {
        self.state.read(|s| s.advice.clone())
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
        remember: bool,
    ) -> ApiResult<UserIdentity> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
            remember,
        };
        let response = self.ctx.backend.login(&request).await.inspect_err(|err| {
            tracing::warn!(username, error = %err, "Login failed");
            let message = err
                .server_message()
                .map_or_else(|| err.user_message("Login failed"), str::to_string);
            self.ctx.notifier.error(message);
        })?;
        let (user, tokens) = response.into_parts();
        self.session.sign_in(user.clone(), tokens, remember);
        tracing::info!(user_id = %user.user_id, "Signed in");
        Ok(user)
    }

    pub fn logout(&self) {
        self.session.sign_out();
        self.state.write(|s| *s = UserState::default());
    }

    /// Stream personalised advice. Token-usage lines are not shown.
    pub async fn user_advice(&self) -> ApiResult<String> {
        self.state.write(|s| {
            s.advice_in_progress = true;
            s.advice.clear();
        });
        let state = self.state.clone();
        let result = self
            .ctx
            .stream_into(
                StreamTarget::UserAdvice,
                DeliveryMode::Incremental,
                self.ctx.backend.user_advice_stream(),
                "Failed to get advice",
                |text| state.write(|s| s.advice = text.to_string()),
            )
            .await;
        if !self.ctx.streams.is_active(StreamTarget::UserAdvice) {
            self.state.write(|s| s.advice_in_progress = false);
        }
        result
    }
}
