//! REST client for the study backend.
//!
//! Every request carries the current bearer token. A 401 triggers exactly
//! one refresh through `/auth/refresh` followed by one replay of the
//! original request; anything else surfaces as an [`ApiError`].

use crate::auth::SessionHandle;
use crate::backend::{QuestionField, StudyBackend};
use crate::config::ClientConfig;
use crate::stream::{decode_chunks, TextStream};
use async_trait::async_trait;
use lingxi_core::{
    ApiError, ApiResult, Category, Chapter, ChapterId, ChatList, ChatListId, ChatMessage,
    CreatedChat, Envelope, ErrorBody, ExistingAdvice, ExistingSummary, FavoriteState,
    KnowledgeGraph, LoginRequest, LoginResponse, NewChapter, NewNote, NewPlan, NewQuestion,
    NewQuestionList, Note, NoteEdit, NoteId, Plan, PlanId, PlanListing, Question, QuestionEdit,
    QuestionId, QuestionList, QuestionListId, RefreshedToken, SuccessRule,
};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const EVENT_STREAM: &str = "text/event-stream";
const DEFAULT_CHAT_NAME: &str = "新对话";

#[derive(Debug, thiserror::Error)]
pub enum RestClientError {
    #[error("HTTP client setup failed: {0}")]
    Build(#[from] reqwest::Error),
}

/// Timeout class and response shape of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Plain,
    /// One JSON response produced by a slow AI generation.
    Generation,
    Streaming,
}

/// Everything needed to send, and if necessary replay, one request.
struct Call<'a> {
    method: Method,
    path: &'a str,
    body: Option<serde_json::Value>,
    kind: Kind,
    authenticated: bool,
}

impl<'a> Call<'a> {
    fn new(method: Method, path: &'a str) -> Self {
        Self {
            method,
            path,
            body: None,
            kind: Kind::Plain,
            authenticated: true,
        }
    }

    fn json<B: Serialize + ?Sized>(mut self, body: &B) -> ApiResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("unserializable request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    fn streaming(mut self) -> Self {
        self.kind = Kind::Streaming;
        self
    }

    fn generation(mut self) -> Self {
        self.kind = Kind::Generation;
        self
    }

    fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    generation_timeout: Duration,
    session: SessionHandle,
}

impl RestClient {
    pub fn new(config: &ClientConfig, session: SessionHandle) -> Result<Self, RestClientError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
            generation_timeout: config.generation_timeout(),
            session,
        })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self.execute(&Call::new(Method::GET, path)).await?;
        parse_json(response).await
    }

    /// GET a list endpoint that wraps rows as `{ data: [...] }`.
    async fn get_list<T: DeserializeOwned>(&self, path: &str, rule: SuccessRule) -> ApiResult<Vec<T>> {
        self.get_json::<Envelope<Vec<T>>>(path)
            .await?
            .into_data_or_default(rule)
    }

    /// GET where a 404 means "nothing stored yet". Accepts the record bare
    /// or under `data`.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Option<T>> {
        let value = match self.get_json::<serde_json::Value>(path).await {
            Ok(value) => value,
            Err(ApiError::Status { status: 404, .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        let record = match value {
            serde_json::Value::Object(mut map) if map.contains_key("data") => {
                map.remove("data").unwrap_or_default()
            }
            other => other,
        };
        if record.is_null() {
            return Ok(None);
        }
        serde_json::from_value(record)
            .map(Some)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Send a mutation whose success is the HTTP status alone.
    async fn send_unit(&self, call: Call<'_>) -> ApiResult<()> {
        self.execute(&call).await.map(|_| ())
    }

    /// Send a mutation that reports success as `code == 1` in the body.
    async fn send_checked(&self, call: Call<'_>) -> ApiResult<()> {
        let response = self.execute(&call).await?;
        parse_json::<Envelope<serde_json::Value>>(response)
            .await?
            .check(SuccessRule::BodyCode)
    }

    async fn open_stream(&self, call: Call<'_>) -> ApiResult<TextStream> {
        let response = self.execute(&call.streaming()).await?;
        Ok(decode_chunks(response.bytes_stream(), transport_error))
    }

    /// Send `call`, refreshing the access token and replaying once on 401.
    async fn execute(&self, call: &Call<'_>) -> ApiResult<reqwest::Response> {
        let response = self.send_once(call).await?;
        if response.status() != StatusCode::UNAUTHORIZED || !call.authenticated {
            return check_status(response, call.authenticated).await;
        }

        tracing::debug!(path = call.path, "Access token rejected, refreshing");
        match self.refresh().await {
            Ok(()) => {
                let replayed = self.send_once(call).await?;
                check_status(replayed, true).await
            }
            Err(err) => {
                tracing::warn!(path = call.path, error = %err, "Token refresh failed");
                if !self.session.remember() {
                    tracing::info!("Session not remembered, signing out");
                    self.session.sign_out();
                }
                Err(ApiError::AuthExpired)
            }
        }
    }

    async fn send_once(&self, call: &Call<'_>) -> ApiResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, call.path);
        let timeout = match call.kind {
            Kind::Plain => self.request_timeout,
            Kind::Generation | Kind::Streaming => self.generation_timeout,
        };
        let mut request = self.client.request(call.method.clone(), url).timeout(timeout);
        if call.kind == Kind::Streaming {
            request = request.header(ACCEPT, HeaderValue::from_static(EVENT_STREAM));
        }
        if call.authenticated {
            if let Some(token) = self.session.access_token() {
                request = request.header(AUTHORIZATION, bearer(&token)?);
            }
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }
        request.send().await.map_err(transport_error)
    }

    async fn refresh(&self) -> ApiResult<()> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or(ApiError::NotAuthenticated)?;
        let response = self
            .client
            .post(format!("{}/auth/refresh", self.base_url))
            .timeout(self.request_timeout)
            .header(AUTHORIZATION, bearer(&refresh_token)?)
            .send()
            .await
            .map_err(transport_error)?;
        let refreshed: RefreshedToken = parse_json(check_status(response, true).await?).await?;
        let access_token = refreshed
            .access_token
            .ok_or_else(|| ApiError::InvalidResponse("refresh returned no access_token".to_string()))?;
        self.session.replace_access_token(access_token);
        tracing::debug!("Access token refreshed");
        Ok(())
    }
}

#[async_trait]
impl StudyBackend for RestClient {
    async fn login(&self, request: &LoginRequest) -> ApiResult<LoginResponse> {
        let call = Call::new(Method::POST, "/auth/login").json(request)?.anonymous();
        let response = self.execute(&call).await?;
        parse_json(response).await
    }

    async fn list_categories(&self) -> ApiResult<Vec<Category>> {
        self.get_list("/notes_service/categories", SuccessRule::HttpStatus)
            .await
    }

    async fn list_chapters(&self) -> ApiResult<Vec<Chapter>> {
        self.get_list("/notes_service/chapter/list", SuccessRule::HttpStatus)
            .await
    }

    async fn create_chapter(&self, chapter: &NewChapter) -> ApiResult<()> {
        self.send_unit(Call::new(Method::POST, "/notes_service/chapter/create").json(chapter)?)
            .await
    }

    async fn update_chapter(&self, chapter_id: ChapterId, chapter: &NewChapter) -> ApiResult<()> {
        let path = format!("/notes_service/chapter/edit/{chapter_id}");
        self.send_unit(Call::new(Method::PUT, &path).json(chapter)?)
            .await
    }

    async fn delete_chapter(&self, chapter_id: ChapterId) -> ApiResult<()> {
        let path = format!("/notes_service/chapter/delete/{chapter_id}");
        self.send_unit(Call::new(Method::PUT, &path)).await
    }

    async fn list_notes(&self, chapter_id: ChapterId) -> ApiResult<Vec<Note>> {
        let path = format!("/notes_service/note/list/{chapter_id}");
        self.get_list(&path, SuccessRule::HttpStatus).await
    }

    async fn create_note(&self, note: &NewNote) -> ApiResult<()> {
        self.send_unit(Call::new(Method::POST, "/notes_service/note/create").json(note)?)
            .await
    }

    async fn update_note(&self, note_id: NoteId, edit: &NoteEdit) -> ApiResult<()> {
        let path = format!("/notes_service/note/edit/{note_id}");
        self.send_unit(Call::new(Method::PUT, &path).json(edit)?)
            .await
    }

    async fn delete_note(&self, note_id: NoteId) -> ApiResult<()> {
        let path = format!("/notes_service/note/delete/{note_id}");
        self.send_unit(Call::new(Method::PUT, &path)).await
    }

    async fn existing_summary(&self, chapter_id: ChapterId) -> ApiResult<Option<ExistingSummary>> {
        let path = format!("/notes_summary_service/notes/summary/get/{chapter_id}");
        self.get_optional(&path).await
    }

    async fn summary_stream(&self, chapter_id: ChapterId) -> ApiResult<TextStream> {
        let path = format!("/notes_summary_service/notes/summary/generate/{chapter_id}");
        self.open_stream(Call::new(Method::POST, &path).json(&serde_json::json!({}))?)
            .await
    }

    async fn knowledge_graph(&self, chapter_id: ChapterId) -> ApiResult<Option<KnowledgeGraph>> {
        let path = format!("/notes_summary_service/knowledge_graph/get/{chapter_id}");
        self.get_optional(&path).await
    }

    async fn generate_knowledge_graph(&self, chapter_id: ChapterId) -> ApiResult<KnowledgeGraph> {
        let path = format!("/notes_summary_service/knowledge_graph/generate/{chapter_id}");
        let call = Call::new(Method::POST, &path)
            .json(&serde_json::json!({}))?
            .generation();
        let response = self.execute(&call).await?;
        parse_json::<Envelope<KnowledgeGraph>>(response)
            .await?
            .into_data(SuccessRule::HttpStatus)
    }

    async fn list_question_lists(&self) -> ApiResult<Vec<QuestionList>> {
        self.get_list("/mistaken_question_service/list/all", SuccessRule::HttpStatus)
            .await
    }

    async fn create_question_list(&self, list: &NewQuestionList) -> ApiResult<()> {
        self.send_unit(Call::new(Method::POST, "/mistaken_question_service/list/create").json(list)?)
            .await
    }

    async fn update_question_list(
        &self,
        list_id: QuestionListId,
        list: &NewQuestionList,
    ) -> ApiResult<()> {
        let path = format!("/mistaken_question_service/list/edit/{list_id}");
        self.send_unit(Call::new(Method::PUT, &path).json(list)?)
            .await
    }

    async fn delete_question_list(&self, list_id: QuestionListId) -> ApiResult<()> {
        let path = format!("/mistaken_question_service/list/delete/{list_id}");
        self.send_unit(Call::new(Method::PUT, &path)).await
    }

    async fn list_questions(&self, list_id: QuestionListId) -> ApiResult<Vec<Question>> {
        let path = format!("/mistaken_question_service/question/list/{list_id}");
        self.get_list(&path, SuccessRule::HttpStatus).await
    }

    async fn create_question(&self, question: &NewQuestion) -> ApiResult<()> {
        self.send_unit(
            Call::new(Method::POST, "/mistaken_question_service/question/create").json(question)?,
        )
        .await
    }

    async fn update_question(&self, question_id: QuestionId, edit: &QuestionEdit) -> ApiResult<()> {
        let path = format!("/mistaken_question_service/question/edit/{question_id}");
        self.send_unit(Call::new(Method::PUT, &path).json(edit)?)
            .await
    }

    async fn delete_question(&self, question_id: QuestionId) -> ApiResult<()> {
        let path = format!("/mistaken_question_service/question/delete/{question_id}");
        self.send_unit(Call::new(Method::PUT, &path)).await
    }

    async fn toggle_favorite(&self, question_id: QuestionId) -> ApiResult<FavoriteState> {
        let path = format!("/mistaken_question_service/question/toggle_favorite/{question_id}");
        let response = self.execute(&Call::new(Method::PUT, &path)).await?;
        parse_json::<Envelope<FavoriteState>>(response)
            .await?
            .into_data(SuccessRule::HttpStatus)
    }

    async fn question_stream(
        &self,
        field: QuestionField,
        question_id: QuestionId,
    ) -> ApiResult<TextStream> {
        let path = format!(
            "/mistaken_question_service/question/{}/{question_id}",
            field.endpoint()
        );
        self.open_stream(Call::new(Method::POST, &path).json(&serde_json::json!({}))?)
            .await
    }

    async fn list_chats(&self) -> ApiResult<Vec<ChatList>> {
        self.get_list("/history_service/list", SuccessRule::BodyCode)
            .await
    }

    async fn chat_detail(&self, list_id: ChatListId) -> ApiResult<Vec<ChatMessage>> {
        let path = format!("/history_service/detail/{list_id}");
        self.get_list(&path, SuccessRule::BodyCode).await
    }

    async fn create_chat(&self, name: &str) -> ApiResult<CreatedChat> {
        let name = if name.trim().is_empty() {
            DEFAULT_CHAT_NAME
        } else {
            name
        };
        let call = Call::new(Method::POST, "/history_service/list/create")
            .json(&serde_json::json!({ "name": name }))?;
        let response = self.execute(&call).await?;
        parse_json::<Envelope<CreatedChat>>(response)
            .await?
            .into_data(SuccessRule::BodyCode)
    }

    async fn delete_chat(&self, list_id: ChatListId) -> ApiResult<()> {
        let path = format!("/history_service/list/delete/{list_id}");
        self.send_checked(Call::new(Method::DELETE, &path)).await
    }

    async fn list_plans(&self) -> ApiResult<Vec<Plan>> {
        let listing: PlanListing = self.get_json("/plan_service/plans").await?;
        Ok(listing.plans)
    }

    async fn create_plan(&self, plan: &NewPlan) -> ApiResult<()> {
        self.send_unit(Call::new(Method::POST, "/plan_service/plans").json(plan)?)
            .await
    }

    async fn update_plan(&self, plan_id: PlanId, plan: &NewPlan) -> ApiResult<()> {
        let path = format!("/plan_service/plans/{plan_id}");
        self.send_unit(Call::new(Method::PUT, &path).json(plan)?)
            .await
    }

    async fn delete_plan(&self, plan_id: PlanId) -> ApiResult<()> {
        let path = format!("/plan_service/plans/{plan_id}");
        self.send_unit(Call::new(Method::DELETE, &path)).await
    }

    async fn existing_plan_advice(&self) -> ApiResult<Option<ExistingAdvice>> {
        self.get_optional("/plan_service/plans/ai_advice/get").await
    }

    async fn plan_advice_stream(&self) -> ApiResult<TextStream> {
        self.open_stream(
            Call::new(Method::POST, "/plan_service/plans/ai_advice").json(&serde_json::json!({}))?,
        )
        .await
    }

    async fn user_advice_stream(&self) -> ApiResult<TextStream> {
        self.open_stream(Call::new(Method::GET, "/auth/user/advice"))
            .await
    }
}

fn bearer(token: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| ApiError::InvalidResponse(format!("unusable token: {e}")))
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(err.to_string())
    }
}

/// Pass 2xx through; turn anything else into a classified error.
async fn check_status(
    response: reqwest::Response,
    authenticated: bool,
) -> ApiResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = ErrorBody::message_from(&text);
    tracing::debug!(status = status.as_u16(), %message, "Request failed");
    Err(status_error(status.as_u16(), message, authenticated))
}

/// A 401 only means an expired session when a token was sent; on the
/// anonymous endpoints it is a plain rejection carrying the server's text.
fn status_error(status: u16, message: String, authenticated: bool) -> ApiError {
    if status == StatusCode::UNAUTHORIZED.as_u16() && !authenticated {
        return ApiError::Status { status, message };
    }
    ApiError::from_status(status, message)
}

async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}
