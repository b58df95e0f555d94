//! Response envelope adapter.
//!
//! The backend is inconsistent about how it reports success: most endpoints
//! rely on the HTTP status alone, the chat-history endpoints also put
//! `code: 1` in the body. Every endpoint declares its [`SuccessRule`] and
//! this module is the only place that interprets it.

use crate::entities::Plan;
use crate::error::{ApiError, ApiResult};
use serde::Deserialize;

/// Body-level code the chat-history endpoints use for success.
pub const BODY_SUCCESS_CODE: i64 = 1;

/// How an endpoint signals success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessRule {
    /// Any 2xx status is success; the body `code` is ignored.
    HttpStatus,
    /// 2xx status and `code == 1` in the body.
    BodyCode,
}

/// `{ code, msg, data }` wrapper used by most list/detail endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Apply `rule` to a 2xx envelope and pull out `data`.
    ///
    /// A missing `data` is reported as an invalid response; list endpoints
    /// that may omit it should use [`Envelope::into_data_or_default`].
    pub fn into_data(self, rule: SuccessRule) -> ApiResult<T> {
        self.check(rule)?;
        self.data
            .ok_or_else(|| ApiError::InvalidResponse("response has no data field".to_string()))
    }

    pub fn into_data_or_default(self, rule: SuccessRule) -> ApiResult<T>
    where
        T: Default,
    {
        self.check(rule)?;
        Ok(self.data.unwrap_or_default())
    }

    /// Success check without caring about the payload.
    pub fn check(&self, rule: SuccessRule) -> ApiResult<()> {
        match rule {
            SuccessRule::HttpStatus => Ok(()),
            SuccessRule::BodyCode => match self.code {
                Some(BODY_SUCCESS_CODE) => Ok(()),
                code => Err(ApiError::Rejected {
                    code: code.unwrap_or_default(),
                    message: self.msg.clone().unwrap_or_default(),
                }),
            },
        }
    }
}

/// Error body shape for non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
}

impl ErrorBody {
    /// Best-effort message extraction from a raw error body.
    pub fn message_from(raw: &str) -> String {
        serde_json::from_str::<ErrorBody>(raw)
            .ok()
            .and_then(|body| body.msg)
            .unwrap_or_else(|| raw.trim().to_string())
    }
}

/// The plan listing is the one endpoint that wraps its rows as `{ plans }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanListing {
    #[serde(default)]
    pub plans: Vec<Plan>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_rule_ignores_body_code() {
        let envelope: Envelope<Vec<i64>> =
            serde_json::from_str(r#"{"code":0,"msg":"ok","data":[1,2]}"#).unwrap();
        assert_eq!(envelope.into_data(SuccessRule::HttpStatus).unwrap(), vec![1, 2]);
    }

    #[test]
    fn body_code_rule_rejects_non_one() {
        let envelope: Envelope<Vec<i64>> =
            serde_json::from_str(r#"{"code":0,"msg":"denied"}"#).unwrap();
        let err = envelope.into_data(SuccessRule::BodyCode).unwrap_err();
        assert_eq!(
            err,
            ApiError::Rejected {
                code: 0,
                message: "denied".to_string()
            }
        );
    }

    #[test]
    fn missing_data_defaults_for_lists() {
        let envelope: Envelope<Vec<i64>> = serde_json::from_str(r#"{"msg":"ok"}"#).unwrap();
        assert!(envelope
            .into_data_or_default(SuccessRule::HttpStatus)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn envelope_data_needs_no_default_impl() {
        use crate::entities::{CreatedChat, FavoriteState};
        use crate::identity::ChatListId;

        let toggled: Envelope<FavoriteState> =
            serde_json::from_str(r#"{"msg":"ok","data":{"is_favorite":true}}"#).unwrap();
        assert_eq!(
            toggled.into_data(SuccessRule::HttpStatus).unwrap(),
            FavoriteState { is_favorite: true }
        );

        let created: Envelope<CreatedChat> =
            serde_json::from_str(r#"{"code":1,"data":{"chat_history_list_id":8,"name":"新对话"}}"#)
                .unwrap();
        assert_eq!(
            created.into_data(SuccessRule::BodyCode).unwrap().chat_history_list_id,
            ChatListId::new(8)
        );

        let empty: Envelope<CreatedChat> = serde_json::from_str(r#"{"code":1}"#).unwrap();
        assert!(matches!(
            empty.into_data(SuccessRule::BodyCode),
            Err(ApiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn error_body_accepts_message_alias() {
        assert_eq!(ErrorBody::message_from(r#"{"message":"nope"}"#), "nope");
        assert_eq!(ErrorBody::message_from("plain text"), "plain text");
    }
}
