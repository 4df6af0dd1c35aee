//! JSON body helper.
//!
//! A body is read as a JSON object only when the content type is
//! `application/json`. An empty, undecodable or non-object body reads as an
//! empty object, so a handler only fails on the arguments it actually needs.

use crate::domain::error::ApiError;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

const JSON_MIME: &str = "application/json";

/// Request body parsed as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonBody(pub Map<String, Value>);

impl JsonBody {
    /// Parse `body` sent with `content_type`.
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> Self {
        let is_json = content_type
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with(JSON_MIME))
            .unwrap_or(false);
        if !is_json {
            return Self::default();
        }

        let Ok(text) = std::str::from_utf8(body) else {
            return Self::default();
        };
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }

    /// A required argument. Missing or mistyped is `bad_arguments`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ApiError> {
        let value = self
            .0
            .get(name)
            .ok_or_else(|| ApiError::bad_arguments(format!("Missing {name}")))?;
        serde_json::from_value(value.clone())
            .map_err(|_| ApiError::bad_arguments(format!("Invalid {name}")))
    }

    /// An optional argument, `default` when missing.
    pub fn get_or<T: DeserializeOwned>(&self, name: &str, default: T) -> Result<T, ApiError> {
        if self.0.contains_key(name) {
            self.get(name)
        } else {
            Ok(default)
        }
    }
}

#[async_trait]
impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|_| ApiError::bad_arguments("Cannot read request body"))?;
        Ok(Self::parse(content_type.as_deref(), &body))
    }
}
