//! Request bodies accepted by the relay, and their validation

use async_trait::async_trait;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::{Validate, ValidationErrors};

use crate::prompts::{PromptClarification, PromptContext};
use crate::stage::StageKind;

/// Minimum length of every free-text field
pub const MIN_FIELD_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ClarifyRequest {
    #[validate(length(min = 10, message = "Prompt must be at least 10 characters"))]
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClarificationInput {
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ArchitectureRequest {
    #[validate(length(min = 10, message = "Prompt must be at least 10 characters"))]
    pub prompt: String,
    #[serde(default)]
    pub clarifications: Vec<ClarificationInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DatabaseRequest {
    #[validate(length(min = 10, message = "Intent must be at least 10 characters"))]
    pub intent: String,
    #[validate(length(min = 10, message = "Architecture must be at least 10 characters"))]
    pub architecture: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ApiDesignRequest {
    #[validate(length(min = 10, message = "Intent must be at least 10 characters"))]
    pub intent: String,
    #[validate(length(min = 10, message = "Architecture must be at least 10 characters"))]
    pub architecture: String,
    #[validate(length(min = 10, message = "Database must be at least 10 characters"))]
    pub database: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BlueprintRequest {
    #[validate(length(min = 10, message = "Intent must be at least 10 characters"))]
    pub intent: String,
    #[validate(length(min = 10, message = "Architecture must be at least 10 characters"))]
    pub architecture: String,
    #[validate(length(min = 10, message = "Database must be at least 10 characters"))]
    pub database: String,
    #[validate(length(min = 10, message = "API design must be at least 10 characters"))]
    pub api: String,
}

/// A request body that drives one stage's prompt
pub trait StagePayload: DeserializeOwned + Validate + Send + 'static {
    const STAGE: StageKind;

    fn prompt_context(&self) -> PromptContext;
}

impl StagePayload for ClarifyRequest {
    const STAGE: StageKind = StageKind::Clarify;

    fn prompt_context(&self) -> PromptContext {
        PromptContext::new(&self.prompt)
    }
}

impl StagePayload for ArchitectureRequest {
    const STAGE: StageKind = StageKind::Architecture;

    fn prompt_context(&self) -> PromptContext {
        PromptContext {
            clarifications: self
                .clarifications
                .iter()
                .map(|c| PromptClarification {
                    question: c.question.clone(),
                    answer: c.answer.clone(),
                })
                .collect(),
            ..PromptContext::new(&self.prompt)
        }
    }
}

impl StagePayload for DatabaseRequest {
    const STAGE: StageKind = StageKind::Database;

    fn prompt_context(&self) -> PromptContext {
        PromptContext {
            architecture: Some(self.architecture.clone()),
            ..PromptContext::new(&self.intent)
        }
    }
}

impl StagePayload for ApiDesignRequest {
    const STAGE: StageKind = StageKind::Api;

    fn prompt_context(&self) -> PromptContext {
        PromptContext {
            architecture: Some(self.architecture.clone()),
            database: Some(self.database.clone()),
            ..PromptContext::new(&self.intent)
        }
    }
}

impl StagePayload for BlueprintRequest {
    const STAGE: StageKind = StageKind::Blueprint;

    fn prompt_context(&self) -> PromptContext {
        PromptContext {
            architecture: Some(self.architecture.clone()),
            database: Some(self.database.clone()),
            api: Some(self.api.clone()),
            ..PromptContext::new(&self.intent)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

/// A request rejected before any model call; always a 400
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub success: bool,
    pub error: String,
    pub details: Vec<FieldIssue>,
}

impl ValidationFailure {
    pub fn from_errors(errors: &ValidationErrors) -> Self {
        let mut details: Vec<FieldIssue> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                let field = field.to_string();
                errs.iter().map(move |e| FieldIssue {
                    field: field.clone(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        debug!(issue_count = details.len(), "ValidationFailure::from_errors: called");

        Self {
            success: false,
            error: "Invalid request".to_string(),
            details,
        }
    }

    pub fn from_rejection(rejection: JsonRejection) -> Self {
        debug!(%rejection, "ValidationFailure::from_rejection: called");
        Self {
            success: false,
            error: "Invalid request body".to_string(),
            details: vec![FieldIssue {
                field: "body".to_string(),
                message: rejection.body_text(),
            }],
        }
    }
}

impl IntoResponse for ValidationFailure {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// `Json<T>` that also runs `T::validate`, rejecting with [`ValidationFailure`]
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ValidationFailure;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ValidationFailure::from_rejection)?;
        value.validate().map_err(|e| ValidationFailure::from_errors(&e))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_fields_report_each_field() {
        let req = ApiDesignRequest {
            intent: "short".to_string(),
            architecture: "long enough architecture".to_string(),
            database: "tiny".to_string(),
        };

        let failure = ValidationFailure::from_errors(&req.validate().unwrap_err());

        assert!(!failure.success);
        assert_eq!(
            failure.details,
            vec![
                FieldIssue {
                    field: "database".to_string(),
                    message: "Database must be at least 10 characters".to_string()
                },
                FieldIssue {
                    field: "intent".to_string(),
                    message: "Intent must be at least 10 characters".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_valid_request_passes() {
        let req = ClarifyRequest {
            prompt: "A marketplace for used bikes".to_string(),
        };
        assert!(req.validate().is_ok());
        assert!(req.prompt.len() >= MIN_FIELD_LEN);
    }

    #[test]
    fn test_clarifications_default_to_empty() {
        let req: ArchitectureRequest = serde_json::from_str(r#"{"prompt":"A marketplace for used bikes"}"#).unwrap();
        assert!(req.clarifications.is_empty());

        let req: ArchitectureRequest = serde_json::from_str(
            r#"{"prompt":"A marketplace for used bikes","clarifications":[{"question":"Who sells?"}]}"#,
        )
        .unwrap();
        assert_eq!(req.clarifications[0].answer, "");
    }

    #[test]
    fn test_prompt_context_carries_prior_artifacts() {
        let req = BlueprintRequest {
            intent: "A marketplace for used bikes".to_string(),
            architecture: "arch text".to_string(),
            database: "db text".to_string(),
            api: "api text".to_string(),
        };
        let ctx = req.prompt_context();
        assert_eq!(ctx.intent, "A marketplace for used bikes");
        assert_eq!(ctx.api.as_deref(), Some("api text"));
        assert_eq!(BlueprintRequest::STAGE, StageKind::Blueprint);
    }
}
