use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use order_engine::{ErrorKind, OrderFlowError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("The request cannot be completed. {0}")]
    RuleViolation(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The payment provider could not complete the request. {0}")]
    PaymentProviderError(String),
    #[error("Signature verification failed. {0}")]
    InvalidSignature(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::RuleViolation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
                _ => StatusCode::UNAUTHORIZED,
            },
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::PaymentProviderError(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No access token was provided.")]
    MissingToken,
    #[error("Access token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("Access token is invalid. {0}")]
    ValidationError(String),
    #[error("Access token has expired.")]
    ExpiredToken,
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Could not issue an access token. {0}")]
    CouldNotIssueToken(String),
}

impl From<OrderFlowError> for ServerError {
    fn from(e: OrderFlowError) -> Self {
        let msg = e.to_string();
        match e.kind() {
            ErrorKind::Validation => Self::InvalidRequestBody(msg),
            ErrorKind::BusinessRule => Self::RuleViolation(msg),
            ErrorKind::Authorization => Self::InsufficientPermissions(msg),
            ErrorKind::NotFound => Self::NoRecordFound(msg),
            ErrorKind::ExternalProvider => Self::PaymentProviderError(msg),
            ErrorKind::Signature => Self::InvalidSignature(msg),
            ErrorKind::Internal => {
                error!("💻️ Internal error. {msg}");
                Self::BackendError(msg)
            },
        }
    }
}
