use order_engine::traits::PaymentProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("The provider did not respond in time")]
    Timeout,
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("The provider is not configured. {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for ProviderApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderApiError::Timeout
        } else if e.is_decode() {
            ProviderApiError::JsonError(e.to_string())
        } else if e.is_builder() {
            ProviderApiError::RestRequestError(e.to_string())
        } else {
            ProviderApiError::RestResponseError(e.to_string())
        }
    }
}

impl From<ProviderApiError> for PaymentProviderError {
    fn from(e: ProviderApiError) -> Self {
        match e {
            ProviderApiError::Timeout => PaymentProviderError::Timeout,
            ProviderApiError::QueryError { status, message } => PaymentProviderError::Rejected { status, message },
            ProviderApiError::JsonError(s) => PaymentProviderError::MalformedResponse(s),
            ProviderApiError::NotConfigured(s) => PaymentProviderError::NotConfigured(s),
            ProviderApiError::Initialization(s) |
            ProviderApiError::RestRequestError(s) |
            ProviderApiError::RestResponseError(s) => PaymentProviderError::Http(s),
        }
    }
}
