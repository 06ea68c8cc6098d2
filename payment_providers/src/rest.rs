use log::*;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use shop_common::Secret;

use crate::ProviderApiError;

/// A thin REST client that authenticates every request with HTTP basic auth, as both providers expect.
#[derive(Clone)]
pub(crate) struct RestClient {
    base_url: String,
    username: String,
    password: Option<Secret<String>>,
    client: Client,
}

impl RestClient {
    pub fn new(
        base_url: &str,
        username: &str,
        password: Option<Secret<String>>,
        timeout: std::time::Duration,
    ) -> Result<Self, ProviderApiError> {
        let client =
            Client::builder().timeout(timeout).build().map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self { base_url, username: username.to_string(), password, client })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let password = self.password.as_ref().map(|p| p.reveal().as_str());
        self.client.request(method, self.url(path)).basic_auth(&self.username, password)
    }

    pub async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ProviderApiError> {
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            trace!("REST query successful. {status}");
            response.json::<T>().await.map_err(|e| ProviderApiError::JsonError(e.to_string()))
        } else {
            let message = response.text().await?;
            debug!("REST query failed. {status}. {message}");
            Err(ProviderApiError::QueryError { status: status.as_u16(), message })
        }
    }
}
