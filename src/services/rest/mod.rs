// src/services/rest/mod.rs

//! REST clients for the managed services.
//!
//! All clients share one authorized `reqwest::Client`. Error statuses are
//! mapped onto [`AppError`]: 404 becomes `NotFound`, 409 `AlreadyExists`,
//! anything else a `Service` error carrying the API's message.

mod bigquery;
mod catalog;
mod dlp;
mod pubsub;

use std::sync::Arc;

use log::debug;
use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::JobConfig;
use crate::services::Services;
use crate::utils::http::create_async_client;

pub use bigquery::RestWarehouse;
pub use catalog::RestCatalog;
pub use dlp::RestDlp;
pub use pubsub::RestSubscription;

/// Build every service client from the job configuration.
pub fn services(config: &JobConfig) -> Result<Services> {
    let http = create_async_client(&config.api)?;
    let api = &config.api;

    Ok(Services {
        catalog: Arc::new(RestCatalog::new(ApiClient::new(
            http.clone(),
            &api.catalog_endpoint,
            "catalog",
        ))),
        warehouse: Arc::new(RestWarehouse::new(
            ApiClient::new(http.clone(), &api.bigquery_endpoint, "bigquery"),
            ApiClient::new(http.clone(), &api.bigquery_upload_endpoint, "bigquery"),
        )),
        dlp: Arc::new(RestDlp::new(ApiClient::new(
            http.clone(),
            &api.dlp_endpoint,
            "dlp",
        ))),
        subscription: Arc::new(RestSubscription::new(
            ApiClient::new(http, &api.pubsub_endpoint, "pubsub"),
            &config.project_id,
            &config.dlp.subscription_id,
        )),
    })
}

/// JSON client for one API base URL.
#[derive(Clone)]
pub(crate) struct ApiClient {
    http: reqwest::Client,
    base: String,
    service: &'static str,
}

impl ApiClient {
    pub(crate) fn new(http: reqwest::Client, base: &str, service: &'static str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            service,
        }
    }

    /// Absolute URL for a resource path. Paths may contain `:` verbs
    /// (`entries:lookup`), so they are appended rather than joined.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.base,
            path.trim_start_matches('/')
        ))?)
    }

    pub(crate) fn url_with(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        self.decode(response).await
    }

    pub(crate) async fn post<B, T>(&self, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POST {}", url);
        let response = self.http.post(url).json(body).send().await?;
        self.decode(response).await
    }

    pub(crate) async fn post_raw<T: DeserializeOwned>(
        &self,
        url: Url,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<T> {
        debug!("POST {} ({} bytes)", url, body.len());
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        self.decode(response).await
    }

    pub(crate) async fn patch<B, T>(&self, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("PATCH {}", url);
        let response = self.http.patch(url).json(body).send().await?;
        self.decode(response).await
    }

    pub(crate) async fn delete(&self, url: Url) -> Result<()> {
        debug!("DELETE {}", url);
        let response = self.http.delete(url).send().await?;
        self.check(response).await?;
        Ok(())
    }

    /// Follow `nextPageToken` until the listing is exhausted.
    pub(crate) async fn get_pages<P, T, F>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        mut split: F,
    ) -> Result<Vec<T>>
    where
        P: DeserializeOwned,
        F: FnMut(P) -> (Vec<T>, Option<String>),
    {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut pairs = query.to_vec();
            if let Some(token) = &token {
                pairs.push(("pageToken", token.as_str()));
            }
            let page: P = self.get(self.url_with(path, &pairs)?).await?;
            let (batch, next) = split(page);
            items.extend(batch);
            match next.filter(|t| !t.is_empty()) {
                Some(next) => token = Some(next),
                None => return Ok(items),
            }
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let response = self.check(response).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::from_value(Value::Object(Default::default()))?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or(body);
        Err(match status {
            StatusCode::NOT_FOUND => AppError::not_found(format!("{}: {}", self.service, message)),
            StatusCode::CONFLICT => {
                AppError::already_exists(format!("{}: {}", self.service, message))
            }
            _ => AppError::service(self.service, format!("{status}: {message}")),
        })
    }
}

/// `error.message` of a Google API error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(reqwest::Client::new(), base, "catalog")
    }

    #[test]
    fn test_url_keeps_colon_verbs() {
        let url = client("https://datacatalog.googleapis.com/v1/")
            .url_with(
                "entries:lookup",
                &[("linkedResource", "//bigquery.googleapis.com/projects/p/datasets/d")],
            )
            .unwrap();
        assert_eq!(url.path(), "/v1/entries:lookup");
        assert_eq!(
            url.query_pairs().next().unwrap().1,
            "//bigquery.googleapis.com/projects/p/datasets/d"
        );
    }

    #[test]
    fn test_error_message_extracted() {
        let body = r#"{"error": {"code": 404, "message": "Requested entity was not found."}}"#;
        assert_eq!(
            error_message(body).as_deref(),
            Some("Requested entity was not found.")
        );
        assert_eq!(error_message("<html>"), None);
    }
}
