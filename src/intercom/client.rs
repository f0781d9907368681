//! HTTP client for the Intercom conversations API

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;

use super::model::{Conversation, SearchRequest, SearchResponse};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.intercom.io";

/// How failed requests are repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub retries: usize,
    /// Pause between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            backoff: Duration::from_secs(5),
        }
    }
}

/// Intercom API client authenticated with a bearer token
pub struct IntercomClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl IntercomClient {
    /// Create a client against the public Intercom API
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            retry: RetryPolicy::default(),
        })
    }

    /// Point the client at another host (a regional endpoint or a test server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Most recent `updated_at` among the first page of conversations
    /// updated strictly after `start`.
    ///
    /// `None` when nothing was updated.
    pub async fn max_updated_at(&self, start: i64) -> Result<Option<i64>> {
        let response = self.search(&SearchRequest::updated_after(start)).await?;
        Ok(response.synced_conversations().map(|c| c.updated_at).max())
    }

    /// Ids of conversations with `start < updated_at <= end`.
    ///
    /// Pages are read from the last to the first: a conversation updated
    /// while we page moves out of the window and shrinks the result set,
    /// which would otherwise shift unseen records onto pages already read.
    pub async fn conversation_ids_updated_between(&self, start: i64, end: i64) -> Result<Vec<String>> {
        let first = self.search(&SearchRequest::updated_between(start, end, 1)).await?;
        let total_pages = first.total_pages();
        tracing::debug!("{} API page(s) found", total_pages);

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for page in (1..=total_pages).rev() {
            let response = self.search(&SearchRequest::updated_between(start, end, page)).await?;
            tracing::debug!("Retrieved data for page {}", page);
            for summary in response.synced_conversations() {
                if seen.insert(summary.id.clone()) {
                    ids.push(summary.id.clone());
                }
            }
        }

        Ok(ids)
    }

    /// Full conversation, including its most recent parts
    pub async fn conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let url = format!("{}/conversations/{}", self.base_url, conversation_id);
        let url = url.as_str();
        self.retrying(|| async move {
            let response = self.http.get(url).bearer_auth(&self.token).send().await?;
            Self::decode(response, url).await
        })
        .await
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let url = format!("{}/conversations/search", self.base_url);
        let url = url.as_str();
        self.retrying(|| async move {
            let response = self
                .http
                .post(url)
                .bearer_auth(&self.token)
                .json(request)
                .send()
                .await?;
            Self::decode(response, url).await
        })
        .await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn retrying<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let backoff = ConstantBuilder::default()
            .with_delay(self.retry.backoff)
            .with_max_times(self.retry.retries);

        call.retry(backoff)
            .when(Error::is_retryable)
            .notify(|err: &Error, after: Duration| {
                tracing::info!("API query failed ({}), backing off {:?} and trying again", err, after);
            })
            .await
            .inspect_err(|err| tracing::error!("Unable to query API: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn quick_retry(retries: usize) -> RetryPolicy {
        RetryPolicy {
            retries,
            backoff: Duration::from_millis(1),
        }
    }

    fn client_for(server: &mockito::ServerGuard, retries: usize) -> IntercomClient {
        IntercomClient::new("test-token")
            .unwrap()
            .with_base_url(server.url())
            .with_retry(quick_retry(retries))
    }

    fn page_body(page: u32, total: u32, entries: &[(&str, i64, &str)]) -> String {
        let conversations: Vec<_> = entries
            .iter()
            .map(|(id, updated_at, source)| json!({"id": id, "updated_at": updated_at, "source": {"type": source}}))
            .collect();
        json!({
            "type": "conversation.list",
            "conversations": conversations,
            "pages": {"type": "pages", "page": page, "total_pages": total}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_max_updated_at_ignores_other_sources() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/conversations/search")
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::PartialJson(json!({"query": {"field": "updated_at", "operator": ">", "value": 100}})))
            .with_status(200)
            .with_body(page_body(1, 1, &[("1", 150, "conversation"), ("2", 900, "email"), ("3", 170, "conversation")]))
            .create_async()
            .await;

        let client = client_for(&server, 0);
        assert_eq!(client.max_updated_at(100).await.unwrap(), Some(170));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_max_updated_at_none_without_updates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/conversations/search")
            .with_status(200)
            .with_body(page_body(1, 0, &[]))
            .create_async()
            .await;

        let client = client_for(&server, 0);
        assert_eq!(client.max_updated_at(0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ids_walk_pages_from_last_to_first() {
        let mut server = mockito::Server::new_async().await;
        let page1 = server
            .mock("POST", "/conversations/search")
            .match_body(Matcher::PartialJson(json!({"pagination": {"page": 1}})))
            .with_status(200)
            .with_body(page_body(1, 2, &[("a", 10, "conversation"), ("b", 11, "email")]))
            .expect(2)
            .create_async()
            .await;
        let page2 = server
            .mock("POST", "/conversations/search")
            .match_body(Matcher::PartialJson(json!({"pagination": {"page": 2}})))
            .with_status(200)
            .with_body(page_body(2, 2, &[("c", 12, "conversation"), ("a", 10, "conversation")]))
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 0);
        let ids = client.conversation_ids_updated_between(0, 20).await.unwrap();

        assert_eq!(ids, vec!["c".to_string(), "a".to_string()]);
        page1.assert_async().await;
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn test_ids_empty_when_no_pages() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/conversations/search")
            .with_status(200)
            .with_body(page_body(1, 0, &[]))
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 0);
        assert!(client.conversation_ids_updated_between(0, 20).await.unwrap().is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_conversation_fetch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/conversations/42")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body(json!({"type": "conversation", "id": "42", "updated_at": 77, "title": "Hi"}).to_string())
            .create_async()
            .await;

        let client = client_for(&server, 0);
        let conversation = client.conversation("42").await.unwrap();
        assert_eq!(conversation.id, "42");
        assert_eq!(conversation.updated_at, 77);
        assert_eq!(conversation.title.as_deref(), Some("Hi"));
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/conversations/42")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server, 2);
        let err = client.conversation("42").await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 500, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/conversations/42")
            .with_status(503)
            .create_async()
            .await;

        let client = IntercomClient::new("test-token")
            .unwrap()
            .with_base_url(server.url())
            .with_retry(RetryPolicy {
                retries: 3,
                backoff: Duration::from_millis(300),
            });
        let call = tokio::spawn(async move { client.conversation("42").await });

        // Bring the endpoint back while the client is backing off
        while !failing.matched_async().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        failing.remove_async().await;
        let healthy = server
            .mock("GET", "/conversations/42")
            .with_status(200)
            .with_body(json!({"type": "conversation", "id": "42", "updated_at": 77}).to_string())
            .expect(1)
            .create_async()
            .await;

        let conversation = call.await.unwrap().unwrap();
        assert_eq!(conversation.id, "42");
        healthy.assert_async().await;
    }

    #[tokio::test]
    async fn test_does_not_retry_bad_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/conversations/42")
            .with_status(200)
            .with_body("not json")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 3);
        let err = client.conversation("42").await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
        mock.assert_async().await;
    }
}
