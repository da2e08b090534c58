//! HttpPublishApi - publishes to a REST endpoint with reqwest.
//!
//! Wire contract:
//! - `POST {endpoint}/posts` with `Authorization: Bearer <token>` and
//!   `Idempotency-Key: <item id>`; a 2xx answers `{"id": "..."}`.
//! - `GET {endpoint}/posts?client_ref=<item id>` answers
//!   `{"posts": [{"id": "..."}]}`; an empty list or 404 means no such post.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ErrorKind, ExternalId, ItemId, PublishError};
use crate::error::{HeraldError, Result};
use crate::ports::{Credentials, Lookup, PublishApi, PublishRequest};

#[derive(Debug, Serialize)]
struct CreatePost<'a> {
    client_ref: String,
    author: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PostsPage {
    #[serde(default)]
    posts: Vec<PostRef>,
}

pub struct HttpPublishApi {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpPublishApi {
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| HeraldError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn posts_url(&self) -> String {
        format!("{}/posts", self.endpoint)
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
pub fn classify_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        401 | 403 => ErrorKind::Authorization,
        408 | 429 => ErrorKind::Transient,
        500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Permanent,
    }
}

/// Map a transport failure. Once the request may have reached the server,
/// we cannot say whether the post exists.
fn classify_transport(err: &reqwest::Error) -> PublishError {
    if err.is_timeout() {
        PublishError::ambiguous(format!("request timed out: {err}"))
    } else if err.is_connect() || err.is_builder() {
        PublishError::transient(format!("could not reach publish endpoint: {err}"))
    } else {
        PublishError::ambiguous(format!("transport error: {err}"))
    }
}

async fn status_error(response: reqwest::Response) -> PublishError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let mut message = format!("publish endpoint answered {status}");
    if !body.is_empty() {
        message.push_str(": ");
        message.extend(body.chars().take(200));
    }
    PublishError::new(classify_status(status), message)
}

#[async_trait]
impl PublishApi for HttpPublishApi {
    async fn publish(
        &self,
        credentials: &Credentials,
        request: &PublishRequest,
    ) -> std::result::Result<ExternalId, PublishError> {
        let key = request.item_id.to_key();
        let body = CreatePost {
            client_ref: key.clone(),
            author: request.owner_id.as_str(),
            text: &request.content,
        };

        debug!(item_id = %request.item_id, "POST {}", self.posts_url());
        let response = self
            .client
            .post(self.posts_url())
            .bearer_auth(&credentials.access_token)
            .header("Idempotency-Key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        // The post exists remotely at this point; failing to read its id is
        // not a reason to try again.
        let post: PostRef = response
            .json()
            .await
            .map_err(|e| PublishError::ambiguous(format!("unreadable publish response: {e}")))?;
        Ok(ExternalId::new(post.id))
    }

    async fn lookup(
        &self,
        credentials: &Credentials,
        item_id: ItemId,
    ) -> std::result::Result<Lookup, PublishError> {
        let response = self
            .client
            .get(self.posts_url())
            .bearer_auth(&credentials.access_token)
            .query(&[("client_ref", item_id.to_key())])
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(Lookup::Absent),
            status if !status.is_success() => return Err(status_error(response).await),
            _ => {}
        }

        let page: PostsPage = response
            .json()
            .await
            .map_err(|e| PublishError::ambiguous(format!("unreadable lookup response: {e}")))?;
        Ok(match page.posts.into_iter().next() {
            Some(post) => Lookup::Found(ExternalId::new(post.id)),
            None => Lookup::Absent,
        })
    }
}
