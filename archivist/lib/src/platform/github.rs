//! GitHub REST adapter.
//!
//! Issue state is toggled by PATCHing the issue resource with a `state`
//! field; comments live under the issue's `comments` collection and are
//! paged with the `page` query parameter.

use std::collections::BTreeMap;

use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::http::{DEFAULT_ATTEMPTS, request_with_retry};
use super::{FetchedIssue, GitService, Platform};
use crate::error::ArchiveError;
use crate::issue::{Comment, IssueState};

#[derive(Debug, Deserialize)]
struct GithubIssue {
    title: String,
    state: String,
    body: Option<String>,
    labels: Vec<GithubLabel>,
}

#[derive(Debug, Deserialize)]
struct GithubLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GithubComment {
    user: GithubUser,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

pub struct GithubClient {
    client: reqwest::Client,
    token: String,
}

impl GithubClient {
    pub fn new(token: impl Into<String>) -> Result<Self, ArchiveError> {
        let token = token.into();
        let mut headers = HeaderMap::new();
        let auth: HeaderValue = format!("Bearer {token}")
            .parse()
            .map_err(|_| ArchiveError::Config("token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self { client, token })
    }
}

impl GitService for GithubClient {
    fn platform(&self) -> Platform {
        Platform::Github
    }

    fn auth_header(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Authorization".to_string(), format!("Bearer {}", self.token)),
            (
                "Accept".to_string(),
                "application/vnd.github+json".to_string(),
            ),
        ])
    }

    async fn fetch_issue(&self, issue_url: &str) -> Result<FetchedIssue, ArchiveError> {
        info!(issue_url, "fetching issue");
        let response = request_with_retry(
            &self.client,
            Method::GET,
            issue_url,
            None,
            None,
            DEFAULT_ATTEMPTS,
        )
        .await?;
        let raw: GithubIssue = response.json().await?;
        Ok(FetchedIssue {
            title: raw.title,
            state: IssueState::parse(&raw.state)?,
            body: raw.body.unwrap_or_default(),
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
        })
    }

    async fn fetch_comments(&self, comments_url: &str) -> Result<Vec<Comment>, ArchiveError> {
        info!(comments_url, "fetching issue comments");
        let mut comments = Vec::new();
        let mut page = 1u32;
        loop {
            let query = [("page", page.to_string())];
            let response = request_with_retry(
                &self.client,
                Method::GET,
                comments_url,
                Some(&query),
                None,
                DEFAULT_ATTEMPTS,
            )
            .await?;
            let raw: Vec<GithubComment> = response.json().await?;
            if raw.is_empty() {
                break;
            }
            comments.extend(raw.into_iter().map(|c| Comment {
                author: c.user.login,
                body: c.body.unwrap_or_default(),
            }));
            page += 1;
        }
        info!(count = comments.len(), "fetched issue comments");
        Ok(comments)
    }

    async fn reopen_issue(&self, issue_url: &str) -> Result<(), ArchiveError> {
        info!(issue_url, "reopening issue");
        request_with_retry(
            &self.client,
            Method::PATCH,
            issue_url,
            None,
            Some(&json!({"state": "open"})),
            DEFAULT_ATTEMPTS,
        )
        .await?;
        Ok(())
    }

    async fn close_issue(&self, issue_url: &str) -> Result<(), ArchiveError> {
        info!(issue_url, "closing issue");
        request_with_retry(
            &self.client,
            Method::PATCH,
            issue_url,
            None,
            Some(&json!({"state": "closed"})),
            DEFAULT_ATTEMPTS,
        )
        .await?;
        Ok(())
    }

    async fn post_comment(&self, comments_url: &str, body: &str) -> Result<(), ArchiveError> {
        info!(comments_url, "posting issue comment");
        request_with_retry(
            &self.client,
            Method::POST,
            comments_url,
            None,
            Some(&json!({"body": body})),
            DEFAULT_ATTEMPTS,
        )
        .await?;
        Ok(())
    }
}
