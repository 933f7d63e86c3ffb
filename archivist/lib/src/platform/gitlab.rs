//! GitLab REST adapter.
//!
//! GitLab toggles issue state by PUTting a `state_event`; comments are
//! "notes". Webhook-triggered pipelines cannot filter by event kind on
//! the GitLab side, so the payload's `event_name` is checked here and
//! non-issue webhooks (e.g. push) bail out before any API call.

use std::collections::BTreeMap;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::http::{DEFAULT_ATTEMPTS, request_with_retry};
use super::{FetchedIssue, GitService, Platform};
use crate::config::Environment;
use crate::error::ArchiveError;
use crate::issue::{Comment, IssueRecord, IssueState, Links};

#[derive(Debug, Deserialize)]
struct GitlabIssue {
    title: String,
    state: String,
    description: Option<String>,
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GitlabNote {
    author: GitlabAuthor,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitlabAuthor {
    username: String,
}

/// The subset of an issue webhook payload the pipeline consumes.
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    object_attributes: WebhookIssue,
    #[serde(default)]
    labels: Vec<WebhookLabel>,
    project: WebhookProject,
}

#[derive(Debug, Deserialize)]
struct WebhookIssue {
    iid: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    /// `close` / `reopen` / `open` / `update`; more precise than `state`
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    state: Option<String>,
    /// Browser-facing issue URL, converted to the API resource
    url: String,
}

#[derive(Debug, Deserialize)]
struct WebhookLabel {
    title: String,
}

#[derive(Debug, Deserialize)]
struct WebhookProject {
    id: u64,
}

/// Whether the webhook that triggered this pipeline is an issue event.
/// A missing payload means the run was not webhook-triggered at all, and
/// the gate lets it pass.
pub fn is_issue_event_webhook(env: &Environment) -> Result<bool, ArchiveError> {
    let Some(raw) = &env.webhook_payload else {
        return Ok(true);
    };
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let event_name = value.get("event_name").and_then(|v| v.as_str());
    if event_name == Some("issue") {
        info!("issue webhook detected");
        Ok(true)
    } else {
        info!(event_name, "non-issue webhook detected, nothing to archive");
        Ok(false)
    }
}

/// Convert a browser-facing issue URL into its API resource.
///
/// `https://{host}/{owner}/{project}/-/issues/{iid}`
/// becomes `https://{host}/api/v4/projects/{project_id}/issues/{iid}`.
pub fn web_url_to_api_url(web_url: &str, project_id: u64) -> Result<String, ArchiveError> {
    let parts: Vec<&str> = web_url.split('/').collect();
    let (scheme, host) = match (parts.first(), parts.get(2)) {
        (Some(scheme), Some(host)) if !host.is_empty() => (*scheme, *host),
        _ => {
            return Err(ArchiveError::Config(format!(
                "unrecognized issue web URL {web_url:?}"
            )));
        }
    };
    let iid = parts.last().filter(|s| !s.is_empty()).ok_or_else(|| {
        ArchiveError::Config(format!("issue web URL has no issue number: {web_url:?}"))
    })?;
    Ok(format!(
        "{scheme}//{host}/api/v4/projects/{project_id}/issues/{iid}"
    ))
}

/// Build the initial issue record from an issue webhook payload.
pub fn issue_from_webhook(
    raw_payload: &str,
    repository: &str,
) -> Result<IssueRecord, ArchiveError> {
    let payload: WebhookPayload = serde_json::from_str(raw_payload)?;
    let attrs = payload.object_attributes;

    // `action` distinguishes update events from close/reopen; older
    // payloads only carry `state`.
    let state_raw = attrs
        .action
        .as_deref()
        .or(attrs.state.as_deref())
        .unwrap_or("open");
    let state = IssueState::parse(state_raw)?;

    let issue_url = web_url_to_api_url(&attrs.url, payload.project.id)?;
    let mut issue = IssueRecord::new(attrs.iid, repository);
    issue.title = attrs.title;
    issue.body = attrs.description.unwrap_or_default();
    issue.state = state;
    issue.labels = payload.labels.into_iter().map(|l| l.title).collect();
    issue.links = Links {
        comments_url: format!("{issue_url}/notes"),
        issue_url,
    };
    Ok(issue)
}

pub struct GitlabClient {
    client: reqwest::Client,
    token: String,
}

impl GitlabClient {
    pub fn new(token: impl Into<String>) -> Result<Self, ArchiveError> {
        let token = token.into();
        let mut headers = HeaderMap::new();
        let auth: HeaderValue = format!("Bearer {token}")
            .parse()
            .map_err(|_| ArchiveError::Config("token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self { client, token })
    }

    async fn set_state(&self, issue_url: &str, state_event: &str) -> Result<(), ArchiveError> {
        request_with_retry(
            &self.client,
            Method::PUT,
            issue_url,
            None,
            Some(&json!({"state_event": state_event})),
            DEFAULT_ATTEMPTS,
        )
        .await?;
        Ok(())
    }
}

impl GitService for GitlabClient {
    fn platform(&self) -> Platform {
        Platform::Gitlab
    }

    fn auth_header(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Authorization".to_string(), format!("Bearer {}", self.token)),
            ("Content-Type".to_string(), "application/json".to_string()),
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
        let raw: GitlabIssue = response.json().await?;
        Ok(FetchedIssue {
            title: raw.title,
            state: IssueState::parse(&raw.state)?,
            body: raw.description.unwrap_or_default(),
            labels: raw.labels,
        })
    }

    async fn fetch_comments(&self, comments_url: &str) -> Result<Vec<Comment>, ArchiveError> {
        info!(comments_url, "fetching issue notes");
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
            let raw: Vec<GitlabNote> = response.json().await?;
            if raw.is_empty() {
                break;
            }
            comments.extend(raw.into_iter().map(|n| Comment {
                author: n.author.username,
                body: n.body.unwrap_or_default(),
            }));
            page += 1;
        }
        info!(count = comments.len(), "fetched issue notes");
        Ok(comments)
    }

    async fn reopen_issue(&self, issue_url: &str) -> Result<(), ArchiveError> {
        info!(issue_url, "reopening issue");
        self.set_state(issue_url, "reopen").await
    }

    async fn close_issue(&self, issue_url: &str) -> Result<(), ArchiveError> {
        info!(issue_url, "closing issue");
        self.set_state(issue_url, "close").await
    }

    async fn post_comment(&self, comments_url: &str, body: &str) -> Result<(), ArchiveError> {
        info!(comments_url, "posting issue note");
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::env_keys;

    fn client() -> GitlabClient {
        GitlabClient::new("test-token").unwrap()
    }

    const ISSUE_WEBHOOK: &str = r##"{
        "event_name": "issue",
        "object_attributes": {
            "iid": 5,
            "title": "#Bug#加载卡死",
            "description": "引入版本：0.99.914",
            "action": "close",
            "state": "closed",
            "url": "https://gitlab.example.com/group/proj/-/issues/5"
        },
        "labels": [{"title": "resolved"}],
        "project": {"id": 42}
    }"##;

    #[test]
    fn webhook_gate_accepts_issue_events() {
        let env = Environment::from_map(HashMap::from([(
            env_keys::WEBHOOK_PAYLOAD,
            ISSUE_WEBHOOK,
        )]));
        assert!(is_issue_event_webhook(&env).unwrap());
    }

    #[test]
    fn webhook_gate_rejects_other_events() {
        let env = Environment::from_map(HashMap::from([(
            env_keys::WEBHOOK_PAYLOAD,
            r#"{"event_name": "push"}"#,
        )]));
        assert!(!is_issue_event_webhook(&env).unwrap());
    }

    #[test]
    fn webhook_gate_passes_without_payload() {
        let env = Environment::from_map(HashMap::new());
        assert!(is_issue_event_webhook(&env).unwrap());
    }

    #[test]
    fn web_url_converts_to_api_resource() {
        let api = web_url_to_api_url("https://gitlab.example.com/group/proj/-/issues/5", 42)
            .unwrap();
        assert_eq!(
            api,
            "https://gitlab.example.com/api/v4/projects/42/issues/5"
        );
    }

    #[test]
    fn malformed_web_url_is_rejected() {
        assert!(web_url_to_api_url("not a url", 42).is_err());
    }

    #[test]
    fn issue_from_webhook_maps_fields() {
        let issue = issue_from_webhook(ISSUE_WEBHOOK, "外部Issue").unwrap();
        assert_eq!(issue.issue_id, 5);
        assert_eq!(issue.state, IssueState::Closed);
        assert_eq!(issue.labels, vec!["resolved".to_string()]);
        assert_eq!(
            issue.links.issue_url,
            "https://gitlab.example.com/api/v4/projects/42/issues/5"
        );
        assert_eq!(
            issue.links.comments_url,
            "https://gitlab.example.com/api/v4/projects/42/issues/5/notes"
        );
    }

    #[test]
    fn update_action_maps_to_update_state() {
        let payload = ISSUE_WEBHOOK.replace(r#""action": "close""#, r#""action": "update""#);
        let issue = issue_from_webhook(&payload, "外部Issue").unwrap();
        assert_eq!(issue.state, IssueState::Update);
    }

    #[tokio::test]
    async fn reopen_puts_state_event() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v4/projects/42/issues/5"))
            .and(body_json(json!({"state_event": "reopen"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/api/v4/projects/42/issues/5", server.uri());
        client().reopen_issue(&url).await.unwrap();
    }

    #[tokio::test]
    async fn close_puts_state_event() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v4/projects/42/issues/5"))
            .and(body_json(json!({"state_event": "close"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/api/v4/projects/42/issues/5", server.uri());
        client().close_issue(&url).await.unwrap();
    }

    #[tokio::test]
    async fn fetch_issue_maps_gitlab_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/42/issues/5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"iid": 5, "title": "t", "state": "opened",
                    "description": null, "labels": ["resolved"]}"#,
            ))
            .mount(&server)
            .await;

        let url = format!("{}/api/v4/projects/42/issues/5", server.uri());
        let issue = client().fetch_issue(&url).await.unwrap();
        assert_eq!(issue.state, IssueState::Open);
        assert_eq!(issue.body, "");
        assert_eq!(issue.labels, vec!["resolved".to_string()]);
    }

    #[tokio::test]
    async fn fetch_comments_maps_notes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"author": {"username": "carol"}, "body": "0.99.918 passed"}]"#,
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/notes"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let url = format!("{}/notes", server.uri());
        let comments = client().fetch_comments(&url).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author, "carol");
    }
}
