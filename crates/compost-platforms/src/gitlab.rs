//! GitLab backend.
//!
//! Merge request comments are notes. Commit comments are handled as commit
//! discussions because the plain commit comment API cannot edit or delete.
//! GitLab has no way to minimize a note, so hiding is not implemented.

use std::any::Any;
use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compost_core::{
    downcast_comment, has_tag, Comment, CompostError, HandlerRequest, PlatformHandler, Result,
};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::http::{secret_header, ApiClient};

pub const DEFAULT_SERVER_URL: &str = "https://gitlab.com";

const PAGE_SIZE: usize = 100;

/// A merge request note or a note in a commit discussion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLabNote {
    pub id: u64,
    /// Set for commit discussion notes.
    pub discussion_id: Option<String>,
    pub url: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Comment for GitLabNote {
    fn body(&self) -> &str {
        &self.body
    }

    fn reference(&self) -> &str {
        &self.url
    }

    fn is_hidden(&self) -> bool {
        false
    }

    fn recency_cmp(&self, other: &dyn Comment) -> Ordering {
        match other.as_any().downcast_ref::<GitLabNote>() {
            Some(other) => other
                .created_at
                .cmp(&self.created_at)
                .then_with(|| other.id.cmp(&self.id)),
            None => Ordering::Equal,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GitLabTarget {
    MergeRequest(u64),
    Commit(String),
}

#[derive(Debug, Deserialize)]
struct NoteResponse {
    id: u64,
    body: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    system: bool,
}

#[derive(Debug, Deserialize)]
struct DiscussionResponse {
    id: String,
    #[serde(default)]
    notes: Vec<NoteResponse>,
}

/// Comments on a GitLab merge request or commit.
#[derive(Debug, Clone)]
pub struct GitLabHandler {
    client: ApiClient,
    server_url: String,
    api_url: String,
    project: String,
    target: GitLabTarget,
}

impl GitLabHandler {
    /// Handler for the merge request with IID `request.target_ref`.
    pub fn merge_request(request: &HandlerRequest) -> Result<Self> {
        let iid = request
            .target_ref
            .trim_start_matches('!')
            .parse::<u64>()
            .map_err(|_| {
                CompostError::InvalidInput(format!(
                    "invalid merge request IID '{}'",
                    request.target_ref
                ))
            })?;
        Self::new(request, GitLabTarget::MergeRequest(iid))
    }

    /// Handler for the commit `request.target_ref`.
    pub fn commit(request: &HandlerRequest) -> Result<Self> {
        if request.target_ref.is_empty() {
            return Err(CompostError::InvalidInput("commit SHA is empty".into()));
        }
        Self::new(request, GitLabTarget::Commit(request.target_ref.clone()))
    }

    fn new(request: &HandlerRequest, target: GitLabTarget) -> Result<Self> {
        if request.project.is_empty() {
            return Err(CompostError::InvalidInput("GitLab project is empty".into()));
        }
        let token = request
            .credentials
            .token
            .as_deref()
            .ok_or_else(|| CompostError::InvalidInput("GitLab token is required".into()))?;
        let server_url = request
            .credentials
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_SERVER_URL)
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert("private-token", secret_header(token)?);

        Ok(Self {
            client: ApiClient::new("gitlab", headers)?,
            api_url: format!("{server_url}/api/v4"),
            server_url,
            project: request.project.clone(),
            target,
        })
    }

    fn target_url(&self) -> String {
        let project = format!(
            "{}/projects/{}",
            self.api_url,
            urlencoding::encode(&self.project)
        );
        match &self.target {
            GitLabTarget::MergeRequest(iid) => format!("{project}/merge_requests/{iid}/notes"),
            GitLabTarget::Commit(sha) => format!("{project}/repository/commits/{sha}/discussions"),
        }
    }

    fn note_url(&self, note: &GitLabNote) -> Result<String> {
        match (&self.target, &note.discussion_id) {
            (GitLabTarget::MergeRequest(_), _) => Ok(format!("{}/{}", self.target_url(), note.id)),
            (GitLabTarget::Commit(_), Some(discussion)) => Ok(format!(
                "{}/{discussion}/notes/{}",
                self.target_url(),
                note.id
            )),
            (GitLabTarget::Commit(_), None) => Err(CompostError::InvalidInput(format!(
                "note {} has no discussion",
                note.id
            ))),
        }
    }

    fn web_url(&self, note_id: u64) -> String {
        let project = format!("{}/{}", self.server_url, self.project);
        match &self.target {
            GitLabTarget::MergeRequest(iid) => {
                format!("{project}/-/merge_requests/{iid}#note_{note_id}")
            }
            GitLabTarget::Commit(sha) => format!("{project}/-/commit/{sha}#note_{note_id}"),
        }
    }

    fn to_note(&self, note: NoteResponse, discussion_id: Option<String>) -> GitLabNote {
        GitLabNote {
            url: self.web_url(note.id),
            id: note.id,
            discussion_id,
            body: note.body,
            created_at: note.created_at,
        }
    }

    async fn list_pages<T>(&self, operation: &str) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let url = self.target_url();
        let mut page = 1_u32;
        let mut rows = Vec::new();

        loop {
            let request = self.client.http().get(&url).query(&[
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
            let chunk: Vec<T> = self.client.request_json(operation, request).await?;
            let chunk_len = chunk.len();
            rows.extend(chunk);
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }

        Ok(rows)
    }

    async fn list_notes(&self) -> Result<Vec<GitLabNote>> {
        let notes = match &self.target {
            GitLabTarget::MergeRequest(_) => self
                .list_pages::<NoteResponse>("list notes")
                .await?
                .into_iter()
                .filter(|n| !n.system)
                .map(|n| self.to_note(n, None))
                .collect(),
            GitLabTarget::Commit(_) => self
                .list_pages::<DiscussionResponse>("list discussions")
                .await?
                .into_iter()
                .flat_map(|d| {
                    let discussion_id = d.id;
                    d.notes
                        .into_iter()
                        .filter(|n| !n.system)
                        .map(move |n| (n, discussion_id.clone()))
                })
                .map(|(n, discussion_id)| self.to_note(n, Some(discussion_id)))
                .collect(),
        };
        Ok(notes)
    }
}

#[async_trait]
impl PlatformHandler for GitLabHandler {
    async fn find_matching_comments(&self, tag: &str) -> Result<Vec<Box<dyn Comment>>> {
        let notes = self.list_notes().await?;
        debug!("Listed {} GitLab notes", notes.len());

        Ok(notes
            .into_iter()
            .filter(|n| has_tag(&n.body, tag))
            .map(|n| Box::new(n) as Box<dyn Comment>)
            .collect())
    }

    async fn create_comment(&self, body: &str) -> Result<Box<dyn Comment>> {
        let request = self
            .client
            .http()
            .post(self.target_url())
            .json(&json!({ "body": body }));

        let note = match &self.target {
            GitLabTarget::MergeRequest(_) => {
                let note: NoteResponse = self.client.request_json("create note", request).await?;
                self.to_note(note, None)
            }
            GitLabTarget::Commit(_) => {
                let discussion: DiscussionResponse = self
                    .client
                    .request_json("create discussion", request)
                    .await?;
                let note = discussion.notes.into_iter().next().ok_or_else(|| {
                    CompostError::Api {
                        operation: "gitlab api create discussion".to_string(),
                        status: 201,
                        message: "discussion was created without a note".to_string(),
                    }
                })?;
                self.to_note(note, Some(discussion.id))
            }
        };

        Ok(Box::new(note))
    }

    async fn update_comment(&self, comment: &dyn Comment, body: &str) -> Result<()> {
        let note = downcast_comment::<GitLabNote>(comment, "gitlab")?;
        let request = self
            .client
            .http()
            .put(self.note_url(note)?)
            .json(&json!({ "body": body }));
        self.client.request_empty("update note", request).await
    }

    async fn delete_comment(&self, comment: &dyn Comment) -> Result<()> {
        let note = downcast_comment::<GitLabNote>(comment, "gitlab")?;
        let request = self.client.http().delete(self.note_url(note)?);
        self.client.request_empty("delete note", request).await
    }

    fn check_hide_supported(&self) -> Result<()> {
        Err(CompostError::NotImplemented {
            platform: "gitlab".to_string(),
            operation: "hide comment".to_string(),
        })
    }

    async fn hide_comment(&self, _comment: &dyn Comment) -> Result<()> {
        self.check_hide_supported()
    }
}
