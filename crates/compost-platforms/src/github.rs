//! GitHub backend.
//!
//! Comments are listed through GraphQL because only GraphQL exposes
//! `isMinimized`. Create, update and delete go through REST; hiding uses the
//! `minimizeComment` mutation.

use std::any::Any;
use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compost_core::{
    downcast_comment, has_tag, Comment, CompostError, HandlerRequest, PlatformHandler, Result,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::http::{secret_header, ApiClient};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const PAGE_SIZE: usize = 100;

const COMMENT_FIELDS: &str = "nodes { id databaseId url body isMinimized createdAt } \
                              pageInfo { hasNextPage endCursor }";

const MINIMIZE_MUTATION: &str = "mutation($id: ID!) { \
    minimizeComment(input: {subjectId: $id, classifier: OUTDATED}) { clientMutationId } }";

/// GraphQL endpoint for a REST API URL.
///
/// GitHub Enterprise serves REST at `/api/v3` and GraphQL at `/api/graphql`;
/// github.com serves GraphQL at `/graphql` on the API host.
pub fn graphql_url(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    match trimmed.strip_suffix("/api/v3") {
        Some(host) => format!("{host}/api/graphql"),
        None => format!("{trimmed}/graphql"),
    }
}

/// Split `owner/repo`.
fn split_repository(project: &str) -> Result<(String, String)> {
    match project.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(CompostError::InvalidInput(format!(
            "invalid GitHub repository '{project}', expected owner/repo"
        ))),
    }
}

/// An issue comment on a pull request, or a commit comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubComment {
    pub id: u64,
    pub node_id: String,
    pub url: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub is_minimized: bool,
}

impl Comment for GitHubComment {
    fn body(&self) -> &str {
        &self.body
    }

    fn reference(&self) -> &str {
        &self.url
    }

    fn is_hidden(&self) -> bool {
        self.is_minimized
    }

    fn recency_cmp(&self, other: &dyn Comment) -> Ordering {
        match other.as_any().downcast_ref::<GitHubComment>() {
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
enum GitHubTarget {
    PullRequest(u64),
    Commit(String),
}

// ── GraphQL response shapes ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryData {
    repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
struct RepositoryNode {
    target: Option<CommentsOwner>,
}

#[derive(Debug, Deserialize)]
struct CommentsOwner {
    comments: Option<CommentConnection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentConnection {
    nodes: Vec<CommentNode>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentNode {
    id: String,
    database_id: u64,
    url: String,
    body: String,
    is_minimized: bool,
    created_at: DateTime<Utc>,
}

impl From<CommentNode> for GitHubComment {
    fn from(node: CommentNode) -> Self {
        GitHubComment {
            id: node.database_id,
            node_id: node.id,
            url: node.url,
            body: node.body,
            created_at: node.created_at,
            is_minimized: node.is_minimized,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RestComment {
    id: u64,
    node_id: String,
    html_url: String,
    body: Option<String>,
    created_at: DateTime<Utc>,
}

// ── Handler ───────────────────────────────────────────────────────────────

/// Comments on a GitHub pull request or commit.
#[derive(Debug, Clone)]
pub struct GitHubHandler {
    client: ApiClient,
    api_url: String,
    graphql_url: String,
    owner: String,
    repo: String,
    target: GitHubTarget,
}

impl GitHubHandler {
    /// Handler for the pull request numbered `request.target_ref`.
    pub fn pull_request(request: &HandlerRequest) -> Result<Self> {
        let number = request
            .target_ref
            .trim_start_matches('#')
            .parse::<u64>()
            .map_err(|_| {
                CompostError::InvalidInput(format!(
                    "invalid pull request number '{}'",
                    request.target_ref
                ))
            })?;
        Self::new(request, GitHubTarget::PullRequest(number))
    }

    /// Handler for the commit `request.target_ref`.
    pub fn commit(request: &HandlerRequest) -> Result<Self> {
        if request.target_ref.is_empty() {
            return Err(CompostError::InvalidInput("commit SHA is empty".into()));
        }
        Self::new(request, GitHubTarget::Commit(request.target_ref.clone()))
    }

    fn new(request: &HandlerRequest, target: GitHubTarget) -> Result<Self> {
        let (owner, repo) = split_repository(&request.project)?;
        let token = request
            .credentials
            .token
            .as_deref()
            .ok_or_else(|| CompostError::InvalidInput("GitHub token is required".into()))?;
        let api_url = request
            .credentials
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(AUTHORIZATION, secret_header(&format!("Bearer {token}"))?);

        Ok(Self {
            client: ApiClient::new("github", headers)?,
            graphql_url: graphql_url(&api_url),
            api_url,
            owner,
            repo,
            target,
        })
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.owner, self.repo)
    }

    fn create_url(&self) -> String {
        match &self.target {
            GitHubTarget::PullRequest(number) => {
                format!("{}/issues/{number}/comments", self.repo_url())
            }
            GitHubTarget::Commit(sha) => format!("{}/commits/{sha}/comments", self.repo_url()),
        }
    }

    fn comment_url(&self, id: u64) -> String {
        match &self.target {
            GitHubTarget::PullRequest(_) => format!("{}/issues/comments/{id}", self.repo_url()),
            GitHubTarget::Commit(_) => format!("{}/comments/{id}", self.repo_url()),
        }
    }

    fn list_query(&self) -> (String, Value) {
        let (selector, variable, value) = match &self.target {
            GitHubTarget::PullRequest(number) => (
                "target: pullRequest(number: $target)",
                "Int!",
                json!(number),
            ),
            GitHubTarget::Commit(sha) => (
                "target: object(expression: $target) { ... on Commit",
                "String!",
                json!(sha),
            ),
        };
        // The commit selector opens an inline fragment that needs closing.
        let close = if matches!(self.target, GitHubTarget::Commit(_)) {
            " }"
        } else {
            ""
        };
        let query = format!(
            "query($owner: String!, $repo: String!, $target: {variable}, $after: String) {{ \
             repository(owner: $owner, name: $repo) {{ {selector} {{ \
             comments(first: {PAGE_SIZE}, after: $after) {{ {COMMENT_FIELDS} }} }}{close} }} }}"
        );
        let variables = json!({
            "owner": self.owner,
            "repo": self.repo,
            "target": value,
        });
        (query, variables)
    }

    async fn graphql<T>(&self, operation: &str, query: &str, variables: Value) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let request = self
            .client
            .http()
            .post(&self.graphql_url)
            .json(&json!({ "query": query, "variables": variables }));
        let response: GraphqlResponse<T> = self.client.request_json(operation, request).await?;

        if !response.errors.is_empty() {
            let message = response
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CompostError::Api {
                operation: format!("github api {operation}"),
                status: 200,
                message,
            });
        }

        response.data.ok_or_else(|| CompostError::Api {
            operation: format!("github api {operation}"),
            status: 200,
            message: "response contained no data".to_string(),
        })
    }

    async fn list_comments(&self) -> Result<Vec<GitHubComment>> {
        let (query, base_variables) = self.list_query();
        let mut after: Option<String> = None;
        let mut comments = Vec::new();

        loop {
            let mut variables = base_variables.clone();
            variables["after"] = json!(after);

            let data: RepositoryData = self.graphql("list comments", &query, variables).await?;
            let connection = data
                .repository
                .and_then(|r| r.target)
                .and_then(|t| t.comments)
                .ok_or_else(|| CompostError::Api {
                    operation: "github api list comments".to_string(),
                    status: 404,
                    message: format!("{:?} not found in {}/{}", self.target, self.owner, self.repo),
                })?;

            comments.extend(connection.nodes.into_iter().map(GitHubComment::from));

            match connection.page_info.end_cursor {
                Some(cursor) if connection.page_info.has_next_page => after = Some(cursor),
                _ => break,
            }
        }

        Ok(comments)
    }
}

#[async_trait]
impl PlatformHandler for GitHubHandler {
    async fn find_matching_comments(&self, tag: &str) -> Result<Vec<Box<dyn Comment>>> {
        let comments = self.list_comments().await?;
        debug!("Listed {} GitHub comments", comments.len());

        Ok(comments
            .into_iter()
            .filter(|c| has_tag(&c.body, tag))
            .map(|c| Box::new(c) as Box<dyn Comment>)
            .collect())
    }

    async fn create_comment(&self, body: &str) -> Result<Box<dyn Comment>> {
        let request = self
            .client
            .http()
            .post(self.create_url())
            .json(&json!({ "body": body }));
        let created: RestComment = self.client.request_json("create comment", request).await?;

        Ok(Box::new(GitHubComment {
            id: created.id,
            node_id: created.node_id,
            url: created.html_url,
            body: created.body.unwrap_or_else(|| body.to_string()),
            created_at: created.created_at,
            is_minimized: false,
        }))
    }

    async fn update_comment(&self, comment: &dyn Comment, body: &str) -> Result<()> {
        let comment = downcast_comment::<GitHubComment>(comment, "github")?;
        let request = self
            .client
            .http()
            .patch(self.comment_url(comment.id))
            .json(&json!({ "body": body }));
        self.client.request_empty("update comment", request).await
    }

    async fn delete_comment(&self, comment: &dyn Comment) -> Result<()> {
        let comment = downcast_comment::<GitHubComment>(comment, "github")?;
        let request = self.client.http().delete(self.comment_url(comment.id));
        self.client.request_empty("delete comment", request).await
    }

    async fn hide_comment(&self, comment: &dyn Comment) -> Result<()> {
        let comment = downcast_comment::<GitHubComment>(comment, "github")?;
        let _: Value = self
            .graphql(
                "minimize comment",
                MINIMIZE_MUTATION,
                json!({ "id": comment.node_id }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compost_core::PlatformCredentials;

    fn request(project: &str, target_ref: &str) -> HandlerRequest {
        HandlerRequest {
            project: project.to_string(),
            target_ref: target_ref.to_string(),
            credentials: PlatformCredentials::new(Some("token".into()), None),
        }
    }

    #[test]
    fn test_graphql_url() {
        assert_eq!(graphql_url("https://api.github.com"), "https://api.github.com/graphql");
        assert_eq!(
            graphql_url("https://ghe.example.com/api/v3/"),
            "https://ghe.example.com/api/graphql"
        );
    }

    #[test]
    fn test_invalid_repository_is_rejected() {
        assert!(GitHubHandler::commit(&request("no-slash", "abc")).is_err());
        assert!(GitHubHandler::commit(&request("a/b/c", "abc")).is_err());
    }

    #[test]
    fn test_invalid_pull_request_number_is_rejected() {
        let err = GitHubHandler::pull_request(&request("owner/repo", "abc")).unwrap_err();
        assert!(err.to_string().contains("'abc'"));
    }

    #[test]
    fn test_token_is_required() {
        let mut req = request("owner/repo", "3");
        req.credentials = PlatformCredentials::default();
        assert!(GitHubHandler::pull_request(&req).is_err());
    }

    #[test]
    fn test_commit_query_closes_inline_fragment() {
        let handler = GitHubHandler::commit(&request("owner/repo", "abc")).unwrap();
        let (query, variables) = handler.list_query();
        assert_eq!(query.matches('{').count(), query.matches('}').count());
        assert!(query.contains("... on Commit"));
        assert_eq!(variables["target"], "abc");
    }

    #[test]
    fn test_recency_prefers_newer_then_higher_id() {
        let older = GitHubComment {
            id: 1,
            node_id: "IC_1".into(),
            url: "u1".into(),
            body: String::new(),
            created_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            is_minimized: false,
        };
        let newer = GitHubComment {
            id: 2,
            created_at: "2024-02-01T00:00:00Z".parse().unwrap(),
            ..older.clone()
        };
        assert_eq!(newer.recency_cmp(&older), Ordering::Less);
        assert_eq!(older.recency_cmp(&newer), Ordering::Greater);
    }
}
