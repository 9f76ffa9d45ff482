//! GitHub backend tests against a mock API server.

use compost_core::{
    render, CommentHandler, CompostError, HandlerRequest, PlatformCredentials, PlatformHandler,
    UpdateOutcome, DEFAULT_TAG,
};
use compost_platforms::GitHubHandler;
use httpmock::prelude::*;
use serde_json::{json, Value};

fn request(server: &MockServer, target_ref: &str) -> HandlerRequest {
    HandlerRequest {
        project: "owner/repo".to_string(),
        target_ref: target_ref.to_string(),
        credentials: PlatformCredentials::new(Some("ghs-test".into()), Some(server.base_url())),
    }
}

fn node(id: u64, body: &str, created_at: &str, minimized: bool) -> Value {
    json!({
        "id": format!("IC_{id}"),
        "databaseId": id,
        "url": format!("https://github.com/owner/repo/pull/7#issuecomment-{id}"),
        "body": body,
        "isMinimized": minimized,
        "createdAt": created_at,
    })
}

fn comments_page(nodes: Vec<Value>) -> Value {
    json!({
        "data": {
            "repository": {
                "target": {
                    "comments": {
                        "nodes": nodes,
                        "pageInfo": { "hasNextPage": false, "endCursor": null }
                    }
                }
            }
        }
    })
}

#[tokio::test]
async fn find_filters_by_tag_and_reads_minimized_state() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .header("authorization", "Bearer ghs-test")
            .body_includes("pullRequest(number: $target)");
        then.status(200).json_body(comments_page(vec![
            node(1, &render("old", DEFAULT_TAG), "2024-05-01T10:00:00Z", true),
            node(2, "a human review comment", "2024-05-02T10:00:00Z", false),
            node(3, &render("newer", DEFAULT_TAG), "2024-05-03T10:00:00Z", false),
        ]));
    });

    let handler = GitHubHandler::pull_request(&request(&server, "7")).unwrap();
    let found = handler.find_matching_comments(DEFAULT_TAG).await.unwrap();

    list.assert();
    assert_eq!(found.len(), 2);
    assert!(found[0].is_hidden());
    assert!(!found[1].is_hidden());
    assert_eq!(found[1].body(), render("newer", DEFAULT_TAG));
}

#[tokio::test]
async fn create_posts_to_issue_comments() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/owner/repo/issues/7/comments")
            .body_includes("hello");
        then.status(201).json_body(json!({
            "id": 11,
            "node_id": "IC_11",
            "html_url": "https://github.com/owner/repo/pull/7#issuecomment-11",
            "body": "hello",
            "created_at": "2024-05-04T10:00:00Z",
        }));
    });

    let handler = GitHubHandler::pull_request(&request(&server, "7")).unwrap();
    let created = handler.create_comment("hello").await.unwrap();

    create.assert();
    assert_eq!(
        created.reference(),
        "https://github.com/owner/repo/pull/7#issuecomment-11"
    );
    assert!(!created.is_hidden());
}

#[tokio::test]
async fn hide_and_new_minimizes_visible_comments() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql").body_includes("comments(first");
        then.status(200).json_body(comments_page(vec![
            node(1, &render("old", DEFAULT_TAG), "2024-05-01T10:00:00Z", true),
            node(2, &render("old", DEFAULT_TAG), "2024-05-02T10:00:00Z", false),
        ]));
    });
    let minimize = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("minimizeComment")
            .body_includes("IC_2");
        then.status(200).json_body(json!({
            "data": { "minimizeComment": { "clientMutationId": null } }
        }));
    });
    let create = server.mock(|when, then| {
        when.method(POST).path("/repos/owner/repo/issues/7/comments");
        then.status(201).json_body(json!({
            "id": 12,
            "node_id": "IC_12",
            "html_url": "https://github.com/owner/repo/pull/7#issuecomment-12",
            "body": "fresh",
            "created_at": "2024-05-04T10:00:00Z",
        }));
    });

    let platform = GitHubHandler::pull_request(&request(&server, "7")).unwrap();
    let outcome = CommentHandler::new(Box::new(platform), None)
        .hide_and_new_comment("fresh")
        .await
        .unwrap();

    minimize.assert_calls(1);
    create.assert_calls(1);
    assert_eq!(outcome.hidden, 1);
    assert_eq!(outcome.already_hidden, 1);
}

#[tokio::test]
async fn update_edits_the_latest_tagged_comment() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200).json_body(comments_page(vec![
            node(40, &render("v0", DEFAULT_TAG), "2024-05-01T10:00:00Z", false),
            node(42, &render("v1", DEFAULT_TAG), "2024-05-02T10:00:00Z", false),
        ]));
    });
    let patch = server.mock(|when, then| {
        when.method(PATCH)
            .path("/repos/owner/repo/issues/comments/42")
            .body_includes("v2");
        then.status(200).json_body(json!({}));
    });

    let platform = GitHubHandler::pull_request(&request(&server, "7")).unwrap();
    let outcome = CommentHandler::new(Box::new(platform), None)
        .update_comment("v2")
        .await
        .unwrap();

    patch.assert();
    assert!(matches!(outcome, UpdateOutcome::Updated { .. }));
    assert_eq!(
        outcome.reference(),
        "https://github.com/owner/repo/pull/7#issuecomment-42"
    );
}

#[tokio::test]
async fn commit_comments_use_the_commit_endpoints() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("... on Commit")
            .body_includes("abc123");
        then.status(200).json_body(comments_page(vec![node(
            9,
            &render("old", DEFAULT_TAG),
            "2024-05-01T10:00:00Z",
            false,
        )]));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/repos/owner/repo/comments/9");
        then.status(204);
    });
    let create = server.mock(|when, then| {
        when.method(POST).path("/repos/owner/repo/commits/abc123/comments");
        then.status(201).json_body(json!({
            "id": 10,
            "node_id": "CC_10",
            "html_url": "https://github.com/owner/repo/commit/abc123#commitcomment-10",
            "body": "fresh",
            "created_at": "2024-05-04T10:00:00Z",
        }));
    });

    let platform = GitHubHandler::commit(&request(&server, "abc123")).unwrap();
    let outcome = CommentHandler::new(Box::new(platform), None)
        .delete_and_new_comment("fresh")
        .await
        .unwrap();

    delete.assert();
    create.assert();
    assert_eq!(outcome.deleted, 1);
}

#[tokio::test]
async fn graphql_errors_surface_as_api_errors() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200).json_body(json!({
            "data": null,
            "errors": [{ "message": "Could not resolve to a PullRequest" }]
        }));
    });

    let handler = GitHubHandler::pull_request(&request(&server, "7")).unwrap();
    let err = handler.find_matching_comments(DEFAULT_TAG).await.err().unwrap();

    match err {
        CompostError::Api { message, .. } => {
            assert!(message.contains("Could not resolve"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn http_failures_carry_the_status_code() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/repos/owner/repo/issues/7/comments");
        then.status(401).body("Bad credentials");
    });

    let handler = GitHubHandler::pull_request(&request(&server, "7")).unwrap();
    let err = handler.create_comment("hello").await.err().unwrap();

    match err {
        CompostError::Api {
            status, message, ..
        } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Bad credentials");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
