//! GitLab backend tests against a mock API server.

use compost_core::{
    render, CommentHandler, HandlerRequest, PlatformCredentials, PlatformHandler, DEFAULT_TAG,
};
use compost_platforms::GitLabHandler;
use httpmock::prelude::*;
use serde_json::{json, Value};

fn request(server: &MockServer, target_ref: &str) -> HandlerRequest {
    HandlerRequest {
        project: "group/project".to_string(),
        target_ref: target_ref.to_string(),
        credentials: PlatformCredentials::new(Some("glpat-test".into()), Some(server.base_url())),
    }
}

fn note(id: u64, body: &str, created_at: &str, system: bool) -> Value {
    json!({
        "id": id,
        "body": body,
        "created_at": created_at,
        "system": system,
    })
}

#[tokio::test]
async fn merge_request_find_skips_system_notes() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET)
            .path_includes("/merge_requests/7/notes")
            .header("private-token", "glpat-test")
            .query_param("page", "1");
        then.status(200).json_body(json!([
            note(1, &render("added 1 commit", DEFAULT_TAG), "2024-05-01T10:00:00.000Z", true),
            note(2, &render("status", DEFAULT_TAG), "2024-05-02T10:00:00.000Z", false),
            note(3, "looks good", "2024-05-03T10:00:00.000Z", false),
        ]));
    });

    let handler = GitLabHandler::merge_request(&request(&server, "7")).unwrap();
    let found = handler.find_matching_comments(DEFAULT_TAG).await.unwrap();

    list.assert();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].body(), render("status", DEFAULT_TAG));
    assert!(found[0]
        .reference()
        .ends_with("/group/project/-/merge_requests/7#note_2"));
}

#[tokio::test]
async fn merge_request_update_puts_the_note() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path_includes("/merge_requests/7/notes");
        then.status(200).json_body(json!([note(
            31,
            &render("v1", DEFAULT_TAG),
            "2024-05-01T10:00:00.000Z",
            false
        )]));
    });
    let put = server.mock(|when, then| {
        when.method(PUT)
            .path_includes("/merge_requests/7/notes/31")
            .body_includes("v2");
        then.status(200).json_body(note(
            31,
            &render("v2", DEFAULT_TAG),
            "2024-05-01T10:00:00.000Z",
            false,
        ));
    });

    let platform = GitLabHandler::merge_request(&request(&server, "7")).unwrap();
    let outcome = CommentHandler::new(Box::new(platform), None)
        .update_comment("v2")
        .await
        .unwrap();

    put.assert();
    assert!(outcome.reference().ends_with("#note_31"));
}

#[tokio::test]
async fn commit_delete_and_new_uses_discussions() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path_includes("/repository/commits/abc123/discussions");
        then.status(200).json_body(json!([{
            "id": "d1",
            "notes": [note(5, &render("old", DEFAULT_TAG), "2024-05-01T10:00:00.000Z", false)]
        }]));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE)
            .path_includes("/repository/commits/abc123/discussions/d1/notes/5");
        then.status(204);
    });
    let create = server.mock(|when, then| {
        when.method(POST)
            .path_includes("/repository/commits/abc123/discussions")
            .body_includes("fresh");
        then.status(201).json_body(json!({
            "id": "d2",
            "notes": [note(6, "fresh", "2024-05-02T10:00:00.000Z", false)]
        }));
    });

    let platform = GitLabHandler::commit(&request(&server, "abc123")).unwrap();
    let outcome = CommentHandler::new(Box::new(platform), None)
        .delete_and_new_comment("fresh")
        .await
        .unwrap();

    delete.assert();
    create.assert();
    assert_eq!(outcome.deleted, 1);
    assert!(outcome
        .created
        .ends_with("/group/project/-/commit/abc123#note_6"));
}

#[tokio::test]
async fn hide_and_new_fails_before_listing_notes() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET).path_includes("/merge_requests/7/notes");
        then.status(200).json_body(json!([note(
            8,
            &render("old", DEFAULT_TAG),
            "2024-05-01T10:00:00.000Z",
            false
        )]));
    });
    let create = server.mock(|when, then| {
        when.method(POST).path_includes("/merge_requests/7/notes");
        then.status(201).json_body(note(9, "fresh", "2024-05-02T10:00:00.000Z", false));
    });

    let platform = GitLabHandler::merge_request(&request(&server, "7")).unwrap();
    let err = CommentHandler::new(Box::new(platform), None)
        .hide_and_new_comment("fresh")
        .await
        .err()
        .unwrap();

    assert!(err.is_not_implemented());
    list.assert_calls(0);
    create.assert_calls(0);
}
