//! Integration tests for the HTTP client endpoint against a mock server

use anyhow::Result;

use super::test_harness::{assert_suite_success, TestProject};

fn client_config(url: &str) -> String {
    format!(
        r#"
settings:
  suiteName: http-client
variables:
  todoId: "1"
endpoints:
  - type: httpClient
    name: todoClient
    requestUrl: {}
"#,
        url
    )
}

#[tokio::test]
async fn test_http_client_round_trip() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let todo = server
        .mock("GET", "/todos/1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 1, "title": "Learn Citrus", "done": false}"#)
        .create_async()
        .await;
    let created = server
        .mock("POST", "/todos")
        .match_body(mockito::Matcher::PartialJsonString(r#"{"title": "Write tests"}"#.to_string()))
        .with_status(201)
        .create_async()
        .await;

    let project = TestProject::new(&client_config(&server.url()))?.with_test(
        "todo-test.yaml",
        r#"
name: todo-test
actions:
  - http:
      client: todoClient
      sendRequest:
        method: get
        path: /todos/${todoId}
  - http:
      client: todoClient
      receiveResponse:
        status: 200
        body:
          data: '{"id": "@isNumber()@", "title": "@startsWith(Learn)@", "done": "@ignore@"}'
        extract:
          body:
            - path: $.title
              variable: title
  - http:
      client: todoClient
      sendRequest:
        method: post
        path: /todos
        contentType: application/json
        body:
          data: '{"title": "Write tests"}'
  - http:
      client: todoClient
      receiveResponse:
        status: 201
  - echo:
      message: "Fetched ${title}"
"#,
    )?;

    let suite = project.run().await?;
    assert_suite_success(&suite);
    todo.assert_async().await;
    created.assert_async().await;

    let junit = std::fs::read_to_string(project.report_dir().join("TEST-http-client.xml"))?;
    assert!(junit.contains("<testcase name=\"todo-test\""));
    Ok(())
}

#[tokio::test]
async fn test_http_client_status_mismatch_is_reported() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/todos/1").with_status(404).create_async().await;

    let project = TestProject::new(&client_config(&server.url()))?.with_test(
        "missing-test.yaml",
        r#"
name: missing-test
actions:
  - http:
      client: todoClient
      sendRequest:
        method: get
        path: /todos/${todoId}
  - http:
      client: todoClient
      receiveResponse:
        status: 200
"#,
    )?;

    let suite = project.run().await?;
    assert_eq!(suite.failed(), 1);
    assert_eq!(suite.results[0].failed_action.as_deref(), Some("http"));

    let summary: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
        project.report_dir().join(citrus::report::JSON_SUMMARY_FILE),
    )?)?;
    assert_eq!(summary["failed"], 1);
    assert_eq!(summary["results"][0]["errorCode"], "validation_failed");
    Ok(())
}
