//! Integration tests for HTTP client and server endpoints talking to each other

use anyhow::Result;

use super::test_harness::{assert_suite_success, free_port, TestProject};

#[tokio::test]
async fn test_client_and_server_exchange() -> Result<()> {
    let port = free_port()?;
    let config = format!(
        r#"
settings:
  suiteName: http-server
endpoints:
  - type: httpServer
    name: orderServer
    port: {port}
    autoStart: true
  - type: httpClient
    name: orderClient
    requestUrl: http://127.0.0.1:{port}
"#
    );

    let project = TestProject::new(&config)?.with_test(
        "order-test.yaml",
        r#"
name: order-test
variables:
  - name: orderId
    value: "42"
actions:
  - parallel:
      actions:
        - sequential:
            actions:
              - http:
                  client: orderClient
                  sendRequest:
                    method: post
                    path: /orders
                    contentType: application/json
                    body:
                      data: '{"order": ${orderId}}'
              - http:
                  client: orderClient
                  receiveResponse:
                    status: 201
                    body:
                      data: '{"status": "created", "order": "${orderId}"}'
        - sequential:
            actions:
              - http:
                  server: orderServer
                  receiveRequest:
                    method: post
                    path: /orders
                    body:
                      data: '{"order": "@isNumber()@"}'
              - http:
                  server: orderServer
                  sendResponse:
                    status: 201
                    contentType: application/json
                    body:
                      data: '{"status": "created", "order": ${orderId}}'
"#,
    )?;

    let suite = project.run().await?;
    assert_suite_success(&suite);

    // server is stopped after the suite, so the port is free again
    std::net::TcpListener::bind(("127.0.0.1", port))?;
    Ok(())
}
