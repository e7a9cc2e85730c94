//! Integration tests for tests written with the Rust builder DSL

use anyhow::Result;

use citrus::dsl::{assert_error, echo, parallel, receive, send, sequential, sleep};
use citrus::{CitrusSettings, TestContextFactory};

#[tokio::test]
async fn test_builder_exchange_with_selector() -> Result<()> {
    let factory = TestContextFactory::new(CitrusSettings::default());
    let context = factory.create_context("builder-test");
    context.set_variable("customer", "citrus")?;

    parallel(vec![
        receive("direct:orders")
            .selector("type = 'priority'")
            .body(r#"{"customer": "${customer}", "items": "@ignore@"}"#)
            .timeout(2000)
            .extract_header("type", "orderType")
            .build(),
        sequential(vec![
            sleep(50),
            send("direct:orders")
                .header("type", "standard")
                .body(r#"{"customer": "other", "items": []}"#)
                .build(),
            send("direct:orders")
                .header("type", "priority")
                .body(r#"{"customer": "${customer}", "items": [1, 2]}"#)
                .build(),
        ]),
    ])
    .execute(&context)
    .await?;

    assert_eq!(context.get_variable("orderType")?, "priority");

    // the standard order is still queued
    receive("direct:orders")
        .header("type", "standard")
        .timeout(500)
        .build()
        .execute(&context)
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_builder_receive_timeout_is_assertable() -> Result<()> {
    let context = TestContextFactory::default().create_context("timeout-test");

    sequential(vec![
        echo("Expecting a timeout"),
        assert_error(
            Some("message_timeout"),
            receive("direct:empty").timeout(100).build(),
        ),
    ])
    .execute(&context)
    .await?;
    Ok(())
}
