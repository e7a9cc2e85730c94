//! Integration tests running YAML test suites through the runner

use anyhow::Result;

use citrus::report::JSON_SUMMARY_FILE;
use citrus::TestStatus;

use super::test_harness::{assert_suite_success, TestProject};

const CONFIG: &str = r#"
settings:
  suiteName: yaml-suite
  defaultTimeout: 1000
variables:
  shop: citrus-shop
endpoints:
  - type: direct
    name: orders
"#;

#[tokio::test]
async fn test_yaml_suite_with_containers() -> Result<()> {
    let project = TestProject::new(CONFIG)?
        .with_test(
            "a-iterate-test.yaml",
            r#"
name: iterate-test
author: Citrus
actions:
  - iterate:
      condition: i lt= 3
      actions:
        - send:
            endpoint: orders
            message:
              headers:
                shop: ${shop}
              body:
                data: '{"order": ${i}, "id": "citrus:randomNumber(4)"}'
  - repeat:
      until: i gt 3
      actions:
        - receive:
            endpoint: orders
            message:
              headers:
                shop: citrus-shop
              body:
                data: '{"order": "${i}", "id": "@ignore@"}'
"#,
        )?
        .with_test(
            "b-assert-test.yaml",
            r#"
name: assert-test
actions:
  - assert:
      type: validation_failed
      action:
        sequential:
          actions:
            - send:
                endpoint: orders
                message:
                  body:
                    data: '{"status": "open"}'
            - receive:
                endpoint: orders
                message:
                  body:
                    data: '{"status": "closed"}'
  - catch:
      actions:
        - fail:
            message: "ignored"
  - createVariables:
      variables:
        - name: orderCount
          value: "3"
  - conditional:
      when: "${orderCount} = 3"
      actions:
        - createVariables:
            variables:
              - name: matched
                value: "citrus:upperCase('yes')"
  - echo:
      message: "Matched ${matched}"
"#,
        )?;

    let suite = project.run().await?;
    assert_eq!(suite.total(), 2);
    assert_suite_success(&suite);
    assert_eq!(suite.results[0].name, "iterate-test");
    Ok(())
}

#[tokio::test]
async fn test_yaml_suite_reports_failures() -> Result<()> {
    let project = TestProject::new(CONFIG)?
        .with_test(
            "passing-test.yaml",
            "name: passing-test\nactions:\n  - echo:\n      message: \"${shop}\"\n",
        )?
        .with_test(
            "timeout-test.yaml",
            r#"
name: timeout-test
actions:
  - receive:
      endpoint: orders
      timeout: 100
"#,
        )?;

    let suite = project.run().await?;
    assert_eq!(suite.success(), 1);
    assert_eq!(suite.failed(), 1);

    let failed = suite
        .results
        .iter()
        .find(|result| result.status == TestStatus::Failure)
        .unwrap();
    assert_eq!(failed.name, "timeout-test");
    assert_eq!(failed.failed_action.as_deref(), Some("receive"));

    let junit = std::fs::read_to_string(project.report_dir().join("TEST-yaml-suite.xml"))?;
    assert!(junit.contains("tests=\"2\" failures=\"1\""));
    assert!(junit.contains("<failure type=\"message_timeout\""));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(project.report_dir().join(JSON_SUMMARY_FILE))?)?;
    assert_eq!(summary["suite"], "yaml-suite");
    assert_eq!(summary["successPercentage"], 50.0);
    Ok(())
}

#[tokio::test]
async fn test_xml_test_extracts_variables() -> Result<()> {
    let project = TestProject::new(CONFIG)?.with_test(
        "order-test.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<test name="xml-order-test" author="Citrus">
  <variables>
    <variable name="orderId" value="citrus:randomNumber(6)"/>
  </variables>
  <actions>
    <send endpoint="orders">
      <message>
        <headers shop="${shop}"/>
        <body><data><![CDATA[{"orderId": "${orderId}", "template": "${shop}"}]]></data></body>
      </message>
    </send>
    <receive endpoint="orders" timeout="1000">
      <message>
        <body><data><![CDATA[{"orderId": "@variable('receivedId')@", "template": "@variable()@"}]]></data></body>
      </message>
    </receive>
    <send endpoint="orders">
      <message>
        <body><data><![CDATA[{"orderId": "${receivedId}", "template": "${template}"}]]></data></body>
      </message>
    </send>
    <receive endpoint="orders" timeout="1000">
      <message>
        <body><data><![CDATA[{"orderId": "${orderId}", "template": "citrus-shop"}]]></data></body>
      </message>
    </receive>
  </actions>
</test>"#,
    )?;

    let suite = project.run().await?;
    assert_eq!(suite.total(), 1);
    assert_suite_success(&suite);
    assert_eq!(suite.results[0].name, "xml-order-test");
    Ok(())
}
