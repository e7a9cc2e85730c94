//! XML representation of test cases.
//!
//! XML tests map onto the same action model as YAML tests. Attributes and
//! child elements become fields, list fields wrap their items and actions are
//! named by their element:
//!
//! ```xml
//! <test name="greeting-test" author="Citrus">
//!   <variables>
//!     <variable name="user" value="Citrus"/>
//!   </variables>
//!   <actions>
//!     <echo message="Hello ${user}"/>
//!     <send endpoint="direct:greetings">
//!       <message>
//!         <body><data><![CDATA[{"greeting": "Hello ${user}"}]]></data></body>
//!       </message>
//!     </send>
//!   </actions>
//! </test>
//! ```
//!
//! Values are typed with the JSON schema of [`TestCase`], so `timeout="500"`
//! becomes a number where the model expects one.

use roxmltree::{Document, Node};
use serde_json::{Map, Value};
use tracing::trace;

use super::TestCase;
use crate::error::{CitrusError, CitrusResult};

const ROOT_ELEMENT: &str = "test";

static UNTYPED: Value = Value::Null;

/// Parse an XML test into the test case model
pub fn from_xml(content: &str) -> CitrusResult<TestCase> {
    let document = Document::parse(content).map_err(|e| CitrusError::parse("XML test case", e))?;
    let root = document.root_element();
    if root.tag_name().name() != ROOT_ELEMENT {
        return Err(CitrusError::parse(
            "XML test case",
            format!(
                "expected root element <{}> but was <{}>",
                ROOT_ELEMENT,
                root.tag_name().name()
            ),
        ));
    }

    let schema = serde_json::to_value(schemars::schema_for!(TestCase))
        .map_err(|e| CitrusError::parse("test case schema", e))?;
    let value = SchemaWalker { root: &schema }.element(root, &schema);
    trace!(test = %value, "Converted XML test case");

    serde_json::from_value(value).map_err(|e| CitrusError::parse("XML test case", e))
}

/// Walks the XML tree alongside the schema of the target type
struct SchemaWalker<'a> {
    root: &'a Value,
}

impl<'a> SchemaWalker<'a> {
    fn element(&self, node: Node, schema: &'a Value) -> Value {
        let schema = self.choose(schema, node);
        match primary_type(schema) {
            Some("array") => self.items(node, schema.get("items").unwrap_or(&UNTYPED)),
            Some("string" | "integer" | "number" | "boolean") => self.text(&text_content(node), schema),
            _ if is_object(schema) => self.object(node, schema),
            _ if schema.get("enum").is_some() => Value::String(text_content(node)),
            _ => self.untyped(node),
        }
    }

    fn object(&self, node: Node, schema: &'a Value) -> Value {
        let mut map = Map::new();
        for attribute in node.attributes() {
            if attribute.namespace().is_some() {
                continue;
            }
            let value = match self.property(schema, attribute.name()) {
                Some(property) => self.text(attribute.value(), property),
                None => Value::String(attribute.value().to_string()),
            };
            map.insert(attribute.name().to_string(), value);
        }

        for child in node.children().filter(Node::is_element) {
            let name = child.tag_name().name();
            let value = match self.property(schema, name) {
                Some(property) => self.element(child, property),
                None => self.untyped(child),
            };
            match map.get_mut(name) {
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(name.to_string(), value);
                }
            }
        }
        Value::Object(map)
    }

    /// List fields wrap their items; items of action lists are single-key
    /// maps named by the item element
    fn items(&self, node: Node, items: &'a Value) -> Value {
        node.children()
            .filter(Node::is_element)
            .map(|child| {
                let name = child.tag_name().name();
                match self.variant(items, name) {
                    Some(variant) => {
                        let mut map = Map::new();
                        map.insert(name.to_string(), self.element(child, variant));
                        Value::Object(map)
                    }
                    None => self.element(child, items),
                }
            })
            .collect()
    }

    fn untyped(&self, node: Node) -> Value {
        if is_leaf(node) {
            Value::String(text_content(node))
        } else {
            self.object(node, &UNTYPED)
        }
    }

    fn text(&self, text: &str, schema: &'a Value) -> Value {
        let schema = self.resolve(schema);
        let scalar = choices(schema)
            .and_then(|branches| branches.iter().map(|branch| self.resolve(branch)).find(|branch| !is_null(branch)))
            .unwrap_or(schema);

        let text_trimmed = text.trim();
        let typed = match primary_type(scalar) {
            Some("integer") => text_trimmed
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| text_trimmed.parse::<u64>().map(Value::from))
                .ok(),
            Some("number") => text_trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            Some("boolean") => text_trimmed.parse::<bool>().ok().map(Value::Bool),
            _ => None,
        };
        typed.unwrap_or_else(|| Value::String(text.to_string()))
    }

    /// Follow `$ref`s and single-entry `allOf` wrappers
    fn resolve(&self, schema: &'a Value) -> &'a Value {
        let mut schema = schema;
        loop {
            if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
                let target = reference
                    .strip_prefix("#/definitions/")
                    .and_then(|name| self.root.get("definitions")?.get(name));
                match target {
                    Some(target) => {
                        schema = target;
                        continue;
                    }
                    None => return schema,
                }
            }
            match schema.get("allOf").and_then(Value::as_array) {
                Some(all) if all.len() == 1 && schema.get("properties").is_none() => schema = &all[0],
                _ => return schema,
            }
        }
    }

    /// Pick the `oneOf`/`anyOf` branch fitting the element
    fn choose(&self, schema: &'a Value, node: Node) -> &'a Value {
        let schema = self.resolve(schema);
        if schema.get("properties").is_some() {
            return schema;
        }
        let Some(branches) = choices(schema) else {
            return schema;
        };

        let candidates: Vec<&'a Value> = branches
            .iter()
            .map(|branch| self.resolve(branch))
            .filter(|branch| !is_null(branch))
            .collect();
        match candidates
            .iter()
            .copied()
            .find(|branch| fits(branch, node))
            .or_else(|| candidates.first().copied())
        {
            Some(branch) => self.choose(branch, node),
            None => schema,
        }
    }

    /// Schema of a named field, looking into merged and flattened schemas
    fn property(&self, schema: &'a Value, name: &str) -> Option<&'a Value> {
        let schema = self.resolve(schema);
        if let Some(property) = schema.get("properties").and_then(|properties| properties.get(name)) {
            return Some(property);
        }
        for key in ["allOf", "oneOf", "anyOf"] {
            let nested = schema
                .get(key)
                .and_then(Value::as_array)
                .and_then(|schemas| schemas.iter().find_map(|nested| self.property(nested, name)));
            if nested.is_some() {
                return nested;
            }
        }
        schema.get("additionalProperties").filter(|additional| additional.is_object())
    }

    /// Schema of the enum variant named `name`, if `schema` is an enum of
    /// single-key maps
    fn variant(&self, schema: &'a Value, name: &str) -> Option<&'a Value> {
        choices(self.resolve(schema))?.iter().find_map(|branch| {
            let branch = self.resolve(branch);
            let required = branch.get("required")?.as_array()?;
            if required.len() == 1 && required[0].as_str() == Some(name) {
                branch.get("properties")?.get(name)
            } else {
                None
            }
        })
    }
}

fn choices(schema: &Value) -> Option<&Vec<Value>> {
    schema
        .get("oneOf")
        .or_else(|| schema.get("anyOf"))
        .and_then(Value::as_array)
}

fn primary_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(kind) => Some(kind.as_str()),
        Value::Array(kinds) => kinds.iter().filter_map(Value::as_str).find(|kind| *kind != "null"),
        _ => None,
    }
}

fn is_null(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}

fn is_object(schema: &Value) -> bool {
    primary_type(schema) == Some("object")
        || schema.get("properties").is_some()
        || schema.get("additionalProperties").is_some()
}

fn fits(branch: &Value, node: Node) -> bool {
    if let Some(values) = branch.get("enum").and_then(Value::as_array) {
        let text = text_content(node);
        return values.iter().any(|value| value.as_str() == Some(text.as_str()));
    }

    match primary_type(branch) {
        Some("string" | "integer" | "number" | "boolean") => is_leaf(node),
        Some("array") => !is_leaf(node),
        _ if is_object(branch) => {
            let keys = node_keys(node);
            let required_present = branch
                .get("required")
                .and_then(Value::as_array)
                .map(|required| {
                    required
                        .iter()
                        .filter_map(Value::as_str)
                        .all(|name| keys.iter().any(|key| key == name))
                })
                .unwrap_or(true);
            let closed = branch.get("additionalProperties") == Some(&Value::Bool(false));
            let known = !closed
                || keys.iter().all(|key| {
                    branch
                        .get("properties")
                        .map(|properties| properties.get(key.as_str()).is_some())
                        .unwrap_or(false)
                });
            !is_leaf(node) && required_present && known
        }
        _ => true,
    }
}

fn node_keys(node: Node) -> Vec<String> {
    node.attributes()
        .filter(|attribute| attribute.namespace().is_none())
        .map(|attribute| attribute.name().to_string())
        .chain(
            node.children()
                .filter(Node::is_element)
                .map(|child| child.tag_name().name().to_string()),
        )
        .collect()
}

fn is_leaf(node: Node) -> bool {
    node.attributes().next().is_none() && !node.children().any(|child| child.is_element())
}

fn text_content(node: Node) -> String {
    node.children()
        .filter(Node::is_text)
        .filter_map(|child| child.text())
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::ActionDefinition;

    const GREETING_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<test name="greeting-test" author="Citrus" xmlns="http://citrusframework.org/schema/xml/testcase">
  <description>Sends and receives a greeting</description>
  <variables>
    <variable name="user" value="Citrus"/>
  </variables>
  <actions>
    <echo message="Hello ${user}"/>
    <send endpoint="direct:greetings">
      <message>
        <headers operation="greet"/>
        <body><data><![CDATA[{"greeting": "Hello ${user}"}]]></data></body>
      </message>
    </send>
    <receive endpoint="direct:greetings" timeout="1000" selector="operation = 'greet'">
      <message>
        <body><data>{"greeting": "@startsWith('Hello')@"}</data></body>
      </message>
    </receive>
    <iterate condition="i lt= 2">
      <actions>
        <sleep milliseconds="1"/>
      </actions>
    </iterate>
    <assert type="failed">
      <action>
        <fail message="boom"/>
      </action>
    </assert>
  </actions>
  <finally>
    <echo><message>Bye</message></echo>
  </finally>
</test>"#;

    const GREETING_YAML: &str = r#"
name: greeting-test
author: Citrus
description: Sends and receives a greeting
variables:
  - name: user
    value: Citrus
actions:
  - echo:
      message: "Hello ${user}"
  - send:
      endpoint: direct:greetings
      message:
        headers:
          operation: greet
        body:
          data: '{"greeting": "Hello ${user}"}'
  - receive:
      endpoint: direct:greetings
      timeout: 1000
      selector: "operation = 'greet'"
      message:
        body:
          data: '{"greeting": "@startsWith(''Hello'')@"}'
  - iterate:
      condition: i lt= 2
      actions:
        - sleep:
            milliseconds: 1
  - assert:
      type: failed
      action:
        fail:
          message: boom
finally:
  - echo:
      message: Bye
"#;

    #[test]
    fn test_xml_matches_yaml_model() {
        let from_xml = from_xml(GREETING_XML).unwrap();
        let from_yaml = TestCase::from_yaml(GREETING_YAML).unwrap();
        assert_eq!(from_xml, from_yaml);
    }

    #[test]
    fn test_nested_elements_and_numbers() {
        let test = from_xml(
            r#"<test name="sleepy">
                 <actions>
                   <sleep><milliseconds>250</milliseconds></sleep>
                   <createVariables>
                     <variables>
                       <variable name="a" value="1"/>
                       <variable><name>b</name><value>2</value></variable>
                     </variables>
                   </createVariables>
                 </actions>
               </test>"#,
        )
        .unwrap();

        match &test.actions[0] {
            ActionDefinition::Sleep(sleep) => assert_eq!(sleep.milliseconds, 250),
            other => panic!("unexpected action {:?}", other),
        }
        match &test.actions[1] {
            ActionDefinition::CreateVariables(create) => {
                assert_eq!(create.variables.len(), 2);
                assert_eq!(create.variables[1].name, "b");
                assert_eq!(create.variables[1].value, "2");
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_invalid_xml_tests() {
        assert!(from_xml("<testcase name=\"x\"><actions/></testcase>").is_err());
        assert!(from_xml("<test name=\"x\"><actions><unknown/></actions></test>").is_err());
        assert!(from_xml("<test name=\"x\"><actions>").is_err());
    }
}
