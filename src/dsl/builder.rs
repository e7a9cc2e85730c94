// Fluent constructors for writing tests in Rust instead of YAML
use std::sync::Arc;

use crate::actions::message::{BodyExtract, HeaderExtract, SelectorDefinition, ValidationDefinition};
use crate::actions::{
    ActionRef, AssertAction, CatchAction, ConditionalAction, CreateVariablesAction, EchoAction, ExtractDefinition,
    FailAction, IterateAction, MessageBuilder, ParallelAction, ReceiveMessageAction, RepeatOnErrorAction,
    SendMessageAction, SequentialAction, SleepAction,
};
use crate::actions::builtin::VariableDefinition;
use crate::message::MessageType;

pub fn echo(message: impl Into<String>) -> ActionRef {
    Arc::new(EchoAction {
        message: message.into(),
    })
}

pub fn sleep(milliseconds: u64) -> ActionRef {
    Arc::new(SleepAction { milliseconds })
}

pub fn fail(message: impl Into<String>) -> ActionRef {
    Arc::new(FailAction {
        message: message.into(),
    })
}

pub fn create_variable(name: impl Into<String>, value: impl Into<String>) -> ActionRef {
    Arc::new(CreateVariablesAction {
        variables: vec![VariableDefinition {
            name: name.into(),
            value: value.into(),
        }],
    })
}

/// Builder of a send action
pub struct SendBuilder {
    action: SendMessageAction,
}

pub fn send(endpoint: impl Into<String>) -> SendBuilder {
    SendBuilder {
        action: SendMessageAction::new(endpoint, MessageBuilder::default()),
    }
}

impl SendBuilder {
    pub fn body(mut self, payload: impl Into<String>) -> Self {
        self.action.message = self.action.message.with_body(payload);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.action.message = self.action.message.with_header(name, value);
        self
    }

    /// Store the sent message under this name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.action.message.name = Some(name.into());
        self
    }

    pub fn build(self) -> ActionRef {
        Arc::new(self.action)
    }
}

/// Builder of a receive action
pub struct ReceiveBuilder {
    action: ReceiveMessageAction,
}

pub fn receive(endpoint: impl Into<String>) -> ReceiveBuilder {
    ReceiveBuilder {
        action: ReceiveMessageAction::new(endpoint, MessageBuilder::default()),
    }
}

impl ReceiveBuilder {
    pub fn body(mut self, payload: impl Into<String>) -> Self {
        self.action.message = self.action.message.with_body(payload);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.action.message = self.action.message.with_header(name, value);
        self
    }

    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.action.message.message_type = Some(message_type);
        self
    }

    /// Selector expression such as `type = 'order'`
    pub fn selector(mut self, expression: impl Into<String>) -> Self {
        self.action.selector = Some(SelectorDefinition::Expression(expression.into()));
        self
    }

    pub fn timeout(mut self, milliseconds: u64) -> Self {
        self.action.timeout = Some(milliseconds);
        self
    }

    pub fn validate(mut self, validation: ValidationDefinition) -> Self {
        self.action.validate.push(validation);
        self
    }

    pub fn extract_header(mut self, header: impl Into<String>, variable: impl Into<String>) -> Self {
        self.action
            .extract
            .get_or_insert_with(ExtractDefinition::default)
            .header
            .push(HeaderExtract {
                name: header.into(),
                variable: variable.into(),
            });
        self
    }

    /// Extract a JSON path value of the payload
    pub fn extract_body(mut self, path: impl Into<String>, variable: impl Into<String>) -> Self {
        self.action
            .extract
            .get_or_insert_with(ExtractDefinition::default)
            .body
            .push(BodyExtract {
                path: path.into(),
                variable: variable.into(),
            });
        self
    }

    pub fn build(self) -> ActionRef {
        Arc::new(self.action)
    }
}

pub fn sequential(actions: Vec<ActionRef>) -> ActionRef {
    Arc::new(SequentialAction { actions })
}

pub fn parallel(actions: Vec<ActionRef>) -> ActionRef {
    Arc::new(ParallelAction { actions })
}

pub fn conditional(when: impl Into<String>, actions: Vec<ActionRef>) -> ActionRef {
    Arc::new(ConditionalAction {
        when: when.into(),
        actions,
    })
}

/// Loop with index variable `i` starting at 1
pub fn iterate(condition: impl Into<String>, actions: Vec<ActionRef>) -> ActionRef {
    Arc::new(IterateAction {
        index: super::DEFAULT_INDEX_NAME.to_string(),
        start: 1,
        step: 1,
        condition: condition.into(),
        actions,
    })
}

pub fn repeat_on_error(until: impl Into<String>, auto_sleep: u64, actions: Vec<ActionRef>) -> ActionRef {
    Arc::new(RepeatOnErrorAction {
        index: super::DEFAULT_INDEX_NAME.to_string(),
        start: 1,
        until: until.into(),
        auto_sleep,
        actions,
    })
}

/// Expect `action` to fail, optionally with the given error code
pub fn assert_error(error_type: Option<&str>, action: ActionRef) -> ActionRef {
    Arc::new(AssertAction {
        error_type: error_type.map(str::to_string),
        message: None,
        action,
    })
}

pub fn catch_errors(actions: Vec<ActionRef>) -> ActionRef {
    Arc::new(CatchAction {
        error_type: None,
        actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;

    #[tokio::test]
    async fn test_send_and_receive_builders() {
        let context = TestContext::new();
        context.set_variable("id", "42").unwrap();

        send("direct:builder")
            .body(r#"{"id": ${id}, "status": "new"}"#)
            .header("operation", "create")
            .build()
            .execute(&context)
            .await
            .unwrap();

        receive("direct:builder")
            .body(r#"{"id": "@isNumber()@", "status": "new"}"#)
            .header("operation", "create")
            .timeout(1000)
            .extract_body("$.id", "orderId")
            .build()
            .execute(&context)
            .await
            .unwrap();
        assert_eq!(context.get_variable("orderId").unwrap(), "42");
    }

    #[tokio::test]
    async fn test_container_builders() {
        let context = TestContext::new();
        sequential(vec![
            iterate("i lt 4", vec![create_variable("count", "${i}")]),
            conditional("${count} = 3", vec![create_variable("done", "true")]),
            assert_error(Some("failed"), fail("expected")),
            catch_errors(vec![fail("ignored")]),
        ])
        .execute(&context)
        .await
        .unwrap();
        assert_eq!(context.get_variable("done").unwrap(), "true");
    }
}
