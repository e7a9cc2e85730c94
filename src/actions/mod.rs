//! Test actions: the executable steps of a test case.

pub mod builtin;
pub mod container;
pub mod http;
pub mod message;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::context::TestContext;
use crate::error::CitrusResult;

pub use builtin::{
    CreateVariablesAction, EchoAction, FailAction, PurgeEndpointAction, SleepAction, StartServerAction,
    StopServerAction, TraceVariablesAction, WaitCondition, WaitForAction,
};
pub use container::{
    AssertAction, CatchAction, ConditionalAction, IterateAction, ParallelAction, RepeatOnErrorAction,
    RepeatUntilTrueAction, SequentialAction,
};
pub use message::{ExtractDefinition, MessageBuilder, ReceiveMessageAction, SendMessageAction};

/// A single step of a test case
#[async_trait]
pub trait TestAction: Send + Sync {
    /// Action name used in logs and reports
    fn name(&self) -> &str;

    async fn execute(&self, context: &TestContext) -> CitrusResult<()>;
}

pub type ActionRef = Arc<dyn TestAction>;

/// Run actions in order, stopping at the first failure
pub async fn execute_all(actions: &[ActionRef], context: &TestContext) -> CitrusResult<()> {
    for action in actions {
        debug!(action = %action.name(), "Executing nested action");
        action.execute(context).await?;
    }
    Ok(())
}
