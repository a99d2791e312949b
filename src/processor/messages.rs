use crate::element::Message;

use super::{BuildState, ElementVisitor};

/// 把模块记录的消息并入错误列表
pub(crate) struct MessageProcessor<'s> {
    state: &'s mut BuildState,
}

impl<'s> MessageProcessor<'s> {
    pub fn new(state: &'s mut BuildState) -> Self {
        Self { state }
    }
}

impl ElementVisitor for MessageProcessor<'_> {
    fn visit_message(&mut self, message: &Message) -> bool {
        if let Some(cause) = message.cause() {
            tracing::debug!(source = %message.source(), cause = %cause, "recorded error with cause");
        }
        self.state.errors.add(message.clone());
        true
    }
}
