//! Canned replies for common greetings

use super::{ToolDescriptor, ToolError};
use async_trait::async_trait;

const DEFAULT_REPLIES: &[(&str, &str)] = &[
    ("你好", "你好！有什么我可以帮助你的吗？"),
    ("你是谁", "我是基于LangGraphJS构建的智能聊天助手。"),
    ("再见", "再见！期待下次与你交流。"),
    ("谢谢", "不客气！如果你有任何问题，随时问我。"),
    ("早上好", "早上好！今天过得怎么样？"),
    ("晚上好", "晚上好！今天过得如何？"),
];

/// Keyword table checked by substring, in table order
pub struct SpecificReplyTool {
    replies: Vec<(String, String)>,
}

impl Default for SpecificReplyTool {
    fn default() -> Self {
        Self::new(
            DEFAULT_REPLIES
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        )
    }
}

impl SpecificReplyTool {
    pub fn new(replies: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
        }
    }

    fn lookup(&self, text: &str) -> Option<&str> {
        self.replies
            .iter()
            .find(|(keyword, _)| text.contains(keyword.as_str()))
            .map(|(_, reply)| reply.as_str())
    }
}

#[async_trait]
impl ToolDescriptor for SpecificReplyTool {
    fn name(&self) -> &'static str {
        "specific_reply"
    }

    fn description(&self) -> &'static str {
        "Reply to greetings and small talk from a fixed table"
    }

    fn matches(&self, text: &str) -> bool {
        self.lookup(text).is_some()
    }

    async fn handle(&self, text: &str) -> Result<Option<String>, ToolError> {
        Ok(self.lookup(text).map(str::to_string))
    }
}
