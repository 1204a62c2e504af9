//! Mock search results

use super::{ToolDescriptor, ToolError};
use async_trait::async_trait;

const PREFIX: &str = "搜索";

pub struct SearchTool;

fn query_of(text: &str) -> Option<&str> {
    let query = text
        .strip_prefix(PREFIX)?
        .trim_start_matches([':', '：'])
        .trim();
    (!query.is_empty()).then_some(query)
}

#[async_trait]
impl ToolDescriptor for SearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> &'static str {
        "Search for information (mock results)"
    }

    fn matches(&self, text: &str) -> bool {
        text.starts_with(PREFIX)
    }

    async fn handle(&self, text: &str) -> Result<Option<String>, ToolError> {
        Ok(query_of(text).map(|query| {
            [
                format!("关于 \"{query}\" 的搜索结果："),
                format!("1. {query} 相关的最新信息..."),
                format!("2. {query} 的详细解释和说明..."),
                format!("3. {query} 的相关链接和资源..."),
                "\n💡 这是一个模拟的搜索功能，在实际应用中可以接入真实的搜索API。".to_string(),
            ]
            .join("\n")
        }))
    }
}
