//! Current wall-clock time in China Standard Time

use super::{ToolDescriptor, ToolError};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, Utc, Weekday};

const CST_OFFSET_SECS: i32 = 8 * 3600;

pub struct CurrentTimeTool;

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "星期一",
        Weekday::Tue => "星期二",
        Weekday::Wed => "星期三",
        Weekday::Thu => "星期四",
        Weekday::Fri => "星期五",
        Weekday::Sat => "星期六",
        Weekday::Sun => "星期日",
    }
}

fn format_time(now: DateTime<Utc>) -> Result<String, ToolError> {
    let offset = FixedOffset::east_opt(CST_OFFSET_SECS)
        .ok_or_else(|| ToolError::Unavailable("invalid timezone offset".to_string()))?;
    let local = now.with_timezone(&offset);
    Ok(format!(
        "当前时间: {}{} {}",
        local.format("%Y年%-m月%-d日"),
        weekday_name(local.weekday()),
        local.format("%H:%M:%S")
    ))
}

#[async_trait]
impl ToolDescriptor for CurrentTimeTool {
    fn name(&self) -> &'static str {
        "current_time"
    }

    fn description(&self) -> &'static str {
        "Tell the current date and time"
    }

    fn matches(&self, text: &str) -> bool {
        ["现在几点", "当前时间", "几点了"].iter().any(|k| text.contains(k))
    }

    async fn handle(&self, _text: &str) -> Result<Option<String>, ToolError> {
        format_time(Utc::now()).map(Some)
    }
}
