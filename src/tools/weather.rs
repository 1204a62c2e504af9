//! Canned weather reports for a handful of cities

use super::{ToolDescriptor, ToolError};
use async_trait::async_trait;

struct Report {
    city: &'static str,
    temperature: &'static str,
    condition: &'static str,
    humidity: &'static str,
}

const REPORTS: &[Report] = &[
    Report { city: "北京", temperature: "15°C", condition: "晴天", humidity: "45%" },
    Report { city: "上海", temperature: "18°C", condition: "多云", humidity: "60%" },
    Report { city: "广州", temperature: "25°C", condition: "小雨", humidity: "80%" },
    Report { city: "深圳", temperature: "26°C", condition: "晴天", humidity: "55%" },
    Report { city: "杭州", temperature: "20°C", condition: "多云", humidity: "65%" },
    Report { city: "成都", temperature: "18°C", condition: "阴天", humidity: "70%" },
];

pub struct WeatherTool;

#[async_trait]
impl ToolDescriptor for WeatherTool {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn description(&self) -> &'static str {
        "Report the weather for a known city"
    }

    fn matches(&self, text: &str) -> bool {
        text.contains("天气")
    }

    async fn handle(&self, text: &str) -> Result<Option<String>, ToolError> {
        // Unknown cities go to the model
        Ok(REPORTS.iter().find(|r| text.contains(r.city)).map(|r| {
            format!(
                "{}的天气情况：\n🌡️ 温度：{}\n☁️ 天气：{}\n💧 湿度：{}",
                r.city, r.temperature, r.condition, r.humidity
            )
        }))
    }
}
