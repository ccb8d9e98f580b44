//! The `plugins.spam_detector` config section.

use serde::{Deserialize, Deserializer, Serialize};

fn default_last_time() -> u64 {
    5
}

fn default_alert_message() -> String {
    "⚠️ 检测到疑似推销信息，该消息已被处理。".to_string()
}

fn default_context_message_count() -> usize {
    1
}

fn default_model_timeout_secs() -> u64 {
    30
}

fn default_system_prompt() -> String {
    "你是一个专业的推销信息检测助手。请分析给定的消息内容，判断它是否是推销信息。\n\n\
     推销信息的特征包括但不限于：\n\
     1. 销售产品或服务\n\
     2. 包含价格、优惠、折扣等商业信息\n\
     3. 引导添加微信、QQ等联系方式进行交易\n\
     4. 推广某个商品、品牌或服务\n\
     5. 含有明显的营销意图\n\n\
     请只回答\"是\"或\"否\"，如果是推销信息回答\"是\"，如果不是推销信息回答\"否\"。"
        .to_string()
}

/// Spam detector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpamDetectorConfig {
    /// Users never checked. A list or a comma-separated string.
    #[serde(default, deserialize_with = "id_list")]
    pub whitelist_users: Vec<String>,

    /// Groups never checked. A list or a comma-separated string.
    #[serde(default, deserialize_with = "id_list")]
    pub whitelist_groups: Vec<String>,

    /// Minutes of a user's history included in the admin report.
    #[serde(default = "default_last_time")]
    pub last_time: u64,

    /// Group that receives spam reports; empty disables forwarding.
    #[serde(default)]
    pub admin_chat_id: String,

    #[serde(default = "default_alert_message")]
    pub spam_alert_message: String,

    /// Earlier messages of the same user given to the classifier.
    #[serde(default = "default_context_message_count")]
    pub context_message_count: usize,

    #[serde(default = "default_system_prompt")]
    pub llm_system_prompt: String,

    /// Provider for the verdict; the using provider when unset.
    #[serde(default)]
    pub text_provider_id: Option<String>,

    /// Provider describing images; the using provider when unset.
    #[serde(default)]
    pub vision_provider_id: Option<String>,

    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    /// Mute length for detected senders; 0 disables muting.
    #[serde(default)]
    pub mute_duration_secs: u64,
}

impl Default for SpamDetectorConfig {
    fn default() -> Self {
        Self {
            whitelist_users: Vec::new(),
            whitelist_groups: Vec::new(),
            last_time: default_last_time(),
            admin_chat_id: String::new(),
            spam_alert_message: default_alert_message(),
            context_message_count: default_context_message_count(),
            llm_system_prompt: default_system_prompt(),
            text_provider_id: None,
            vision_provider_id: None,
            model_timeout_secs: default_model_timeout_secs(),
            mute_duration_secs: 0,
        }
    }
}

impl SpamDetectorConfig {
    pub fn is_user_whitelisted(&self, user_id: &str) -> bool {
        self.whitelist_users.iter().any(|u| u == user_id)
    }

    pub fn is_group_whitelisted(&self, group_id: &str) -> bool {
        self.whitelist_groups.iter().any(|g| g == group_id)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(i64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdList {
    List(Vec<IdValue>),
    Csv(String),
}

/// Accepts `["1", 2]` as well as `"1, 2"`.
fn id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let ids = match IdList::deserialize(deserializer)? {
        IdList::List(values) => values
            .into_iter()
            .map(|value| match value {
                IdValue::Text(text) => text.trim().to_string(),
                IdValue::Number(n) => n.to_string(),
            })
            .filter(|id| !id.is_empty())
            .collect(),
        IdList::Csv(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect(),
    };
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_section() {
        let config: SpamDetectorConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, SpamDetectorConfig::default());
        assert_eq!(config.last_time, 5);
        assert_eq!(config.context_message_count, 1);
        assert_eq!(config.model_timeout_secs, 30);
        assert_eq!(config.mute_duration_secs, 0);
    }

    #[test]
    fn test_whitelists_accept_csv_and_lists() {
        let config: SpamDetectorConfig = serde_json::from_value(json!({
            "whitelist_users": "10001, 10002,,",
            "whitelist_groups": ["g1", 20002],
        }))
        .unwrap();

        assert_eq!(config.whitelist_users, vec!["10001", "10002"]);
        assert_eq!(config.whitelist_groups, vec!["g1", "20002"]);
        assert!(config.is_user_whitelisted("10002"));
        assert!(config.is_group_whitelisted("20002"));
        assert!(!config.is_user_whitelisted("10003"));
    }
}
