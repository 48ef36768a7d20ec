//! 编辑操作：{find, replace, count?, reason?}
//!
//! count 在 JSON 中为正整数或字符串 "all"，缺省为 1。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 单个 find/replace 编辑
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EditOperation {
    /// 要定位的原文片段（为空表示追加到文末）
    pub find: String,
    /// 替换后的文本
    pub replace: String,
    /// 替换次数：正整数或 "all"，缺省 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<CountSpec>")]
    pub count: Option<ReplaceCount>,
    /// 修改理由（仅用于日志）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EditOperation {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
            count: None,
            reason: None,
        }
    }

    pub fn with_count(mut self, count: ReplaceCount) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// 在文末追加 text 的操作
    pub fn append(text: impl Into<String>) -> Self {
        Self::new(String::new(), text)
    }

    pub fn replace_count(&self) -> ReplaceCount {
        self.count.unwrap_or(ReplaceCount::N(1))
    }
}

/// 替换次数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CountSpec", into = "CountSpec")]
pub enum ReplaceCount {
    N(usize),
    All,
}

impl ReplaceCount {
    /// 转为 `str::replacen` / `Regex::replacen` 的上限（0 表示全部）
    pub fn limit(self) -> usize {
        match self {
            ReplaceCount::N(n) => n,
            ReplaceCount::All => 0,
        }
    }
}

/// count 的线上格式
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
enum CountSpec {
    Number(u64),
    Text(String),
}

impl TryFrom<CountSpec> for ReplaceCount {
    type Error = String;

    fn try_from(spec: CountSpec) -> Result<Self, Self::Error> {
        match spec {
            // 0 按 1 处理
            CountSpec::Number(n) => Ok(ReplaceCount::N((n as usize).max(1))),
            CountSpec::Text(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("all") {
                    Ok(ReplaceCount::All)
                } else {
                    s.parse::<usize>()
                        .map(|n| ReplaceCount::N(n.max(1)))
                        .map_err(|_| format!("invalid count: {s:?}"))
                }
            }
        }
    }
}

impl From<ReplaceCount> for CountSpec {
    fn from(count: ReplaceCount) -> Self {
        match count {
            ReplaceCount::N(n) => CountSpec::Number(n as u64),
            ReplaceCount::All => CountSpec::Text("all".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_wire_format() {
        let op: EditOperation =
            serde_json::from_str(r#"{"find":"a","replace":"b","count":"all"}"#).unwrap();
        assert_eq!(op.count, Some(ReplaceCount::All));

        let op: EditOperation =
            serde_json::from_str(r#"{"find":"a","replace":"b","count":3}"#).unwrap();
        assert_eq!(op.replace_count(), ReplaceCount::N(3));

        let op: EditOperation = serde_json::from_str(r#"{"find":"a","replace":"b"}"#).unwrap();
        assert_eq!(op.replace_count(), ReplaceCount::N(1));

        let op: EditOperation =
            serde_json::from_str(r#"{"find":"a","replace":"b","count":"2"}"#).unwrap();
        assert_eq!(op.replace_count(), ReplaceCount::N(2));
    }

    #[test]
    fn test_invalid_count_rejected() {
        let res: Result<EditOperation, _> =
            serde_json::from_str(r#"{"find":"a","replace":"b","count":"many"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_serialize_all() {
        let op = EditOperation::new("a", "b").with_count(ReplaceCount::All);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["count"], "all");
        assert!(json.get("reason").is_none());
    }
}
