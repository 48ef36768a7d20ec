//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 两种用法：
//! - 脚本：按顺序弹出预置回复（`with_responses` / `push_response`）
//! - 应答函数：按请求内容（通常是 system prompt 中的智能体标识）动态生成回复
//!
//! 先消费脚本，脚本为空时再用应答函数；两者都没有则返回 ApiError。所有请求都会被记录。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, Role};

type Responder = Box<dyn Fn(&[Message]) -> Result<String, LlmError> + Send + Sync>;

/// Mock 客户端：脚本回复 + 可选应答函数 + 请求记录
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一组按顺序返回的回复
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for r in responses {
            client.push_response(r);
        }
        client
    }

    /// 设置应答函数（脚本耗尽后使用）
    pub fn with_responder<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Message]) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(f));
        self
    }

    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(response.into()));
        }
    }

    pub fn push_error(&self, err: LlmError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(err));
        }
    }

    /// 已收到的请求次数
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 已收到的全部请求（按时间顺序）
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// 最后一次请求中 user 消息的内容
    pub fn last_user_prompt(&self) -> Option<String> {
        let requests = self.requests();
        requests.last().and_then(|msgs| {
            msgs.iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
        })
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }

        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        if let Some(reply) = scripted {
            return reply;
        }

        match &self.responder {
            Some(f) => f(messages),
            None => Err(LlmError::ApiError("mock script exhausted".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_responder() {
        let mock = MockLlmClient::with_responses(["first"])
            .with_responder(|_| Ok("fallback".to_string()));
        let msgs = vec![Message::user("hi")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert_eq!(mock.complete(&msgs).await.unwrap(), "fallback");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.last_user_prompt().as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_exhausted_script_errors() {
        let mock = MockLlmClient::new();
        let err = mock.complete(&[Message::user("x")]).await.unwrap_err();
        assert!(matches!(err, LlmError::ApiError(_)));
    }
}
