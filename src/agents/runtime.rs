//! 智能体运行时
//!
//! 智能体与外界的唯一接口：生成网关调用（带输入/输出/错误日志与取消）、WorkflowState 读写、
//! 动作历史与上下文构建。状态以显式句柄传入，不使用全局变量。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, ParseError};
use crate::llm::{Capability, GatewayRouter, ImageAttachment};
use crate::state::{Limits, StateKey, StateStore, WorkflowState};

use super::context::Context;
use super::kind::AgentKind;
use super::log::{LogEntry, LogKind, LogSink, TracingLogSink};
use super::parser::{with_retry_validated, DEFAULT_MAX_RETRIES};
use super::prompts::PromptLibrary;

/// 某一 (document_id, section_id) 的状态句柄
#[derive(Clone)]
pub struct StateHandle {
    store: Arc<dyn StateStore>,
    key: StateKey,
}

impl StateHandle {
    pub fn new(store: Arc<dyn StateStore>, key: StateKey) -> Self {
        Self { store, key }
    }

    pub fn key(&self) -> &StateKey {
        &self.key
    }

    pub async fn get(&self) -> Result<Option<WorkflowState>, AgentError> {
        Ok(self.store.get(&self.key).await?)
    }

    pub async fn load(&self) -> Result<WorkflowState, AgentError> {
        Ok(self.store.load(&self.key).await?)
    }

    pub async fn save(&self, state: &WorkflowState) -> Result<(), AgentError> {
        Ok(self.store.save(state).await?)
    }

    /// 读取-修改-写回；返回写回后的状态
    pub async fn update<F>(&self, f: F) -> Result<WorkflowState, AgentError>
    where
        F: FnOnce(&mut WorkflowState),
    {
        let mut state = self.load().await?;
        f(&mut state);
        state.last_modified = chrono::Utc::now();
        self.store.save(&state).await?;
        Ok(state)
    }
}

pub struct AgentRuntime {
    gateway: Arc<GatewayRouter>,
    state: StateHandle,
    limits: Limits,
    log_sink: Arc<dyn LogSink>,
    cancel: CancellationToken,
    prompts: PromptLibrary,
    max_retries: usize,
}

impl AgentRuntime {
    pub fn new(gateway: Arc<GatewayRouter>, store: Arc<dyn StateStore>, key: StateKey) -> Self {
        Self {
            gateway,
            state: StateHandle::new(store, key),
            limits: Limits::default(),
            log_sink: Arc::new(TracingLogSink),
            cancel: CancellationToken::new(),
            prompts: PromptLibrary::default(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// 新建状态时使用的限额
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn key(&self) -> &StateKey {
        self.state.key()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn gateway(&self) -> &GatewayRouter {
        &self.gateway
    }

    pub fn prompts(&self) -> &PromptLibrary {
        &self.prompts
    }

    pub fn log_sink(&self) -> &dyn LogSink {
        self.log_sink.as_ref()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn log(&self, agent: AgentKind, kind: LogKind, content: impl Into<String>, metadata: Value) {
        self.log_sink
            .emit(&LogEntry::new(agent, kind, content).with_metadata(metadata));
    }

    pub fn check_cancelled(&self) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            Err(AgentError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// 纯文本调用；online 为 true 时走联网模型
    pub async fn execute_agent(
        &self,
        agent: AgentKind,
        system: &str,
        user: &str,
        online: bool,
    ) -> Result<String, AgentError> {
        let capability = if online {
            Capability::online()
        } else {
            Capability::offline()
        };
        self.call(agent, system, user, &capability).await
    }

    /// 附带一张图片的调用（走视觉模型）
    pub async fn execute_agent_with_image(
        &self,
        agent: AgentKind,
        system: &str,
        user: &str,
        image: ImageAttachment,
    ) -> Result<String, AgentError> {
        let capability = Capability::online().with_image(image);
        self.call(agent, system, user, &capability).await
    }

    async fn call(
        &self,
        agent: AgentKind,
        system: &str,
        user: &str,
        capability: &Capability,
    ) -> Result<String, AgentError> {
        self.check_cancelled()?;
        let route = capability.route();
        let model = self.gateway.model_name(route);
        self.log(
            agent,
            LogKind::Input,
            user,
            json!({
                "route": format!("{route:?}").to_lowercase(),
                "model": model,
                "system_chars": system.len(),
                "image": capability.image.is_some(),
            }),
        );

        // 取消只在发起调用前检查，进行中的调用不中断
        let result = self
            .gateway
            .generate(system, user, capability)
            .await
            .map_err(AgentError::from);

        match &result {
            Ok(text) => self.log(
                agent,
                LogKind::Output,
                text.as_str(),
                json!({ "model": model, "chars": text.len() }),
            ),
            Err(e) => self.log(agent, LogKind::Error, e.to_string(), json!({ "model": model })),
        }
        result
    }

    /// 调用并解析为 T：system prompt 由提示词库 + T 的 Schema 组成，解析失败按 max_retries 重新生成
    pub async fn run_structured<T>(
        &self,
        agent: AgentKind,
        user: &str,
        required: &[&str],
        capability: Capability,
    ) -> Result<T, AgentError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        self.run_structured_validated(agent, user, required, capability, Ok)
            .await
    }

    /// 同 run_structured，另带语义校验；校验失败与解析失败一样重新生成
    pub async fn run_structured_validated<T, V>(
        &self,
        agent: AgentKind,
        user: &str,
        required: &[&str],
        capability: Capability,
        validate: V,
    ) -> Result<T, AgentError>
    where
        T: DeserializeOwned + JsonSchema,
        V: Fn(T) -> Result<T, ParseError>,
    {
        let system = self.prompts.system_prompt::<T>(agent);
        let system = system.as_str();
        let capability = &capability;
        with_retry_validated(
            self.log_sink(),
            agent,
            self.max_retries,
            required,
            move || self.call(agent, system, user, capability),
            validate,
        )
        .await
    }

    /// 读取状态；不存在时按给定参数新建并持久化
    pub async fn get_or_create_state(
        &self,
        instructions: &str,
        max_passes: u32,
        min_score: f32,
    ) -> Result<WorkflowState, AgentError> {
        if let Some(state) = self.state.get().await? {
            if state.instructions != instructions {
                tracing::info!(key = %self.key(), "resuming with stored instructions");
            }
            return Ok(state);
        }
        let limits = Limits {
            max_passes,
            min_score,
            ..self.limits.clone()
        };
        let state = WorkflowState::new(self.key(), instructions, limits);
        self.state.save(&state).await?;
        tracing::info!(key = %self.key(), "created workflow state");
        Ok(state)
    }

    pub async fn load_state(&self) -> Result<WorkflowState, AgentError> {
        self.state.load().await
    }

    /// 唯一的状态修改入口
    pub async fn update_state<F>(&self, f: F) -> Result<WorkflowState, AgentError>
    where
        F: FnOnce(&mut WorkflowState),
    {
        self.state.update(f).await
    }

    /// 追加一条动作历史
    pub async fn add_history(
        &self,
        action: &str,
        summary: &str,
        success: bool,
        error: Option<String>,
    ) -> Result<(), AgentError> {
        self.update_state(|s| s.push_history(action, summary, success, error))
            .await
            .map(|_| ())
    }

    /// 从当前状态与文档构建上下文，overrides 优先
    pub async fn build_context(
        &self,
        document: &str,
        overrides: Map<String, Value>,
    ) -> Result<Context, AgentError> {
        let state = self.load_state().await?;
        Ok(Context::derive(&state, document).with_overrides(overrides)?)
    }
}
