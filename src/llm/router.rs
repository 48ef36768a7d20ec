//! 生成网关路由
//!
//! 按调用能力选择后端：
//! - 离线（纯文本编辑）：便宜的编辑模型
//! - 联网（需要外部知识，如引用检索、格式规范）：带实时知识的模型
//! - 图片：支持视觉输入的模型（仅 Figure 智能体）
//!
//! 未配置的路由回退到离线模型并打 warn 日志。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::{ImageAttachment, LlmClient, LlmError, Message, MockLlmClient, OpenAiClient};

/// DeepSeek 的 OpenAI 兼容端点
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// 路由目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Offline,
    Online,
    Vision,
}

impl Route {
    fn index(self) -> usize {
        match self {
            Route::Offline => 0,
            Route::Online => 1,
            Route::Vision => 2,
        }
    }
}

/// 单次调用所需能力：是否联网、是否附带图片
#[derive(Debug, Clone, Default)]
pub struct Capability {
    pub online: bool,
    pub image: Option<ImageAttachment>,
}

impl Capability {
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn online() -> Self {
        Self {
            online: true,
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }

    pub fn route(&self) -> Route {
        if self.image.is_some() {
            Route::Vision
        } else if self.online {
            Route::Online
        } else {
            Route::Offline
        }
    }
}

/// 生成网关：(system, user, capability) -> text
pub struct GatewayRouter {
    offline: Arc<dyn LlmClient>,
    online: Option<Arc<dyn LlmClient>>,
    vision: Option<Arc<dyn LlmClient>>,
    /// 调用统计（按 Route::index）
    call_counts: [AtomicUsize; 3],
}

impl GatewayRouter {
    /// 所有路由共用一个客户端（测试与单模型部署）
    pub fn single(client: Arc<dyn LlmClient>) -> Self {
        Self {
            offline: client,
            online: None,
            vision: None,
            call_counts: Default::default(),
        }
    }

    pub fn with_online(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.online = Some(client);
        self
    }

    pub fn with_vision(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.vision = Some(client);
        self
    }

    /// 选择路由对应的客户端；视觉回退顺序：vision -> online -> offline
    pub fn select(&self, route: Route) -> &Arc<dyn LlmClient> {
        let picked = match route {
            Route::Offline => None,
            Route::Online => self.online.as_ref(),
            Route::Vision => self.vision.as_ref().or(self.online.as_ref()),
        };
        match picked {
            Some(client) => client,
            None => {
                if route != Route::Offline {
                    tracing::warn!(?route, "no dedicated model configured, using offline model");
                }
                &self.offline
            }
        }
    }

    /// 执行一次生成
    pub async fn generate(
        &self,
        system: &str,
        user: &str,
        capability: &Capability,
    ) -> Result<String, LlmError> {
        let route = capability.route();
        let mut user_msg = Message::user(user);
        if let Some(image) = &capability.image {
            user_msg = user_msg.with_image(image.clone());
        }
        let messages = vec![Message::system(system), user_msg];

        let client = self.select(route);
        self.call_counts[route.index()].fetch_add(1, Ordering::Relaxed);
        client.complete(&messages).await
    }

    /// 某路由的调用次数
    pub fn call_count(&self, route: Route) -> usize {
        self.call_counts[route.index()].load(Ordering::Relaxed)
    }

    /// 指定路由实际使用的模型名
    pub fn model_name(&self, route: Route) -> String {
        self.select_quiet(route).model_name().to_string()
    }

    fn select_quiet(&self, route: Route) -> &Arc<dyn LlmClient> {
        match route {
            Route::Offline => &self.offline,
            Route::Online => self.online.as_ref().unwrap_or(&self.offline),
            Route::Vision => self
                .vision
                .as_ref()
                .or(self.online.as_ref())
                .unwrap_or(&self.offline),
        }
    }

    /// 汇总所有后端的 token 使用 (prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        let mut clients: Vec<&Arc<dyn LlmClient>> = vec![&self.offline];
        clients.extend(self.online.iter());
        clients.extend(self.vision.iter());
        clients.iter().fold((0, 0, 0), |acc, c| {
            let (p, cpl, t) = c.token_usage();
            (acc.0 + p, acc.1 + cpl, acc.2 + t)
        })
    }
}

/// 根据配置与环境变量构建网关（OpenAI 兼容 / DeepSeek / Mock）
///
/// DeepSeek 只承担离线编辑；联网与视觉路由需要 OpenAI 兼容端点（配置了 online_model / vision_model 时）。
pub fn create_gateway_from_config(cfg: &AppConfig) -> GatewayRouter {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = cfg.llm.timeouts.request;
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();
    let has_deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();

    if provider == "mock" || (!has_openai_key && !has_deepseek_key) {
        tracing::warn!("No API key set or provider is mock, using Mock LLM");
        return GatewayRouter::single(Arc::new(MockLlmClient::new()));
    }

    let base = cfg.llm.base_url.as_deref();
    let openai = |model: &str| -> Arc<dyn LlmClient> {
        Arc::new(
            OpenAiClient::new(base, model, std::env::var("OPENAI_API_KEY").ok().as_deref())
                .with_timeout(timeout),
        )
    };

    let offline: Arc<dyn LlmClient> = if provider == "deepseek" && has_deepseek_key {
        tracing::info!("Using DeepSeek LLM ({}) for offline edits", cfg.llm.model);
        let key = std::env::var("DEEPSEEK_API_KEY").ok();
        Arc::new(
            OpenAiClient::new(Some(base.unwrap_or(DEEPSEEK_BASE_URL)), &cfg.llm.model, key.as_deref())
                .with_timeout(timeout),
        )
    } else {
        tracing::info!("Using OpenAI LLM ({}) for offline edits", cfg.llm.model);
        openai(&cfg.llm.model)
    };

    let mut router = GatewayRouter::single(offline);
    if has_openai_key {
        if let Some(model) = &cfg.llm.online_model {
            tracing::info!("Using {} for online calls", model);
            router = router.with_online(openai(model));
        }
        if let Some(model) = &cfg.llm.vision_model {
            tracing::info!("Using {} for image calls", model);
            router = router.with_vision(openai(model));
        }
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_routes_by_capability() {
        let offline = Arc::new(MockLlmClient::new().with_responder(|_| Ok("off".into())));
        let online = Arc::new(MockLlmClient::new().with_responder(|_| Ok("on".into())));
        let router = GatewayRouter::single(offline).with_online(online);

        let out = router.generate("s", "u", &Capability::offline()).await.unwrap();
        assert_eq!(out, "off");
        let out = router.generate("s", "u", &Capability::online()).await.unwrap();
        assert_eq!(out, "on");

        // 未配置视觉模型时回退到联网模型
        let img = ImageAttachment::new("image/png", vec![1, 2, 3]);
        let out = router
            .generate("s", "u", &Capability::offline().with_image(img))
            .await
            .unwrap();
        assert_eq!(out, "on");

        assert_eq!(router.call_count(Route::Offline), 1);
        assert_eq!(router.call_count(Route::Online), 1);
        assert_eq!(router.call_count(Route::Vision), 1);
    }

    #[tokio::test]
    async fn test_image_attached_to_user_message() {
        let mock = Arc::new(MockLlmClient::with_responses(["ok"]));
        let router = GatewayRouter::single(mock.clone());
        let img = ImageAttachment::new("image/png", vec![9]);
        router
            .generate("sys", "describe", &Capability::offline().with_image(img.clone()))
            .await
            .unwrap();
        let req = &mock.requests()[0];
        assert_eq!(req.len(), 2);
        assert_eq!(req[0].content, "sys");
        assert_eq!(req[1].image.as_ref(), Some(&img));
    }
}
