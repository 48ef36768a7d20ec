//! LLM 层：生成网关抽象与实现（OpenAI 兼容端点 / Mock）与能力路由

pub mod message;
pub mod mock;
pub mod openai;
pub mod router;
pub mod traits;

pub use message::{ImageAttachment, Message, Role};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use router::{create_gateway_from_config, Capability, GatewayRouter, Route, DEEPSEEK_BASE_URL};
pub use traits::{LlmClient, LlmError};
