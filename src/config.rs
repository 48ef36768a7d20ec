//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `QUILL__*` 覆盖（双下划线表示嵌套，如 `QUILL__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

/// [app] 段：应用名、状态存储目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// JSON 状态文件根目录
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            state_dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".quill/state")
}

/// [llm] 段：后端选择、离线/联网/视觉三个模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 离线编辑模型（写作、评审、修订）
    #[serde(default = "default_model")]
    pub model: String,
    /// 联网模型（格式规范、引用检索）；未设置时回退到 model
    pub online_model: Option<String>,
    /// 视觉模型（图片处理）；未设置时回退到 online_model / model
    pub vision_model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            online_model: None,
            vision_model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    120
}

/// [workflow] 段：新建 WorkflowState 时使用的限额
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    /// 评审-修订总轮数上限
    #[serde(default = "default_max_passes")]
    pub max_passes: u32,
    /// 评审达标分（0-10）
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    /// 单次修订最多提交的编辑操作数
    #[serde(default = "default_max_hunks")]
    pub max_hunks: usize,
    /// 引用目标数上限
    #[serde(default = "default_max_targets")]
    pub max_targets: usize,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
            min_score: default_min_score(),
            max_hunks: default_max_hunks(),
            max_targets: default_max_targets(),
        }
    }
}

fn default_max_passes() -> u32 {
    3
}

fn default_min_score() -> f32 {
    8.0
}

fn default_max_hunks() -> usize {
    5
}

fn default_max_targets() -> usize {
    10
}

/// [prompts] 段：可选的提示词覆盖目录（`<agent>.txt`）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PromptsSection {
    pub dir: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 QUILL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 QUILL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("QUILL")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.workflow.max_passes, 3);
        assert_eq!(cfg.workflow.max_hunks, 5);
        assert_eq!(cfg.workflow.max_targets, 10);
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.app.state_dir, PathBuf::from(".quill/state"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(
            &path,
            "[workflow]\nmax_passes = 5\nmin_score = 7.5\n\n[llm]\nonline_model = \"gpt-4o-search-preview\"\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.workflow.max_passes, 5);
        assert!((cfg.workflow.min_score - 7.5).abs() < f32::EPSILON);
        assert_eq!(cfg.workflow.max_hunks, 5);
        assert_eq!(cfg.llm.online_model.as_deref(), Some("gpt-4o-search-preview"));
    }
}
