//! 对话消息
//!
//! 发往生成网关的单条消息：role + content；user 消息可附带一张图片（仅 Figure 智能体使用）。

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 图片附件：原始字节 + MIME 类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// 按文件扩展名推断 MIME 类型，未知扩展名按 png 处理
    pub fn from_extension(ext: &str, data: Vec<u8>) -> Self {
        let mime = match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            _ => "image/png",
        };
        Self::new(mime, data)
    }

    /// 编码为 `data:<mime>;base64,...`，供 OpenAI 兼容接口的 image_url 使用
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

/// 单条消息
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub image: Option<ImageAttachment>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            image: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url() {
        let img = ImageAttachment::from_extension("JPG", vec![0xff, 0xd8]);
        assert_eq!(img.mime_type, "image/jpeg");
        assert_eq!(img.to_data_url(), "data:image/jpeg;base64,/9g=");
    }
}
