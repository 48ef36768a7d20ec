//! 素材：需要插入文档的图片与表格

use std::path::Path;

use serde::Serialize;

use crate::core::AgentError;
use crate::llm::ImageAttachment;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Table,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssetPayload {
    Image(ImageAttachment),
    /// CSV / Markdown 等文本形式的表格数据
    Table(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub name: String,
    pub caption: Option<String>,
    pub payload: AssetPayload,
}

impl Asset {
    pub fn image(name: impl Into<String>, image: ImageAttachment) -> Self {
        Self {
            name: name.into(),
            caption: None,
            payload: AssetPayload::Image(image),
        }
    }

    pub fn table(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            caption: None,
            payload: AssetPayload::Table(data.into()),
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn kind(&self) -> AssetKind {
        match self.payload {
            AssetPayload::Image(_) => AssetKind::Image,
            AssetPayload::Table(_) => AssetKind::Table,
        }
    }

    /// 从文件加载：图片扩展名按图片处理，其余按文本表格读取
    pub async fn load(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let not_found = |e: std::io::Error| {
            AgentError::AssetNotFound(format!("{}: {}", path.display(), e))
        };
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            let data = tokio::fs::read(path).await.map_err(not_found)?;
            Ok(Self::image(name, ImageAttachment::from_extension(&ext, data)))
        } else {
            let data = tokio::fs::read_to_string(path).await.map_err(not_found)?;
            Ok(Self::table(name, data))
        }
    }
}

/// 提示词与上下文中使用的素材摘要
#[derive(Debug, Clone, Serialize)]
pub struct AssetSummary {
    pub name: String,
    pub kind: AssetKind,
    pub processed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_by_extension() {
        let dir = TempDir::new().unwrap();
        let img = dir.path().join("plot.JPG");
        let csv = dir.path().join("results.csv");
        std::fs::write(&img, [0xff, 0xd8]).unwrap();
        std::fs::write(&csv, "a,b\n1,2\n").unwrap();

        let image = Asset::load("plot", &img).await.unwrap();
        assert_eq!(image.kind(), AssetKind::Image);
        match image.payload {
            AssetPayload::Image(a) => assert_eq!(a.mime_type, "image/jpeg"),
            AssetPayload::Table(_) => panic!("expected image"),
        }

        let table = Asset::load("results", &csv).await.unwrap();
        assert_eq!(table.payload, AssetPayload::Table("a,b\n1,2\n".into()));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = Asset::load("x", "/definitely/not/here.png").await.unwrap_err();
        assert!(matches!(err, AgentError::AssetNotFound(_)));
    }
}
