use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 文件描述信息
///
/// 由后端文件列表生成，`id` 是元数据索引与内容缓存共用的唯一键
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// 唯一标识（路径或服务端分配的 ID）
    pub id: String,

    /// 显示名称
    pub name: String,

    /// 引用路径
    #[serde(default)]
    pub path: String,

    /// 后端报告的文件大小（字节）
    #[serde(default)]
    pub size: u64,

    /// 时长（秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// 轨道数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_count: Option<u32>,

    /// 标签
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// 最后修改时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,

    /// 其他后端字段（不做解释）
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FileDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            size,
            duration: None,
            track_count: None,
            tags: Vec::new(),
            modified_at: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_track_count(mut self, track_count: u32) -> Self {
        self.track_count = Some(track_count);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// 文件扩展名（小写，带点），如 `.mid`
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.name)
    }

    /// 搜索索引使用的文本：名称、路径、标签拼接后转小写
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(self.name.len() + self.path.len() + 16);
        text.push_str(&self.name);
        text.push(' ');
        text.push_str(&self.path);
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text.to_lowercase()
    }
}

/// 从文件名提取小写扩展名（带点）
pub fn file_extension(name: &str) -> Option<String> {
    let file_name = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
    let dot = file_name.rfind('.')?;
    if dot == 0 || dot + 1 == file_name.len() {
        return None;
    }
    Some(file_name[dot..].to_lowercase())
}
