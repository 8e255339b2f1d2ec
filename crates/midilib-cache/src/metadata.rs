use chrono::{DateTime, Utc};
use midilib_types::FileDescriptor;
use std::collections::HashMap;

/// 元数据索引：后端文件列表的内存镜像
///
/// 只能整体替换（`replace_all`）或在确认删除后移除单项，不存在部分更新
#[derive(Debug, Default)]
pub struct MetadataIndex {
    entries: HashMap<String, FileDescriptor>,
    /// 后端返回的顺序
    order: Vec<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体替换索引内容；重复 ID 保留最后一个描述，位置取第一次出现处
    pub fn replace_all(&mut self, descriptors: Vec<FileDescriptor>) {
        let mut entries = HashMap::with_capacity(descriptors.len());
        let mut order = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if !entries.contains_key(&descriptor.id) {
                order.push(descriptor.id.clone());
            }
            entries.insert(descriptor.id.clone(), descriptor);
        }

        self.entries = entries;
        self.order = order;
        self.updated_at = Some(Utc::now());
    }

    pub fn get(&self, id: &str) -> Option<&FileDescriptor> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<FileDescriptor> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// 当前内容的快照
    pub fn all(&self) -> Vec<FileDescriptor> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .cloned()
            .collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 后端报告的文件总大小
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|d| d.size).sum()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.updated_at = None;
    }
}
