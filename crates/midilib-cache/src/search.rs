use midilib_types::FileDescriptor;
use std::collections::HashMap;

/// 搜索索引：ID -> 小写的可搜索文本
///
/// 每次扫描后整体重建，除删除外不做增量修改
#[derive(Debug, Default)]
pub struct SearchIndex {
    entries: HashMap<String, String>,
    order: Vec<String>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(&mut self, descriptors: &[FileDescriptor]) {
        let mut entries = HashMap::with_capacity(descriptors.len());
        let mut order = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if entries
                .insert(descriptor.id.clone(), descriptor.searchable_text())
                .is_none()
            {
                order.push(descriptor.id.clone());
            }
        }

        self.entries = entries;
        self.order = order;
    }

    /// 大小写不敏感的子串匹配；空白查询返回全部
    pub fn search(&self, query: &str) -> Vec<String> {
        if query.trim().is_empty() {
            return self.order.clone();
        }

        let needle = query.to_lowercase();
        self.order
            .iter()
            .filter(|id| {
                self.entries
                    .get(id.as_str())
                    .map(|text| text.contains(&needle))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub fn indexed_text(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        if self.entries.remove(id).is_some() {
            self.order.retain(|existing| existing != id);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
