use midilib_types::{EvictionPolicy, FileDescriptor};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::content::{CacheStats, ContentCache, PutOutcome, RejectReason};
use crate::estimate::{JsonSizeEstimator, SizeEstimator};
use crate::metadata::MetadataIndex;
use crate::search::SearchIndex;

/// 文件目录：内容缓存 + 元数据索引 + 搜索索引
///
/// 三者只通过这里的方法一起修改，每个方法都是一次完整的同步更新，
/// 不会出现元数据与搜索索引不一致、或缓存中存在未索引文件的中间状态。
pub struct FileCatalog<V, E = JsonSizeEstimator> {
    content: ContentCache<V, E>,
    metadata: MetadataIndex,
    search: SearchIndex,
}

impl<V> FileCatalog<V, JsonSizeEstimator>
where
    V: Serialize,
{
    pub fn new(max_cache_bytes: u64, policy: EvictionPolicy) -> Self {
        Self::with_content(ContentCache::new(max_cache_bytes, policy))
    }
}

impl<V, E> FileCatalog<V, E>
where
    E: SizeEstimator<V>,
{
    pub fn with_content(content: ContentCache<V, E>) -> Self {
        Self {
            content,
            metadata: MetadataIndex::new(),
            search: SearchIndex::new(),
        }
    }

    /// 应用扫描结果：替换元数据、重建搜索索引，并清掉已不存在文件的缓存内容
    ///
    /// 返回被清理的缓存 ID
    pub fn apply_scan(&mut self, descriptors: Vec<FileDescriptor>) -> Vec<String> {
        self.search.rebuild(&descriptors);
        self.metadata.replace_all(descriptors);

        let metadata = &self.metadata;
        let purged = self.content.retain(|id| metadata.contains(id));
        if !purged.is_empty() {
            debug!(purged = purged.len(), "Purged cache entries for vanished files");
        }
        purged
    }

    /// 删除文件的全部痕迹
    pub fn remove_file(&mut self, id: &str) -> Option<FileDescriptor> {
        let removed = self.metadata.remove(id);
        self.search.remove(id);
        self.content.invalidate(id);
        removed
    }

    pub fn get_payload(&mut self, id: &str) -> Option<Arc<V>> {
        self.content.get(id)
    }

    pub fn peek_payload(&self, id: &str) -> Option<Arc<V>> {
        self.content.peek(id)
    }

    /// 缓存负载；不在元数据索引中的文件不缓存
    pub fn put_payload(&mut self, id: &str, payload: impl Into<Arc<V>>) -> PutOutcome {
        if !self.metadata.contains(id) {
            debug!(file_id = %id, "Skipping cache for unindexed file");
            return PutOutcome::Rejected(RejectReason::Unindexed);
        }
        self.content.put(id, payload)
    }

    pub fn invalidate_payload(&mut self, id: &str) -> bool {
        self.content.invalidate(id)
    }

    pub fn evict_expired(&mut self, ttl: Duration) -> Vec<String> {
        self.content.evict_expired(ttl)
    }

    pub fn descriptor(&self, id: &str) -> Option<&FileDescriptor> {
        self.metadata.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.metadata.contains(id)
    }

    pub fn files(&self) -> Vec<FileDescriptor> {
        self.metadata.all()
    }

    /// 搜索并返回匹配的描述
    pub fn search(&self, query: &str) -> Vec<FileDescriptor> {
        self.search
            .search(query)
            .iter()
            .filter_map(|id| self.metadata.get(id))
            .cloned()
            .collect()
    }

    pub fn search_ids(&self, query: &str) -> Vec<String> {
        self.search.search(query)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.content.stats()
    }

    pub fn content(&self) -> &ContentCache<V, E> {
        &self.content
    }

    pub fn metadata(&self) -> &MetadataIndex {
        &self.metadata
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.search
    }

    /// 会话结束时清空全部内容
    pub fn clear(&mut self) {
        self.content.clear();
        self.metadata.clear();
        self.search.clear();
    }
}
