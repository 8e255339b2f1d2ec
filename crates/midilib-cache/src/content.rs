use chrono::{DateTime, Utc};
use midilib_types::EvictionPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::estimate::{JsonSizeEstimator, SizeEstimator};

/// 缓存条目
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub payload: Arc<V>,
    pub size_bytes: u64,
    pub inserted_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// 在淘汰顺序中的位置
    order_key: u64,
}

/// 写入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// 已缓存，`evicted` 为腾出空间而淘汰的条目
    Inserted { size_bytes: u64, evicted: Vec<String> },
    /// 未缓存（策略决定，不是错误），调用方仍使用负载
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// 单个负载超过缓存上限
    Oversized { size_bytes: u64, max_bytes: u64 },
    /// 无法估算大小
    Unmeasurable,
    /// 文件不在元数据索引中
    Unindexed,
}

impl PutOutcome {
    pub fn is_cached(&self) -> bool {
        matches!(self, PutOutcome::Inserted { .. })
    }
}

/// 缓存统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub current_bytes: u64,
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub rejections: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 有界内容缓存
///
/// 按字节预算限制总大小：插入前先按淘汰顺序逐个移除旧条目，
/// 任何插入完成后 `current_bytes <= max_bytes` 始终成立。
/// 过期清理（`evict_expired`）按插入时间进行，与访问无关。
pub struct ContentCache<V, E = JsonSizeEstimator> {
    entries: HashMap<String, CacheEntry<V>>,
    /// 淘汰顺序：键越小越先淘汰
    order: BTreeMap<u64, String>,
    next_key: u64,
    current_bytes: u64,
    max_bytes: u64,
    policy: EvictionPolicy,
    estimator: E,
    stats: CacheStats,
}

impl<V> ContentCache<V, JsonSizeEstimator>
where
    V: Serialize,
{
    pub fn new(max_bytes: u64, policy: EvictionPolicy) -> Self {
        Self::with_estimator(max_bytes, policy, JsonSizeEstimator)
    }
}

impl<V, E> ContentCache<V, E>
where
    E: SizeEstimator<V>,
{
    pub fn with_estimator(max_bytes: u64, policy: EvictionPolicy, estimator: E) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_key: 0,
            current_bytes: 0,
            max_bytes,
            policy,
            estimator,
            stats: CacheStats::default(),
        }
    }

    /// 读取负载，命中时更新访问时间
    pub fn get(&mut self, id: &str) -> Option<Arc<V>> {
        self.get_at(id, Utc::now())
    }

    pub fn get_at(&mut self, id: &str, now: DateTime<Utc>) -> Option<Arc<V>> {
        let refreshed_key = match self.policy {
            EvictionPolicy::LeastRecentlyUsed => Some(self.next_key),
            EvictionPolicy::InsertionOrder => None,
        };

        let Some(entry) = self.entries.get_mut(id) else {
            self.stats.misses += 1;
            return None;
        };

        entry.last_accessed_at = now;
        if let Some(key) = refreshed_key {
            self.order.remove(&entry.order_key);
            entry.order_key = key;
            self.order.insert(key, id.to_string());
            self.next_key += 1;
        }

        self.stats.hits += 1;
        Some(entry.payload.clone())
    }

    /// 只读查看，不影响访问时间和统计
    pub fn peek(&self, id: &str) -> Option<Arc<V>> {
        self.entries.get(id).map(|entry| entry.payload.clone())
    }

    pub fn entry(&self, id: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(id)
    }

    /// 写入负载
    pub fn put(&mut self, id: &str, payload: impl Into<Arc<V>>) -> PutOutcome {
        self.put_at(id, payload, Utc::now())
    }

    pub fn put_at(&mut self, id: &str, payload: impl Into<Arc<V>>, now: DateTime<Utc>) -> PutOutcome {
        let payload = payload.into();

        let Some(size_bytes) = self.estimator.estimate(&payload) else {
            // 旧内容可能已经过时，不再保留
            self.invalidate(id);
            self.stats.rejections += 1;
            warn!(file_id = %id, "Payload size could not be estimated, not caching");
            return PutOutcome::Rejected(RejectReason::Unmeasurable);
        };

        if size_bytes > self.max_bytes {
            self.invalidate(id);
            self.stats.rejections += 1;
            warn!(
                file_id = %id,
                size = size_bytes,
                max = self.max_bytes,
                "Payload exceeds cache budget, not caching"
            );
            return PutOutcome::Rejected(RejectReason::Oversized {
                size_bytes,
                max_bytes: self.max_bytes,
            });
        }

        self.remove_entry(id);

        let mut evicted = Vec::new();
        while self.current_bytes + size_bytes > self.max_bytes {
            let Some((_, victim)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&victim) {
                self.current_bytes -= entry.size_bytes;
                self.stats.evictions += 1;
                debug!(file_id = %victim, size = entry.size_bytes, "Evicted cache entry");
            }
            evicted.push(victim);
        }

        let order_key = self.next_key;
        self.next_key += 1;
        self.order.insert(order_key, id.to_string());
        self.entries.insert(
            id.to_string(),
            CacheEntry {
                payload,
                size_bytes,
                inserted_at: now,
                last_accessed_at: now,
                order_key,
            },
        );
        self.current_bytes += size_bytes;
        self.stats.insertions += 1;

        debug!(
            file_id = %id,
            size = size_bytes,
            current = self.current_bytes,
            evicted = evicted.len(),
            "Cached payload"
        );

        PutOutcome::Inserted {
            size_bytes,
            evicted,
        }
    }

    /// 清理插入时间早于 `now - ttl` 的条目，返回被移除的 ID
    pub fn evict_expired(&mut self, ttl: Duration) -> Vec<String> {
        self.evict_expired_at(ttl, Utc::now())
    }

    pub fn evict_expired_at(&mut self, ttl: Duration, now: DateTime<Utc>) -> Vec<String> {
        let Some(cutoff) = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
        else {
            return Vec::new();
        };

        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            self.remove_entry(id);
            self.stats.expirations += 1;
        }

        if !expired.is_empty() {
            debug!(removed = expired.len(), "Expired cache entries removed");
        }

        expired
    }

    /// 移除单个条目（文件被删除或覆盖时）
    pub fn invalidate(&mut self, id: &str) -> bool {
        self.remove_entry(id).is_some()
    }

    /// 只保留满足条件的条目，返回被移除的 ID
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let removed: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !keep(id))
            .cloned()
            .collect();

        for id in &removed {
            self.remove_entry(id);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.current_bytes = 0;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_bytes(&self) -> u64 {
        self.current_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// 按淘汰顺序列出 ID（最先淘汰的在前）
    pub fn ids(&self) -> Vec<String> {
        self.order.values().cloned().collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            current_bytes: self.current_bytes,
            max_bytes: self.max_bytes,
            ..self.stats.clone()
        }
    }

    fn remove_entry(&mut self, id: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(id)?;
        self.order.remove(&entry.order_key);
        self.current_bytes -= entry.size_bytes;
        Some(entry)
    }
}
