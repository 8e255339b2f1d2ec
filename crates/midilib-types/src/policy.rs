use serde::{Deserialize, Serialize};

/// 内容缓存淘汰顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// 最近最少访问优先淘汰
    #[default]
    #[serde(rename = "lru")]
    LeastRecentlyUsed,
    /// 最早插入优先淘汰
    #[serde(rename = "insertion")]
    InsertionOrder,
}
