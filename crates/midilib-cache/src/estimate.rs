use serde::Serialize;
use std::io;

/// 负载大小估算
///
/// 估算值只用于缓存记账，必须对同一值确定且单调；无法估算时返回 `None`
pub trait SizeEstimator<V>: Send + Sync {
    fn estimate(&self, value: &V) -> Option<u64>;
}

/// 按 JSON 序列化后的字节数估算
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSizeEstimator;

impl<V: Serialize> SizeEstimator<V> for JsonSizeEstimator {
    fn estimate(&self, value: &V) -> Option<u64> {
        let mut counter = ByteCounter(0);
        serde_json::to_writer(&mut counter, value).ok()?;
        Some(counter.0)
    }
}

/// 只计数不保存的 writer
struct ByteCounter(u64);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
