use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use courier_core::{
    models::LoadEntry,
    traits::{DistributedLock, LoadRegistry},
    CourierResult,
};

struct LockRecord {
    holder_id: String,
    expires_at: Instant,
}

/// 内存版分布式锁，语义与Redis实现一致（含过期），用于测试与
/// 单进程嵌入式部署
#[derive(Default)]
pub struct InMemoryLock {
    records: Mutex<HashMap<String, LockRecord>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn try_acquire(
        &self,
        key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> CourierResult<bool> {
        let mut records = self.records.lock().unwrap();
        let now = Instant::now();

        match records.get(key) {
            Some(record) if record.expires_at > now => Ok(false),
            _ => {
                records.insert(
                    key.to_string(),
                    LockRecord {
                        holder_id: holder_id.to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn renew(&self, key: &str, holder_id: &str, ttl: Duration) -> CourierResult<bool> {
        let mut records = self.records.lock().unwrap();
        let now = Instant::now();

        match records.get_mut(key) {
            Some(record) if record.holder_id == holder_id && record.expires_at > now => {
                record.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, holder_id: &str) -> CourierResult<()> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get(key) {
            if record.holder_id == holder_id {
                records.remove(key);
            }
        }
        Ok(())
    }
}

/// 内存版负载注册表，同分按 node_id 字典序选取
#[derive(Default)]
pub struct InMemoryLoadRegistry {
    scores: Mutex<BTreeMap<String, f64>>,
}

impl InMemoryLoadRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoadRegistry for InMemoryLoadRegistry {
    async fn report_load(&self, node_id: &str, score: f64) -> CourierResult<()> {
        self.scores
            .lock()
            .unwrap()
            .insert(node_id.to_string(), score);
        Ok(())
    }

    async fn select_lowest(&self) -> CourierResult<Option<String>> {
        let scores = self.scores.lock().unwrap();
        // BTreeMap按key字典序遍历，严格小于比较使同分时首个节点胜出
        let mut lowest: Option<(&String, f64)> = None;
        for (node_id, &score) in scores.iter() {
            match lowest {
                Some((_, best)) if score >= best => {}
                _ => lowest = Some((node_id, score)),
            }
        }
        Ok(lowest.map(|(node_id, _)| node_id.clone()))
    }

    async fn snapshot(&self) -> CourierResult<Vec<LoadEntry>> {
        let scores = self.scores.lock().unwrap();
        let mut entries: Vec<LoadEntry> = scores
            .iter()
            .map(|(node_id, &score)| LoadEntry {
                node_id: node_id.clone(),
                score,
            })
            .collect();
        entries.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        Ok(entries)
    }

    async fn remove(&self, node_id: &str) -> CourierResult<()> {
        self.scores.lock().unwrap().remove(node_id);
        Ok(())
    }
}
