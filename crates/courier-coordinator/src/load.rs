use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

/// 节点自身负载的采样来源
#[async_trait]
pub trait LoadProbe: Send + Sync {
    async fn current_load(&self) -> f64;
}

/// 从Worker的在途任务计数推导负载分数
pub struct GaugeLoadProbe {
    inflight: Arc<AtomicI64>,
    /// 每个在途任务折算的分数
    scale: f64,
}

impl GaugeLoadProbe {
    pub fn new(inflight: Arc<AtomicI64>, scale: f64) -> Self {
        Self { inflight, scale }
    }
}

#[async_trait]
impl LoadProbe for GaugeLoadProbe {
    async fn current_load(&self) -> f64 {
        self.inflight.load(Ordering::Relaxed).max(0) as f64 * self.scale
    }
}

/// 返回固定分数的探针，可随时改写，用于测试与手工接管
#[derive(Default)]
pub struct FixedLoadProbe {
    score: Mutex<f64>,
}

impl FixedLoadProbe {
    pub fn new(score: f64) -> Self {
        Self {
            score: Mutex::new(score),
        }
    }

    pub fn set(&self, score: f64) {
        *self.score.lock().unwrap() = score;
    }
}

#[async_trait]
impl LoadProbe for FixedLoadProbe {
    async fn current_load(&self) -> f64 {
        *self.score.lock().unwrap()
    }
}
