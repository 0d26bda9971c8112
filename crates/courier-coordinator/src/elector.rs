use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_core::{
    traits::{DistributedLock, LoadRegistry},
    CourierError, CourierResult, ElectorConfig,
};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::job::LeaderJob;
use crate::load::LoadProbe;

/// 节点在选举中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectorState {
    Idle,
    Candidate,
    Leader,
}

/// 负载感知的Leader选举器
///
/// 每个tick: 上报自身负载；非Leader节点查询最低负载节点，若是
/// 自己则尝试抢锁；Leader节点先校验负载阈值（超限主动让出），再
/// 续约并执行单例任务。续约失败或出错一律立即退位，宁可短暂无
/// Leader也不允许双Leader。
pub struct LeaderElector {
    node_id: String,
    lock_key: String,
    config: ElectorConfig,
    lock: Arc<dyn DistributedLock>,
    registry: Arc<dyn LoadRegistry>,
    probe: Arc<dyn LoadProbe>,
    job: Arc<dyn LeaderJob>,
    state: Mutex<ElectorState>,
}

impl LeaderElector {
    pub fn new(
        node_id: impl Into<String>,
        lock_key: impl Into<String>,
        config: ElectorConfig,
        lock: Arc<dyn DistributedLock>,
        registry: Arc<dyn LoadRegistry>,
        probe: Arc<dyn LoadProbe>,
        job: Arc<dyn LeaderJob>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            lock_key: lock_key.into(),
            config,
            lock,
            registry,
            probe,
            job,
            state: Mutex::new(ElectorState::Idle),
        }
    }

    pub fn state(&self) -> ElectorState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: ElectorState) {
        *self.state.lock().unwrap() = state;
    }

    fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.config.lock_ttl_seconds)
    }

    /// 单次协调调用以一个tick周期为时间预算，协调存储失联时当次
    /// tick按出错处理而不是挂起循环
    async fn bounded_coord_call<T>(
        &self,
        op: &str,
        fut: impl std::future::Future<Output = CourierResult<T>> + Send,
    ) -> CourierResult<T> {
        let budget = Duration::from_secs(self.config.tick_interval_seconds);
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(CourierError::Timeout(format!("协调操作 {op} 超时"))),
        }
    }

    /// 推进一个选举周期；公开以便测试确定性单步驱动
    pub async fn tick(&self) -> ElectorState {
        let score = self.probe.current_load().await;
        if let Err(e) = self
            .bounded_coord_call("report_load", self.registry.report_load(&self.node_id, score))
            .await
        {
            warn!("节点 {} 上报负载失败: {}", self.node_id, e);
        }

        let next = match self.state() {
            ElectorState::Leader => self.leader_tick(score).await,
            ElectorState::Idle | ElectorState::Candidate => self.candidate_tick().await,
        };
        self.set_state(next);
        next
    }

    async fn leader_tick(&self, score: f64) -> ElectorState {
        // 协作式让出: 自身负载超过阈值时释放角色，把机会留给
        // 更空闲的节点
        if score > self.config.load_threshold {
            info!(
                "节点 {} 负载 {:.1} 超过阈值 {:.1}，主动让出Leader",
                self.node_id, score, self.config.load_threshold
            );
            if let Err(e) = self
                .bounded_coord_call("release", self.lock.release(&self.lock_key, &self.node_id))
                .await
            {
                warn!("节点 {} 让出时释放锁失败: {}", self.node_id, e);
            }
            return ElectorState::Idle;
        }

        match self
            .bounded_coord_call(
                "renew",
                self.lock.renew(&self.lock_key, &self.node_id, self.lock_ttl()),
            )
            .await
        {
            Ok(true) => {
                self.run_leader_job().await;
                ElectorState::Leader
            }
            Ok(false) => {
                warn!("节点 {} 锁所有权已丢失，立即停止Leader工作", self.node_id);
                ElectorState::Idle
            }
            Err(e) => {
                // 协调存储不可达时按失去所有权处理，避免脑裂
                warn!("节点 {} 续约出错，按失去所有权处理: {}", self.node_id, e);
                ElectorState::Idle
            }
        }
    }

    async fn candidate_tick(&self) -> ElectorState {
        let lowest = match self
            .bounded_coord_call("select_lowest", self.registry.select_lowest())
            .await
        {
            Ok(lowest) => lowest,
            Err(e) => {
                warn!("节点 {} 查询最低负载节点失败: {}", self.node_id, e);
                return ElectorState::Candidate;
            }
        };

        match lowest {
            None => ElectorState::Idle,
            Some(node_id) if node_id == self.node_id => {
                match self
                    .bounded_coord_call(
                        "try_acquire",
                        self.lock
                            .try_acquire(&self.lock_key, &self.node_id, self.lock_ttl()),
                    )
                    .await
                {
                    Ok(true) => {
                        info!("节点 {} 当选Leader", self.node_id);
                        self.run_leader_job().await;
                        ElectorState::Leader
                    }
                    Ok(false) => ElectorState::Candidate,
                    Err(e) => {
                        warn!("节点 {} 抢锁出错: {}", self.node_id, e);
                        ElectorState::Candidate
                    }
                }
            }
            Some(_) => ElectorState::Candidate,
        }
    }

    async fn run_leader_job(&self) {
        if let Err(e) = self.job.run().await {
            // 任务失败不影响Leader身份，下个tick重试
            error!("Leader任务 {} 执行失败: {}", self.job.name(), e);
        }
    }

    /// 选举主循环，随shutdown信号退出并释放已持有的锁
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut tick_interval = interval(Duration::from_secs(self.config.tick_interval_seconds));
        info!(
            "节点 {} 选举循环启动, tick间隔={}s, 锁TTL={}s",
            self.node_id, self.config.tick_interval_seconds, self.config.lock_ttl_seconds
        );

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("节点 {} 选举循环收到关闭信号", self.node_id);
                    if self.state() == ElectorState::Leader {
                        if let Err(e) = self
                            .bounded_coord_call(
                                "release",
                                self.lock.release(&self.lock_key, &self.node_id),
                            )
                            .await
                        {
                            warn!("节点 {} 退出时释放锁失败: {}", self.node_id, e);
                        }
                        self.set_state(ElectorState::Idle);
                    }
                    break;
                }
            }
        }
    }
}
