//! 进度通道注册表
//!
//! 保证每个任务 ID 同一时刻至多一个通道。提交响应和对账轮询都可能报告同一个任务，
//! 所以 `register` 是幂等的

use crate::tracker::channel::{JobSnapshot, ProgressChannel};
use crate::tracker::connector::PushConnector;
use crate::tracker::sink::{CloseReason, ProgressSink};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 注册表中的一条通道记录
#[derive(Debug, Clone)]
struct ChannelEntry {
    /// 通道实例号，旧实例退场时不会误删新实例
    instance: u64,
    snapshot: JobSnapshot,
}

/// 进度通道注册表
pub struct ProgressRegistry {
    channels: DashMap<String, ChannelEntry>,
    connector: Arc<dyn PushConnector>,
    sink: Arc<dyn ProgressSink>,
    completion_grace: Duration,
    next_instance: AtomicU64,
}

impl ProgressRegistry {
    pub fn new(
        connector: Arc<dyn PushConnector>,
        sink: Arc<dyn ProgressSink>,
        completion_grace: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            channels: DashMap::new(),
            connector,
            sink,
            completion_grace,
            next_instance: AtomicU64::new(1),
        })
    }

    /// 为任务打开进度通道；已存在则什么都不做
    ///
    /// 检查与插入在同一个 entry 操作内完成，中间没有 await。
    /// 返回 `true` 表示新建了通道
    pub fn register(self: &Arc<Self>, job_id: &str) -> bool {
        let instance = match self.channels.entry(job_id.to_string()) {
            Entry::Occupied(_) => {
                debug!("任务已在追踪中，跳过: {}", job_id);
                return false;
            }
            Entry::Vacant(vacant) => {
                let instance = self.next_instance.fetch_add(1, Ordering::SeqCst);
                vacant.insert(ChannelEntry {
                    instance,
                    snapshot: JobSnapshot::default(),
                });
                instance
            }
        };

        info!("开始追踪任务进度: {}", job_id);
        let registry = Arc::clone(self);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            registry.drive(job_id, instance).await;
        });
        true
    }

    async fn drive(self: Arc<Self>, job_id: String, instance: u64) {
        let reason = match self.connector.open(&job_id).await {
            Ok(frames) => {
                let channel = ProgressChannel::new(job_id.clone(), self.completion_grace);
                channel
                    .run(frames, self.sink.as_ref(), |snapshot| {
                        self.record_snapshot(&job_id, instance, snapshot)
                    })
                    .await
            }
            Err(e) => {
                // 任务若仍在运行，下一次对账会重新注册
                warn!("打开推送通道失败: {} - {}", job_id, e);
                CloseReason::ConnectFailed(e.to_string())
            }
        };

        self.retire(&job_id, instance);
        self.sink.closed(&job_id, &reason);
    }

    fn record_snapshot(&self, job_id: &str, instance: u64, snapshot: JobSnapshot) {
        if let Some(mut entry) = self.channels.get_mut(job_id) {
            if entry.instance == instance {
                entry.snapshot = snapshot;
            }
        }
    }

    fn retire(&self, job_id: &str, instance: u64) {
        if self
            .channels
            .remove_if(job_id, |_, entry| entry.instance == instance)
            .is_some()
        {
            debug!("通道已移除: {}", job_id);
        }
    }

    /// 任务是否有存活的通道
    pub fn is_tracking(&self, job_id: &str) -> bool {
        self.channels.contains_key(job_id)
    }

    /// 任务当前的可见状态
    pub fn snapshot(&self, job_id: &str) -> Option<JobSnapshot> {
        self.channels.get(job_id).map(|entry| entry.snapshot)
    }

    /// 所有存活通道的任务 ID
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
