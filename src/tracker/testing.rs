//! 测试用的假实现：推送连接、界面、作业 API、调度器

use crate::api::{DownloadRequest, JobApi, JobId};
use crate::error::{ClientError, Result};
use crate::tracker::connector::{FrameStream, PushConnector};
use crate::tracker::message::ProgressView;
use crate::tracker::scheduler::{ScheduleHandle, Scheduler, TickTask};
use crate::tracker::sink::{CloseReason, ProgressSink};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 可控的推送连接：测试向指定任务推帧或断开
#[derive(Default)]
pub(crate) struct FakeConnector {
    senders: Mutex<HashMap<String, UnboundedSender<Result<String>>>>,
    opens: Mutex<HashMap<String, usize>>,
    unreachable: Mutex<HashSet<String>>,
}

impl FakeConnector {
    pub(crate) fn push(&self, job_id: &str, frame: &str) -> bool {
        match self.senders.lock().get(job_id) {
            Some(tx) => tx.unbounded_send(Ok(frame.to_string())).is_ok(),
            None => false,
        }
    }

    /// 模拟服务端断开
    pub(crate) fn hang_up(&self, job_id: &str) {
        self.senders.lock().remove(job_id);
    }

    pub(crate) fn open_count(&self, job_id: &str) -> usize {
        self.opens.lock().get(job_id).copied().unwrap_or(0)
    }

    pub(crate) fn set_unreachable(&self, job_id: &str) {
        self.unreachable.lock().insert(job_id.to_string());
    }
}

#[async_trait]
impl PushConnector for FakeConnector {
    async fn open(&self, job_id: &str) -> Result<FrameStream> {
        *self.opens.lock().entry(job_id.to_string()).or_default() += 1;
        if self.unreachable.lock().contains(job_id) {
            return Err(ClientError::Connect {
                job_id: job_id.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        let (tx, rx) = unbounded();
        self.senders.lock().insert(job_id.to_string(), tx);
        Ok(Box::pin(rx))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SinkEvent {
    Reveal,
    Progress(u8),
    Done,
    Error,
    Closed(CloseReason),
}

/// 记录所有界面回调
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<(String, SinkEvent)>>,
}

impl RecordingSink {
    pub(crate) fn events(&self, job_id: &str) -> Vec<SinkEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub(crate) fn last_percent(&self, job_id: &str) -> Option<u8> {
        self.events(job_id).into_iter().rev().find_map(|e| match e {
            SinkEvent::Progress(p) => Some(p),
            _ => None,
        })
    }

    fn record(&self, job_id: &str, event: SinkEvent) {
        self.events.lock().push((job_id.to_string(), event));
    }
}

impl ProgressSink for RecordingSink {
    fn reveal(&self, job_id: &str) {
        self.record(job_id, SinkEvent::Reveal);
    }

    fn progress(&self, job_id: &str, view: ProgressView) {
        self.record(job_id, SinkEvent::Progress(view.percent));
    }

    fn done(&self, job_id: &str) {
        self.record(job_id, SinkEvent::Done);
    }

    fn error(&self, job_id: &str) {
        self.record(job_id, SinkEvent::Error);
    }

    fn closed(&self, job_id: &str, reason: &CloseReason) {
        self.record(job_id, SinkEvent::Closed(reason.clone()));
    }
}

/// 按脚本返回结果的作业 API
#[derive(Default)]
pub(crate) struct FakeJobApi {
    active: Mutex<VecDeque<Result<Vec<JobId>>>>,
    submits: Mutex<VecDeque<Result<Vec<JobId>>>>,
    polls: Mutex<usize>,
}

impl FakeJobApi {
    pub(crate) fn queue_active(&self, result: Result<Vec<JobId>>) {
        self.active.lock().push_back(result);
    }

    pub(crate) fn queue_submit(&self, result: Result<Vec<JobId>>) {
        self.submits.lock().push_back(result);
    }

    pub(crate) fn poll_count(&self) -> usize {
        *self.polls.lock()
    }
}

pub(crate) fn ids(list: &[&str]) -> Vec<JobId> {
    list.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl JobApi for FakeJobApi {
    async fn submit(&self, _request: &DownloadRequest) -> Result<Vec<JobId>> {
        self.submits
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Transport("no scripted response".into())))
    }

    async fn active_jobs(&self) -> Result<Vec<JobId>> {
        *self.polls.lock() += 1;
        self.active
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Transport("no scripted response".into())))
    }
}

/// 手动触发的调度器
#[derive(Default)]
pub(crate) struct ManualScheduler {
    tasks: Mutex<Vec<(Duration, TickTask, CancellationToken)>>,
}

impl ManualScheduler {
    pub(crate) fn intervals(&self) -> Vec<Duration> {
        self.tasks.lock().iter().map(|(d, _, _)| *d).collect()
    }

    /// 依次执行每个未取消的任务一次
    pub(crate) async fn tick(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        for (_, task, token) in tasks.iter_mut() {
            if !token.is_cancelled() {
                task().await;
            }
        }
        let mut slot = self.tasks.lock();
        tasks.append(&mut slot);
        *slot = tasks;
    }
}

impl Scheduler for ManualScheduler {
    fn every(&self, interval: Duration, task: TickTask) -> ScheduleHandle {
        let token = CancellationToken::new();
        self.tasks.lock().push((interval, task, token.clone()));
        ScheduleHandle::new(token)
    }
}
