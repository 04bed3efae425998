// 下载提交：提交请求 → 拿到任务 ID → 注册进度通道

use crate::api::{DownloadRequest, JobApi, JobId};
use crate::error::Result;
use crate::tracker::registry::ProgressRegistry;
use std::sync::Arc;
use tracing::{error, info};

/// 下载提交器
pub struct JobSubmitter {
    api: Arc<dyn JobApi>,
    registry: Arc<ProgressRegistry>,
}

impl JobSubmitter {
    pub fn new(api: Arc<dyn JobApi>, registry: Arc<ProgressRegistry>) -> Self {
        Self { api, registry }
    }

    /// 提交并追踪返回的任务
    ///
    /// 失败时返回错误，调用方据此重新启用触发提交的控件
    pub async fn submit(&self, request: &DownloadRequest) -> Result<Vec<JobId>> {
        let ids = match self.api.submit(request).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("下载提交失败 ({}): {}", request.kind.endpoint(), e);
                return Err(e);
            }
        };

        for id in &ids {
            self.registry.register(id);
        }
        info!("已提交 {} 个任务: {:?}", ids.len(), ids);
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::tracker::testing::{ids, FakeConnector, FakeJobApi, RecordingSink};
    use std::time::Duration;

    fn setup() -> (JobSubmitter, Arc<FakeJobApi>, Arc<ProgressRegistry>) {
        let api = Arc::new(FakeJobApi::default());
        let registry = ProgressRegistry::new(
            Arc::new(FakeConnector::default()),
            Arc::new(RecordingSink::default()),
            Duration::from_millis(1500),
        );
        (
            JobSubmitter::new(api.clone(), Arc::clone(&registry)),
            api,
            registry,
        )
    }

    #[tokio::test]
    async fn test_submit_registers_every_id() {
        let (submitter, api, registry) = setup();
        api.queue_submit(Ok(ids(&["t1", "t2", "t1"])));

        let submitted = submitter
            .submit(&DownloadRequest::album().field("album_id", "42"))
            .await
            .unwrap();

        assert_eq!(submitted.len(), 3);
        assert_eq!(registry.active_ids(), vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_submit_failure_is_returned() {
        let (submitter, api, registry) = setup();
        api.queue_submit(Err(ClientError::Transport("timeout".into())));

        let result = submitter.submit(&DownloadRequest::track()).await;
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_submission_and_reconcile_share_one_channel() {
        let (submitter, api, registry) = setup();
        api.queue_submit(Ok(ids(&["t1"])));
        submitter.submit(&DownloadRequest::track()).await.unwrap();

        // 对账再次报告同一个任务
        assert!(!registry.register("t1"));
        assert_eq!(registry.len(), 1);
    }
}
