// ABOUTME: Crawl job registry: job ids, lifecycle status, progress counters and accumulated results.
// ABOUTME: Each job runs as its own task; a panic or error ends the job as errored with no results.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info};

use crate::crawl::{CrawlMonitor, Crawler};
use crate::progress::{NoopSink, ProgressEvent, ProgressSink};
use crate::result::ProductRecord;

/// Lifecycle of a crawl job: `pending -> running -> {completed, failed, errored}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    /// Finished with at least one record
    Completed,
    /// Finished cleanly but found nothing
    Failed,
    /// Aborted by an error or panic
    Errored,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Errored)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a job, as served by status polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub keyword: String,
    pub max_pages: u32,
    pub status: JobStatus,
    pub progress: u8,
    pub current_item: u32,
    /// Records collected while running. Counters only grow, so an errored job
    /// keeps this value even though it returns no records.
    pub total_items: usize,
    pub message: String,
    /// Records available from [`JobRegistry::results`].
    pub result_count: usize,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct JobState {
    keyword: String,
    max_pages: u32,
    status: JobStatus,
    progress: u8,
    current_item: u32,
    total_items: usize,
    message: String,
    results: Vec<ProductRecord>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl JobState {
    fn event(&self, job_id: &str) -> ProgressEvent {
        ProgressEvent {
            job_id: job_id.to_string(),
            status: self.status,
            progress: self.progress,
            current_item: self.current_item,
            total_items: self.total_items,
            message: self.message.clone(),
        }
    }

    fn snapshot(&self, job_id: &str) -> JobSnapshot {
        JobSnapshot {
            job_id: job_id.to_string(),
            keyword: self.keyword.clone(),
            max_pages: self.max_pages,
            status: self.status,
            progress: self.progress,
            current_item: self.current_item,
            total_items: self.total_items,
            message: self.message.clone(),
            result_count: self.results.len(),
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }
}

/// Registry of crawl jobs for the lifetime of the process.
///
/// Cloning shares the registry. Job state is mutated only by the task driving
/// that job and is frozen once the job reaches a terminal status.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, JobState>>>,
    sink: Arc<dyn ProgressSink>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(Arc::new(NoopSink))
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.len())
            .finish_non_exhaustive()
    }
}

impl JobRegistry {
    /// Create a registry that reports progress to `sink`.
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            sink,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobState>> {
        self.jobs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobState>> {
        self.jobs.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a pending job and returns its id.
    pub fn create(&self, keyword: impl Into<String>, max_pages: u32) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let state = JobState {
            keyword: keyword.into(),
            max_pages,
            status: JobStatus::Pending,
            progress: 0,
            current_item: 0,
            total_items: 0,
            message: String::new(),
            results: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        };
        self.write().insert(id.clone(), state);
        id
    }

    /// Registers a job and drives it on a new tokio task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, keyword: impl Into<String>, max_pages: u32, crawler: Crawler) -> String {
        let id = self.create(keyword, max_pages);
        let registry = self.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            registry.run(&job_id, crawler).await;
        });
        id
    }

    /// Drives a pending job to a terminal status.
    ///
    /// Returns the terminal status, or `None` if the id is unknown or the job
    /// was not pending.
    pub async fn run(&self, id: &str, crawler: Crawler) -> Option<JobStatus> {
        let (keyword, max_pages, started) = {
            let mut jobs = self.write();
            let state = jobs.get_mut(id)?;
            if state.status != JobStatus::Pending {
                return None;
            }
            state.status = JobStatus::Running;
            state.message = format!("'{}' 검색을 시작합니다...", state.keyword);
            (state.keyword.clone(), state.max_pages, state.event(id))
        };
        self.sink.publish(&started);
        info!(job_id = id, keyword = %keyword, max_pages, "job started");

        let monitor = JobMonitor {
            registry: self,
            job_id: id,
        };
        let outcome = AssertUnwindSafe(crawler.crawl(&keyword, max_pages, &monitor))
            .catch_unwind()
            .await;

        let (status, message, results) = match outcome {
            Ok(Ok(records)) if records.is_empty() => {
                (JobStatus::Failed, "상품을 찾을 수 없습니다.".to_string(), Vec::new())
            }
            Ok(Ok(records)) => (
                JobStatus::Completed,
                format!("총 {}개 상품 수집 완료!", records.len()),
                records,
            ),
            Ok(Err(e)) => {
                error!(job_id = id, error = %e, "job failed");
                (JobStatus::Errored, format!("오류 발생: {}", e), Vec::new())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(job_id = id, reason = %reason, "job panicked");
                (JobStatus::Errored, format!("오류 발생: {}", reason), Vec::new())
            }
        };

        self.finish(id, status, message, results);
        info!(job_id = id, status = %status, "job finished");
        Some(status)
    }

    fn finish(&self, id: &str, status: JobStatus, message: String, results: Vec<ProductRecord>) {
        self.update(id, |state| {
            state.status = status;
            state.message = message;
            if status == JobStatus::Completed {
                state.progress = 100;
                state.total_items = results.len();
            }
            state.results = results;
            state.finished_at = Some(Utc::now());
        });
    }

    /// Applies `f` to a non-terminal job and publishes the resulting event.
    fn update(&self, id: &str, f: impl FnOnce(&mut JobState)) {
        let event = {
            let mut jobs = self.write();
            let Some(state) = jobs.get_mut(id) else {
                return;
            };
            if state.status.is_terminal() {
                return;
            }
            f(state);
            state.event(id)
        };
        self.sink.publish(&event);
    }

    pub fn status(&self, id: &str) -> Option<JobStatus> {
        self.read().get(id).map(|state| state.status)
    }

    pub fn snapshot(&self, id: &str) -> Option<JobSnapshot> {
        self.read().get(id).map(|state| state.snapshot(id))
    }

    /// Accumulated records of a job; empty until the job completes.
    pub fn results(&self, id: &str) -> Option<Vec<ProductRecord>> {
        self.read().get(id).map(|state| state.results.clone())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Feeds crawl callbacks into one job's state.
struct JobMonitor<'a> {
    registry: &'a JobRegistry,
    job_id: &'a str,
}

impl CrawlMonitor for JobMonitor<'_> {
    fn message(&self, text: &str) {
        self.registry.update(self.job_id, |state| {
            state.message = text.to_string();
        });
    }

    fn page_started(&self, page: u32, _max_pages: u32) {
        self.registry.update(self.job_id, |state| {
            state.current_item = state.current_item.max(page);
        });
    }

    fn page_finished(&self, page: u32, max_pages: u32, total_records: usize) {
        let percent = (u64::from(page) * 100 / u64::from(max_pages.max(1))).min(100) as u8;
        self.registry.update(self.job_id, |state| {
            state.progress = state.progress.max(percent);
            state.total_items = state.total_items.max(total_records);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrawlError;
    use crate::progress::ProgressHub;
    use crate::resource::{FetchResult, PageFetcher};
    use async_trait::async_trait;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    enum Mode {
        Listing,
        Chairs,
        BrokenAfterFirst,
        Empty,
        Broken,
        Panic,
    }

    struct FixedFetcher(Mode);

    fn html(body: &str) -> String {
        format!(
            "<html><head><title>t</title></head><body>{}<!--{}--></body></html>",
            body,
            "x".repeat(1200)
        )
    }

    fn desk_listing() -> String {
        html(
            r#"<ul class="product_list">
                <li><p class="prod_name"><a href="/p/1">스탠딩 데스크</a></p><strong class="num">299,000</strong></li>
                <li><p class="prod_name"><a href="/p/2">모션 데스크 프레임</a></p><strong class="num">189,000</strong></li>
            </ul>"#,
        )
    }

    #[async_trait]
    impl PageFetcher for FixedFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchResult, CrawlError> {
            let body = match self.0 {
                Mode::Listing => desk_listing(),
                Mode::Chairs => html(
                    r#"<ul class="product_list">
                        <li><p class="prod_name"><a href="/p/9">메쉬 사무용 의자</a></p><strong class="num">159,000</strong></li>
                    </ul>"#,
                ),
                Mode::BrokenAfterFirst if url.ends_with("page=1") => desk_listing(),
                Mode::BrokenAfterFirst => {
                    return Err(CrawlError::internal("Fetch", Some(anyhow::anyhow!("boom"))))
                }
                Mode::Empty => html("<p>없음</p>"),
                Mode::Broken => {
                    return Err(CrawlError::internal("Fetch", Some(anyhow::anyhow!("boom"))))
                }
                Mode::Panic => panic!("fetcher exploded"),
            };
            Ok(FetchResult {
                status: 200,
                url: url.to_string(),
                final_url: url.to_string(),
                content_type: Some("text/html; charset=utf-8".to_string()),
                body: Bytes::from(body),
            })
        }
    }

    fn crawler(mode: Mode) -> Crawler {
        Crawler::builder()
            .fetcher(Arc::new(FixedFetcher(mode)))
            .delay(Duration::ZERO, Duration::ZERO)
            .build()
            .unwrap()
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_value(JobStatus::Errored).unwrap(), "errored");
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert_eq!(JobStatus::Completed.to_string(), "completed");
    }

    #[tokio::test]
    async fn completed_job_keeps_results_and_counters() {
        let registry = JobRegistry::default();
        let id = registry.create("데스크", 2);
        assert_eq!(registry.status(&id), Some(JobStatus::Pending));

        let status = registry.run(&id, crawler(Mode::Listing)).await;
        assert_eq!(status, Some(JobStatus::Completed));

        let snap = registry.snapshot(&id).unwrap();
        assert_eq!(snap.progress, 100);
        assert_eq!(snap.current_item, 2);
        assert_eq!(snap.total_items, 4);
        assert_eq!(snap.result_count, 4);
        assert_eq!(snap.message, "총 4개 상품 수집 완료!");
        assert!(snap.finished_at.is_some());
        assert_eq!(registry.results(&id).unwrap()[0].name(), "스탠딩 데스크");
    }

    #[tokio::test]
    async fn empty_crawl_is_failed() {
        let registry = JobRegistry::default();
        let id = registry.create("없는상품", 3);
        assert_eq!(
            registry.run(&id, crawler(Mode::Empty)).await,
            Some(JobStatus::Failed)
        );
        assert!(registry.results(&id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn error_and_panic_are_errored_with_no_results() {
        let registry = JobRegistry::default();

        let id = registry.create("데스크", 2);
        assert_eq!(
            registry.run(&id, crawler(Mode::Broken)).await,
            Some(JobStatus::Errored)
        );
        assert!(registry.results(&id).unwrap().is_empty());
        assert!(registry.snapshot(&id).unwrap().message.starts_with("오류 발생: "));

        let id = registry.create("데스크", 2);
        assert_eq!(
            registry.run(&id, crawler(Mode::Panic)).await,
            Some(JobStatus::Errored)
        );
        assert_eq!(
            registry.snapshot(&id).unwrap().message,
            "오류 발생: fetcher exploded"
        );
    }

    #[tokio::test]
    async fn errored_job_keeps_collected_count_but_returns_nothing() {
        let registry = JobRegistry::default();
        let id = registry.create("데스크", 3);
        assert_eq!(
            registry.run(&id, crawler(Mode::BrokenAfterFirst)).await,
            Some(JobStatus::Errored)
        );

        let snap = registry.snapshot(&id).unwrap();
        assert_eq!(snap.total_items, 2);
        assert_eq!(snap.result_count, 0);
        assert!(registry.results(&id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn terminal_job_is_not_rerun() {
        let registry = JobRegistry::default();
        let id = registry.create("데스크", 1);
        registry.run(&id, crawler(Mode::Listing)).await;
        assert_eq!(registry.run(&id, crawler(Mode::Broken)).await, None);
        assert_eq!(registry.status(&id), Some(JobStatus::Completed));
        assert_eq!(registry.run("missing", crawler(Mode::Listing)).await, None);
    }

    #[tokio::test]
    async fn progress_events_are_monotonic_and_end_terminal() {
        let hub = ProgressHub::with_capacity(1024);
        let mut sub = hub.subscribe();
        let registry = JobRegistry::new(Arc::new(hub.clone()));
        let id = registry.create("데스크", 3);
        registry.run(&id, crawler(Mode::Listing)).await;

        let mut events = Vec::new();
        while let Ok(event) = sub.receiver.try_recv() {
            events.push(event);
        }
        assert!(events.iter().all(|e| e.job_id == id));
        assert_eq!(events.first().unwrap().status, JobStatus::Running);
        assert_eq!(events.last().unwrap().status, JobStatus::Completed);
        assert_eq!(
            events.iter().filter(|e| e.status.is_terminal()).count(),
            1
        );
        for pair in events.windows(2) {
            assert!(pair[0].progress <= pair[1].progress);
            assert!(pair[0].current_item <= pair[1].current_item);
            assert!(pair[0].total_items <= pair[1].total_items);
        }
    }

    #[tokio::test]
    async fn submit_runs_in_background() {
        let registry = JobRegistry::default();
        let id = registry.submit("데스크", 1, crawler(Mode::Listing));
        assert_eq!(registry.len(), 1);

        let mut status = registry.status(&id);
        for _ in 0..200 {
            if status.is_some_and(JobStatus::is_terminal) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = registry.status(&id);
        }
        assert_eq!(status, Some(JobStatus::Completed));
        assert!(registry.snapshot("missing").is_none());
    }

    async fn wait_terminal(registry: &JobRegistry, id: &str) -> Option<JobStatus> {
        for _ in 0..500 {
            let status = registry.status(id);
            if status.is_some_and(JobStatus::is_terminal) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        registry.status(id)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_jobs_share_one_hub_without_mixing_state() {
        let hub = ProgressHub::with_capacity(1024);
        let mut sub = hub.subscribe();
        let registry = JobRegistry::new(Arc::new(hub.clone()));

        let desks = registry.submit("데스크", 3, crawler(Mode::Listing));
        let chairs = registry.submit("의자", 2, crawler(Mode::Chairs));

        assert_eq!(wait_terminal(&registry, &desks).await, Some(JobStatus::Completed));
        assert_eq!(wait_terminal(&registry, &chairs).await, Some(JobStatus::Completed));

        let desk_results = registry.results(&desks).unwrap();
        assert_eq!(desk_results.len(), 6);
        assert!(desk_results.iter().all(|r| r.name().contains("데스크")));
        let chair_results = registry.results(&chairs).unwrap();
        assert_eq!(chair_results.len(), 2);
        assert!(chair_results.iter().all(|r| r.name() == "메쉬 사무용 의자"));

        let mut by_job: HashMap<String, Vec<ProgressEvent>> = HashMap::new();
        while let Ok(event) = sub.receiver.try_recv() {
            by_job.entry(event.job_id.clone()).or_default().push(event);
        }
        assert_eq!(by_job.len(), 2);
        for (id, events) in &by_job {
            assert_eq!(events.last().unwrap().status, JobStatus::Completed, "job {}", id);
            for pair in events.windows(2) {
                assert!(pair[0].progress <= pair[1].progress, "job {}", id);
                assert!(pair[0].current_item <= pair[1].current_item, "job {}", id);
                assert!(pair[0].total_items <= pair[1].total_items, "job {}", id);
            }
        }
        assert_eq!(by_job[&desks].last().unwrap().total_items, 6);
        assert_eq!(by_job[&chairs].last().unwrap().total_items, 2);
    }
}
