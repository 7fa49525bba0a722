//! 结果存储 - 按任务 ID 保存分析报告

use super::aggregator::AnalysisReport;
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Reports {
    by_job: HashMap<String, AnalysisReport>,
    /// Job ids oldest first; replacing a report moves its id to the back.
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl Reports {
    fn forget(&mut self, job_id: &str) {
        if let Some(pos) = self.order.iter().position(|id| id == job_id) {
            self.order.remove(pos);
        }
    }
}

/// Reports keyed by job id. Clones share the same map, so a service can hand
/// one handle to every request.
///
/// [`ReportStore::new`] keeps every report until it is removed. A long-lived
/// service should use [`ReportStore::with_capacity`], which evicts the
/// oldest report once the limit is reached.
#[derive(Debug, Clone, Default)]
pub struct ReportStore {
    reports: Arc<Mutex<Reports>>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding at most `capacity` reports (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            reports: Arc::new(Mutex::new(Reports {
                capacity: Some(capacity.max(1)),
                ..Default::default()
            })),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.lock().capacity
    }

    /// Stores `report` under `job_id`, returning the report it replaced.
    pub fn insert(&self, job_id: impl Into<String>, report: AnalysisReport) -> Option<AnalysisReport> {
        let job_id = job_id.into();
        let mut reports = self.lock();
        reports.forget(&job_id);
        reports.order.push_back(job_id.clone());
        let previous = reports.by_job.insert(job_id, report);

        if let Some(capacity) = reports.capacity {
            while reports.by_job.len() > capacity {
                let Some(oldest) = reports.order.pop_front() else {
                    break;
                };
                reports.by_job.remove(&oldest);
                debug!("evicted report for job {}", oldest);
            }
        }
        previous
    }

    pub fn get(&self, job_id: &str) -> Option<AnalysisReport> {
        self.lock().by_job.get(job_id).cloned()
    }

    pub fn remove(&self, job_id: &str) -> Option<AnalysisReport> {
        let mut reports = self.lock();
        reports.forget(job_id);
        reports.by_job.remove(job_id)
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().by_job.contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().by_job.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_job.is_empty()
    }

    pub fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().by_job.keys().cloned().collect();
        ids.sort();
        ids
    }

    // entries are replaced whole, a poisoned map is still consistent
    fn lock(&self) -> MutexGuard<'_, Reports> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn report(total: u64, engaged: u64) -> AnalysisReport {
        AnalysisReport {
            total_frames: total,
            engaged_frames: engaged,
            engagement_percentage: super::super::aggregator::engagement_percentage(engaged, total),
            ..Default::default()
        }
    }

    #[test]
    fn test_jobs_do_not_interfere() {
        let store = ReportStore::new();
        store.insert("upload-a", report(10, 5));
        store.insert("upload-b", report(4, 4));

        assert_eq!(store.get("upload-a").unwrap().engaged_frames, 5);
        assert_eq!(store.get("upload-b").unwrap().engagement_percentage, 100.0);
        assert_eq!(store.len(), 2);
        assert_eq!(store.job_ids(), vec!["upload-a", "upload-b"]);
    }

    #[test]
    fn test_insert_replaces_and_remove_takes() {
        let store = ReportStore::new();
        assert!(store.insert("job", report(1, 0)).is_none());
        let previous = store.insert("job", report(2, 2)).unwrap();
        assert_eq!(previous.total_frames, 1);

        let taken = store.remove("job").unwrap();
        assert_eq!(taken.total_frames, 2);
        assert!(!store.contains("job"));
        assert!(store.is_empty());
        assert!(store.get("job").is_none());
    }

    #[test]
    fn test_clones_share_state_across_threads() {
        let store = ReportStore::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    store.insert(format!("job-{}", i), report(i, 0));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 8);
        assert_eq!(store.get("job-7").unwrap().total_frames, 7);
    }

    #[test]
    fn test_bounded_store_evicts_oldest() {
        let store = ReportStore::with_capacity(2);
        assert_eq!(store.capacity(), Some(2));
        store.insert("first", report(1, 1));
        store.insert("second", report(2, 1));
        // replacing moves "first" to the back of the queue
        store.insert("first", report(3, 1));
        store.insert("third", report(4, 1));

        assert_eq!(store.len(), 2);
        assert!(!store.contains("second"));
        assert_eq!(store.get("first").unwrap().total_frames, 3);
        assert_eq!(store.job_ids(), vec!["first", "third"]);

        store.remove("first");
        store.insert("fourth", report(5, 1));
        assert_eq!(store.job_ids(), vec!["fourth", "third"]);
    }

    #[test]
    fn test_default_store_is_unbounded() {
        let store = ReportStore::new();
        assert_eq!(store.capacity(), None);
        for i in 0..100 {
            store.insert(format!("job-{}", i), report(i, 0));
        }
        assert_eq!(store.len(), 100);
        assert_eq!(ReportStore::with_capacity(0).capacity(), Some(1));
    }
}
