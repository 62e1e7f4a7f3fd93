use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use std::time::Duration;
use tracing::{info, warn};

/// 缓存守护进程的运行指标
///
/// 没有安装导出器时，这些句柄的记录操作都是空操作。
#[derive(Clone)]
pub struct CacheMetrics {
    // Cycle metrics
    cycles_total: Counter,
    cycle_duration: Histogram,
    cycle_overruns_total: Counter,
    endpoints_polled_total: Counter,
    endpoints_failed_total: Counter,
    endpoints_abandoned_total: Counter,
    active_clusters: Gauge,

    // Directory metrics
    endpoint_response_time: Histogram,
    reachable_registries: Gauge,

    // Job metrics
    jobs_written_total: Counter,
    jobs_lost_total: Counter,
    jobs_rerun_total: Counter,
    jobs_refused_total: Counter,

    // Access sync metrics
    access_entries_added_total: Counter,
    access_entries_removed_total: Counter,

    // Housekeeping metrics
    records_purged_total: Counter,
    housekeeping_duration: Histogram,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            cycles_total: counter!("infocache_cycles_total"),
            cycle_duration: histogram!("infocache_cycle_duration_seconds"),
            cycle_overruns_total: counter!("infocache_cycle_overruns_total"),
            endpoints_polled_total: counter!("infocache_endpoints_polled_total"),
            endpoints_failed_total: counter!("infocache_endpoints_failed_total"),
            endpoints_abandoned_total: counter!("infocache_endpoints_abandoned_total"),
            active_clusters: gauge!("infocache_active_clusters"),
            endpoint_response_time: histogram!("infocache_endpoint_response_time_seconds"),
            reachable_registries: gauge!("infocache_reachable_registries"),
            jobs_written_total: counter!("infocache_jobs_written_total"),
            jobs_lost_total: counter!("infocache_jobs_lost_total"),
            jobs_rerun_total: counter!("infocache_jobs_rerun_total"),
            jobs_refused_total: counter!("infocache_jobs_refused_total"),
            access_entries_added_total: counter!("infocache_access_entries_added_total"),
            access_entries_removed_total: counter!("infocache_access_entries_removed_total"),
            records_purged_total: counter!("infocache_records_purged_total"),
            housekeeping_duration: histogram!("infocache_housekeeping_duration_seconds"),
        }
    }

    pub fn record_cycle(
        &self,
        duration: Duration,
        polled: usize,
        failed: usize,
        abandoned: usize,
        active_clusters: usize,
    ) {
        self.cycles_total.increment(1);
        self.cycle_duration.record(duration.as_secs_f64());
        self.endpoints_polled_total.increment(polled as u64);
        self.endpoints_failed_total.increment(failed as u64);
        self.endpoints_abandoned_total.increment(abandoned as u64);
        self.active_clusters.set(active_clusters as f64);
    }

    pub fn record_overrun(&self, duration: Duration, period: Duration) {
        self.cycle_overruns_total.increment(1);
        warn!(
            duration_secs = duration.as_secs_f64(),
            period_secs = period.as_secs_f64(),
            "轮询周期超出目标周期，立即开始下一个周期"
        );
    }

    pub fn record_response_time(&self, seconds: f64) {
        self.endpoint_response_time.record(seconds);
    }

    pub fn record_topology(&self, reachable_registries: usize) {
        self.reachable_registries.set(reachable_registries as f64);
    }

    pub fn record_jobs(&self, written: u64, lost: u64, reruns: u64, refused: u64) {
        self.jobs_written_total.increment(written);
        self.jobs_lost_total.increment(lost);
        self.jobs_rerun_total.increment(reruns);
        self.jobs_refused_total.increment(refused);
    }

    pub fn record_access_sync(&self, added: u64, removed: u64) {
        self.access_entries_added_total.increment(added);
        self.access_entries_removed_total.increment(removed);
    }

    pub fn record_housekeeping(&self, purged: u64, duration: Duration) {
        self.records_purged_total.increment(purged);
        self.housekeeping_duration.record(duration.as_secs_f64());
        info!(
            purged = purged,
            duration_ms = duration.as_millis() as u64,
            "过期数据清理完成"
        );
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}
