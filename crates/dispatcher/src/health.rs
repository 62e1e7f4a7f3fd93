//! 端点健康策略
//!
//! 失败的主机被拉黑 N 个周期。拉黑计数只在主机被检查时衰减，
//! 每个周期至多衰减一次：同一周期内的重复检查返回同一结果。
//! 黑名单、响应时间和在途集合共用一把锁，所有轮询工作者共享同一个实例。

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
struct BlacklistEntry {
    remaining: u32,
    last_checked_cycle: u64,
}

#[derive(Debug, Default)]
struct HealthState {
    cycle: u64,
    blacklist: HashMap<String, BlacklistEntry>,
    response_times: HashMap<String, f64>,
    in_flight: HashSet<String>,
}

/// 黑名单快照项，用于日志和测试
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlacklistSnapshot {
    pub host: String,
    pub remaining_cycles: u32,
}

#[derive(Debug)]
pub struct HealthPolicy {
    blacklist_cycles: u32,
    state: Mutex<HealthState>,
}

impl HealthPolicy {
    pub fn new(blacklist_cycles: u32) -> Self {
        Self {
            blacklist_cycles,
            state: Mutex::new(HealthState::default()),
        }
    }

    /// 进入新的轮询周期，返回周期序号（从1开始）
    pub async fn begin_cycle(&self) -> u64 {
        let mut state = self.state.lock().await;
        state.cycle += 1;
        state.cycle
    }

    pub async fn current_cycle(&self) -> u64 {
        self.state.lock().await.cycle
    }

    /// 检查主机是否被拉黑，并推进其衰减计数
    ///
    /// 在第 c 个周期被拉黑的主机，在 c+1..=c+N 周期的检查中返回 true，
    /// 之后的第一次检查移除该条目并返回 false。
    pub async fn is_blacklisted(&self, host: &str) -> bool {
        let mut state = self.state.lock().await;
        let cycle = state.cycle;

        let Some(entry) = state.blacklist.get_mut(host) else {
            return false;
        };

        if entry.last_checked_cycle == cycle {
            return true;
        }

        if entry.remaining == 0 {
            state.blacklist.remove(host);
            info!("主机 {} 解除拉黑", host);
            return false;
        }

        entry.remaining -= 1;
        entry.last_checked_cycle = cycle;
        debug!("主机 {} 仍被拉黑，剩余 {} 个周期", host, entry.remaining);
        true
    }

    /// 只读检查，不推进衰减计数
    pub async fn peek_blacklisted(&self, host: &str) -> bool {
        let state = self.state.lock().await;
        state
            .blacklist
            .get(host)
            .is_some_and(|entry| entry.remaining > 0 || entry.last_checked_cycle == state.cycle)
    }

    /// 拉黑主机，重复拉黑会重置计数
    pub async fn blacklist(&self, host: &str) {
        let mut state = self.state.lock().await;
        let cycle = state.cycle;
        state.blacklist.insert(
            host.to_string(),
            BlacklistEntry {
                remaining: self.blacklist_cycles,
                last_checked_cycle: cycle,
            },
        );
        info!("主机 {} 被拉黑 {} 个周期", host, self.blacklist_cycles);
    }

    pub async fn record_response_time(&self, host: &str, seconds: f64) {
        let mut state = self.state.lock().await;
        state.response_times.insert(host.to_string(), seconds);
    }

    pub async fn response_time(&self, host: &str) -> Option<f64> {
        self.state.lock().await.response_times.get(host).copied()
    }

    /// 占用主机，同一主机同一时刻只允许一个轮询
    pub async fn try_claim(&self, host: &str) -> bool {
        self.state.lock().await.in_flight.insert(host.to_string())
    }

    pub async fn release(&self, host: &str) {
        self.state.lock().await.in_flight.remove(host);
    }

    pub async fn blacklisted_hosts(&self) -> Vec<BlacklistSnapshot> {
        let state = self.state.lock().await;
        let mut hosts: Vec<BlacklistSnapshot> = state
            .blacklist
            .iter()
            .map(|(host, entry)| BlacklistSnapshot {
                host: host.clone(),
                remaining_cycles: entry.remaining,
            })
            .collect();
        hosts.sort_by(|a, b| a.host.cmp(&b.host));
        hosts
    }
}
