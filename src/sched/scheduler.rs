//! Resource scheduler: admission control over the shared 4-D budget.
//!
//! Requests are validated synchronously, allocated immediately when the
//! available quota covers every cost dimension, and otherwise parked in one
//! of four priority queues (high 8-10, medium 4-7, low 1-3, background).
//! A periodic tick drains the queues top-down; the background queue is
//! touched only when the whole pool is near idle. Completion feedback nudges
//! the capacity estimate up or down after sustained runs of high or low
//! allocation efficiency.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::sched::quota::ResourceQuota;
use crate::types::NetworkClass;

/// Reject any request whose cost exceeds this multiple of total capacity.
const MAX_COST_FACTOR: f64 = 2.0;

/// Bounds on efficiency-driven capacity nudging, relative to the baseline.
const CAPACITY_FLOOR: f64 = 0.25;
const CAPACITY_CEILING: f64 = 1.5;

/// Step applied per capacity nudge.
const NUDGE_FACTOR: f64 = 0.05;

/// Completed-request memory kept for dependency checks.
const COMPLETED_MEMORY: usize = 1024;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("request id is empty")]
    MissingId,

    #[error("requester tag is empty")]
    MissingRequester,

    #[error("priority {0} outside [1,10]")]
    PriorityOutOfRange(u8),

    #[error("estimated cost exceeds {MAX_COST_FACTOR}x total capacity in {dimension}")]
    CostExceedsCapacity { dimension: &'static str },

    #[error("request {0} already pending")]
    DuplicateRequest(String),

    #[error("dependencies of request {0} would form a cycle")]
    DependencyCycle(String),

    #[error("no allocation with id {0}")]
    UnknownAllocation(String),
}

/// Queue tier a request is parked in when it cannot be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueTier {
    High,
    Medium,
    Low,
    Background,
}

impl QueueTier {
    fn for_request(req: &ResourceRequest) -> QueueTier {
        if req.background {
            return QueueTier::Background;
        }
        match req.priority {
            8..=10 => QueueTier::High,
            4..=7 => QueueTier::Medium,
            _ => QueueTier::Low,
        }
    }
}

/// A request for a slice of the shared resource pool.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub id: String,
    pub requester: String,

    /// Priority 1 (lowest) to 10.
    pub priority: u8,

    pub cost: ResourceQuota,
    pub estimated_duration: Duration,
    pub deadline: Option<Instant>,

    /// Request ids that must complete before this one may be allocated.
    pub dependencies: Vec<String>,

    /// Cheaper request to fall back to when this one does not fit.
    pub fallback: Option<Box<ResourceRequest>>,

    /// Background requests are serviced only when the pool is near idle.
    pub background: bool,
}

impl ResourceRequest {
    pub fn new(id: impl Into<String>, requester: impl Into<String>, priority: u8) -> Self {
        Self {
            id: id.into(),
            requester: requester.into(),
            priority,
            cost: ResourceQuota::ZERO,
            estimated_duration: Duration::from_secs(5),
            deadline: None,
            dependencies: Vec::new(),
            fallback: None,
            background: false,
        }
    }

    pub fn with_cost(mut self, cost: ResourceQuota) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// A granted slice of the pool, open until completed or reclaimed.
#[derive(Debug, Clone)]
pub struct ResourceAllocation {
    pub request_id: String,
    pub requester: String,
    pub quota: ResourceQuota,
    pub priority: u8,
    pub started_at: Instant,
    pub estimated_end: Instant,
}

/// Outcome of a synchronous admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Allocated immediately; quota already deducted.
    Allocated,
    /// Parked in the given queue tier.
    Queued(QueueTier),
}

/// What one scheduling tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Requests allocated this tick (fallbacks listed under their own id).
    pub allocated: Vec<String>,
    /// Requests dropped because their deadline passed while queued.
    pub dropped: Vec<String>,
    /// Allocations force-reclaimed past their grace window.
    pub reclaimed: Vec<String>,
}

/// Monotonic counters for the downstream consumer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub admitted: u64,
    pub queued: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub completed: u64,
    pub reclaimed: u64,
    pub nudged_up: u64,
    pub nudged_down: u64,
}

/// The resource scheduler.
pub struct ResourceScheduler {
    config: SchedulerConfig,

    /// Baseline capacity the nudging bounds are anchored to. The network
    /// dimension follows the current network class so that a shrunk slow-
    /// network capacity is never nudged back toward the device baseline.
    base_total: ResourceQuota,
    total: ResourceQuota,
    available: ResourceQuota,

    queues: HashMap<QueueTier, VecDeque<ResourceRequest>>,
    allocations: HashMap<String, ResourceAllocation>,

    /// Recently completed request ids, for dependency gating.
    completed: HashSet<String>,
    completed_order: VecDeque<String>,

    /// Rolling window of allocation efficiencies.
    efficiencies: VecDeque<f64>,

    network_class: NetworkClass,
    stats: SchedulerStats,
}

impl ResourceScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let total = ResourceQuota::new(
            config.base_network_bandwidth,
            config.base_storage_space,
            config.base_cpu_time,
            config.base_battery_budget,
        );
        let mut queues = HashMap::new();
        for tier in [
            QueueTier::High,
            QueueTier::Medium,
            QueueTier::Low,
            QueueTier::Background,
        ] {
            queues.insert(tier, VecDeque::new());
        }
        Self {
            config,
            base_total: total,
            total,
            available: total,
            queues,
            allocations: HashMap::new(),
            completed: HashSet::new(),
            completed_order: VecDeque::new(),
            efficiencies: VecDeque::new(),
            network_class: NetworkClass::Unknown,
            stats: SchedulerStats::default(),
        }
    }

    /// Submit a request. Invalid requests are rejected synchronously and
    /// never queued.
    pub fn request_resources(
        &mut self,
        req: ResourceRequest,
    ) -> Result<Admission, SchedulerError> {
        self.validate(&req)?;

        // Background work gets the same idle gate at submission as on the
        // tick path; a busy pool parks it regardless of fit.
        let idle = self.available.max_utilization(&self.total) < self.config.idle_threshold;
        if (!req.background || idle)
            && self.available.fits(&req.cost)
            && self.dependencies_complete(&req)
        {
            self.allocate(req, Instant::now());
            return Ok(Admission::Allocated);
        }

        let tier = QueueTier::for_request(&req);
        let queue = self.queues.get_mut(&tier).expect("all tiers initialized");

        // Keep each tier ordered by descending priority; FIFO within equal
        // priority.
        let pos = queue
            .iter()
            .position(|existing| existing.priority < req.priority)
            .unwrap_or(queue.len());
        debug!(
            id = %req.id,
            requester = %req.requester,
            priority = req.priority,
            ?tier,
            "Queued resource request"
        );
        queue.insert(pos, req);
        self.stats.queued += 1;
        Ok(Admission::Queued(tier))
    }

    fn validate(&mut self, req: &ResourceRequest) -> Result<(), SchedulerError> {
        let result = self.validate_inner(req);
        if result.is_err() {
            self.stats.rejected += 1;
        }
        result
    }

    fn validate_inner(&self, req: &ResourceRequest) -> Result<(), SchedulerError> {
        if req.id.is_empty() {
            return Err(SchedulerError::MissingId);
        }
        if req.requester.is_empty() {
            return Err(SchedulerError::MissingRequester);
        }
        if !(1..=10).contains(&req.priority) {
            return Err(SchedulerError::PriorityOutOfRange(req.priority));
        }
        if req.cost.network_bandwidth > self.total.network_bandwidth * MAX_COST_FACTOR {
            return Err(SchedulerError::CostExceedsCapacity {
                dimension: "network",
            });
        }
        if req.cost.storage_space > self.total.storage_space * MAX_COST_FACTOR {
            return Err(SchedulerError::CostExceedsCapacity {
                dimension: "storage",
            });
        }
        if req.cost.cpu_time > self.total.cpu_time * MAX_COST_FACTOR {
            return Err(SchedulerError::CostExceedsCapacity { dimension: "cpu" });
        }
        if req.cost.battery_budget > self.total.battery_budget * MAX_COST_FACTOR {
            return Err(SchedulerError::CostExceedsCapacity {
                dimension: "battery",
            });
        }
        if self.allocations.contains_key(&req.id) || self.is_queued(&req.id) {
            return Err(SchedulerError::DuplicateRequest(req.id.clone()));
        }
        if self.would_form_cycle(req) {
            return Err(SchedulerError::DependencyCycle(req.id.clone()));
        }
        Ok(())
    }

    fn is_queued(&self, id: &str) -> bool {
        self.queues
            .values()
            .any(|q| q.iter().any(|r| r.id == id))
    }

    /// Dependency edges among queued requests plus the incoming one must
    /// stay acyclic; a cycle would stall its queue tier forever.
    fn would_form_cycle(&self, req: &ResourceRequest) -> bool {
        let mut edges: HashMap<&str, &[String]> = HashMap::new();
        for queue in self.queues.values() {
            for r in queue {
                edges.insert(r.id.as_str(), &r.dependencies);
            }
        }
        edges.insert(req.id.as_str(), &req.dependencies);

        // DFS from the new request; a path back to it is a cycle.
        let mut stack: Vec<&str> = req.dependencies.iter().map(String::as_str).collect();
        let mut visited: HashSet<&str> = HashSet::new();
        while let Some(node) = stack.pop() {
            if node == req.id {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(deps) = edges.get(node) {
                stack.extend(deps.iter().map(String::as_str));
            }
        }
        false
    }

    fn dependencies_complete(&self, req: &ResourceRequest) -> bool {
        req.dependencies.iter().all(|d| self.completed.contains(d))
    }

    fn allocate(&mut self, req: ResourceRequest, now: Instant) {
        self.available.deduct(&req.cost);
        debug!(
            id = %req.id,
            requester = %req.requester,
            "Allocated resources"
        );
        self.allocations.insert(
            req.id.clone(),
            ResourceAllocation {
                request_id: req.id,
                requester: req.requester,
                quota: req.cost,
                priority: req.priority,
                started_at: now,
                estimated_end: now + req.estimated_duration,
            },
        );
        self.stats.admitted += 1;
    }

    /// Run one scheduling tick at the current instant.
    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Instant::now())
    }

    /// Tick with an explicit clock, for deterministic tests.
    pub fn tick_at(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        self.reclaim_stale(now, &mut report);

        for tier in [QueueTier::High, QueueTier::Medium, QueueTier::Low] {
            self.drain_tier(tier, now, &mut report);
        }

        // Background work only when the whole pool is near idle.
        if self.available.max_utilization(&self.total) < self.config.idle_threshold {
            self.drain_tier(QueueTier::Background, now, &mut report);
        }

        report
    }

    fn drain_tier(&mut self, tier: QueueTier, now: Instant, report: &mut TickReport) {
        loop {
            let head = match self.queues.get(&tier).and_then(|q| q.front()) {
                Some(h) => h,
                None => break,
            };

            if head.deadline.is_some_and(|d| d <= now) {
                let dropped = self
                    .queues
                    .get_mut(&tier)
                    .and_then(|q| q.pop_front())
                    .expect("head just observed");
                warn!(id = %dropped.id, requester = %dropped.requester, "Dropped request past deadline");
                self.stats.dropped += 1;
                report.dropped.push(dropped.id);
                continue;
            }

            // An unmet dependency stalls the whole tier; order within the
            // tier is meaningful.
            if !self.dependencies_complete(head) {
                break;
            }

            if self.available.fits(&head.cost) {
                let req = self
                    .queues
                    .get_mut(&tier)
                    .and_then(|q| q.pop_front())
                    .expect("head just observed");
                report.allocated.push(req.id.clone());
                self.allocate(req, now);
                continue;
            }

            // Try the cheaper fallback before giving up on this tier.
            if let Some(fallback) = head.fallback.as_deref() {
                if self.available.fits(&fallback.cost) && self.dependencies_complete(fallback) {
                    let req = self
                        .queues
                        .get_mut(&tier)
                        .and_then(|q| q.pop_front())
                        .expect("head just observed");
                    let fb = *req.fallback.expect("fallback just observed");
                    debug!(id = %req.id, fallback = %fb.id, "Allocating fallback request");
                    report.allocated.push(fb.id.clone());
                    self.allocate(fb, now);
                    continue;
                }
            }

            break;
        }
    }

    fn reclaim_stale(&mut self, now: Instant, report: &mut TickReport) {
        let grace = Duration::from_secs(self.config.reclaim_grace_secs);
        let stale: Vec<String> = self
            .allocations
            .values()
            .filter(|a| now > a.estimated_end + grace)
            .map(|a| a.request_id.clone())
            .collect();

        for id in stale {
            if let Some(alloc) = self.allocations.remove(&id) {
                warn!(id = %id, requester = %alloc.requester, "Force-reclaiming stale allocation");
                self.available.restore(&alloc.quota, &self.total);
                self.mark_completed(id.clone());
                self.stats.reclaimed += 1;
                report.reclaimed.push(id);
            }
        }
    }

    /// Signal that the work behind an allocation finished; returns the
    /// allocation efficiency (capped at 1.0).
    pub fn complete_allocation(&mut self, id: &str) -> Result<f64, SchedulerError> {
        self.complete_allocation_at(id, Instant::now())
    }

    pub fn complete_allocation_at(
        &mut self,
        id: &str,
        now: Instant,
    ) -> Result<f64, SchedulerError> {
        let alloc = self
            .allocations
            .remove(id)
            .ok_or_else(|| SchedulerError::UnknownAllocation(id.to_string()))?;

        self.available.restore(&alloc.quota, &self.total);
        self.mark_completed(alloc.request_id.clone());
        self.stats.completed += 1;

        let estimated = alloc
            .estimated_end
            .saturating_duration_since(alloc.started_at)
            .as_secs_f64();
        let actual = now.saturating_duration_since(alloc.started_at).as_secs_f64();
        let efficiency = if actual > 0.0 {
            (estimated / actual).min(1.0)
        } else {
            1.0
        };

        self.record_efficiency(efficiency);
        Ok(efficiency)
    }

    fn mark_completed(&mut self, id: String) {
        if self.completed.insert(id.clone()) {
            self.completed_order.push_back(id);
            if self.completed_order.len() > COMPLETED_MEMORY {
                if let Some(old) = self.completed_order.pop_front() {
                    self.completed.remove(&old);
                }
            }
        }
    }

    fn record_efficiency(&mut self, efficiency: f64) {
        self.efficiencies.push_back(efficiency);
        if self.efficiencies.len() < self.config.efficiency_window {
            return;
        }
        while self.efficiencies.len() > self.config.efficiency_window {
            self.efficiencies.pop_front();
        }

        let avg: f64 = self.efficiencies.iter().sum::<f64>() / self.efficiencies.len() as f64;
        if avg < self.config.low_efficiency_threshold {
            self.nudge_capacity(1.0 - NUDGE_FACTOR);
            self.stats.nudged_down += 1;
            self.efficiencies.clear();
        } else if avg > self.config.high_efficiency_threshold {
            self.nudge_capacity(1.0 + NUDGE_FACTOR);
            self.stats.nudged_up += 1;
            self.efficiencies.clear();
        }
    }

    /// Nudge the rate-like capacity dimensions (network, CPU), bounded
    /// relative to the baseline. Storage and battery track the device probe
    /// and are not estimates to be corrected.
    fn nudge_capacity(&mut self, factor: f64) {
        let clamp = |v: f64, base: f64| v.clamp(base * CAPACITY_FLOOR, base * CAPACITY_CEILING);

        let old_network = self.total.network_bandwidth;
        let old_cpu = self.total.cpu_time;
        self.total.network_bandwidth = clamp(
            self.total.network_bandwidth * factor,
            self.base_total.network_bandwidth,
        );
        self.total.cpu_time = clamp(self.total.cpu_time * factor, self.base_total.cpu_time);

        // Keep the allocated share constant: shift the deltas onto the
        // available pool.
        let dn = self.total.network_bandwidth - old_network;
        let dc = self.total.cpu_time - old_cpu;
        self.available.network_bandwidth = (self.available.network_bandwidth + dn).max(0.0);
        self.available.cpu_time = (self.available.cpu_time + dc).max(0.0);

        info!(
            network = self.total.network_bandwidth,
            cpu = self.total.cpu_time,
            "Nudged capacity estimate"
        );
    }

    /// Re-derive total network bandwidth when the network class changes,
    /// scaling the available share proportionally.
    pub fn set_network_class(&mut self, class: NetworkClass) {
        if class == self.network_class {
            return;
        }
        let old_total = self.total.network_bandwidth;
        let new_total = self.config.base_network_bandwidth * class.bandwidth_estimate();

        let ratio = if old_total > 0.0 {
            self.available.network_bandwidth / old_total
        } else {
            1.0
        };
        self.total.network_bandwidth = new_total;
        self.base_total.network_bandwidth = new_total;
        self.available.network_bandwidth = new_total * ratio;

        info!(
            from = %self.network_class,
            to = %class,
            bandwidth = new_total,
            "Network class changed, re-derived bandwidth capacity"
        );
        self.network_class = class;
    }

    pub fn network_class(&self) -> NetworkClass {
        self.network_class
    }

    pub fn total(&self) -> &ResourceQuota {
        &self.total
    }

    pub fn available(&self) -> &ResourceQuota {
        &self.available
    }

    /// Sum of quota held by open allocations.
    pub fn allocated(&self) -> ResourceQuota {
        let mut sum = ResourceQuota::ZERO;
        for alloc in self.allocations.values() {
            sum.network_bandwidth += alloc.quota.network_bandwidth;
            sum.storage_space += alloc.quota.storage_space;
            sum.cpu_time += alloc.quota.cpu_time;
            sum.battery_budget += alloc.quota.battery_budget;
        }
        sum
    }

    pub fn active_allocations(&self) -> usize {
        self.allocations.len()
    }

    pub fn queue_depth(&self, tier: QueueTier) -> usize {
        self.queues.get(&tier).map(|q| q.len()).unwrap_or(0)
    }

    pub fn total_queued(&self) -> usize {
        self.queues.values().map(|q| q.len()).sum()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}
