//! Integration tests for the resource scheduler.

use std::time::{Duration, Instant};

use adaptive_prefetch::config::SchedulerConfig;
use adaptive_prefetch::sched::quota::ResourceQuota;
use adaptive_prefetch::sched::scheduler::{
    Admission, QueueTier, ResourceRequest, ResourceScheduler,
};
use adaptive_prefetch::types::NetworkClass;

fn request(id: &str, priority: u8, network: f64) -> ResourceRequest {
    ResourceRequest::new(id, "test", priority)
        .with_cost(ResourceQuota::new(network, 0.02, 0.02, 0.01))
}

fn assert_conserved(s: &ResourceScheduler) {
    let allocated = s.allocated();
    let available = s.available();
    let total = s.total();
    for (alloc, avail, tot, dim) in [
        (
            allocated.network_bandwidth,
            available.network_bandwidth,
            total.network_bandwidth,
            "network",
        ),
        (
            allocated.storage_space,
            available.storage_space,
            total.storage_space,
            "storage",
        ),
        (allocated.cpu_time, available.cpu_time, total.cpu_time, "cpu"),
        (
            allocated.battery_budget,
            available.battery_budget,
            total.battery_budget,
            "battery",
        ),
    ] {
        assert!(
            alloc + avail <= tot + 1e-9,
            "{dim}: allocated {alloc} + available {avail} > total {tot}"
        );
        assert!(avail >= -1e-9, "{dim}: available went negative");
    }
}

#[test]
fn test_quota_conserved_across_mixed_workload() {
    let mut s = ResourceScheduler::new(SchedulerConfig::default());

    // Admit a burst, complete half, tick, admit more; the books must
    // balance at every step.
    for i in 0..12 {
        let _ = s.request_resources(request(&format!("a{i}"), 1 + (i % 10) as u8, 0.15));
        assert_conserved(&s);
    }
    for i in (0..12).step_by(2) {
        let _ = s.complete_allocation(&format!("a{i}"));
        assert_conserved(&s);
    }
    s.tick();
    assert_conserved(&s);

    for i in 0..6 {
        let _ = s.request_resources(request(&format!("b{i}"), 9, 0.2));
        assert_conserved(&s);
    }
    s.tick();
    assert_conserved(&s);
}

#[test]
fn test_high_priority_queue_drains_before_low() {
    let mut s = ResourceScheduler::new(SchedulerConfig::default());
    s.request_resources(request("filler", 5, 1.0)).unwrap();

    assert_eq!(
        s.request_resources(request("low", 2, 0.3)).unwrap(),
        Admission::Queued(QueueTier::Low)
    );
    assert_eq!(
        s.request_resources(request("high", 9, 0.3)).unwrap(),
        Admission::Queued(QueueTier::High)
    );
    assert_eq!(
        s.request_resources(request("mid", 6, 0.3)).unwrap(),
        Admission::Queued(QueueTier::Medium)
    );

    s.complete_allocation("filler").unwrap();
    let report = s.tick();
    assert_eq!(report.allocated, vec!["high", "mid", "low"]);
}

#[test]
fn test_stale_allocation_reclaimed_after_grace() {
    let mut cfg = SchedulerConfig::default();
    cfg.reclaim_grace_secs = 5;
    let mut s = ResourceScheduler::new(cfg);

    let mut r = request("stuck", 5, 0.5);
    r.estimated_duration = Duration::from_secs(1);
    let start = Instant::now();
    s.request_resources(r).unwrap();

    // Within the grace window nothing happens.
    let report = s.tick_at(start + Duration::from_secs(3));
    assert!(report.reclaimed.is_empty());

    let report = s.tick_at(start + Duration::from_secs(10));
    assert_eq!(report.reclaimed, vec!["stuck".to_string()]);
    assert_eq!(s.active_allocations(), 0);
    assert_conserved(&s);
}

#[test]
fn test_reclaim_unblocks_queued_work() {
    let mut cfg = SchedulerConfig::default();
    cfg.reclaim_grace_secs = 5;
    let mut s = ResourceScheduler::new(cfg);

    let mut hog = request("hog", 5, 0.9);
    hog.estimated_duration = Duration::from_secs(1);
    let start = Instant::now();
    s.request_resources(hog).unwrap();
    s.request_resources(request("next", 5, 0.5)).unwrap();

    let report = s.tick_at(start + Duration::from_secs(10));
    assert_eq!(report.reclaimed, vec!["hog".to_string()]);
    assert_eq!(report.allocated, vec!["next".to_string()]);
}

#[test]
fn test_network_downgrade_shrinks_pool_but_conserves() {
    let mut s = ResourceScheduler::new(SchedulerConfig::default());
    s.set_network_class(NetworkClass::Wifi);
    s.request_resources(request("a", 5, 0.4)).unwrap();

    s.set_network_class(NetworkClass::TwoG);
    // Pool shrank under an open allocation; availability scaled, never
    // negative.
    assert!(s.available().network_bandwidth >= 0.0);
    assert!(s.total().network_bandwidth < 0.2);

    s.complete_allocation("a").unwrap();
    assert!(s.available().network_bandwidth <= s.total().network_bandwidth + 1e-9);
}

#[test]
fn test_completed_dependency_admits_child_directly() {
    let mut s = ResourceScheduler::new(SchedulerConfig::default());
    s.request_resources(request("parent", 5, 0.2)).unwrap();
    s.complete_allocation("parent").unwrap();

    let mut child = request("child", 5, 0.2);
    child.dependencies = vec!["parent".to_string()];
    assert_eq!(
        s.request_resources(child).unwrap(),
        Admission::Allocated
    );
}
