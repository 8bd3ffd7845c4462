//! Four-dimensional resource quota arithmetic.
//!
//! Every admission decision compares a request's estimated cost against the
//! available quota in all four dimensions independently; a request fits only
//! when every dimension fits.

use serde::{Deserialize, Serialize};

/// A non-negative budget across the four managed dimensions.
///
/// Units are normalized: 1.0 in a dimension means "the whole baseline
/// capacity of the device" for that dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub network_bandwidth: f64,
    pub storage_space: f64,
    pub cpu_time: f64,
    pub battery_budget: f64,
}

impl ResourceQuota {
    pub const ZERO: ResourceQuota = ResourceQuota {
        network_bandwidth: 0.0,
        storage_space: 0.0,
        cpu_time: 0.0,
        battery_budget: 0.0,
    };

    pub const fn new(network: f64, storage: f64, cpu: f64, battery: f64) -> Self {
        Self {
            network_bandwidth: network,
            storage_space: storage,
            cpu_time: cpu,
            battery_budget: battery,
        }
    }

    /// Uniform quota across all four dimensions.
    pub const fn uniform(v: f64) -> Self {
        Self::new(v, v, v, v)
    }

    /// Whether `cost` fits inside this quota in every dimension.
    pub fn fits(&self, cost: &ResourceQuota) -> bool {
        cost.network_bandwidth <= self.network_bandwidth
            && cost.storage_space <= self.storage_space
            && cost.cpu_time <= self.cpu_time
            && cost.battery_budget <= self.battery_budget
    }

    /// Whether any dimension of `self` exceeds `factor × other`.
    pub fn any_exceeds(&self, other: &ResourceQuota, factor: f64) -> bool {
        self.network_bandwidth > other.network_bandwidth * factor
            || self.storage_space > other.storage_space * factor
            || self.cpu_time > other.cpu_time * factor
            || self.battery_budget > other.battery_budget * factor
    }

    /// Deduct `cost`, flooring each dimension at zero.
    pub fn deduct(&mut self, cost: &ResourceQuota) {
        self.network_bandwidth = (self.network_bandwidth - cost.network_bandwidth).max(0.0);
        self.storage_space = (self.storage_space - cost.storage_space).max(0.0);
        self.cpu_time = (self.cpu_time - cost.cpu_time).max(0.0);
        self.battery_budget = (self.battery_budget - cost.battery_budget).max(0.0);
    }

    /// Return `cost`, capping each dimension at the corresponding `total`.
    pub fn restore(&mut self, cost: &ResourceQuota, total: &ResourceQuota) {
        self.network_bandwidth =
            (self.network_bandwidth + cost.network_bandwidth).min(total.network_bandwidth);
        self.storage_space = (self.storage_space + cost.storage_space).min(total.storage_space);
        self.cpu_time = (self.cpu_time + cost.cpu_time).min(total.cpu_time);
        self.battery_budget =
            (self.battery_budget + cost.battery_budget).min(total.battery_budget);
    }

    /// Per-dimension utilization given this as "available" out of `total`.
    ///
    /// Returns the maximum utilization across dimensions.
    pub fn max_utilization(&self, total: &ResourceQuota) -> f64 {
        let frac = |avail: f64, tot: f64| {
            if tot <= 0.0 {
                0.0
            } else {
                1.0 - (avail / tot).clamp(0.0, 1.0)
            }
        };
        frac(self.network_bandwidth, total.network_bandwidth)
            .max(frac(self.storage_space, total.storage_space))
            .max(frac(self.cpu_time, total.cpu_time))
            .max(frac(self.battery_budget, total.battery_budget))
    }

    /// Scale every dimension by `factor`.
    pub fn scaled(&self, factor: f64) -> ResourceQuota {
        ResourceQuota {
            network_bandwidth: self.network_bandwidth * factor,
            storage_space: self.storage_space * factor,
            cpu_time: self.cpu_time * factor,
            battery_budget: self.battery_budget * factor,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.network_bandwidth == 0.0
            && self.storage_space == 0.0
            && self.cpu_time == 0.0
            && self.battery_budget == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_requires_all_dimensions() {
        let avail = ResourceQuota::new(0.5, 0.5, 0.5, 0.5);
        assert!(avail.fits(&ResourceQuota::new(0.5, 0.4, 0.3, 0.2)));
        assert!(!avail.fits(&ResourceQuota::new(0.6, 0.1, 0.1, 0.1)));
        assert!(!avail.fits(&ResourceQuota::new(0.1, 0.1, 0.1, 0.51)));
    }

    #[test]
    fn test_deduct_and_restore_round_trip() {
        let total = ResourceQuota::uniform(1.0);
        let mut avail = total;
        let cost = ResourceQuota::new(0.3, 0.2, 0.1, 0.05);

        avail.deduct(&cost);
        assert!((avail.network_bandwidth - 0.7).abs() < 1e-12);

        avail.restore(&cost, &total);
        assert_eq!(avail, total);
    }

    #[test]
    fn test_restore_caps_at_total() {
        let total = ResourceQuota::uniform(1.0);
        let mut avail = total;
        avail.restore(&ResourceQuota::uniform(0.5), &total);
        assert_eq!(avail, total);
    }

    #[test]
    fn test_max_utilization() {
        let total = ResourceQuota::uniform(1.0);
        let avail = ResourceQuota::new(0.9, 0.5, 1.0, 1.0);
        assert!((avail.max_utilization(&total) - 0.5).abs() < 1e-12);
    }
}
