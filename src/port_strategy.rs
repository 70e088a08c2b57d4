//! Provides a means to hold the ports of a scan and the order they are probed in.
use crate::error::ScanError;
use crate::input::{parse_ports_and_ranges, ScanOrder};
use itertools::Itertools;
use rand::seq::SliceRandom;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Sorted, duplicate-free set of ports.
///
/// Built once per scan and never mutated afterwards; cloning only bumps a
/// reference count, so workers can share it without locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet(Arc<[u16]>);

impl TargetSet {
    /// Sorts and deduplicates `ports`.
    pub fn new(mut ports: Vec<u16>) -> Self {
        ports.sort_unstable();
        ports.dedup();
        Self(ports.into())
    }

    /// Ports in ascending order.
    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    /// Number of ports.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there is nothing to scan.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates ports in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    pub(crate) fn shared(&self) -> Arc<[u16]> {
        Arc::clone(&self.0)
    }
}

/// Writes the set back as a port spec, collapsing consecutive runs into ranges.
impl fmt::Display for TargetSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spec = self
            .iter()
            .map(|port| (port, port))
            .coalesce(|(start, end), (next_start, next_end)| {
                if u32::from(end) + 1 == u32::from(next_start) {
                    Ok((start, next_end))
                } else {
                    Err(((start, end), (next_start, next_end)))
                }
            })
            .map(|(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{start}-{end}")
                }
            })
            .join(",");

        f.write_str(&spec)
    }
}

impl FromStr for TargetSet {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_ports_and_ranges(s)
    }
}

/// The ports of a scan together with the order they are dispatched in.
#[derive(Debug, Clone)]
pub struct PortStrategy {
    targets: TargetSet,
    order: ScanOrder,
}

impl PortStrategy {
    /// Pairs a target set with a dispatch order.
    pub const fn pick(targets: TargetSet, order: ScanOrder) -> Self {
        Self { targets, order }
    }

    /// The ascending target set.
    pub const fn targets(&self) -> &TargetSet {
        &self.targets
    }

    /// Ports in the order the workers should claim them.
    ///
    /// Serial shares the target set as is, random hands out a shuffled copy.
    pub fn order(&self) -> Arc<[u16]> {
        match self.order {
            ScanOrder::Serial => self.targets.shared(),
            ScanOrder::Random => {
                let mut rng = rand::rng();
                let mut ports = self.targets.as_slice().to_vec();
                ports.shuffle(&mut rng);
                ports.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PortStrategy, TargetSet};
    use crate::input::ScanOrder;

    #[test]
    fn target_set_sorts_and_dedups() {
        let set = TargetSet::new(vec![443, 22, 80, 22, 443]);
        assert_eq!(set.as_slice(), &[22, 80, 443]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn display_collapses_runs() {
        let set = TargetSet::new(vec![1, 2, 3, 5, 7, 8, 65535]);
        assert_eq!(set.to_string(), "1-3,5,7-8,65535");
        assert_eq!("1-3,5,7-8,65535".parse::<TargetSet>().unwrap(), set);
    }

    #[test]
    fn serial_strategy_keeps_ascending_order() {
        let targets: TargetSet = "100-110,1-10,20-30".parse().unwrap();
        let strategy = PortStrategy::pick(targets.clone(), ScanOrder::Serial);

        assert_eq!(&*strategy.order(), targets.as_slice());
    }

    #[test]
    fn random_strategy_is_a_permutation() {
        let targets: TargetSet = "1-1000".parse().unwrap();
        let strategy = PortStrategy::pick(targets.clone(), ScanOrder::Random);
        let mut result = strategy.order().to_vec();

        assert_ne!(result.as_slice(), targets.as_slice());
        result.sort_unstable();
        assert_eq!(result.as_slice(), targets.as_slice());
        assert_eq!(strategy.targets(), &targets);
    }
}
