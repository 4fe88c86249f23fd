use std::collections::BTreeMap;

use serde::Serialize;

use crate::common::manager::slurm::NodeRecord;
use crate::submit::scheduler::ArrayScheduler;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberCapacity {
    pub node: String,
    pub total_units: u64,
    pub allocated_units: u64,
    pub is_down: bool,
}

impl MemberCapacity {
    pub fn free_units(&self) -> u64 {
        if self.is_down {
            0
        } else {
            self.total_units.saturating_sub(self.allocated_units)
        }
    }
}

/// Capacity of the nodes of a single pool at the moment of the query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceSnapshot {
    pub pool: String,
    pub members: Vec<MemberCapacity>,
}

impl ResourceSnapshot {
    /// Selects the nodes whose partition list contains `pool`.
    pub fn from_nodes(pool: &str, nodes: &[NodeRecord]) -> Self {
        let members = nodes
            .iter()
            .filter(|node| node.belongs_to(pool))
            .map(|node| MemberCapacity {
                node: node.name.clone(),
                total_units: node.total_units,
                allocated_units: node.allocated_units,
                is_down: node.is_down(),
            })
            .collect();
        Self {
            pool: pool.to_string(),
            members,
        }
    }

    pub fn free_units(&self) -> u64 {
        self.members.iter().map(|m| m.free_units()).sum()
    }

    pub fn down_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_down).count()
    }
}

/// Groups nodes by every partition they belong to.
pub fn group_by_pool(nodes: &[NodeRecord]) -> BTreeMap<String, ResourceSnapshot> {
    let mut pools: BTreeMap<String, ResourceSnapshot> = BTreeMap::new();
    for node in nodes {
        for pool in node
            .partitions
            .split([',', ' '])
            .filter(|pool| !pool.is_empty())
        {
            let snapshot = pools.entry(pool.to_string()).or_insert_with(|| ResourceSnapshot {
                pool: pool.to_string(),
                members: vec![],
            });
            snapshot.members.push(MemberCapacity {
                node: node.name.clone(),
                total_units: node.total_units,
                allocated_units: node.allocated_units,
                is_down: node.is_down(),
            });
        }
    }
    pools
}

/// Queries the scheduler for the free units of `pool`.
///
/// Failures are not fatal: they are logged and reported as zero free units, so that the caller
/// falls back to its default concurrency.
pub async fn probe_free_units(scheduler: &dyn ArrayScheduler, pool: &str) -> ResourceSnapshot {
    match scheduler.query_nodes().await {
        Ok(nodes) => {
            let snapshot = ResourceSnapshot::from_nodes(pool, &nodes);
            if snapshot.members.is_empty() {
                log::warn!("No nodes found in partition `{pool}`");
            } else {
                log::debug!(
                    "Partition `{pool}`: {} node(s), {} down, {} free unit(s)",
                    snapshot.members.len(),
                    snapshot.down_count(),
                    snapshot.free_units()
                );
            }
            snapshot
        }
        Err(error) => {
            log::warn!("Cannot query resources of partition `{pool}`: {error:?}");
            ResourceSnapshot {
                pool: pool.to_string(),
                members: vec![],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{group_by_pool, probe_free_units, ResourceSnapshot};
    use crate::common::manager::slurm::{parse_node_records, NodeRecord};
    use crate::tests::utils::MockScheduler;

    fn nodes() -> Vec<NodeRecord> {
        parse_node_records(
            "NodeName=c001 CPUAlloc=8 CPUTot=32 Partitions=compute,long State=MIXED
NodeName=c002 CPUAlloc=0 CPUTot=32 Partitions=compute State=DOWN*
NodeName=c003 CPUAlloc=40 CPUTot=32 Partitions=compute State=ALLOCATED
NodeName=c004 CPUAlloc=2 CPUTot=16 Partitions=compute State=IDLE
NodeName=g001 CPUAlloc=0 CPUTot=16 Partitions=gpu State=IDLE",
        )
    }

    #[test]
    fn test_snapshot_free_units() {
        let snapshot = ResourceSnapshot::from_nodes("compute", &nodes());
        assert_eq!(snapshot.members.len(), 4);
        assert_eq!(snapshot.down_count(), 1);
        assert_eq!(snapshot.free_units(), 24 + 14);
    }

    #[test]
    fn test_snapshot_unknown_pool() {
        let snapshot = ResourceSnapshot::from_nodes("bigmem", &nodes());
        assert!(snapshot.members.is_empty());
        assert_eq!(snapshot.free_units(), 0);
    }

    #[test]
    fn test_group_by_pool() {
        let pools = group_by_pool(&nodes());
        assert_eq!(
            pools.keys().cloned().collect::<Vec<_>>(),
            vec!["compute", "gpu", "long"]
        );
        assert_eq!(pools["long"].free_units(), 24);
        assert_eq!(pools["gpu"].free_units(), 16);
    }

    #[tokio::test]
    async fn test_probe_failure_degrades_to_zero() {
        let scheduler = MockScheduler::always_accept().with_node_query_failure();
        let snapshot = probe_free_units(&scheduler, "compute").await;
        assert_eq!(snapshot.free_units(), 0);
    }

    #[tokio::test]
    async fn test_probe_uses_scheduler_nodes() {
        let scheduler = MockScheduler::always_accept().with_nodes(nodes());
        let snapshot = probe_free_units(&scheduler, "compute").await;
        assert_eq!(snapshot.free_units(), 38);
    }
}
