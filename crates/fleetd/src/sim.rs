//! In-process resource provider.
//!
//! Keeps the latest allocation request per cluster and fulfils it on a
//! tick by synthesising units on the configured nodes. Terminated units are
//! reported back as completions on the following tick.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

use fleetgrid_controller::{LaunchContext, ProviderEvent, ResourceProvider};
use fleetgrid_core::config::{SimulatedNode, SimulatorConfig};
use fleetgrid_core::{
    ClusterId, DEFAULT_FAILURE_DOMAIN, ExitInfo, ResourceUnit, Resources, UnitId,
};
use fleetgrid_grid::AllocationRequest;

const FALLBACK_NODE: &str = "localhost";

#[derive(Default)]
struct SimState {
    outstanding: BTreeMap<ClusterId, AllocationRequest>,
    live: HashMap<UnitId, ResourceUnit>,
    terminated: Vec<ResourceUnit>,
    next_id: u64,
    next_node: usize,
}

pub struct SimulatedProvider {
    nodes: Vec<SimulatedNode>,
    events: mpsc::Sender<ProviderEvent>,
    state: Mutex<SimState>,
}

impl SimulatedProvider {
    pub fn new(config: SimulatorConfig, events: mpsc::Sender<ProviderEvent>) -> Self {
        let nodes = if config.nodes.is_empty() {
            vec![SimulatedNode {
                name: FALLBACK_NODE.to_string(),
                failure_domain: None,
            }]
        } else {
            config.nodes
        };
        Self {
            nodes,
            events,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Turn outstanding requests and terminations into provider events.
    pub async fn tick(&self) -> Vec<ProviderEvent> {
        let mut state = self.state.lock().await;
        let requests = std::mem::take(&mut state.outstanding);
        let mut events = Vec::new();

        for (cluster, request) in requests {
            let resources = request.resources.unwrap_or_default();
            let mut placements: Vec<&SimulatedNode> = Vec::new();

            for (node, &count) in &request.nodes {
                match self.nodes.iter().find(|n| &n.name == node) {
                    Some(n) => placements.extend(std::iter::repeat_n(n, count as usize)),
                    None => warn!(cluster = %cluster, node = %node, "no such simulated node"),
                }
            }
            for (domain, &count) in &request.failure_domains {
                let candidates: Vec<&SimulatedNode> = self
                    .nodes
                    .iter()
                    .filter(|n| domain_of(n) == domain)
                    .collect();
                if candidates.is_empty() {
                    warn!(cluster = %cluster, domain = %domain, "no simulated node in failure domain");
                    continue;
                }
                for i in 0..count as usize {
                    placements.push(candidates[i % candidates.len()]);
                }
            }
            for _ in 0..request.any {
                let node = &self.nodes[state.next_node % self.nodes.len()];
                state.next_node += 1;
                placements.push(node);
            }

            for node in placements {
                state.next_id += 1;
                let unit = synthesize(state.next_id, node, resources, request.priority);
                state.live.insert(unit.id.clone(), unit.clone());
                events.push(ProviderEvent::UnitAllocated(unit));
            }
        }

        for unit in state.terminated.drain(..) {
            events.push(ProviderEvent::UnitCompleted(
                unit,
                ExitInfo::new(0, "terminated by controller"),
            ));
        }
        events
    }

    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, nodes = self.nodes.len(), "simulated provider started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    for event in self.tick().await {
                        if self.events.send(event).await.is_err() {
                            warn!("event receiver gone, simulated provider stopping");
                            return;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("simulated provider shutting down");
                    break;
                }
            }
        }
    }

    #[cfg(test)]
    async fn live_count(&self) -> usize {
        self.state.lock().await.live.len()
    }
}

fn domain_of(node: &SimulatedNode) -> &str {
    node.failure_domain.as_deref().unwrap_or(DEFAULT_FAILURE_DOMAIN)
}

fn synthesize(
    seq: u64,
    node: &SimulatedNode,
    resources: Resources,
    priority: Option<u32>,
) -> ResourceUnit {
    let unit = ResourceUnit::new(format!("unit-{seq:06}"), node.name.clone())
        .with_failure_domain(domain_of(node))
        .with_resources(resources);
    match priority {
        Some(p) => unit.with_priority(p),
        None => unit,
    }
}

#[async_trait]
impl ResourceProvider for SimulatedProvider {
    async fn allocate(
        &self,
        cluster: &ClusterId,
        request: &AllocationRequest,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if request.is_empty() {
            state.outstanding.remove(cluster);
        } else {
            debug!(cluster = %cluster, total = request.total(), "allocation request replaced");
            state.outstanding.insert(cluster.clone(), request.clone());
        }
        Ok(())
    }

    async fn release(&self, unit: &UnitId) -> anyhow::Result<()> {
        self.state.lock().await.live.remove(unit);
        debug!(unit = %unit, "unit released");
        Ok(())
    }

    async fn launch(&self, unit: &ResourceUnit, context: &LaunchContext) -> anyhow::Result<()> {
        if !self.state.lock().await.live.contains_key(&unit.id) {
            anyhow::bail!("unit {} is not allocated", unit.id);
        }
        debug!(
            unit = %unit.id,
            cluster = %context.cluster_id,
            commands = ?context.commands,
            "unit running"
        );
        Ok(())
    }

    async fn terminate(&self, unit: &UnitId) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let Some(found) = state.live.remove(unit) else {
            anyhow::bail!("unit {unit} is not running");
        };
        state.terminated.push(found);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> (SimulatedProvider, mpsc::Receiver<ProviderEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let config = SimulatorConfig {
            nodes: vec![
                SimulatedNode {
                    name: "h1".into(),
                    failure_domain: Some("/rack1".into()),
                },
                SimulatedNode {
                    name: "h2".into(),
                    failure_domain: None,
                },
            ],
            fulfil_interval_ms: 10,
        };
        (SimulatedProvider::new(config, tx), rx)
    }

    fn allocated(events: &[ProviderEvent]) -> Vec<&ResourceUnit> {
        events
            .iter()
            .filter_map(|e| match e {
                ProviderEvent::UnitAllocated(unit) => Some(unit),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn newer_request_replaces_outstanding_one() {
        let (sim, _rx) = provider();
        let cluster = "c1".to_string();
        sim.allocate(&cluster, &AllocationRequest { any: 5, ..Default::default() })
            .await
            .unwrap();
        sim.allocate(&cluster, &AllocationRequest { any: 2, ..Default::default() })
            .await
            .unwrap();

        let events = sim.tick().await;
        assert_eq!(allocated(&events).len(), 2);
        assert!(sim.tick().await.is_empty());
    }

    #[tokio::test]
    async fn placement_follows_nodes_and_domains() {
        let (sim, _rx) = provider();
        let request = AllocationRequest {
            nodes: BTreeMap::from([("h2".to_string(), 1)]),
            failure_domains: BTreeMap::from([("/rack1".to_string(), 2)]),
            priority: Some(3),
            ..Default::default()
        };
        sim.allocate(&"c1".to_string(), &request).await.unwrap();

        let events = sim.tick().await;
        let units = allocated(&events);
        assert_eq!(units.len(), 3);
        assert_eq!(units.iter().filter(|u| u.node == "h1").count(), 2);
        let h2 = units.iter().find(|u| u.node == "h2").unwrap();
        assert_eq!(h2.failure_domain, DEFAULT_FAILURE_DOMAIN);
        assert!(units.iter().all(|u| u.priority == Some(3)));
    }

    #[tokio::test]
    async fn terminated_units_complete_on_next_tick() {
        let (sim, _rx) = provider();
        sim.allocate(&"c1".to_string(), &AllocationRequest { any: 1, ..Default::default() })
            .await
            .unwrap();
        let events = sim.tick().await;
        let id = allocated(&events)[0].id.clone();

        sim.terminate(&id).await.unwrap();
        assert!(sim.terminate(&id).await.is_err());
        assert_eq!(sim.live_count().await, 0);

        let events = sim.tick().await;
        assert!(matches!(
            &events[..],
            [ProviderEvent::UnitCompleted(unit, _)] if unit.id == id
        ));
    }
}
