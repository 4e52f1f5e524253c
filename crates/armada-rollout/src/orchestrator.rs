//! Deployment orchestrator — drives a plan's waves to completion.
//!
//! For each wave in order: regenerate and push snapshots for the wave's
//! instances, wait (bounded, notified — never polling) for ACK/NACK from
//! each, and abort the plan when the NACK ratio exceeds the threshold or
//! the wave times out. An abort triggers an immediate parallel rollback
//! push of the plan's captured fallback version to every instance already
//! pushed, independent of wave order. The rollback path runs to
//! completion or explicit failure; it is not cancellable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use armada_snapshot::{SnapshotCache, SnapshotGenerator};
use armada_types::{
    ConfigSpec, ConfigStore, ConfigVersion, InstanceId, InstanceStatus, ValidationState,
};
use armada_xds::{AckEvent, AckOutcome, StreamRegistry};

use crate::error::{RolloutError, RolloutResult};
use crate::plan::{
    AbortReason, DeploymentPlan, FailureReport, PlanStatus, RollbackOutcome, RollbackTarget,
    WaveStatus,
};
use crate::strategy::DeployStrategy;

/// Orchestrator tunables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// NACK ratio above which a wave aborts the plan.
    pub nack_threshold: f64,
    /// How long to wait for a wave's ACKs.
    pub wave_timeout: Duration,
    /// How long to wait for rollback ACKs.
    pub rollback_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            nack_threshold: 0.05,
            wave_timeout: Duration::from_secs(30),
            rollback_timeout: Duration::from_secs(30),
        }
    }
}

/// Which instances a deployment targets.
#[derive(Debug, Clone)]
pub enum TargetSelector {
    /// An explicit instance list, deployed in listed order.
    Instances(Vec<InstanceId>),
    /// Every connected instance backing the entity.
    Entity,
}

/// Outcome of one bounded ACK wait.
struct WaitOutcome {
    acked: Vec<InstanceId>,
    nacked: Vec<InstanceId>,
    timed_out: bool,
}

/// Drives deployment plans.
pub struct Orchestrator {
    store: Arc<dyn ConfigStore>,
    generator: Arc<SnapshotGenerator>,
    cache: Arc<SnapshotCache>,
    registry: Arc<StreamRegistry>,
    templates: Arc<RwLock<HashMap<String, ConfigSpec>>>,
    config: OrchestratorConfig,
    plan_counter: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        generator: Arc<SnapshotGenerator>,
        cache: Arc<SnapshotCache>,
        registry: Arc<StreamRegistry>,
    ) -> Self {
        Self {
            store,
            generator,
            cache,
            registry,
            templates: Arc::new(RwLock::new(HashMap::new())),
            config: OrchestratorConfig::default(),
            plan_counter: AtomicU64::new(0),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_templates(mut self, templates: Arc<RwLock<HashMap<String, ConfigSpec>>>) -> Self {
        self.templates = templates;
        self
    }

    /// Build a plan for deploying a version to the selected targets.
    ///
    /// The rollback target is the entity's desired version at this
    /// moment, captured into the plan — the pointer may move again before
    /// a rollback ever executes. Both versions are pinned in the store
    /// until the plan reaches a terminal status.
    pub fn plan(
        &self,
        entity_id: &str,
        sequence: u64,
        strategy: DeployStrategy,
        selector: TargetSelector,
    ) -> RolloutResult<DeploymentPlan> {
        let version = self.store.load_version(entity_id, sequence)?;
        if version.validation != ValidationState::Valid {
            return Err(RolloutError::VersionNotValid {
                entity: entity_id.to_string(),
                sequence,
            });
        }

        let targets = match selector {
            TargetSelector::Instances(list) => list,
            TargetSelector::Entity => self
                .registry
                .instances_for_entity(entity_id)
                .into_iter()
                .filter(|i| i.status == InstanceStatus::Connected)
                .map(|i| i.id)
                .collect(),
        };
        if targets.is_empty() {
            return Err(RolloutError::NoTargets);
        }

        let rollback = self
            .store
            .desired(entity_id)?
            .filter(|d| d.sequence != sequence)
            .map(|d| RollbackTarget {
                sequence: d.sequence,
                content_hash: d.content_hash,
            });

        self.store.retain_version(entity_id, sequence)?;
        if let Some(rb) = &rollback {
            self.store.retain_version(entity_id, rb.sequence)?;
        }

        let n = self.plan_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("plan-{entity_id}-{sequence}-{n}");

        info!(
            plan = %id,
            entity = %entity_id,
            sequence,
            targets = targets.len(),
            "plan created"
        );
        Ok(DeploymentPlan::new(
            &id,
            entity_id,
            strategy,
            sequence,
            &version.content_hash,
            rollback,
            &targets,
        ))
    }

    /// Execute a plan to a terminal status.
    ///
    /// Cancellation is observed at wave boundaries only; a rollback in
    /// progress always runs to completion.
    pub async fn execute(
        &self,
        plan: &mut DeploymentPlan,
        cancel: watch::Receiver<bool>,
    ) -> RolloutResult<()> {
        plan.transition(PlanStatus::InProgress)?;
        info!(plan = %plan.id, waves = plan.waves.len(), "deployment started");

        let version = match self.store.load_version(&plan.entity_id, plan.target_sequence) {
            Ok(v) => v,
            Err(e) => {
                return self
                    .abort(
                        plan,
                        0,
                        AbortReason::PushFailed {
                            detail: e.to_string(),
                        },
                        &[],
                    )
                    .await;
            }
        };

        let mut events = self.registry.subscribe_acks();
        let mut pushed: Vec<InstanceId> = Vec::new();
        let pause = Duration::from_secs(plan.strategy.pause_secs());

        for wave_index in 0..plan.waves.len() {
            if wave_index > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            // Cancellation takes effect at the wave boundary.
            if *cancel.borrow() {
                info!(plan = %plan.id, wave = wave_index, "deployment cancelled");
                return self
                    .abort(plan, wave_index as u32, AbortReason::Cancelled, &pushed)
                    .await;
            }

            plan.waves[wave_index].status = WaveStatus::InProgress;
            let targets = plan.waves[wave_index].targets.clone();
            debug!(
                plan = %plan.id,
                wave = wave_index,
                instances = targets.len(),
                "wave started"
            );

            for instance_id in &targets {
                match self.push_to(instance_id, &version).await {
                    Ok(()) => pushed.push(instance_id.clone()),
                    Err(detail) => {
                        plan.waves[wave_index].status = WaveStatus::Failed;
                        return self
                            .abort(
                                plan,
                                wave_index as u32,
                                AbortReason::PushFailed { detail },
                                &pushed,
                            )
                            .await;
                    }
                }
            }

            let outcome = self
                .await_targets(
                    &mut events,
                    &targets,
                    &plan.target_hash,
                    self.config.wave_timeout,
                )
                .await;

            let wave = &mut plan.waves[wave_index];
            wave.acked = outcome.acked;
            wave.nacked = outcome.nacked;
            let ratio = wave.nack_ratio();

            if ratio > self.config.nack_threshold {
                wave.status = WaveStatus::Failed;
                return self
                    .abort(
                        plan,
                        wave_index as u32,
                        AbortReason::NackThreshold {
                            ratio,
                            threshold: self.config.nack_threshold,
                        },
                        &pushed,
                    )
                    .await;
            }
            if outcome.timed_out {
                wave.status = WaveStatus::Failed;
                return self
                    .abort(plan, wave_index as u32, AbortReason::Timeout, &pushed)
                    .await;
            }

            wave.status = WaveStatus::Succeeded;
            debug!(plan = %plan.id, wave = wave_index, "wave acknowledged");
        }

        // Success requires every targeted instance to have ACKed the
        // deployed version — sub-threshold NACKs still fail the plan.
        let total = plan.all_targets().len();
        let acked: usize = plan.waves.iter().map(|w| w.acked.len()).sum();
        if acked < total {
            let last = plan.waves.len().saturating_sub(1) as u32;
            return self
                .abort(
                    plan,
                    last,
                    AbortReason::Incomplete {
                        missing: total - acked,
                    },
                    &pushed,
                )
                .await;
        }

        self.store.set_desired(&plan.entity_id, plan.target_sequence)?;
        plan.transition(PlanStatus::Successful)?;
        self.release_refs(plan);
        info!(plan = %plan.id, "deployment successful");
        Ok(())
    }

    /// Fail the plan and run the rollback path.
    async fn abort(
        &self,
        plan: &mut DeploymentPlan,
        wave: u32,
        reason: AbortReason,
        pushed: &[InstanceId],
    ) -> RolloutResult<()> {
        warn!(plan = %plan.id, wave, reason = ?reason, "deployment aborted");
        plan.transition(PlanStatus::Failed)?;

        let rollback_outcome = match plan.rollback.clone() {
            None => RollbackOutcome::NotAttempted,
            Some(target) => self.rollback(plan, &target, pushed).await,
        };

        let rolled_back = rollback_outcome == RollbackOutcome::Completed;
        plan.failure = Some(FailureReport {
            wave,
            reason,
            rollback: rollback_outcome,
        });
        if rolled_back {
            plan.transition(PlanStatus::RolledBack)?;
        }
        self.release_refs(plan);
        Ok(())
    }

    /// Push the rollback version to every instance that already received
    /// the failed one — parallel and non-waved, racing to restore
    /// consistency rather than unwinding wave by wave.
    async fn rollback(
        &self,
        plan: &DeploymentPlan,
        target: &RollbackTarget,
        pushed: &[InstanceId],
    ) -> RollbackOutcome {
        if pushed.is_empty() {
            return RollbackOutcome::Completed;
        }

        info!(
            plan = %plan.id,
            sequence = target.sequence,
            instances = pushed.len(),
            "rolling back"
        );

        let version = match self.store.load_version(&plan.entity_id, target.sequence) {
            Ok(v) => Arc::new(v),
            Err(e) => {
                return RollbackOutcome::Failed {
                    detail: e.to_string(),
                };
            }
        };

        let mut events = self.registry.subscribe_acks();
        let templates = Arc::new(self.templates.read().expect("templates lock").clone());

        let mut pushes = JoinSet::new();
        for instance_id in pushed {
            let generator = self.generator.clone();
            let cache = self.cache.clone();
            let registry = self.registry.clone();
            let version = version.clone();
            let templates = templates.clone();
            let instance_id = instance_id.clone();

            pushes.spawn(async move {
                let Some(instance) = registry.get(&instance_id) else {
                    return Err(format!("unknown instance {instance_id}"));
                };
                generator
                    .generate_into(&cache, &instance, &version, &templates)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            });
        }

        while let Some(result) = pushes.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(detail)) => return RollbackOutcome::Failed { detail },
                Err(join) => {
                    return RollbackOutcome::Failed {
                        detail: join.to_string(),
                    };
                }
            }
        }

        let outcome = self
            .await_targets(
                &mut events,
                pushed,
                &target.content_hash,
                self.config.rollback_timeout,
            )
            .await;

        if outcome.timed_out || !outcome.nacked.is_empty() {
            let missing = pushed.len() - outcome.acked.len();
            return RollbackOutcome::Failed {
                detail: format!(
                    "{missing} of {} instances failed to ack the rollback",
                    pushed.len()
                ),
            };
        }

        info!(plan = %plan.id, "rollback completed");
        RollbackOutcome::Completed
    }

    async fn push_to(&self, instance_id: &str, version: &ConfigVersion) -> Result<(), String> {
        let Some(instance) = self.registry.get(instance_id) else {
            return Err(format!("unknown instance {instance_id}"));
        };
        let templates = self.templates.read().expect("templates lock").clone();
        self.generator
            .generate_into(&self.cache, &instance, version, &templates)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Bounded, notified wait for each target to ACK or NACK the given
    /// version hash.
    ///
    /// Instances whose last-acked hash already matches are counted
    /// immediately — their sessions have nothing new to push and will
    /// never emit a fresh event.
    async fn await_targets(
        &self,
        events: &mut broadcast::Receiver<AckEvent>,
        targets: &[InstanceId],
        target_hash: &str,
        timeout: Duration,
    ) -> WaitOutcome {
        let mut acked: Vec<InstanceId> = Vec::new();
        let mut nacked: Vec<InstanceId> = Vec::new();
        let mut remaining: HashSet<&str> = targets.iter().map(String::as_str).collect();

        for id in targets {
            if let Some(instance) = self.registry.get(id) {
                if instance.last_acked_hash.as_deref() == Some(target_hash) {
                    remaining.remove(id.as_str());
                    acked.push(id.clone());
                }
            }
        }

        let deadline = Instant::now() + timeout;
        while !remaining.is_empty() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return WaitOutcome {
                    acked,
                    nacked,
                    timed_out: true,
                };
            }

            match tokio::time::timeout(left, events.recv()).await {
                Err(_) => {
                    return WaitOutcome {
                        acked,
                        nacked,
                        timed_out: true,
                    };
                }
                Ok(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    warn!(missed, "ack event stream lagged, resyncing from registry");
                    remaining.retain(|id| match self.registry.get(id) {
                        Some(i) if i.last_acked_hash.as_deref() == Some(target_hash) => {
                            acked.push(id.to_string());
                            false
                        }
                        _ => true,
                    });
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return WaitOutcome {
                        acked,
                        nacked,
                        timed_out: true,
                    };
                }
                Ok(Ok(event)) => {
                    if event.source_hash != target_hash
                        || !remaining.remove(event.instance_id.as_str())
                    {
                        continue;
                    }
                    match event.outcome {
                        AckOutcome::Acked => acked.push(event.instance_id),
                        AckOutcome::Nacked { .. } => nacked.push(event.instance_id),
                    }
                }
            }
        }

        WaitOutcome {
            acked,
            nacked,
            timed_out: false,
        }
    }

    fn release_refs(&self, plan: &DeploymentPlan) {
        let _ = self
            .store
            .release_version(&plan.entity_id, plan.target_sequence);
        if let Some(rb) = &plan.rollback {
            let _ = self.store.release_version(&plan.entity_id, rb.sequence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::RollingConfig;
    use armada_snapshot::StaticResolver;
    use armada_snapshot::resources::Endpoint;
    use armada_types::*;
    use armada_xds::RegistryConfig;

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<SnapshotCache>,
        registry: Arc<StreamRegistry>,
        orchestrator: Orchestrator,
    }

    fn fixture(config: OrchestratorConfig) -> Fixture {
        let resolver = StaticResolver::new();
        resolver.set_endpoints(
            "backend.prod",
            vec![Endpoint {
                address: "10.0.0.1".to_string(),
                port: 9000,
                weight: 1,
                locality: Locality::default(),
            }],
        );

        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(SnapshotGenerator::new(Arc::new(resolver)));
        let cache = Arc::new(SnapshotCache::new());
        let registry = Arc::new(StreamRegistry::new(RegistryConfig::default()));

        let orchestrator = Orchestrator::new(
            store.clone() as Arc<dyn ConfigStore>,
            generator,
            cache.clone(),
            registry.clone(),
        )
        .with_config(config);

        Fixture {
            store,
            cache,
            registry,
            orchestrator,
        }
    }

    fn test_config() -> OrchestratorConfig {
        OrchestratorConfig {
            nack_threshold: 0.05,
            wave_timeout: Duration::from_secs(2),
            rollback_timeout: Duration::from_secs(2),
        }
    }

    fn spec(timeout_ms: u64) -> ConfigSpec {
        ConfigSpec {
            clusters: vec![ClusterSpec {
                name: "backend".to_string(),
                endpoints: EndpointSource::Service {
                    service: "backend.prod".to_string(),
                },
                lb_policy: LbPolicy::RoundRobin,
                connect_timeout_ms: timeout_ms,
            }],
            ..Default::default()
        }
    }

    fn register_instances(fx: &Fixture, ids: &[&str]) {
        for id in ids {
            fx.registry
                .register(id, "e1", &"node-1".to_string(), Locality::default());
        }
    }

    /// Simulated proxy: acks (or nacks) every snapshot that lands in its
    /// cache slot.
    fn spawn_proxy(fx: &Fixture, id: &str, nack: bool) {
        let mut rx = fx.cache.watch(id);
        let registry = fx.registry.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if let Some(s) = snapshot {
                    if nack {
                        registry.record_nack(&id, &s.source_hash, "refused by proxy");
                    } else {
                        registry.record_ack(&id, &s.source_hash);
                    }
                }
            }
        });
    }

    fn no_cancel() -> watch::Receiver<bool> {
        // The receiver keeps serving `false` after the sender drops.
        watch::channel(false).1
    }

    /// Deploy v1 to all instances so the fleet has a known-good baseline.
    async fn deploy_baseline(fx: &Fixture, ids: &[&str]) -> u64 {
        let v1 = fx
            .store
            .create_version("e1", spec(100), ValidationState::Valid)
            .unwrap();
        let mut plan = fx
            .orchestrator
            .plan(
                "e1",
                v1.sequence,
                DeployStrategy::AllAtOnce,
                TargetSelector::Instances(ids.iter().map(|s| s.to_string()).collect()),
            )
            .unwrap();
        fx.orchestrator.execute(&mut plan, no_cancel()).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Successful);
        v1.sequence
    }

    #[tokio::test]
    async fn scenario_a_all_at_once_success() {
        let fx = fixture(test_config());
        register_instances(&fx, &["i1", "i2", "i3"]);
        for id in ["i1", "i2", "i3"] {
            spawn_proxy(&fx, id, false);
        }
        deploy_baseline(&fx, &["i1", "i2", "i3"]).await;

        let v2 = fx
            .store
            .create_version("e1", spec(200), ValidationState::Valid)
            .unwrap();
        let mut plan = fx
            .orchestrator
            .plan("e1", 2, DeployStrategy::AllAtOnce, TargetSelector::Entity)
            .unwrap();
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.rollback.as_ref().unwrap().sequence, 1);

        fx.orchestrator.execute(&mut plan, no_cancel()).await.unwrap();

        assert_eq!(plan.status, PlanStatus::Successful);
        let desired = fx.store.desired("e1").unwrap().unwrap();
        assert_eq!(desired.sequence, 2);
        assert_eq!(desired.content_hash, v2.content_hash);
        for id in ["i1", "i2", "i3"] {
            assert_eq!(
                fx.registry.get(id).unwrap().last_acked_hash.as_deref(),
                Some(v2.content_hash.as_str())
            );
        }
    }

    #[tokio::test]
    async fn scenario_b_nack_threshold_rolls_back() {
        let fx = fixture(OrchestratorConfig {
            nack_threshold: 0.10,
            ..test_config()
        });
        register_instances(&fx, &["i1", "i2", "i3"]);
        for id in ["i1", "i2"] {
            spawn_proxy(&fx, id, false);
        }
        deploy_baseline(&fx, &["i1", "i2"]).await;

        // i3 joins the baseline by acking v1 directly, then turns hostile.
        let v1_hash = fx.store.desired("e1").unwrap().unwrap().content_hash;
        fx.registry.record_ack("i3", &v1_hash);
        spawn_proxy(&fx, "i3", true);

        fx.store
            .create_version("e1", spec(200), ValidationState::Valid)
            .unwrap();
        let mut plan = fx
            .orchestrator
            .plan(
                "e1",
                2,
                DeployStrategy::AllAtOnce,
                TargetSelector::Instances(vec![
                    "i1".to_string(),
                    "i2".to_string(),
                    "i3".to_string(),
                ]),
            )
            .unwrap();

        fx.orchestrator.execute(&mut plan, no_cancel()).await.unwrap();

        // 33% NACK against a 10% threshold: aborted and rolled back.
        assert_eq!(plan.status, PlanStatus::RolledBack);
        let failure = plan.failure.as_ref().unwrap();
        assert_eq!(failure.wave, 0);
        assert!(matches!(
            failure.reason,
            AbortReason::NackThreshold { .. }
        ));
        assert_eq!(failure.rollback, RollbackOutcome::Completed);

        // Desired pointer unchanged; every instance back on (or still at)
        // the v1 hash.
        let desired = fx.store.desired("e1").unwrap().unwrap();
        assert_eq!(desired.sequence, 1);
        for id in ["i1", "i2", "i3"] {
            assert_eq!(
                fx.registry.get(id).unwrap().last_acked_hash.as_deref(),
                Some(v1_hash.as_str()),
                "instance {id} not restored"
            );
        }
        // Served snapshots restored to the pre-deployment version.
        for id in ["i1", "i2"] {
            assert_eq!(fx.cache.get(id).unwrap().source_hash, v1_hash);
        }
    }

    #[tokio::test]
    async fn scenario_c_rolling_timeout_stops_later_waves() {
        let fx = fixture(OrchestratorConfig {
            wave_timeout: Duration::from_millis(200),
            rollback_timeout: Duration::from_millis(200),
            ..test_config()
        });
        register_instances(&fx, &["i1", "i2", "i3"]);
        // i2 never answers; i1 and i3 are well-behaved.
        spawn_proxy(&fx, "i1", false);
        spawn_proxy(&fx, "i3", false);
        deploy_baseline(&fx, &["i1", "i3"]).await;

        fx.store
            .create_version("e1", spec(200), ValidationState::Valid)
            .unwrap();
        let mut plan = fx
            .orchestrator
            .plan(
                "e1",
                2,
                DeployStrategy::Rolling(RollingConfig {
                    wave_size: 1,
                    pause_secs: 0,
                }),
                TargetSelector::Instances(vec![
                    "i1".to_string(),
                    "i2".to_string(),
                    "i3".to_string(),
                ]),
            )
            .unwrap();
        assert_eq!(plan.waves.len(), 3);

        fx.orchestrator.execute(&mut plan, no_cancel()).await.unwrap();

        // Wave 2 (index 1) timed out; wave 3 never started.
        let failure = plan.failure.as_ref().unwrap();
        assert_eq!(failure.wave, 1);
        assert_eq!(failure.reason, AbortReason::Timeout);
        assert_eq!(plan.waves[0].status, WaveStatus::Succeeded);
        assert_eq!(plan.waves[1].status, WaveStatus::Failed);
        assert_eq!(plan.waves[2].status, WaveStatus::Pending);

        // i3 was never pushed v2.
        assert!(
            fx.cache.get("i3").is_none()
                || fx.cache.get("i3").unwrap().sequence == 1
        );

        // The silent instance also failed to ack the rollback, so the
        // plan stays failed with a rollback failure on record.
        assert_eq!(plan.status, PlanStatus::Failed);
        assert!(matches!(
            failure.rollback,
            RollbackOutcome::Failed { .. }
        ));

        // i1 still got restored to v1.
        let v1_hash = fx.store.desired("e1").unwrap().unwrap().content_hash;
        assert_eq!(
            fx.registry.get("i1").unwrap().last_acked_hash.as_deref(),
            Some(v1_hash.as_str())
        );
    }

    #[tokio::test]
    async fn cancellation_takes_effect_at_wave_boundary() {
        let fx = fixture(test_config());
        register_instances(&fx, &["i1"]);
        spawn_proxy(&fx, "i1", false);
        deploy_baseline(&fx, &["i1"]).await;

        fx.store
            .create_version("e1", spec(200), ValidationState::Valid)
            .unwrap();
        let mut plan = fx
            .orchestrator
            .plan(
                "e1",
                2,
                DeployStrategy::AllAtOnce,
                TargetSelector::Instances(vec!["i1".to_string()]),
            )
            .unwrap();

        let (cancel_tx, cancel_rx) = watch::channel(true);
        fx.orchestrator.execute(&mut plan, cancel_rx).await.unwrap();
        drop(cancel_tx);

        // Cancelled before the first wave: nothing pushed, trivially
        // rolled back, desired pointer untouched.
        assert_eq!(plan.status, PlanStatus::RolledBack);
        let failure = plan.failure.as_ref().unwrap();
        assert_eq!(failure.reason, AbortReason::Cancelled);
        assert_eq!(fx.store.desired("e1").unwrap().unwrap().sequence, 1);
    }

    #[tokio::test]
    async fn first_deployment_without_rollback_target() {
        let fx = fixture(test_config());
        register_instances(&fx, &["i1"]);
        spawn_proxy(&fx, "i1", true); // refuses everything

        fx.store
            .create_version("e1", spec(100), ValidationState::Valid)
            .unwrap();
        let mut plan = fx
            .orchestrator
            .plan(
                "e1",
                1,
                DeployStrategy::AllAtOnce,
                TargetSelector::Instances(vec!["i1".to_string()]),
            )
            .unwrap();
        assert!(plan.rollback.is_none());

        fx.orchestrator.execute(&mut plan, no_cancel()).await.unwrap();

        // No fallback version exists: the plan fails without a rollback.
        assert_eq!(plan.status, PlanStatus::Failed);
        assert_eq!(
            plan.failure.as_ref().unwrap().rollback,
            RollbackOutcome::NotAttempted
        );
    }

    #[tokio::test]
    async fn plan_requires_validated_version() {
        let fx = fixture(test_config());
        register_instances(&fx, &["i1"]);
        fx.store
            .create_version("e1", spec(100), ValidationState::Pending)
            .unwrap();

        let err = fx
            .orchestrator
            .plan(
                "e1",
                1,
                DeployStrategy::AllAtOnce,
                TargetSelector::Instances(vec!["i1".to_string()]),
            )
            .unwrap_err();
        assert!(matches!(err, RolloutError::VersionNotValid { .. }));
    }

    #[tokio::test]
    async fn plan_requires_targets() {
        let fx = fixture(test_config());
        fx.store
            .create_version("e1", spec(100), ValidationState::Valid)
            .unwrap();

        let err = fx
            .orchestrator
            .plan("e1", 1, DeployStrategy::AllAtOnce, TargetSelector::Entity)
            .unwrap_err();
        assert!(matches!(err, RolloutError::NoTargets));
    }

    #[tokio::test]
    async fn plan_pins_versions_until_terminal() {
        let fx = fixture(test_config());
        register_instances(&fx, &["i1"]);
        spawn_proxy(&fx, "i1", false);
        deploy_baseline(&fx, &["i1"]).await;

        fx.store
            .create_version("e1", spec(200), ValidationState::Valid)
            .unwrap();
        let mut plan = fx
            .orchestrator
            .plan(
                "e1",
                2,
                DeployStrategy::AllAtOnce,
                TargetSelector::Instances(vec!["i1".to_string()]),
            )
            .unwrap();

        // Pinned while the plan is live (v1 is also the desired pointer,
        // so check the deployed version).
        assert!(matches!(
            fx.store.delete_version("e1", 2),
            Err(StoreError::VersionReferenced { .. })
        ));

        fx.orchestrator.execute(&mut plan, no_cancel()).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Successful);
        // Released afterwards — but now it is the desired version, which
        // still protects it.
        assert!(fx.store.delete_version("e1", 2).is_err());
    }
}
