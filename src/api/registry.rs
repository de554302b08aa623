//! In-memory registry of running attempts for the flow API.

use crate::{
    device::DeviceClassifier,
    error::FlowError,
    flow::{ClientContext, Flow, FlowServices, FlowSettings, FlowSnapshot},
    membership::MembershipBridge,
    notify::HostNotifier,
    provider::IdProvider,
};
use chrono::Utc;
use std::{collections::HashMap, fmt, net::IpAddr, sync::Arc, time::Duration};
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use ulid::Ulid;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

/// Builds the provider client for one attempt; the broker wants the
/// end user's address on every transaction.
pub type ProviderFactory = Arc<dyn Fn(IpAddr) -> Arc<dyn IdProvider> + Send + Sync>;

struct FlowHandle {
    snapshot: watch::Receiver<FlowSnapshot>,
    cancel: CancellationToken,
}

impl FlowHandle {
    /// Latest snapshot. A driver that dropped its sender before finishing
    /// reads as failed, so it can still be pruned.
    fn current(&self) -> FlowSnapshot {
        let snapshot = self.snapshot.borrow().clone();
        if snapshot.is_finished() || self.snapshot.has_changed().is_ok() {
            return snapshot;
        }
        snapshot.abandoned(&FlowError::Unknown(
            "the attempt stopped unexpectedly".to_string(),
        ))
    }
}

pub struct FlowRegistry {
    provider_for: ProviderFactory,
    membership: MembershipBridge,
    notifier: Arc<dyn HostNotifier>,
    classifier: Arc<dyn DeviceClassifier>,
    settings: FlowSettings,
    retention: Duration,
    flows: RwLock<HashMap<Ulid, FlowHandle>>,
}

impl fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowRegistry")
            .field("settings", &self.settings)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl FlowRegistry {
    #[must_use]
    pub fn new(
        provider_for: ProviderFactory,
        membership: MembershipBridge,
        notifier: Arc<dyn HostNotifier>,
        classifier: Arc<dyn DeviceClassifier>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            provider_for,
            membership,
            notifier,
            classifier,
            settings,
            retention: DEFAULT_RETENTION,
            flows: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Spawn a new attempt and return its first snapshot.
    pub async fn create(&self, client: ClientContext, end_user_ip: IpAddr) -> FlowSnapshot {
        self.prune().await;

        let services = FlowServices {
            provider: (self.provider_for)(end_user_ip),
            membership: self.membership.clone(),
            notifier: self.notifier.clone(),
            classifier: self.classifier.clone(),
        };
        let flow = Flow::new(services, self.settings.clone(), client);
        let id = flow.id();
        let snapshot = flow.subscribe();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(flow.run(cancel.clone()));
        tokio::spawn(async move {
            if let Err(err) = task.await {
                error!(flow_id = %id, "flow task failed: {err}");
            }
        });
        info!(flow_id = %id, %end_user_ip, "flow created");

        let first = snapshot.borrow().clone();
        self.flows
            .write()
            .await
            .insert(id, FlowHandle { snapshot, cancel });
        first
    }

    pub async fn get(&self, id: Ulid) -> Option<FlowSnapshot> {
        self.flows
            .read()
            .await
            .get(&id)
            .map(FlowHandle::current)
    }

    /// Cancel an attempt. Returns `false` when the id is unknown.
    pub async fn cancel(&self, id: Ulid) -> bool {
        let flows = self.flows.read().await;
        let Some(handle) = flows.get(&id) else {
            return false;
        };
        handle.cancel.cancel();
        debug!(flow_id = %id, "flow cancel requested");
        true
    }

    /// Drop finished attempts whose last update is older than the retention.
    pub async fn prune(&self) -> usize {
        let now = Utc::now();
        let retention = self.retention;
        let mut flows = self.flows.write().await;
        let before = flows.len();

        flows.retain(|_, handle| {
            let snapshot = handle.current();
            let expired = (now - snapshot.updated_at)
                .to_std()
                .is_ok_and(|age| age >= retention);
            !(snapshot.is_finished() && expired)
        });

        let pruned = before - flows.len();
        if pruned > 0 {
            debug!(pruned, "finished flows pruned");
        }
        pruned
    }

    pub async fn len(&self) -> usize {
        self.flows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.flows.read().await.is_empty()
    }
}
