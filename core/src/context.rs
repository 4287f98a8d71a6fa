//! The explicit runtime context (spec §9's "Global state" REDESIGN FLAG):
//! everything that used to live behind process-wide singletons is
//! assembled once at startup and threaded through constructors instead.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex as AsyncMutex;

use crate::{
  config::Config, docker::DockerFacade, eventbus::EventBus,
  model::UpdateDecision, registry::RegistryPool, script::ScriptExecutor,
  store::Store,
};

/// Serializes `backup…health_check` per stack (spec §4.9/§5). Keyed by
/// stack name, falling back to container name for standalone containers.
#[derive(Default)]
pub struct StackLocks {
  locks: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl StackLocks {
  pub async fn get(&self, key: &str) -> Arc<AsyncMutex<()>> {
    let mut locks = self.locks.lock().await;
    locks.entry(key.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
  }
}

/// Holds the most recently computed discovery decisions so `GET
/// /api/status` can answer instantly from the last sweep instead of
/// running one inline (spec §4.6/§6: `/api/status` is the cached read,
/// `/api/check` is the synchronous refresh).
#[derive(Default)]
pub struct DecisionCache {
  decisions: AsyncMutex<Vec<UpdateDecision>>,
}

impl DecisionCache {
  pub async fn set(&self, decisions: Vec<UpdateDecision>) {
    *self.decisions.lock().await = decisions;
  }

  pub async fn get(&self) -> Vec<UpdateDecision> {
    self.decisions.lock().await.clone()
  }
}

pub struct RuntimeContext {
  pub config: Config,
  pub registry: Arc<RegistryPool>,
  pub docker: Arc<DockerFacade>,
  pub store: Arc<Store>,
  pub events: Arc<EventBus>,
  pub scripts: Arc<ScriptExecutor>,
  pub stack_locks: Arc<StackLocks>,
  pub decisions: Arc<DecisionCache>,
}

impl RuntimeContext {
  pub async fn build(mut config: Config) -> anyhow::Result<Self> {
    let store = Store::connect(&config.db_path).await?;
    let registry = RegistryPool::new(&config);
    let docker = DockerFacade::connect(false)?;
    let events = EventBus::new(config.event_queue_capacity);
    let scripts = ScriptExecutor::new(config.scripts_dir.clone());

    config.self_container_id = crate::selfdetect::detect(&docker).await;

    Ok(RuntimeContext {
      registry: Arc::new(registry),
      docker: Arc::new(docker),
      store: Arc::new(store),
      events: Arc::new(events),
      scripts: Arc::new(scripts),
      stack_locks: Arc::new(StackLocks::default()),
      decisions: Arc::new(DecisionCache::default()),
      config,
    })
  }

  /// The lock key for a container: its stack when it belongs to a
  /// compose project, otherwise its own name (spec §4.9).
  pub fn lock_key(stack_name: Option<&str>, container_name: &str) -> String {
    stack_name.unwrap_or(container_name).to_string()
  }
}
