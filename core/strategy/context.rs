use crate::events::EventChannel;
use crate::sync::Arc;
use crate::Config;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// The roots an execution resolves paths against, plus the token that aborts it.
///
/// Every strategy receives this explicitly. There are no process-wide roots.
///
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    pub workspace_root: PathBuf,
    pub output_root: PathBuf,
    pub exec_root: PathBuf,
    pub log_root: PathBuf,

    /// The host environment, for strategies that do not isolate actions from it.
    pub host_env: Arc<HashMap<String, String>>,

    pub event_channel: Arc<EventChannel>,
    pub abort: CancellationToken,
}

impl ExecutionContext {
    pub fn from_config(config: &Config, abort: CancellationToken) -> Self {
        Self {
            workspace_root: config.workspace_root().clone(),
            output_root: config.output_root().clone(),
            exec_root: config.exec_root().clone(),
            log_root: config.kiln_root().join("logs"),
            host_env: Arc::new(config.env().clone()),
            event_channel: config.event_channel(),
            abort,
        }
    }
}
