use crate::events::EventChannel;
use crate::sandbox::MaterializationMode;
use crate::sync::Arc;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::*;

pub const DEFAULT_STRATEGY: &str = "sandboxed";

/// A collection of flags and options that affect how Kiln executes a graph. This is not specific
/// to a single graph, the same `Config` can drive many executions.
///
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(error = "ConfigError"))]
pub struct Config {
    /// The directory that source artifacts are resolved against.
    #[builder(setter(into), default = "self.default_workspace_root()")]
    workspace_root: PathBuf,

    /// The root of Kiln's operating directory. Every other directory defaults to a child of it.
    #[builder(setter(into), default = "self.default_kiln_root()")]
    kiln_root: PathBuf,

    /// Where output artifacts are placed once their action succeeds.
    #[builder(setter(into), default = "self.default_output_root()")]
    output_root: PathBuf,

    /// Where the result cache keeps its entries and output blobs.
    #[builder(setter(into), default = "self.default_cache_root()")]
    cache_root: PathBuf,

    /// Where sandboxes are created.
    #[builder(setter(into), default = "self.default_sandbox_root()")]
    sandbox_root: PathBuf,

    /// The shared working directory of the `local` strategy.
    #[builder(setter(into), default = "self.default_exec_root()")]
    exec_root: PathBuf,

    /// The maximum number of local workers to spawn in the local worker pool.
    #[builder(default = "self.default_max_workers()")]
    max_local_workers: usize,

    /// The strategy used for actions that do not pick one, and whose mnemonic has no mapping.
    #[builder(setter(into), default = "DEFAULT_STRATEGY.to_string()")]
    default_strategy: String,

    /// Strategy names keyed by action mnemonic.
    #[builder(default)]
    strategy_by_mnemonic: BTreeMap<String, String>,

    /// Keep executing unrelated actions after a failure.
    #[builder(default = "true")]
    keep_going: bool,

    /// Leave sandboxes on disk after their action finishes, for debugging.
    #[builder(default = "false")]
    keep_sandboxes: bool,

    /// Whether to read from and write to the result cache.
    #[builder(default = "true")]
    use_cache: bool,

    /// How sandboxed inputs are placed in a sandbox.
    #[builder(default)]
    materialization: MaterializationMode,

    /// The timeout of actions that do not declare their own.
    #[builder(setter(strip_option), default = "None")]
    default_timeout: Option<Duration>,

    /// The environment at the time this config was created. The `local` strategy runs actions
    /// with it. This is separated to assist with testing.
    #[builder(default = "self.default_env()")]
    env: HashMap<String, String>,

    /// The time at which this configuration was created. We will use this to compute the total
    /// build time.
    #[builder(default = "self.default_created_at()")]
    created_at: Instant,

    /// The Event Channel be used across the application.
    /// NOTE: this is safe to clone since it is an [Arc] to a single channel.
    #[builder(default = "self.default_event_channel()")]
    event_channel: Arc<EventChannel>,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build().unwrap()
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    pub fn kiln_root(&self) -> &PathBuf {
        &self.kiln_root
    }

    pub fn output_root(&self) -> &PathBuf {
        &self.output_root
    }

    pub fn cache_root(&self) -> &PathBuf {
        &self.cache_root
    }

    pub fn sandbox_root(&self) -> &PathBuf {
        &self.sandbox_root
    }

    pub fn exec_root(&self) -> &PathBuf {
        &self.exec_root
    }

    /// Never less than one, even if configured so.
    pub fn max_local_workers(&self) -> usize {
        self.max_local_workers.max(1)
    }

    pub fn default_strategy(&self) -> &str {
        &self.default_strategy
    }

    pub fn strategy_by_mnemonic(&self) -> &BTreeMap<String, String> {
        &self.strategy_by_mnemonic
    }

    pub fn keep_going(&self) -> bool {
        self.keep_going
    }

    pub fn keep_sandboxes(&self) -> bool {
        self.keep_sandboxes
    }

    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn materialization(&self) -> MaterializationMode {
        self.materialization
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn event_channel(&self) -> Arc<EventChannel> {
        self.event_channel.clone()
    }
}

impl ConfigBuilder {
    fn _kiln_root(&self) -> PathBuf {
        self.kiln_root
            .clone()
            .unwrap_or_else(|| self.default_kiln_root())
    }

    fn default_workspace_root(&self) -> PathBuf {
        PathBuf::from(".")
    }

    fn default_kiln_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| self.default_workspace_root())
            .join(".kiln")
    }

    fn default_output_root(&self) -> PathBuf {
        self._kiln_root().join("out")
    }

    fn default_cache_root(&self) -> PathBuf {
        self._kiln_root().join("cache")
    }

    fn default_sandbox_root(&self) -> PathBuf {
        self._kiln_root().join("sandbox")
    }

    fn default_exec_root(&self) -> PathBuf {
        self._kiln_root().join("execroot")
    }

    fn default_max_workers(&self) -> usize {
        num_cpus::get()
    }

    fn default_created_at(&self) -> Instant {
        Instant::now()
    }

    fn default_event_channel(&self) -> Arc<EventChannel> {
        EventChannel::new().into()
    }

    fn default_env(&self) -> HashMap<String, String> {
        std::env::vars_os()
            .filter_map(|(k, v)| match (k.into_string(), v.into_string()) {
                (Ok(k), Ok(v)) => Some((k, v)),
                _ => None,
            })
            .collect()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Attempted to build a Config struct while missing fields: {0:?}")]
    BuilderError(derive_builder::UninitializedFieldError),
}

impl From<derive_builder::UninitializedFieldError> for ConfigError {
    fn from(err: derive_builder::UninitializedFieldError) -> Self {
        Self::BuilderError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_default_below_the_kiln_root() {
        let config = Config::builder().kiln_root("/tmp/kiln").build().unwrap();
        assert_eq!(config.output_root(), &PathBuf::from("/tmp/kiln/out"));
        assert_eq!(config.cache_root(), &PathBuf::from("/tmp/kiln/cache"));
        assert_eq!(config.sandbox_root(), &PathBuf::from("/tmp/kiln/sandbox"));
        assert_eq!(config.exec_root(), &PathBuf::from("/tmp/kiln/execroot"));
    }

    #[test]
    fn the_kiln_root_defaults_below_the_workspace() {
        let config = Config::builder().workspace_root("/ws").build().unwrap();
        assert_eq!(config.kiln_root(), &PathBuf::from("/ws/.kiln"));
        assert_eq!(config.output_root(), &PathBuf::from("/ws/.kiln/out"));
    }

    #[test]
    fn explicit_directories_win() {
        let config = Config::builder()
            .kiln_root("/tmp/kiln")
            .cache_root("/var/cache/kiln")
            .build()
            .unwrap();
        assert_eq!(config.cache_root(), &PathBuf::from("/var/cache/kiln"));
        assert_eq!(config.output_root(), &PathBuf::from("/tmp/kiln/out"));
    }

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.default_strategy(), DEFAULT_STRATEGY);
        assert!(config.keep_going());
        assert!(config.use_cache());
        assert!(!config.keep_sandboxes());
        assert_eq!(config.materialization(), MaterializationMode::Copy);
        assert!(config.max_local_workers() >= 1);
    }

    #[test]
    fn there_is_always_at_least_one_worker() {
        let config = Config::builder().max_local_workers(0).build().unwrap();
        assert_eq!(config.max_local_workers(), 1);
    }
}
