use super::*;
use crate::graph::Action;
use crate::sync::Arc;
use crate::Config;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("No strategy named {strategy:?} has been registered")]
    NotRegistered { strategy: String },

    #[error("Strategy {strategy:?} is not available")]
    Unavailable { strategy: String },
}

/// Execution strategies by name, and the rules for picking one for an action.
///
/// The chosen strategy is, in order: the one the action asks for, the one configured for the
/// action's mnemonic, or the default one. There is no fallback when the chosen strategy is
/// missing or unavailable.
///
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn ExecutionStrategy>>,
    default_strategy: String,
    by_mnemonic: BTreeMap<String, String>,
}

impl StrategyRegistry {
    pub fn new<S: Into<String>>(default_strategy: S, by_mnemonic: BTreeMap<String, String>) -> Self {
        Self {
            strategies: BTreeMap::default(),
            default_strategy: default_strategy.into(),
            by_mnemonic,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.default_strategy(),
            config.strategy_by_mnemonic().clone(),
        )
    }

    /// Register `strategy` under `name`, replacing anything registered there before.
    pub fn register_strategy<S: Into<String>>(
        &mut self,
        name: S,
        strategy: Arc<dyn ExecutionStrategy>,
    ) {
        self.strategies.insert(name.into(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExecutionStrategy>> {
        self.strategies.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    /// The name of the strategy that should run `action`.
    pub fn select_strategy<'a>(&'a self, action: &'a Action) -> &'a str {
        action
            .strategy()
            .or_else(|| self.by_mnemonic.get(action.mnemonic()).map(String::as_str))
            .unwrap_or(&self.default_strategy)
    }

    /// The strategy that should run `action`, if it is registered and available right now.
    pub async fn resolve(
        &self,
        action: &Action,
    ) -> Result<Arc<dyn ExecutionStrategy>, StrategyError> {
        let name = self.select_strategy(action);
        let strategy = self.get(name).ok_or_else(|| StrategyError::NotRegistered {
            strategy: name.to_string(),
        })?;
        if !strategy.is_available().await {
            return Err(StrategyError::Unavailable {
                strategy: name.to_string(),
            });
        }
        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(mnemonic: &str, strategy: Option<&str>) -> Action {
        let mut builder = Action::builder();
        builder.owner("//:a").mnemonic(mnemonic);
        if let Some(strategy) = strategy {
            builder.strategy(strategy);
        }
        builder.build().unwrap()
    }

    fn registry() -> StrategyRegistry {
        let mut registry = StrategyRegistry::new(
            "sandboxed",
            BTreeMap::from([("Genrule".to_string(), "local".to_string())]),
        );
        registry.register_strategy("local", Arc::new(LocalStrategy::new()));
        registry.register_strategy("remote", Arc::new(RemoteStrategy::default()));
        registry
    }

    #[test]
    fn the_action_choice_wins() {
        let registry = registry();
        assert_eq!(
            registry.select_strategy(&action("Genrule", Some("remote"))),
            "remote"
        );
    }

    #[test]
    fn mnemonics_come_next() {
        let registry = registry();
        assert_eq!(registry.select_strategy(&action("Genrule", None)), "local");
        assert_eq!(
            registry.select_strategy(&action("CppCompile", None)),
            "sandboxed"
        );
    }

    #[tokio::test]
    async fn unregistered_strategies_do_not_resolve() {
        let registry = registry();
        assert_matches!(
            registry.resolve(&action("CppCompile", None)).await,
            Err(StrategyError::NotRegistered { strategy }) if strategy == "sandboxed"
        );
    }

    #[tokio::test]
    async fn unavailable_strategies_do_not_resolve() {
        let registry = registry();
        assert_matches!(
            registry.resolve(&action("Any", Some("remote"))).await,
            Err(StrategyError::Unavailable { .. })
        );
        assert_matches!(registry.resolve(&action("Genrule", None)).await, Ok(s) if s.name() == "local");
    }
}
