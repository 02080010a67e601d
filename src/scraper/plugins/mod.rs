/// Plugin system for quote scrapers
///
/// Each fund names the plugin able to fetch its quotes. The manager maps
/// those names to plugin factories and hands out scrapers sharing one
/// fetcher.
pub mod investing;
pub mod vinea;

use super::{Fetch, HttpFetcher, QuotePlugin, Scraper, ScraperError};
use std::rc::Rc;
use tracing::error;

/// Builds a fresh plugin instance.
pub type PluginFactory = fn() -> Box<dyn QuotePlugin>;

/// A registered plugin.
#[derive(Debug, Clone)]
pub struct Plugin {
    pub name: &'static str,
    pub factory: PluginFactory,
}

/// PluginManager resolves plugin names to scrapers.
#[derive(Clone)]
pub struct PluginManager {
    plugins: Vec<Plugin>,
    fetcher: Rc<dyn Fetch>,
}

impl PluginManager {
    /// Create a new PluginManager with no plugins registered.
    pub fn new(fetcher: Rc<dyn Fetch>) -> Self {
        Self {
            plugins: Vec::new(),
            fetcher,
        }
    }

    /// Manager with the bundled plugins.
    pub fn with_builtin(fetcher: Rc<dyn Fetch>) -> Self {
        let mut manager = Self::new(fetcher);
        manager.register("investing", || Box::new(investing::Investing));
        manager.register("vinea", || Box::new(vinea::Vinea));
        manager
    }

    /// Bundled plugins over HTTP.
    pub fn http() -> Result<Self, ScraperError> {
        Ok(Self::with_builtin(Rc::new(HttpFetcher::new()?)))
    }

    /// Registers `factory` under `name`, replacing any previous plugin
    /// with that name.
    pub fn register(&mut self, name: &'static str, factory: PluginFactory) {
        self.plugins.retain(|p| p.name != name);
        self.plugins.push(Plugin { name, factory });
    }

    /// Get a plugin by name.
    pub fn get_plugin(&self, name: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.name == name)
    }

    /// List all registered plugin names.
    pub fn list_plugins(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.plugins.iter().map(|p| p.name).collect();
        names.sort_unstable();
        names
    }

    /// Scraper for the fund identified by `data`, using plugin `name`.
    pub fn scraper(&self, name: &str, data: &str) -> Result<Scraper, ScraperError> {
        let plugin = self.get_plugin(name).ok_or_else(|| {
            let msg = format!("{}: no such scraper", name);
            error!("{}", msg);
            ScraperError::NotFound(msg)
        })?;
        Ok(Scraper::new((plugin.factory)(), Rc::clone(&self.fetcher), data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeFetcher;

    #[test]
    fn test_plugin_manager() {
        let manager = PluginManager::with_builtin(Rc::new(FakeFetcher::csv("")));
        assert_eq!(manager.list_plugins(), vec!["investing", "vinea"]);
        assert!(manager.get_plugin("vinea").is_some());

        let scraper = manager.scraper("investing", "alpha-global").unwrap();
        assert_eq!(scraper.plugin(), "investing");
        assert_eq!(scraper.data(), "alpha-global");

        match manager.scraper("morningstar", "X") {
            Err(ScraperError::NotFound(msg)) => assert!(msg.contains("morningstar")),
            _ => panic!("Expected NotFound error"),
        }
    }
}
