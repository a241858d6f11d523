use std::collections::HashMap;

use thiserror::Error;

use super::{pages, Component, PageModule};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("page '{0}' is already registered")]
    DuplicatePage(&'static str),

    #[error("page '{page}' declares component '{component}' more than once")]
    DuplicateComponent {
        page: &'static str,
        component: &'static str,
    },
}

/// `page -> component -> handler` table. Built once at startup from the
/// closed list in [`pages::ALL`] and only read afterwards.
#[derive(Debug, Default)]
pub struct Registry {
    pages: HashMap<&'static str, HashMap<&'static str, Component>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in page
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for module in pages::ALL {
            registry.register(module)?;
        }

        tracing::info!(
            "Page registry ready: {}",
            registry
                .pages()
                .into_iter()
                .map(|page| format!("{}[{}]", page, registry.components(page).join(",")))
                .collect::<Vec<_>>()
                .join(" ")
        );
        Ok(registry)
    }

    /// Register a page module. A name collision is an error, never an overwrite.
    pub fn register(&mut self, module: &PageModule) -> Result<(), RegistryError> {
        if self.pages.contains_key(module.name) {
            return Err(RegistryError::DuplicatePage(module.name));
        }

        let mut components = HashMap::with_capacity(module.components.len());
        for component in module.components {
            if components.insert(component.name, *component).is_some() {
                return Err(RegistryError::DuplicateComponent {
                    page: module.name,
                    component: component.name,
                });
            }
        }

        self.pages.insert(module.name, components);
        tracing::debug!(
            "Registered page '{}' ({} components)",
            module.name,
            module.components.len()
        );
        Ok(())
    }

    pub fn resolve(&self, page: &str, component: &str) -> Option<&Component> {
        self.pages.get(page)?.get(component)
    }

    /// Registered page names, sorted
    pub fn pages(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.pages.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Component names of a page, sorted; empty for an unknown page
    pub fn components(&self, page: &str) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .pages
            .get(page)
            .map(|components| components.keys().copied().collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }
}
