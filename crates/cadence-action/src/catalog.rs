use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use cadence_config::{Action, ActionId};

use crate::error::CatalogError;

/// Read-only lookup of catalog actions.
#[async_trait]
pub trait ActionCatalog: Send + Sync {
  /// Fetch an action by id, whether or not it is enabled.
  async fn action(&self, action_id: &str) -> Option<Action>;
}

/// A catalog held in memory, typically loaded from a JSON array of actions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
  actions: HashMap<ActionId, Action>,
}

impl InMemoryCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, action: Action) {
    self.actions.insert(action.action_id.clone(), action);
  }

  pub fn from_json(json: &str) -> Result<Self, CatalogError> {
    let actions: Vec<Action> = serde_json::from_str(json)?;
    Ok(actions.into_iter().collect())
  }

  pub fn load(path: &Path) -> Result<Self, CatalogError> {
    let json = std::fs::read_to_string(path)?;
    Self::from_json(&json)
  }

  pub fn len(&self) -> usize {
    self.actions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.actions.is_empty()
  }
}

impl FromIterator<Action> for InMemoryCatalog {
  fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
    let mut catalog = Self::new();
    for action in iter {
      catalog.insert(action);
    }
    catalog
  }
}

#[async_trait]
impl ActionCatalog for InMemoryCatalog {
  async fn action(&self, action_id: &str) -> Option<Action> {
    self.actions.get(action_id).cloned()
  }
}
