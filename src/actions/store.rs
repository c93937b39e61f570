use std::collections::BTreeMap;

use crate::actions::{
    error::{ActionError, duplicate_action, unknown_action},
    types::{Action, ActionDescription, ExecutionEnvironment},
};

/// Registry of intent descriptions. Lookups hand out fresh [`Action`] copies.
#[derive(Debug, Default, Clone)]
pub struct ActionStore {
    by_id: BTreeMap<String, Vec<ActionDescription>>,
}

impl ActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, description: ActionDescription) -> Result<(), ActionError> {
        let entries = self.by_id.entry(description.id.clone()).or_default();
        if let Some(platform) = description
            .platforms
            .iter()
            .find(|platform| entries.iter().any(|entry| entry.supports(platform)))
        {
            return Err(duplicate_action(format!(
                "action '{}' already registered for {}",
                description.id, platform
            )));
        }

        entries.push(description);
        Ok(())
    }

    pub fn description(
        &self,
        id: &str,
        platform: &ExecutionEnvironment,
    ) -> Option<&ActionDescription> {
        self.by_id
            .get(id)?
            .iter()
            .find(|description| description.supports(platform))
    }

    pub fn get(&self, id: &str, platform: &ExecutionEnvironment) -> Option<Action> {
        self.description(id, platform)
            .map(ActionDescription::instantiate)
    }

    /// Like [`ActionStore::get`], but a miss is an error naming the platform.
    pub fn require(&self, id: &str, platform: &ExecutionEnvironment) -> Result<Action, ActionError> {
        self.get(id, platform).ok_or_else(|| {
            unknown_action(format!("action '{}' is not registered for {}", id, platform))
        })
    }

    pub fn get_prefixed(&self, prefix: &str, platform: &ExecutionEnvironment) -> Vec<Action> {
        self.by_id
            .range(prefix.to_string()..)
            .take_while(|(id, _)| id.starts_with(prefix))
            .flat_map(|(_, entries)| entries.iter())
            .filter(|description| description.supports(platform))
            .map(ActionDescription::instantiate)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
