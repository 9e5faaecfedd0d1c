//! Process-wide registry of `TimelineAsset`s (§6.1, §9 "process-wide
//! registry"). Modeled as an explicit configuration object built at host
//! init and passed into each `AbilitySet`, not as mutable module-level
//! state.

use std::collections::HashMap;

use crate::error::UsageError;
use crate::timeline::TimelineAsset;

#[derive(Default)]
pub struct TimelineRegistry {
    assets: HashMap<String, TimelineAsset>,
}

impl TimelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, asset: TimelineAsset) {
        self.assets.insert(asset.id.clone(), asset);
    }

    pub fn get(&self, id: &str) -> Option<&TimelineAsset> {
        self.assets.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.assets.contains_key(id)
    }

    /// Loads every asset out of a RON document shaped as a list of
    /// `TimelineAsset` values, the format the host's data pipeline uses
    /// for hand-authored timeline data. Fails fast on malformed data
    /// (grant-time/load-time errors, never at tick-time).
    pub fn load_ron(&mut self, document: &str) -> Result<usize, UsageError> {
        let assets: Vec<TimelineAsset> = ron::from_str(document)
            .map_err(|err| UsageError::InvalidComponentConfig(format!("malformed timeline registry RON: {err}")))?;
        let count = assets.len();
        for asset in assets {
            self.register(asset);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_get_round_trips() {
        let mut registry = TimelineRegistry::new();
        registry.register(TimelineAsset::new("slash", 1000).with_tag("hit", 600));
        assert!(registry.contains("slash"));
        assert_eq!(registry.get("slash").unwrap().total_duration_ms, 1000);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn load_ron_registers_every_asset() {
        let mut registry = TimelineRegistry::new();
        let document = r#"
            [
                (id: "slash", total_duration_ms: 1000, tags: {"cast": 200, "hit": 600}),
                (id: "parry", total_duration_ms: 500, tags: {}),
            ]
        "#;
        let loaded = registry.load_ron(document).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(registry.get("slash").unwrap().tags.get("cast"), Some(&200));
        assert!(registry.contains("parry"));
    }

    #[test]
    fn load_ron_rejects_malformed_document() {
        let mut registry = TimelineRegistry::new();
        assert!(registry.load_ron("not valid ron").is_err());
    }
}
