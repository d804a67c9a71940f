//! The configured tier table (spec §3 Tier, §6 `tiers:`).

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use fleetlb_types::model::TierSpec;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct TierSpecRaw {
    pub name: String,
    pub vcpu: u32,
    pub memory_gb: f64,
    pub storage_gb: f64,
    #[serde(default)]
    pub gpu: u32,
    #[serde(default)]
    pub gpu_memory_gb: f64,
}

/// Immutable lookup table of tier name to resource requirement, built once at
/// startup (spec §3 Tier: "immutable during the process's lifetime").
#[derive(Debug, Clone, Default)]
pub struct TierTable {
    tiers: HashMap<String, Arc<TierSpec>>,
}

impl TierTable {
    pub fn from_specs(raw: Vec<TierSpecRaw>) -> Result<Self, ConfigError> {
        let mut tiers = HashMap::with_capacity(raw.len());
        for r in raw {
            if r.vcpu == 0 && r.memory_gb <= 0.0 && r.storage_gb <= 0.0 {
                return Err(ConfigError::InvalidTier {
                    name: r.name,
                    reason: "tier must require at least one resource".to_string(),
                });
            }
            if tiers.contains_key(&r.name) {
                return Err(ConfigError::DuplicateTier { name: r.name });
            }
            tiers.insert(
                r.name.clone(),
                Arc::new(TierSpec {
                    name: r.name,
                    vcpu: r.vcpu,
                    memory_gb: r.memory_gb,
                    storage_gb: r.storage_gb,
                    gpu: r.gpu,
                    gpu_memory_gb: r.gpu_memory_gb,
                }),
            );
        }
        if !tiers.contains_key("lite") {
            tiers.insert(
                "lite".to_string(),
                Arc::new(TierSpec {
                    name: "lite".to_string(),
                    vcpu: 1,
                    memory_gb: 1.0,
                    storage_gb: 1.0,
                    gpu: 0,
                    gpu_memory_gb: 0.0,
                }),
            );
        }
        Ok(Self { tiers })
    }

    pub fn get(&self, name: &str) -> Option<Arc<TierSpec>> {
        self.tiers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tiers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lite_tier_is_implicit_default() {
        let table = TierTable::from_specs(vec![]).unwrap();
        assert!(table.contains("lite"));
    }

    #[test]
    fn duplicate_tier_names_rejected() {
        let raw = vec![
            TierSpecRaw { name: "a".into(), vcpu: 1, memory_gb: 1.0, storage_gb: 1.0, gpu: 0, gpu_memory_gb: 0.0 },
            TierSpecRaw { name: "a".into(), vcpu: 2, memory_gb: 2.0, storage_gb: 2.0, gpu: 0, gpu_memory_gb: 0.0 },
        ];
        assert!(TierTable::from_specs(raw).is_err());
    }

    #[test]
    fn explicit_lite_tier_is_not_overwritten() {
        let raw = vec![TierSpecRaw {
            name: "lite".into(),
            vcpu: 4,
            memory_gb: 8.0,
            storage_gb: 20.0,
            gpu: 0,
            gpu_memory_gb: 0.0,
        }];
        let table = TierTable::from_specs(raw).unwrap();
        assert_eq!(table.get("lite").unwrap().vcpu, 4);
    }
}
