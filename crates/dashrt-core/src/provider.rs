use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::task::ResourceKind;

/// A registered capability to execute an operation on a given resource kind.
/// Lower `priority` is more preferred (hardware providers register at 0,
/// CPU fallbacks at 10 by convention).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub op: String,
    pub kind: ResourceKind,
    pub instance_id: u32,
    pub priority: i32,
}

impl Provider {
    fn sort_key(&self) -> (&str, i32, ResourceKind, u32) {
        (&self.op, self.priority, self.kind, self.instance_id)
    }
}

/// Ordered provider list. Registration is append-and-resort; readers get a
/// preference-sorted snapshot. Append-only during a run, so ordering is
/// stable.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: RwLock<Vec<Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: Provider) {
        let mut providers = self.providers.write().expect("provider registry lock poisoned");
        providers.push(provider);
        providers.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }

    /// All providers for `op`, most preferred first.
    pub fn providers_for(&self, op: &str) -> Vec<Provider> {
        let providers = self.providers.read().expect("provider registry lock poisoned");
        providers.iter().filter(|p| p.op == op).cloned().collect()
    }
}
