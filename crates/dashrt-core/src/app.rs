use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::task::ResourceKind;

/// Everything the runtime needs to place a logical operation on hardware:
/// the overlay image to program and the kernel entry it exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDescriptor {
    pub app: String,
    /// Partial bitstream to program into a slot; empty for CPU-only apps.
    pub bitstream_path: String,
    pub kernel_name: String,
    pub kind: ResourceKind,
}

/// Thread-safe map from logical app name to its descriptor. Descriptors are
/// immutable once registered; re-registering a name replaces the entry.
#[derive(Debug, Default)]
pub struct AppRegistry {
    apps: RwLock<HashMap<String, AppDescriptor>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_app(&self, descriptor: AppDescriptor) {
        let mut apps = self.apps.write().expect("app registry lock poisoned");
        apps.insert(descriptor.app.clone(), descriptor);
    }

    pub fn lookup(&self, app: &str) -> Option<AppDescriptor> {
        let apps = self.apps.read().expect("app registry lock poisoned");
        apps.get(app).cloned()
    }
}
