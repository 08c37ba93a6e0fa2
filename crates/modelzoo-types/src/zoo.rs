use serde::{Deserialize, Serialize};

/// Registry-side record of a configured zoo: just its name and whether the
/// operator has toggled it off. Catalog enumeration itself is owned by the
/// glue layer — this type only carries what the core needs to decide
/// whether to ask a zoo for its catalog at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZooHandle {
    pub name: String,
    pub enabled: bool,
}

impl ZooHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }
}
