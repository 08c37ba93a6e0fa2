use serde::{Deserialize, Serialize};

/// Bind address + wire protocol for a running backend.
///
/// `protocol` is a key into the protocol registry (`modelzoo::protocol`);
/// it is chosen by the runtime driver at spawn time, not by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listener {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}
