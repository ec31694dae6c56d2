//! Orchestrator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables applied to every run of an orchestrator.
///
/// Deserializable so a host service can embed it in its own configuration;
/// durations are expressed in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Deadline for a single step attempt; `None` waits forever
    #[serde(rename = "step_timeout_ms", with = "opt_millis")]
    pub step_timeout: Option<Duration>,
    /// Retry ceiling for steps that do not declare their own
    pub default_max_retries: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Some(Duration::from_secs(30)),
            default_max_retries: 0,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
