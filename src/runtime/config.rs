//! Runtime configuration

use super::allocator::AllocatorConfig;
use serde::{Deserialize, Serialize};

/// Settings fixed when a [`Runtime`](super::Runtime) is created
///
/// Stack and heap sizes are not part of it; they are passed to each
/// `instantiate`/`create_context` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub allocator: AllocatorConfig,
    /// Instructions a single call may execute; `None` is unbounded
    pub instruction_budget: Option<u64>,
}

impl RuntimeConfig {
    pub fn new() -> RuntimeConfig {
        RuntimeConfig::default()
    }

    /// Use a fixed-capacity pool allocator
    pub fn pool(capacity: usize) -> RuntimeConfig {
        RuntimeConfig::default().with_allocator(AllocatorConfig::Pool { capacity })
    }

    pub fn with_allocator(mut self, allocator: AllocatorConfig) -> RuntimeConfig {
        self.allocator = allocator;
        self
    }

    pub fn with_instruction_budget(mut self, budget: u64) -> RuntimeConfig {
        self.instruction_budget = Some(budget);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = RuntimeConfig::pool(1 << 20).with_instruction_budget(500);
        assert_eq!(config.allocator, AllocatorConfig::Pool { capacity: 1 << 20 });
        assert_eq!(config.instruction_budget, Some(500));
    }

    #[test]
    fn test_json() {
        let config: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::new());

        let config: RuntimeConfig = serde_json::from_str(
            r#"{"allocator": {"strategy": "pool", "capacity": 65536}, "instruction_budget": 10}"#,
        )
        .unwrap();
        assert_eq!(config, RuntimeConfig::pool(65536).with_instruction_budget(10));

        let text = serde_json::to_string(&RuntimeConfig::new()).unwrap();
        assert_eq!(text, r#"{"allocator":{"strategy":"system"},"instruction_budget":null}"#);
    }
}
