//! Stack allocator configuration

/// Configuration for stack allocator
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Fill pattern byte for released memory (for debugging)
    pub dealloc_pattern: Option<u8>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            dealloc_pattern: if cfg!(debug_assertions) {
                Some(0xDD)
            } else {
                None
            },
        }
    }
}

impl StackConfig {
    /// Production configuration - no fill patterns
    #[must_use]
    pub fn production() -> Self {
        Self {
            dealloc_pattern: None,
        }
    }

    /// Debug configuration - poison released memory
    #[must_use]
    pub fn debug() -> Self {
        Self {
            dealloc_pattern: Some(0xDD),
        }
    }
}
