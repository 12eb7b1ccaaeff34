use serde::{Deserialize, Serialize};

/// Live graph counts. `registered` counts descriptor tasks only; the other
/// fields include external operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCounts {
    pub pending: usize,
    pub ready: usize,
    pub suspended: usize,
    pub executing: usize,
    pub registered: usize,
}
