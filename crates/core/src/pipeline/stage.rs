use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage. The declaration order is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MiddlewareStage {
    Validation,
    Authorization,
    Resilience,
    Observability,
    Handler,
}

impl MiddlewareStage {
    pub const ALL: [MiddlewareStage; 5] = [
        MiddlewareStage::Validation,
        MiddlewareStage::Authorization,
        MiddlewareStage::Resilience,
        MiddlewareStage::Observability,
        MiddlewareStage::Handler,
    ];
}

impl fmt::Display for MiddlewareStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MiddlewareStage::Validation => "validation",
            MiddlewareStage::Authorization => "authorization",
            MiddlewareStage::Resilience => "resilience",
            MiddlewareStage::Observability => "observability",
            MiddlewareStage::Handler => "handler",
        };
        f.write_str(name)
    }
}
