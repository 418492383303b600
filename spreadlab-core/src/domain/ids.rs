//! Typed identifiers for orders, trades, and algos.
//!
//! Newtypes prevent mixing up the three id spaces; all are engine-local
//! monotonic counters, not exchange identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a single leg order.
    OrderId
);
id_type!(
    /// Identifier of a single fill.
    TradeId
);
id_type!(
    /// Identifier of one working execution algo.
    AlgoId
);
