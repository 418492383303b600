//! Market domain types shared by the live engine and the backtester.

pub mod bar;
pub mod contract;
pub mod direction;
pub mod ids;
pub mod order;
pub mod tick;
pub mod trade;

pub use bar::SpreadBar;
pub use contract::{ContractData, PositionData};
pub use direction::{Direction, Offset};
pub use ids::{AlgoId, OrderId, TradeId};
pub use order::{OrderData, OrderRequest, OrderStatus};
pub use tick::TickData;
pub use trade::TradeData;
