//! Domain types shared by every component.

pub mod candle;
pub mod ids;
pub mod result;
pub mod signal;

pub use candle::{Candle, PRICE_SCALE};
pub use ids::{JobContext, JobId};
pub use result::BacktestResult;
pub use signal::{Action, Signal};

/// Symbol type alias
pub type Symbol = String;
