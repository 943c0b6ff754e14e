//! Domain types delivered by the ticker.
//!
//! - [`enums`]: Mode, exchange segment, connection state
//! - [`tick`]: Decoded market snapshots and depth
//! - [`order_update`]: Order lifecycle events from the text channel
//!
//! All types are re-exported at the module root.

pub mod enums;
pub mod order_update;
pub mod tick;

pub use enums::*;
pub use order_update::OrderUpdate;
pub use tick::{Depth, DepthItem, Ohlc, Tick};
