//! solana-shard-registry
//!
//! Client-side orchestration for capacity-bounded rarity shards and the
//! staking pools built on them: address derivation, capacity planning,
//! item matching, operation-group building with resumable submission, and
//! read-side aggregation.

pub mod account_shard;
pub mod address;
pub mod config;
pub mod driver;
pub mod errors;
pub mod items;
pub mod matcher;
pub mod ops;
pub mod pipeline;
pub mod planner;
pub mod run_log;
pub mod shard;
pub mod traits;
pub mod view;

#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use account_shard::*;
pub use address::*;
pub use config::*;
pub use driver::*;
pub use errors::*;
pub use items::*;
pub use matcher::*;
pub use ops::*;
pub use pipeline::*;
pub use planner::*;
pub use run_log::*;
pub use shard::*;
pub use traits::*;
pub use view::*;
