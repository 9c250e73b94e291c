//! REST backed implementation of the round store.

mod config;
mod error;
mod models;
mod store;

pub use config::RestConfig;
pub use error::{RestDaoError, RestResult};
pub use store::RestRoundStore;
