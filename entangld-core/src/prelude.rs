//! The common set of imports a host embedding a store actually needs. `use
//! entangld_core::prelude::*;` instead of reaching into each module by hand.

pub use crate::config::StoreConfig;
pub use crate::error::{EntangldError, EntangldErrorType, ErrorMessage, Result};
pub use crate::message::{CorrelationId, Message, Params};
pub use crate::store::{SendFn, Store, StoreEvent};
pub use crate::subscription::Callback;
pub use crate::value::Node;
