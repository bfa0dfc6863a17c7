//! Data models

mod identity;
mod session;

pub use identity::*;
pub use session::*;
