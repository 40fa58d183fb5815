//! Type definitions

pub mod household;
pub mod import;
pub mod messages;
pub mod neighborhood;
pub mod reading;
pub mod stats;

pub use household::*;
pub use import::*;
pub use messages::*;
pub use neighborhood::*;
pub use reading::*;
pub use stats::*;
