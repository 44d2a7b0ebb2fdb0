pub mod visibility;
pub mod worker;

pub use visibility::*;
pub use worker::*;
