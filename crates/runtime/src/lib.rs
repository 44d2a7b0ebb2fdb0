pub mod frame;
pub mod mailbox;
pub mod timers;
pub mod version;

pub use frame::*;
pub use mailbox::*;
pub use timers::*;
pub use version::*;
