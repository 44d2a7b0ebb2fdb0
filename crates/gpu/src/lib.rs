pub mod backend;
pub mod path_cache;
pub mod renderer;
pub mod resources;

pub use backend::*;
pub use path_cache::*;
pub use renderer::*;
pub use resources::*;
