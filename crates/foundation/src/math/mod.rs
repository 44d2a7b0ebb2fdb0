pub mod geo;
pub mod mat4;
pub mod vec;

pub use geo::*;
pub use mat4::*;
pub use vec::*;
