pub mod raster;
pub mod symbology;
pub mod texture;

pub use symbology::*;
pub use texture::*;
