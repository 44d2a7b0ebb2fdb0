pub mod animation;
pub mod arc;
pub mod camera;
pub mod config;
pub mod model;
pub mod sphere;
pub mod traffic;

pub use animation::*;
pub use arc::*;
pub use camera::*;
pub use config::*;
pub use model::*;
pub use sphere::*;
pub use traffic::*;
