pub mod countries;
pub mod datasets;
pub mod sphere_bin;

pub use countries::*;
pub use datasets::*;
pub use sphere_bin::SphereBinError;
