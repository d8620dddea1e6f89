pub mod grid;
pub mod screenshot;
pub mod stability;
pub mod traits;
pub mod types;
