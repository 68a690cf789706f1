pub mod persist;
pub mod resources;
pub mod systems;
