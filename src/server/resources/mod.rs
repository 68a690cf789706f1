pub mod layout;
pub mod scheduler;
