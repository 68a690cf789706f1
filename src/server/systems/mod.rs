pub mod encounter;
pub mod notify;
pub mod region_rules;
pub mod spawner;
