pub mod actor;
pub mod pending;
pub mod trip;
