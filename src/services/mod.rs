pub mod actions;
pub mod connectivity;
pub mod kv;
pub mod pricing;
pub mod queues;
pub mod reconcile;
pub mod remote;
pub mod session_store;
