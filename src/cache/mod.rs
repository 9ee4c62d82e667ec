pub mod backend;
pub mod blacklist;
pub mod error;
pub mod store;
pub mod whitelist;
