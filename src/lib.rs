pub mod access;
pub mod config;
pub mod error;
pub mod identity;
pub mod node;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod storage;
pub mod users;
pub mod worker;
