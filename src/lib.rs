pub mod account;
pub mod chains;
pub mod config;
pub mod error;
pub mod helpers;
pub mod logger;
pub mod rpc;
pub mod validator;
