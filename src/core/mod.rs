pub mod composer;
pub mod config;
pub mod layout;
pub mod pool;
pub mod ritual;
pub mod rules;
pub mod session;
pub mod store;
pub mod validator;
