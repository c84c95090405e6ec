pub mod backend;
pub mod catalog;
pub mod config;
pub mod cooldown;
pub mod deck;
pub mod demo;
pub mod error;
pub mod faction;
pub mod http_cache;
pub mod http_client;
pub mod persist;
pub mod recommend;
pub mod state;
pub mod store;
pub mod totals;
pub mod worker;
