pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod nutrition;
pub mod ranking;
pub mod recipe;
pub mod recommend;
pub mod service;
pub mod store;
