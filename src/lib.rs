// src/lib.rs
pub mod ports {
    pub mod replay_feed;
}
pub mod config;
pub mod model;
pub mod pairmodel;
pub mod position;
pub mod replay;
pub mod sizing;
pub mod stats;
pub mod strategy;
pub mod synthetic;
pub mod tracker;
