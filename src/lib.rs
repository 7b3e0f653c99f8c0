pub mod actor;
pub mod audio;
pub mod catalog;
pub mod config;
pub mod entity;
pub mod event;
pub mod media;
pub mod points;
pub mod quality;
pub mod rng;
pub mod session;
pub mod sim;
pub mod sink;
pub mod state;
pub mod summary;
pub mod transport;
