pub mod config;
pub mod filters;
pub mod gather;
pub mod generator;
pub mod selector;
pub mod sync;


pub use config::*;
pub use generator::*;
