pub mod cli;
pub mod config;
pub mod delivery;
pub mod normalize;
pub mod record;
pub mod search;
pub mod source;
