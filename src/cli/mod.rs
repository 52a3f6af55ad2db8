pub mod config;
pub mod load;
pub mod normalize;
pub mod output;
pub mod run;
pub mod search;
