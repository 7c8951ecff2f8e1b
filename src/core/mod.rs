pub mod candidate;
pub mod config;
pub mod facts;
pub mod lint;
pub mod render;
pub mod search;
pub mod unify;
