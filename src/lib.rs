#[macro_use]
extern crate lazy_static;

pub mod config;
pub mod matcher;
pub mod path_codec;
pub mod placeholder;
pub mod rewriter;
pub mod store;
pub mod visibility;
