#![forbid(unsafe_code)]

//! Library side of `bsmh`: fetches the latest maps from the catalog, turns a
//! window of them into a `.bplist` playlist and keeps a local maps folder in
//! sync with that playlist.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod playlist;
pub mod prune;
pub mod window;

pub use error::{BsmhError, Result};
