pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod messaging;
pub mod services;

#[cfg(test)]
mod testing;

pub use error::Error;
