#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod constants;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod hw;
pub mod instrument;
pub mod retry;
pub mod sim;
pub mod utils;

pub use error::Error;

#[cfg(test)]
mod scenario_tests;
