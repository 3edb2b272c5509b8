//! Plans charging routes for a fleet of power-delivery vehicles (PDVs) serving a
//! wireless rechargeable sensor network, using a genetic algorithm over per-PDV
//! visiting orders.

#![warn(rust_2018_idioms)]

pub mod baseline;
pub mod cluster;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod genetic;
pub mod network;
pub mod parse;
pub mod point;
pub mod problem;
pub mod sensor;

#[cfg(test)]
mod test;
