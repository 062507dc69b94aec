//! VindexChain node: configuration, genesis loading and the consensus driver
//! that runs the chain engine.

pub mod banner;
pub mod cli;
pub mod config;
pub mod error;
pub mod genesis;
pub mod metrics;
pub mod node;
