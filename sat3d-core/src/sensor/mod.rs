//! Sensor models for satellite imagery

pub mod rpc;

pub use rpc::{RpcCoefficients, RpcModel, RpcNormalization, RpcSolver};
