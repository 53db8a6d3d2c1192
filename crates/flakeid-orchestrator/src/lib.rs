#![doc = include_str!("../README.md")]

pub mod allocator;
pub mod config;
pub mod service;
pub mod telemetry;
