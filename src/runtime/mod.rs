// Copyright (c) 2025 - Cowboy AI, Inc.
//! Bundled runtimes

pub mod simulated;

pub use simulated::{SimulatedCluster, SIMULATED};
