//! Tools for preparing SWMM models for the GoldSim bridge.

pub mod diagram;
pub mod discover;
pub mod inp;
pub mod validate;
