//! Hand-maintained wire types for the broker and consumer protocols.
//!
//! In the upstream system these are generated by `tonic-build`/`pbjson-build`
//! from `.proto` sources. That codegen pipeline is out of scope here (the
//! build system is an explicit non-goal), so the shapes this spec depends on
//! are reproduced by hand. Field names and semantics match the `.proto`
//! definitions they stand in for.

pub mod broker;
pub mod codec;
pub mod consumer;
pub mod flow;
pub mod ops;
pub mod shuffle;
