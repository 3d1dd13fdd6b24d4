//! Core numerics for teleseismic receiver functions.
//!
//! Three-component recordings are windowed around a phase arrival, rotated
//! into a source-aligned frame and deconvolved (iterative, water-level or
//! multitaper). Per-event results are moveout-corrected and stacked per
//! station, then packaged with their provenance for an external writer.

pub mod deconvolution;
pub mod interface;
pub mod math;
pub mod model;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use deconvolution::{deconvolve, Deconvolver};
pub use interface::{
    ComponentTriplet, DeconvolutionResult, ReceiverFunctionRecord, ResultAssembler,
    StackedReceiverFunction, Trace, ZneTraces,
};
pub use model::VelocityModel;
pub use prelude::{
    DeconvolutionMethod, DeconvolutionParams, Phase, PipelineConfig, RfError, RfResult,
    RotationKind, StackConfig, WindowConfig,
};
pub use processing::{Geometry, Pipeline, TripletJob};
