pub mod assembly;
pub mod result;
pub mod trace;
pub mod triplet;

pub use assembly::{Provenance, ReceiverFunctionRecord, RecordKind, ResultAssembler};
pub use result::{DeconvolutionResult, Rejection, RejectionReason, StackedReceiverFunction};
pub use trace::{keys, MetaValue, Metadata, Trace};
pub use triplet::{ComponentTriplet, ZneTraces};
