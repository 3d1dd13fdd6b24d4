pub mod moveout;
pub mod pipeline;
pub mod rotation;
pub mod stack;
pub mod window;

pub use moveout::Moveout;
pub use pipeline::{EventReceiverFunctions, JobOutcome, Pipeline, StationStack, TripletJob};
pub use rotation::{Geometry, Rotation};
pub use stack::Stacker;
pub use window::Windowing;
