pub mod fft;
pub mod matrix;
pub mod signal;
pub mod stats;
pub mod taper;

pub use fft::FftHelper;
pub use matrix::{CholeskyFactor, MatrixHelper};
pub use stats::StatsHelper;
pub use taper::{TaperBank, TaperSet};
