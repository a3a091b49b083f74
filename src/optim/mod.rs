pub mod adam;
pub mod optimizer;
pub mod sgd;

pub use adam::Adam;
pub use optimizer::{Optimizer, OptimizerKind, ParamView};
pub use sgd::Sgd;
