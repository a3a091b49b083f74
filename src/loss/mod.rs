pub mod bce;
pub mod dice;
pub mod loss_type;

pub use bce::BceLoss;
pub use dice::DiceLoss;
pub use loss_type::LossType;
