pub mod properties;
pub mod suggest;
