pub mod default_mappings;
pub mod dispatcher;
pub mod endpoint;
pub mod mapping;
pub mod mapping_loader;
pub mod shaper;
pub mod transport;
pub mod validation;
