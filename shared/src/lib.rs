pub mod messages;
pub mod model;
