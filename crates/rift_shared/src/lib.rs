pub mod physics;
pub mod pose;
