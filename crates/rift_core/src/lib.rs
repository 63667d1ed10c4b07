pub mod events;
pub mod frame;
