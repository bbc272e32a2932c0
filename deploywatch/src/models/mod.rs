pub mod event;
pub mod resource;
