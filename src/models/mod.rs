pub mod job;
pub mod stage;
pub mod video;
