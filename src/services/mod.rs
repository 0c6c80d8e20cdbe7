pub mod job_store;
pub mod persister;
pub mod pipeline;
pub mod stages;
