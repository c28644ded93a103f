pub mod jobs;
pub mod orders;
pub mod templates;
