pub mod job;
pub mod photo;
