pub mod company;
pub mod job;
pub mod ruleset;
