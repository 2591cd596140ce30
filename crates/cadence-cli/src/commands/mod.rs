pub mod day;
pub mod rule;
pub mod task;
