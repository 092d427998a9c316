/// Host identity of the running process.
pub mod sys_info;
/// Time formatting helpers.
pub mod utils;
