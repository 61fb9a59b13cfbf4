pub mod json;
pub mod process;
