pub mod cli;
pub mod copyjson;
pub mod flatten;
pub mod manifest;
pub mod packlist;
pub mod util;
