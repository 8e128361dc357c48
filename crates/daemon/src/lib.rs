mod catalog;
mod fetch;
mod loader;
mod parser;
mod pipeline;
mod utils;

pub use catalog::*;
pub use fetch::*;
pub use loader::*;
pub use parser::*;
pub use pipeline::*;
pub use utils::*;
