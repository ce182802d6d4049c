pub mod errors;
pub mod mode;
pub mod todo;

pub use errors::*;
pub use mode::*;
pub use todo::*;
