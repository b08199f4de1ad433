pub mod backend;
pub mod error;
pub mod spec;
pub mod surface;
pub mod tensor;

pub use backend::*;
pub use error::*;
pub use spec::*;
pub use surface::*;
pub use tensor::*;
