pub mod config;
pub mod layers;
pub mod postprocess;
pub mod predictor;
pub mod preprocess;
pub mod runner;
pub mod session;
pub mod visualize;

pub use config::*;
pub use predictor::*;
pub use runner::*;
pub use session::*;
