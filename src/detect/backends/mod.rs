pub mod mixture;

pub use mixture::{Gaussian, MixtureBackground, MixtureConfig};
