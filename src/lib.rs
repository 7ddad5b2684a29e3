mod apertures;
mod expressions;
mod plotter;
mod reader;
pub mod spacial;
mod warnings;

pub use apertures::*;
pub use expressions::*;
pub use plotter::*;
pub use reader::*;
pub use warnings::*;

#[cfg(feature = "testing")]
pub mod testing;
