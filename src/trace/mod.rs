pub mod engine;
pub mod observer;
pub mod unit;

pub use engine::*;
pub use observer::*;
pub use unit::*;
