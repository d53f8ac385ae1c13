pub mod evaluate;
pub mod extract;
pub mod layers;
pub mod stress;

pub use evaluate::*;
pub use extract::*;
pub use layers::*;
pub use stress::*;
