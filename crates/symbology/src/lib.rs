pub mod collect;
pub mod expression;
pub mod geometry;
pub mod identity;
pub mod svg;
pub mod symbol;
pub mod value;

pub use collect::*;
pub use expression::*;
pub use geometry::*;
pub use identity::*;
pub use symbol::*;
pub use value::*;
