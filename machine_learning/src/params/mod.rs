mod cursor;
mod layout;
mod vector;

pub use cursor::{BackIter, FrontIter};
pub use layout::ParamLayout;
pub use vector::{NamedTensor, ParameterVector};
