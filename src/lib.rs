
pub mod hc;
pub mod utility;
pub mod level;
pub mod term;
pub mod database;
pub mod instantiate;
pub mod reduction;

pub(crate) const RED_ZONE: usize = 100 * 1024;
pub(crate) const STACK_CHUNK: usize = 1024 * 1024;

pub mod prelude {
    pub use crate::{
        hc::*,
        utility::*,
        level::*,
        term::*,
        database::*,
        instantiate::*,
        reduction::*,
    };
}
