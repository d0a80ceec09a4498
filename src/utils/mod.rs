pub mod ident;

pub use ident::{Ident, ObjectKey};
