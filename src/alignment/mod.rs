pub mod monotonic;

pub use monotonic::{maximum_path, maximum_path_from_mask, maximum_path_owned, MAX_NEG_VAL};
