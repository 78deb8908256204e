pub mod flow;
pub mod normalize;
pub mod rules;
pub mod spatial;

pub use flow::{extract_fields, CATALOG};
pub use spatial::{extract_hardness, extract_tensile};
