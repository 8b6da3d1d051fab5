pub mod buffer3;
pub mod float_ext;
pub mod log_setup;
pub mod test_utils;

pub const EPSILON: f64 = 1e-6;
