#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use spatia_linalg as linalg;

#[doc(inline)]
pub use spatia_3d as three_d;

#[doc(inline)]
pub use spatia_icp as icp;

#[doc(inline)]
pub use spatia_bvh as bvh;
