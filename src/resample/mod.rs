//! Signal reduction: filter design, filter cache and the reduction methods.
pub mod cache;
pub mod filter;
pub mod fourier;
pub mod method;
