use nalgebra::RealField;

pub use nalgebra;

/// Real scalar type used throughout `galerkin`.
///
/// A trait alias for `RealField + Copy`, so that generic code can pass scalars by value.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Converts an `f64` literal or constant into `T`.
///
/// # Panics
///
/// Panics if the value can not be represented in `T`, which never happens for the
/// floating-point types used in practice.
#[inline]
pub fn real<T: Real>(value: f64) -> T {
    T::from_f64(value).expect("f64 value must be representable in T")
}
