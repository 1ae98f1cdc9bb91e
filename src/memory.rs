use num::{Float, NumCast, Zero};
use std::{
    fmt::{Debug, Display, LowerExp},
    iter::Sum,
    ops::{Add, AddAssign, Sub, SubAssign},
};
use rand::distributions::uniform::SampleUniform;

pub trait Primitive: Add + AddAssign + Sum + Sub + SubAssign + Zero + Float + NumCast + SampleUniform
                + PartialOrd + Copy + Default + Display + Debug + Sync + Send + LowerExp + 'static
                + for<'a> AddAssign<&'a Self> {
    /// Lossless for both supported primitives, used for wire transfer and output files.
    fn to_wire(self) -> f64;
    fn from_wire(v: f64) -> Self;
}
impl Primitive for f32 {
    #[inline(always)] fn to_wire(self) -> f64 { self as f64 }
    #[inline(always)] fn from_wire(v: f64) -> Self { v as f32 }
}
impl Primitive for f64 {
    #[inline(always)] fn to_wire(self) -> f64 { self }
    #[inline(always)] fn from_wire(v: f64) -> Self { v }
}

/// Squared distance between two scalars.
#[inline(always)]
pub(crate) fn sq_dist<T: Primitive>(a: T, b: T) -> T {
    let d = a - b;
    d * d
}
