use std::fmt;

// DType — Supported element data types
//
// Every tensor has a DType that determines its element size and numeric
// behavior. The set matches what compiled graph programs may carry:
//
//   I8..I64  — signed integers of widths 8 through 64
//   U8..U64  — unsigned integers of widths 8 through 64
//   F16      — compact 16-bit IEEE half float (via the `half` crate)
//   F32      — 32-bit float, the default workhorse
//   F64      — 64-bit float, for high-precision work

/// Enum of all supported element data types.
///
/// This is stored inside every tensor so operations can dispatch to the
/// correct typed implementation at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 | DType::F16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    /// Whether this dtype is a floating-point type.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::F32 | DType::F64)
    }

    /// Whether this dtype is a signed type (signed integer or float).
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            DType::I8
                | DType::I16
                | DType::I32
                | DType::I64
                | DType::F16
                | DType::F32
                | DType::F64
        )
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::U32 => "u32",
            DType::U64 => "u64",
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}

// WithDType — Trait that connects Rust element types to the DType enum
//
// This trait is the bridge between Rust's type system and the runtime DType.
// Kernels are written once, generic over `T: WithDType`, and a dispatch on
// the tensor's DType selects the monomorphized instance.
//
// The `bytemuck::Pod` bound is what lets a raw device buffer be viewed in
// place as `&[T]` with a checked cast instead of a copy.

/// Trait implemented by Rust types that can be stored in a tensor.
///
/// Provides the mapping between the concrete Rust type and the DType enum,
/// conversions to/from f64 for generic numeric code, and the arithmetic and
/// bounds traits the reference kernels rely on (saturating division needs
/// `Bounded`, comparisons need `PartialOrd`).
pub trait WithDType:
    bytemuck::Pod
    + PartialOrd
    + num_traits::Zero
    + num_traits::Bounded
    + num_traits::NumCast
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::Div<Output = Self>
    + std::fmt::Debug
    + Send
    + Sync
    + 'static
{
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert this value to f64 (for generic numeric code).
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;
}

macro_rules! with_dtype_prim {
    ($ty:ty, $dtype:expr) => {
        impl WithDType for $ty {
            const DTYPE: DType = $dtype;
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn from_f64(v: f64) -> Self {
                v as $ty
            }
        }
    };
}

with_dtype_prim!(i8, DType::I8);
with_dtype_prim!(i16, DType::I16);
with_dtype_prim!(i32, DType::I32);
with_dtype_prim!(i64, DType::I64);
with_dtype_prim!(u8, DType::U8);
with_dtype_prim!(u16, DType::U16);
with_dtype_prim!(u32, DType::U32);
with_dtype_prim!(u64, DType::U64);
with_dtype_prim!(f32, DType::F32);

impl WithDType for f64 {
    const DTYPE: DType = DType::F64;
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
}

impl WithDType for half::f16 {
    const DTYPE: DType = DType::F16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(DType::I8.size_in_bytes(), 1);
        assert_eq!(DType::U16.size_in_bytes(), 2);
        assert_eq!(DType::F16.size_in_bytes(), 2);
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::U64.size_in_bytes(), 8);
        assert_eq!(DType::F64.size_in_bytes(), 8);
    }

    #[test]
    fn test_dtype_classes() {
        assert!(DType::F16.is_float());
        assert!(!DType::I32.is_float());
        assert!(DType::I8.is_signed());
        assert!(DType::F64.is_signed());
        assert!(!DType::U32.is_signed());
    }

    #[test]
    fn test_with_dtype_roundtrip() {
        assert_eq!(f32::DTYPE, DType::F32);
        assert_eq!(i64::from_f64(42.0).to_f64(), 42.0);
        assert_eq!(u32::from_f64(7.0).to_f64(), 7.0);
        assert_eq!(half::f16::from_f64(1.5).to_f64(), 1.5);
    }
}
