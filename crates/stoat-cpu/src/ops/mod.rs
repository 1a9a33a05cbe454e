// CPU kernel modules.
//
// Every kernel follows the same run() discipline: infer the output
// prototypes from the argument slots, allocate the outputs on the stack via
// its dynamic memory controller, compute, and report the result count.
// Arguments are read by fixed position; the dispatcher drops them after the
// call.

pub mod binary;
pub mod inner_prod;
pub mod reduce;
pub mod softmax;
pub mod unary;

/// Monomorphize `$body` for the element type behind a runtime DType.
///
/// `$T` becomes a local type alias inside each arm, so kernels are written
/// once, generic over `T: WithDType`.
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:block) => {
        match $dtype {
            stoat_core::DType::I8 => {
                type $T = i8;
                $body
            }
            stoat_core::DType::I16 => {
                type $T = i16;
                $body
            }
            stoat_core::DType::I32 => {
                type $T = i32;
                $body
            }
            stoat_core::DType::I64 => {
                type $T = i64;
                $body
            }
            stoat_core::DType::U8 => {
                type $T = u8;
                $body
            }
            stoat_core::DType::U16 => {
                type $T = u16;
                $body
            }
            stoat_core::DType::U32 => {
                type $T = u32;
                $body
            }
            stoat_core::DType::U64 => {
                type $T = u64;
                $body
            }
            stoat_core::DType::F16 => {
                type $T = half::f16;
                $body
            }
            stoat_core::DType::F32 => {
                type $T = f32;
                $body
            }
            stoat_core::DType::F64 => {
                type $T = f64;
                $body
            }
        }
    };
}

pub(crate) use dispatch_dtype;
