/// The element kind an opaque host value reports.
///
/// Mirrors the class taxonomy of the host runtime: ten numeric kinds, a
/// character kind, a cell kind for values whose elements are themselves host
/// values, and a catch-all for anything unrecognized.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostClass {
    /// UTF-16 character data.
    Char,

    /// Signed 8-bit integers.
    Int8,

    /// Unsigned 8-bit integers.
    Uint8,

    /// Signed 16-bit integers.
    Int16,

    /// Unsigned 16-bit integers.
    Uint16,

    /// Signed 32-bit integers.
    Int32,

    /// Unsigned 32-bit integers.
    Uint32,

    /// Signed 64-bit integers.
    Int64,

    /// Unsigned 64-bit integers.
    Uint64,

    /// 32-bit IEEE floating point.
    Single,

    /// 64-bit IEEE floating point.
    Double,

    /// A value whose elements are themselves host values.
    Cell,

    /// Anything the taxonomy does not cover.
    Unknown,
}

/// Whether `class` is one of the numeric kinds a scalar-element container can
/// hold directly.
///
/// `Char`, `Cell` and `Unknown` are excluded: character data needs transcoding
/// and cell data needs per-element unwrapping, neither of which is a plain
/// memory view.
#[must_use]
pub fn is_scalar_class(class: HostClass) -> bool {
    matches!(
        class,
        HostClass::Int8
            | HostClass::Uint8
            | HostClass::Int16
            | HostClass::Uint16
            | HostClass::Int32
            | HostClass::Uint32
            | HostClass::Int64
            | HostClass::Uint64
            | HostClass::Single
            | HostClass::Double
    )
}

/// A native scalar type with a known host element kind.
///
/// # Safety
///
/// Implementations guarantee that a host value reporting [`Self::CLASS`]
/// stores its payload as contiguous values of `Self`, identical in size,
/// alignment and bit validity. Container code relies on this to reinterpret a
/// validated host payload pointer as `*const Self` without further checks.
pub unsafe trait HostScalar: Copy {
    /// The element kind a matching host value reports.
    const CLASS: HostClass;
}

macro_rules! host_scalar {
    ($($scalar:ty => $class:ident),* $(,)?) => {
        $(
            // SAFETY: The host runtime stores this class as the identically
            // sized and aligned native scalar, every bit pattern of which is
            // a valid value of the type.
            unsafe impl HostScalar for $scalar {
                const CLASS: HostClass = HostClass::$class;
            }
        )*
    };
}

host_scalar! {
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Single,
    f64 => Double,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_types_map_to_their_class() {
        assert_eq!(<i8 as HostScalar>::CLASS, HostClass::Int8);
        assert_eq!(<u8 as HostScalar>::CLASS, HostClass::Uint8);
        assert_eq!(<i16 as HostScalar>::CLASS, HostClass::Int16);
        assert_eq!(<u16 as HostScalar>::CLASS, HostClass::Uint16);
        assert_eq!(<i32 as HostScalar>::CLASS, HostClass::Int32);
        assert_eq!(<u32 as HostScalar>::CLASS, HostClass::Uint32);
        assert_eq!(<i64 as HostScalar>::CLASS, HostClass::Int64);
        assert_eq!(<u64 as HostScalar>::CLASS, HostClass::Uint64);
        assert_eq!(<f32 as HostScalar>::CLASS, HostClass::Single);
        assert_eq!(<f64 as HostScalar>::CLASS, HostClass::Double);
    }

    #[test]
    fn numeric_classes_are_scalar() {
        assert!(is_scalar_class(HostClass::Int8));
        assert!(is_scalar_class(HostClass::Uint64));
        assert!(is_scalar_class(HostClass::Single));
        assert!(is_scalar_class(HostClass::Double));
    }

    #[test]
    fn non_numeric_classes_are_not_scalar() {
        assert!(!is_scalar_class(HostClass::Char));
        assert!(!is_scalar_class(HostClass::Cell));
        assert!(!is_scalar_class(HostClass::Unknown));
    }

    static_assertions::assert_impl_all!(HostClass: Send, Sync, Copy);
}
