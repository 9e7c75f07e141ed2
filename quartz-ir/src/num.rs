//! Arbitrary-width numeric values with an attached data type.

use ibig::IBig;

/// Width and signedness of a packed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataType {
    pub width: u32,
    pub signed: bool,
}

impl DataType {
    /// A single unsigned bit, the type of every comparison result.
    pub const BIT: DataType = DataType {
        width: 1,
        signed: false,
    };

    pub fn new(width: u32, signed: bool) -> Self {
        debug_assert!(width > 0, "zero-width data type");
        DataType { width, signed }
    }

    /// The 32-bit signed integer type of `int` variables and genvars.
    pub fn int() -> Self {
        DataType::new(32, true)
    }

    /// An unsigned packed vector of the given width.
    pub fn logic(width: u32) -> Self {
        DataType::new(width, false)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}'{}", self.width, if self.signed { "s" } else { "" })
    }
}

/// A value of a [`DataType`]. The payload is kept in canonical unsigned form,
/// `0 <= val < 2^width`; signedness only affects how the bits are read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Num {
    val: IBig,
    dtype: DataType,
}

impl Num {
    pub fn new<V: Into<IBig>>(val: V, dtype: DataType) -> Self {
        Num {
            val: mask(val.into(), dtype.width),
            dtype,
        }
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn width(&self) -> u32 {
        self.dtype.width
    }

    /// The canonical unsigned bit pattern.
    pub fn value(&self) -> &IBig {
        &self.val
    }

    /// The value with the sign bit honored when the type is signed.
    pub fn signed_value(&self) -> IBig {
        if self.dtype.signed && self.val >= half(self.dtype.width) {
            &self.val - modulus(self.dtype.width)
        } else {
            self.val.clone()
        }
    }

    pub fn is_one(&self) -> bool {
        self.val == IBig::from(1u8)
    }

    pub fn is_zero(&self) -> bool {
        self.val == IBig::from(0u8)
    }

    /// Saturating conversion, mainly for synthesizing block names.
    pub fn to_i64(&self) -> i64 {
        let sv = self.signed_value();
        i64::try_from(&sv).unwrap_or(if sv < IBig::from(0u8) {
            i64::MIN
        } else {
            i64::MAX
        })
    }

    /// Width-preserving assignment: copy `src`'s bits, truncating or
    /// zero-filling to this value's existing type.
    pub fn assign(&mut self, src: &Num) {
        self.val = mask(src.val.clone(), self.dtype.width);
    }

    /// Reinterpret this value under another type, sign-extending from the
    /// source type where it applies.
    pub fn cast(&self, dtype: DataType) -> Num {
        Num::new(self.signed_value(), dtype)
    }
}

impl std::fmt::Display for Num {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d{}", self.dtype, self.signed_value())
    }
}

/// Reduce `val` to two's-complement canonical form in `width` bits.
fn mask(val: IBig, width: u32) -> IBig {
    let m = modulus(width);
    ((val % &m) + &m) % &m
}

fn modulus(width: u32) -> IBig {
    IBig::from(1u8) << width as usize
}

fn half(width: u32) -> IBig {
    IBig::from(1u8) << (width as usize - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_values_canonicalize() {
        let n = Num::new(-1, DataType::new(4, true));
        assert_eq!(n.value(), &IBig::from(15u8));
        assert_eq!(n.signed_value(), IBig::from(-1));
        assert_eq!(n.to_i64(), -1);
    }

    #[test]
    fn unsigned_reads_stay_positive() {
        let n = Num::new(-1, DataType::logic(4));
        assert_eq!(n.signed_value(), IBig::from(15u8));
        assert_eq!(n.to_i64(), 15);
    }

    #[test]
    fn assign_preserves_width() {
        let mut dst = Num::new(0, DataType::logic(4));
        let src = Num::new(0x1ff, DataType::logic(16));
        dst.assign(&src);
        assert_eq!(dst.to_i64(), 0xf);
        assert_eq!(dst.width(), 4);
    }

    #[test]
    fn cast_sign_extends() {
        let n = Num::new(-2, DataType::new(4, true));
        let wide = n.cast(DataType::new(8, true));
        assert_eq!(wide.signed_value(), IBig::from(-2));
        assert_eq!(wide.value(), &IBig::from(0xfeu8));
    }

    #[test]
    fn one_and_zero() {
        assert!(Num::new(1, DataType::BIT).is_one());
        assert!(Num::new(0, DataType::BIT).is_zero());
        assert!(!Num::new(2, DataType::logic(2)).is_one());
    }

    #[test]
    fn display_marks_signedness() {
        assert_eq!(Num::new(5, DataType::int()).to_string(), "32'sd5");
        assert_eq!(Num::new(3, DataType::logic(2)).to_string(), "2'd3");
    }
}
