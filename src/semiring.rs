//! Weight semirings.
//!
//! A semiring supplies the weight algebra the automata operate over:
//! `plus` accumulates alternative paths, `times` extends a path, `zero`
//! annihilates (a zero final weight means "not final") and `one` is the
//! neutral path weight. Composition additionally requires `times` to be
//! commutative unless both operands are unweighted.

use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// `times` has a left identity and left-distributes over `plus`.
pub const LEFT_SEMIRING: u64 = 0x01;
/// `times` has a right identity and right-distributes over `plus`.
pub const RIGHT_SEMIRING: u64 = 0x02;
/// Both a left and a right semiring.
pub const SEMIRING: u64 = LEFT_SEMIRING | RIGHT_SEMIRING;
/// `times` is commutative.
pub const COMMUTATIVE: u64 = 0x04;
/// `plus` is idempotent: `plus(w, w) == w`.
pub const IDEMPOTENT: u64 = 0x08;
/// `plus(w, v)` is always `w` or `v` (a path semiring).
pub const PATH: u64 = 0x10;

/// Default quantization delta for approximate weight equality.
pub const DELTA: f32 = 1.0 / 1024.0;

/// A weight algebra.
///
/// Implementations must satisfy the usual axioms: `plus` is associative
/// and commutative with identity `zero`; `times` is associative with
/// identity `one`; `zero` annihilates `times`. Approximate equality is
/// always up to a caller-supplied delta since most semirings here are
/// float-backed.
pub trait Semiring: Clone + PartialEq + fmt::Debug + fmt::Display + 'static {
    /// Static algebraic properties ([`COMMUTATIVE`], [`IDEMPOTENT`], ...).
    const PROPERTIES: u64;

    /// Tag naming this weight type in file headers.
    const TYPE_NAME: &'static str;

    /// The additive identity. A state with final weight `zero` is not final.
    fn zero() -> Self;

    /// The multiplicative identity.
    fn one() -> Self;

    /// Path alternation.
    fn plus(&self, rhs: &Self) -> Self;

    /// Path extension.
    fn times(&self, rhs: &Self) -> Self;

    /// Rounds the weight to a multiple of `delta`.
    fn quantize(&self, delta: f32) -> Self;

    /// Equality up to `delta`.
    fn approx_eq(&self, rhs: &Self, delta: f32) -> bool;

    /// Whether this is the additive identity.
    #[inline]
    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// Whether this is the multiplicative identity.
    #[inline]
    fn is_one(&self) -> bool {
        *self == Self::one()
    }

    /// Reads a weight from its little-endian wire form.
    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self>;

    /// Writes the weight in its little-endian wire form.
    fn write_to<Wr: Write + ?Sized>(&self, writer: &mut Wr) -> io::Result<()>;
}

/// Tropical semiring: `plus` is min, `times` is addition over `f32`.
///
/// The weight of a path is the sum of its arc weights; alternation keeps
/// the cheapest path. `zero` is positive infinity, `one` is 0.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TropicalWeight {
    value: f32,
}

impl TropicalWeight {
    /// Creates a tropical weight from its value.
    #[inline]
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    /// The underlying value.
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }
}

impl Semiring for TropicalWeight {
    const PROPERTIES: u64 = SEMIRING | COMMUTATIVE | IDEMPOTENT | PATH;
    const TYPE_NAME: &'static str = "tropical";

    #[inline]
    fn zero() -> Self {
        Self::new(f32::INFINITY)
    }

    #[inline]
    fn one() -> Self {
        Self::new(0.0)
    }

    #[inline]
    fn plus(&self, rhs: &Self) -> Self {
        if self.value <= rhs.value {
            *self
        } else {
            *rhs
        }
    }

    #[inline]
    fn times(&self, rhs: &Self) -> Self {
        if self.is_zero() || rhs.is_zero() {
            Self::zero()
        } else {
            Self::new(self.value + rhs.value)
        }
    }

    fn quantize(&self, delta: f32) -> Self {
        if self.value.is_infinite() {
            *self
        } else {
            Self::new((self.value / delta + 0.5).floor() * delta)
        }
    }

    fn approx_eq(&self, rhs: &Self, delta: f32) -> bool {
        if self.value.is_infinite() || rhs.value.is_infinite() {
            self.value == rhs.value
        } else {
            (self.value - rhs.value).abs() <= delta
        }
    }

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        Ok(Self::new(reader.read_f32::<LittleEndian>()?))
    }

    fn write_to<Wr: Write + ?Sized>(&self, writer: &mut Wr) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(self.value)
    }
}

impl fmt::Display for TropicalWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Log semiring: `plus` is the negated log-sum-exp, `times` is addition.
///
/// Weights are negative log probabilities; alternation sums the
/// probabilities they encode. Not idempotent, so unlike the tropical
/// semiring it distinguishes a path taken twice from a path taken once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogWeight {
    value: f32,
}

impl LogWeight {
    /// Creates a log weight from its value (a negative log probability).
    #[inline]
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    /// The underlying value.
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    // -log(e^-x + e^-y), evaluated against the smaller exponent so the
    // intermediate exponential cannot overflow.
    fn log_plus(x: f32, y: f32) -> f32 {
        let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
        if lo == f32::INFINITY {
            f32::INFINITY
        } else {
            lo - (-(hi - lo)).exp().ln_1p()
        }
    }
}

impl Semiring for LogWeight {
    const PROPERTIES: u64 = SEMIRING | COMMUTATIVE;
    const TYPE_NAME: &'static str = "log";

    #[inline]
    fn zero() -> Self {
        Self::new(f32::INFINITY)
    }

    #[inline]
    fn one() -> Self {
        Self::new(0.0)
    }

    fn plus(&self, rhs: &Self) -> Self {
        Self::new(Self::log_plus(self.value, rhs.value))
    }

    #[inline]
    fn times(&self, rhs: &Self) -> Self {
        if self.is_zero() || rhs.is_zero() {
            Self::zero()
        } else {
            Self::new(self.value + rhs.value)
        }
    }

    fn quantize(&self, delta: f32) -> Self {
        if self.value.is_infinite() {
            *self
        } else {
            Self::new((self.value / delta + 0.5).floor() * delta)
        }
    }

    fn approx_eq(&self, rhs: &Self, delta: f32) -> bool {
        if self.value.is_infinite() || rhs.value.is_infinite() {
            self.value == rhs.value
        } else {
            (self.value - rhs.value).abs() <= delta
        }
    }

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        Ok(Self::new(reader.read_f32::<LittleEndian>()?))
    }

    fn write_to<Wr: Write + ?Sized>(&self, writer: &mut Wr) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(self.value)
    }
}

impl fmt::Display for LogWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tropical_identities() {
        let w = TropicalWeight::new(1.5);
        assert_eq!(w.plus(&TropicalWeight::zero()), w);
        assert_eq!(w.times(&TropicalWeight::one()), w);
        assert_eq!(w.times(&TropicalWeight::zero()), TropicalWeight::zero());
    }

    #[test]
    fn test_tropical_plus_is_min() {
        let a = TropicalWeight::new(2.0);
        let b = TropicalWeight::new(3.0);
        assert_eq!(a.plus(&b), a);
        assert_eq!(b.plus(&a), a);
    }

    #[test]
    fn test_tropical_times_is_sum() {
        let a = TropicalWeight::new(2.0);
        let b = TropicalWeight::new(3.0);
        assert_eq!(a.times(&b), TropicalWeight::new(5.0));
    }

    #[test]
    fn test_tropical_quantize() {
        let a = TropicalWeight::new(1.0);
        let b = TropicalWeight::new(1.0 + DELTA / 4.0);
        assert_eq!(a.quantize(DELTA), b.quantize(DELTA));
        assert!(a.approx_eq(&b, DELTA));
    }

    #[test]
    fn test_tropical_zero_absorbs() {
        assert!(TropicalWeight::zero()
            .times(&TropicalWeight::new(7.0))
            .is_zero());
    }

    #[test]
    fn test_log_plus_accumulates() {
        // -log(e^0 + e^0) = -log 2
        let one = LogWeight::one();
        let sum = one.plus(&one);
        assert!(sum.approx_eq(&LogWeight::new(-(2.0f32.ln())), 1e-5));
    }

    #[test]
    fn test_log_zero_is_identity_for_plus() {
        let w = LogWeight::new(0.7);
        assert!(w.plus(&LogWeight::zero()).approx_eq(&w, 1e-6));
    }

    #[test]
    fn test_commutative_property_bits() {
        assert_ne!(TropicalWeight::PROPERTIES & COMMUTATIVE, 0);
        assert_ne!(LogWeight::PROPERTIES & COMMUTATIVE, 0);
        assert_eq!(LogWeight::PROPERTIES & IDEMPOTENT, 0);
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut buf = Vec::new();
        TropicalWeight::new(2.25).write_to(&mut buf).unwrap();
        let back = TropicalWeight::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(back, TropicalWeight::new(2.25));
    }
}
