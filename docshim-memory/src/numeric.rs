//! Numeric arithmetic over BSON values.
//!
//! Integer results keep the narrowest width that holds them: two `Int32`s stay `Int32`
//! unless the result overflows, mixing in an `Int64` yields `Int64`, and any `Double`
//! operand makes the result a `Double`. An `Int64` overflow falls back to `Double`.

use bson::Bson;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Int32(i32),
    Int64(i64),
    Double(f64),
}

impl Number {
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::Int32(n) => Some(Number::Int32(*n)),
            Bson::Int64(n) => Some(Number::Int64(*n)),
            Bson::Double(n) => Some(Number::Double(*n)),
            _ => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int32(n) => f64::from(n),
            Number::Int64(n) => n as f64,
            Number::Double(n) => n,
        }
    }

    fn as_i64(self) -> Option<i64> {
        match self {
            Number::Int32(n) => Some(i64::from(n)),
            Number::Int64(n) => Some(n),
            Number::Double(_) => None,
        }
    }

    pub fn add(self, other: Number) -> Number {
        self.combine(other, i32::checked_add, i64::checked_add, |a, b| a + b)
    }

    pub fn subtract(self, other: Number) -> Number {
        self.combine(other, i32::checked_sub, i64::checked_sub, |a, b| a - b)
    }

    pub fn multiply(self, other: Number) -> Number {
        self.combine(other, i32::checked_mul, i64::checked_mul, |a, b| a * b)
    }

    fn combine(
        self,
        other: Number,
        narrow: fn(i32, i32) -> Option<i32>,
        wide: fn(i64, i64) -> Option<i64>,
        double: fn(f64, f64) -> f64,
    ) -> Number {
        if let (Number::Int32(a), Number::Int32(b)) = (self, other) {
            if let Some(result) = narrow(a, b) {
                return Number::Int32(result);
            }
        }

        match (self.as_i64(), other.as_i64()) {
            (Some(a), Some(b)) => match wide(a, b) {
                Some(result) => Number::Int64(result),
                None => Number::Double(double(a as f64, b as f64)),
            },
            _ => Number::Double(double(self.as_f64(), other.as_f64())),
        }
    }
}

impl From<Number> for Bson {
    fn from(number: Number) -> Self {
        match number {
            Number::Int32(n) => Bson::Int32(n),
            Number::Int64(n) => Bson::Int64(n),
            Number::Double(n) => Bson::Double(n),
        }
    }
}
