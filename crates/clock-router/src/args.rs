//! Positional OSC argument decoding
//!
//! Numeric width is lenient (`i`/`h` both read as integers, `f`/`d` both as
//! floats); kind and arity are strict.

use rosc::{OscTime, OscType};

use crate::error::DecodeError;

/// Cursor over the arguments of one OSC message
#[derive(Debug)]
pub struct Args<'a> {
    args: &'a [OscType],
    pos: usize,
}

impl<'a> Args<'a> {
    /// Require exactly `count` arguments
    pub fn exact(args: &'a [OscType], count: usize) -> Result<Self, DecodeError> {
        Self::between(args, count, count)
    }

    /// Require between `min` and `max` arguments, inclusive
    pub fn between(args: &'a [OscType], min: usize, max: usize) -> Result<Self, DecodeError> {
        if args.len() < min || args.len() > max {
            return Err(DecodeError::Arity {
                expected: if args.len() < min { min } else { max },
                got: args.len(),
            });
        }
        Ok(Self { args, pos: 0 })
    }

    /// Arguments not yet consumed
    pub fn remaining(&self) -> usize {
        self.args.len() - self.pos
    }

    fn next(&mut self, expected: &'static str) -> Result<(usize, &'a OscType), DecodeError> {
        let index = self.pos;
        let arg = self.args.get(index).ok_or(DecodeError::Arity {
            expected: index + 1,
            got: self.args.len(),
        })?;
        self.pos += 1;

        if matches!(arg, OscType::Nil) {
            return Err(mismatch(index, expected, arg));
        }
        Ok((index, arg))
    }

    pub fn int(&mut self) -> Result<i32, DecodeError> {
        let (index, arg) = self.next("int")?;
        match arg {
            OscType::Int(v) => Ok(*v),
            OscType::Long(v) => i32::try_from(*v).map_err(|_| mismatch(index, "int", arg)),
            _ => Err(mismatch(index, "int", arg)),
        }
    }

    pub fn float(&mut self) -> Result<f64, DecodeError> {
        match self.next("float")? {
            (_, OscType::Float(v)) => Ok(f64::from(*v)),
            (_, OscType::Double(v)) => Ok(*v),
            (index, arg) => Err(mismatch(index, "float", arg)),
        }
    }

    pub fn string(&mut self) -> Result<String, DecodeError> {
        match self.next("string")? {
            (_, OscType::String(s)) => Ok(s.clone()),
            (index, arg) => Err(mismatch(index, "string", arg)),
        }
    }

    pub fn boolean(&mut self) -> Result<bool, DecodeError> {
        match self.next("bool")? {
            (_, OscType::Bool(b)) => Ok(*b),
            (index, arg) => Err(mismatch(index, "bool", arg)),
        }
    }

    pub fn time(&mut self) -> Result<OscTime, DecodeError> {
        match self.next("timetag")? {
            (_, OscType::Time(t)) => Ok(*t),
            (index, arg) => Err(mismatch(index, "timetag", arg)),
        }
    }
}

fn mismatch(index: usize, expected: &'static str, got: &OscType) -> DecodeError {
    DecodeError::ArgType {
        index,
        expected,
        got: type_name(got).to_string(),
    }
}

/// OSC type tag name
pub fn type_name(arg: &OscType) -> &'static str {
    match arg {
        OscType::Int(_) => "int",
        OscType::Float(_) => "float",
        OscType::String(_) => "string",
        OscType::Blob(_) => "blob",
        OscType::Time(_) => "timetag",
        OscType::Long(_) => "long",
        OscType::Double(_) => "double",
        OscType::Char(_) => "char",
        OscType::Color(_) => "color",
        OscType::Midi(_) => "midi",
        OscType::Bool(_) => "bool",
        OscType::Array(_) => "array",
        OscType::Nil => "nil",
        OscType::Inf => "inf",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_numeric_width() {
        let raw = [OscType::Long(42), OscType::Double(0.5), OscType::Int(7)];
        let mut args = Args::exact(&raw, 3).unwrap();
        assert_eq!(args.int().unwrap(), 42);
        assert_eq!(args.float().unwrap(), 0.5);
        assert!(args.float().is_err());
    }

    #[test]
    fn test_long_out_of_range() {
        let raw = [OscType::Long(i64::MAX)];
        let mut args = Args::exact(&raw, 1).unwrap();
        assert!(matches!(args.int(), Err(DecodeError::ArgType { index: 0, .. })));
    }

    #[test]
    fn test_arity() {
        let raw = [OscType::Int(1)];
        assert_eq!(
            Args::exact(&raw, 2).unwrap_err(),
            DecodeError::Arity { expected: 2, got: 1 }
        );
        assert!(Args::between(&raw, 0, 1).is_ok());
        assert!(Args::between(&[], 1, 2).is_err());
    }

    #[test]
    fn test_kind_is_strict() {
        let raw = [OscType::String("10".into())];
        let mut args = Args::exact(&raw, 1).unwrap();
        assert_eq!(
            args.int().unwrap_err(),
            DecodeError::ArgType {
                index: 0,
                expected: "int",
                got: "string".into()
            }
        );
    }

    #[test]
    fn test_remaining() {
        let raw = [OscType::Bool(true), OscType::Bool(false)];
        let mut args = Args::exact(&raw, 2).unwrap();
        assert!(args.boolean().unwrap());
        assert_eq!(args.remaining(), 1);
    }
}
