//! Partial parameter knowledge gathered while recognizing a signal.

use crate::Error;
use indexmap::IndexMap;
use std::fmt;

/// A parameter value of which only some bits may be known yet. Bits
/// outside `bitmask` carry no information.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitwiseParameter {
    value: u64,
    bitmask: u64,
    /// Value the parameter must end up matching, when a definition for
    /// it was already evaluable at observation time.
    expected: Option<i64>,
}

impl BitwiseParameter {
    pub fn new(value: u64, bitmask: u64) -> Self {
        BitwiseParameter {
            value: value & bitmask,
            bitmask,
            expected: None,
        }
    }

    /// A fully known value.
    pub fn full(value: i64) -> Self {
        BitwiseParameter {
            value: value as u64,
            bitmask: u64::MAX,
            expected: None,
        }
    }

    pub fn with_expected(mut self, expected: i64) -> Self {
        self.expected = Some(expected);
        self
    }

    pub fn value(&self) -> i64 {
        self.value as i64
    }

    pub fn bitmask(&self) -> u64 {
        self.bitmask
    }

    /// Two observations agree when they match on the bits both know.
    pub fn is_consistent(&self, other: &BitwiseParameter) -> bool {
        (self.value ^ other.value) & self.bitmask & other.bitmask == 0
            && self
                .expected
                .map(|e| (e as u64 ^ other.value) & other.bitmask == 0)
                .unwrap_or(true)
            && other
                .expected
                .map(|e| (e as u64 ^ self.value) & self.bitmask == 0)
                .unwrap_or(true)
    }

    /// Merge another observation into this one. The caller has checked
    /// consistency.
    pub fn aggregate(&mut self, other: &BitwiseParameter) {
        self.value |= other.value & other.bitmask;
        self.bitmask |= other.bitmask;
        if self.expected.is_none() {
            self.expected = other.expected;
        }
    }

    /// Complement the known bits.
    pub fn complement(&self) -> Self {
        BitwiseParameter {
            value: !self.value & self.bitmask,
            bitmask: self.bitmask,
            expected: None,
        }
    }

    /// Exclusive-or the known bits with a constant.
    pub fn xor(&self, constant: i64) -> Self {
        BitwiseParameter {
            value: (self.value ^ constant as u64) & self.bitmask,
            bitmask: self.bitmask,
            expected: None,
        }
    }
}

impl fmt::Display for BitwiseParameter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}&{:#x}", self.value, self.bitmask)
    }
}

/// Accumulates parameter observations during recognition. Conflicting
/// observations for the same name fail the whole attempt.
#[derive(Clone, Debug, Default)]
pub struct ParameterCollector {
    params: IndexMap<String, BitwiseParameter>,
}

impl ParameterCollector {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&mut self, name: &str, param: BitwiseParameter) -> Result<(), Error> {
        match self.params.get_mut(name) {
            Some(existing) => {
                if !existing.is_consistent(&param) {
                    return Err(Error::ParameterInconsistency(name.to_owned()));
                }
                existing.aggregate(&param);
            }
            None => {
                self.params.insert(name.to_owned(), param);
            }
        }
        Ok(())
    }

    /// Replace whatever is known, e.g. for an assignment.
    pub fn overwrite(&mut self, name: &str, value: i64) {
        self.params
            .insert(name.to_owned(), BitwiseParameter::full(value));
    }

    pub fn get(&self, name: &str) -> Option<&BitwiseParameter> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BitwiseParameter)> {
        self.params.iter().map(|(name, p)| (name.as_str(), p))
    }
}
