//! Data model for parsed IRP protocols.
//!
//! The model separates arithmetic expressions ([`Expression`]) from the
//! items that make up a stream ([`StreamItem`]). Bit fields live in both
//! worlds: as a stream item they emit bits, inside an expression they are
//! just a value.

use std::{collections::HashMap, rc::Rc};

/// The general spec of a protocol, e.g. `{38.4k,564,lsb}`.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneralSpec {
    pub duty_cycle: Option<u8>,
    /// Carrier in Hz. `None` means unknown; 0 means unmodulated.
    pub carrier: Option<i64>,
    pub lsb: bool,
    /// Duration of one unit in microseconds.
    pub unit: f64,
}

impl Default for GeneralSpec {
    fn default() -> Self {
        GeneralSpec {
            duty_cycle: None,
            carrier: Some(38000),
            lsb: true,
            unit: 1.0,
        }
    }
}

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Unit {
    Units,
    Microseconds,
    Milliseconds,
    Pulses,
}

/// Repeat marker on a stream: `*`, `+`, `3` or `3+`.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum RepeatMarker {
    Any,
    OneOrMore,
    Count(i64),
    CountOrMore(i64),
}

impl RepeatMarker {
    /// Minimum number of iterations this marker demands.
    pub fn min(&self) -> i64 {
        match self {
            RepeatMarker::Any => 0,
            RepeatMarker::OneOrMore => 1,
            RepeatMarker::Count(n) | RepeatMarker::CountOrMore(n) => *n,
        }
    }

    /// True for markers without an upper bound.
    pub fn is_infinite(&self) -> bool {
        !matches!(self, RepeatMarker::Count(_))
    }
}

/// A bit field `data:width:chop`, with optional complement (`~`) and
/// reverse (`-width`). `width == None` is the infinite form `data::chop`.
#[derive(Clone, Debug, PartialEq)]
pub struct BitField {
    pub data: Rc<Expression>,
    pub width: Option<Rc<Expression>>,
    pub chop: Option<Rc<Expression>>,
    pub complement: bool,
    pub reverse: bool,
}

/// A bit spec `<alt0|alt1|...>`: one bare stream per alternative.
#[derive(Clone, Debug, PartialEq)]
pub struct BitSpec {
    pub alternatives: Vec<Vec<Rc<StreamItem>>>,
}

impl BitSpec {
    pub fn len(&self) -> usize {
        self.alternatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// Number of payload bits encoded by one alternative, `ceil(log2(len))`;
    /// 0 for a degenerate spec of at most one alternative.
    pub fn chunk_size(&self) -> u32 {
        match self.alternatives.len() {
            0 | 1 => 0,
            n => (n - 1).ilog2() + 1,
        }
    }
}

/// A parenthesized stream with an optional governing bit spec and repeat
/// marker, e.g. `<1,-1|1,-3>(16,-8,D:8,1,-78)*`.
#[derive(Clone, Debug, PartialEq)]
pub struct IrStream {
    pub bit_spec: Option<BitSpec>,
    pub stream: Vec<Rc<StreamItem>>,
    pub repeat: Option<RepeatMarker>,
}

/// One item of a stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamItem {
    Flash(Duration),
    Gap(Duration),
    Extent(Duration),
    Assignment(String, Rc<Expression>),
    BitField(BitField),
    Stream(IrStream),
    /// `[intro][repeat][ending]` alternatives; resolved by variant
    /// splitting before render or recognize ever see the tree.
    Variation(Vec<Vec<Rc<StreamItem>>>),
}

/// A duration denotation; the sign (flash/gap/extent) lives in the
/// surrounding [`StreamItem`].
#[derive(Clone, Debug, PartialEq)]
pub enum Duration {
    Constant(f64, Unit),
    Name(String, Unit),
}

/// An arithmetic expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Number(i64),
    Identifier(String),
    BitField(BitField),

    Complement(Rc<Expression>),
    Not(Rc<Expression>),
    Negative(Rc<Expression>),
    BitCount(Rc<Expression>),

    Power(Rc<Expression>, Rc<Expression>),
    Multiply(Rc<Expression>, Rc<Expression>),
    Divide(Rc<Expression>, Rc<Expression>),
    Modulo(Rc<Expression>, Rc<Expression>),
    Add(Rc<Expression>, Rc<Expression>),
    Subtract(Rc<Expression>, Rc<Expression>),

    ShiftLeft(Rc<Expression>, Rc<Expression>),
    ShiftRight(Rc<Expression>, Rc<Expression>),

    LessEqual(Rc<Expression>, Rc<Expression>),
    Less(Rc<Expression>, Rc<Expression>),
    Greater(Rc<Expression>, Rc<Expression>),
    GreaterEqual(Rc<Expression>, Rc<Expression>),
    Equal(Rc<Expression>, Rc<Expression>),
    NotEqual(Rc<Expression>, Rc<Expression>),

    BitwiseAnd(Rc<Expression>, Rc<Expression>),
    BitwiseOr(Rc<Expression>, Rc<Expression>),
    BitwiseXor(Rc<Expression>, Rc<Expression>),
    And(Rc<Expression>, Rc<Expression>),
    Or(Rc<Expression>, Rc<Expression>),
    Ternary(Rc<Expression>, Rc<Expression>, Rc<Expression>),
}

/// A parameter spec entry, e.g. `D:0..255` or `T@:0..1=0`.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub memory: bool,
    pub min: i64,
    pub max: i64,
    pub default: Option<Rc<Expression>>,
}

/// The intro/repeat/ending pass trees of a protocol. All repeat markers
/// surviving in these trees are finite counts; the infinite marker is
/// consumed by the split itself.
#[derive(Clone, Debug, PartialEq)]
pub struct Variants {
    pub intro: Option<Rc<StreamItem>>,
    pub repeat: Option<Rc<StreamItem>>,
    pub ending: Option<Rc<StreamItem>>,
}

/// A parsed IRP protocol. Render and recognize take `&mut self` since
/// both may update the values of memory parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Irp {
    pub general_spec: GeneralSpec,
    pub stream: Rc<StreamItem>,
    pub definitions: Vec<(String, Rc<Expression>)>,
    pub parameters: Vec<ParameterSpec>,
    pub(crate) variants: Variants,
    pub(crate) memory: HashMap<String, i64>,
}
