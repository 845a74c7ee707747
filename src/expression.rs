//! Expression evaluation and the name environment.

use crate::{
    ast::{BitField, BitSpec, Duration, Expression, IrStream, RepeatMarker, StreamItem, Unit},
    Error,
};
use indexmap::IndexMap;
use itertools::Itertools;
use std::{fmt, rc::Rc};

/// Name environment. Bindings are either plain values or deferred
/// expressions (definitions), evaluated on first use. Iteration order is
/// insertion order, so printed environments are deterministic.
#[derive(Clone, Debug, Default)]
pub struct Vartable<'a> {
    vars: IndexMap<String, Binding<'a>>,
}

#[derive(Clone, Debug)]
enum Binding<'a> {
    Value(i64),
    Deferred(&'a Rc<Expression>),
}

impl<'a> Vartable<'a> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set(&mut self, name: String, value: i64) {
        self.vars.insert(name, Binding::Value(value));
    }

    /// Bind a name to an expression which is evaluated against this
    /// environment when the name is read.
    pub fn set_definition(&mut self, name: String, expr: &'a Rc<Expression>) {
        self.vars.insert(name, Binding::Deferred(expr));
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// The expression a name is deferred to, if it is a definition.
    pub(crate) fn definition(&self, name: &str) -> Option<&'a Rc<Expression>> {
        match self.vars.get(name) {
            Some(Binding::Deferred(expr)) => Some(expr),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Result<i64, Error> {
        match self.vars.get(name) {
            Some(Binding::Value(v)) => Ok(*v),
            Some(Binding::Deferred(expr)) => expr.eval(self),
            None => Err(Error::Unassigned(name.to_owned())),
        }
    }

    /// Plain values, in insertion order; deferred definitions are skipped.
    pub fn values(&self) -> impl Iterator<Item = (&str, i64)> {
        self.vars.iter().filter_map(|(name, b)| match b {
            Binding::Value(v) => Some((name.as_str(), *v)),
            Binding::Deferred(_) => None,
        })
    }
}

/// Bit mask of the given width, saturating at 64 bits.
pub(crate) fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Reverse the low `width` bits of `value`; higher bits are dropped.
pub(crate) fn bit_reverse(value: u64, width: u32) -> u64 {
    if width == 0 {
        0
    } else {
        value.reverse_bits() >> (64 - width)
    }
}

impl Expression {
    /// Evaluate against an environment. 64 bit two's complement
    /// arithmetic; division, modulo and `**` fail rather than wrap.
    pub fn eval(&self, vars: &Vartable) -> Result<i64, Error> {
        match self {
            Expression::Number(n) => Ok(*n),
            Expression::Identifier(name) => vars.get(name),
            Expression::BitField(bf) => bf.eval(vars),
            Expression::Complement(e) => Ok(!e.eval(vars)?),
            Expression::Not(e) => Ok((e.eval(vars)? == 0) as i64),
            Expression::Negative(e) => Ok(e.eval(vars)?.wrapping_neg()),
            Expression::BitCount(e) => Ok((e.eval(vars)? as u64).count_ones() as i64),
            Expression::Power(l, r) => {
                let base = l.eval(vars)?;
                let exp = r.eval(vars)?;
                if exp < 0 {
                    return Err(Error::Arithmetic(format!("negative exponent {exp}")));
                }
                let exp = u32::try_from(exp)
                    .map_err(|_| Error::Arithmetic(format!("exponent {exp} too large")))?;
                base.checked_pow(exp)
                    .ok_or_else(|| Error::Arithmetic(format!("{base}**{exp} overflows")))
            }
            Expression::Multiply(l, r) => Ok(l.eval(vars)?.wrapping_mul(r.eval(vars)?)),
            Expression::Divide(l, r) => {
                let divisor = r.eval(vars)?;
                if divisor == 0 {
                    return Err(Error::Arithmetic("division by zero".into()));
                }
                Ok(l.eval(vars)?.wrapping_div(divisor))
            }
            Expression::Modulo(l, r) => {
                let divisor = r.eval(vars)?;
                if divisor == 0 {
                    return Err(Error::Arithmetic("modulo by zero".into()));
                }
                Ok(l.eval(vars)?.wrapping_rem(divisor))
            }
            Expression::Add(l, r) => Ok(l.eval(vars)?.wrapping_add(r.eval(vars)?)),
            Expression::Subtract(l, r) => Ok(l.eval(vars)?.wrapping_sub(r.eval(vars)?)),
            Expression::ShiftLeft(l, r) => Ok(l.eval(vars)?.wrapping_shl(r.eval(vars)? as u32)),
            Expression::ShiftRight(l, r) => Ok(l.eval(vars)?.wrapping_shr(r.eval(vars)? as u32)),
            Expression::LessEqual(l, r) => Ok((l.eval(vars)? <= r.eval(vars)?) as i64),
            Expression::Less(l, r) => Ok((l.eval(vars)? < r.eval(vars)?) as i64),
            Expression::Greater(l, r) => Ok((l.eval(vars)? > r.eval(vars)?) as i64),
            Expression::GreaterEqual(l, r) => Ok((l.eval(vars)? >= r.eval(vars)?) as i64),
            Expression::Equal(l, r) => Ok((l.eval(vars)? == r.eval(vars)?) as i64),
            Expression::NotEqual(l, r) => Ok((l.eval(vars)? != r.eval(vars)?) as i64),
            Expression::BitwiseAnd(l, r) => Ok(l.eval(vars)? & r.eval(vars)?),
            Expression::BitwiseOr(l, r) => Ok(l.eval(vars)? | r.eval(vars)?),
            Expression::BitwiseXor(l, r) => Ok(l.eval(vars)? ^ r.eval(vars)?),
            Expression::And(l, r) => {
                if l.eval(vars)? == 0 {
                    Ok(0)
                } else {
                    Ok((r.eval(vars)? != 0) as i64)
                }
            }
            Expression::Or(l, r) => {
                if l.eval(vars)? != 0 {
                    Ok(1)
                } else {
                    Ok((r.eval(vars)? != 0) as i64)
                }
            }
            Expression::Ternary(cond, then, alt) => {
                if cond.eval(vars)? != 0 {
                    then.eval(vars)
                } else {
                    alt.eval(vars)
                }
            }
        }
    }

    /// Post-order visit of this expression and all subexpressions,
    /// including those inside bit fields.
    pub fn visit<F: FnMut(&Expression)>(&self, visit: &mut F) {
        match self {
            Expression::Number(..) | Expression::Identifier(..) => (),
            Expression::BitField(bf) => {
                bf.data.visit(visit);
                if let Some(width) = &bf.width {
                    width.visit(visit);
                }
                if let Some(chop) = &bf.chop {
                    chop.visit(visit);
                }
            }
            Expression::Complement(e)
            | Expression::Not(e)
            | Expression::Negative(e)
            | Expression::BitCount(e) => e.visit(visit),
            Expression::Power(l, r)
            | Expression::Multiply(l, r)
            | Expression::Divide(l, r)
            | Expression::Modulo(l, r)
            | Expression::Add(l, r)
            | Expression::Subtract(l, r)
            | Expression::ShiftLeft(l, r)
            | Expression::ShiftRight(l, r)
            | Expression::LessEqual(l, r)
            | Expression::Less(l, r)
            | Expression::Greater(l, r)
            | Expression::GreaterEqual(l, r)
            | Expression::Equal(l, r)
            | Expression::NotEqual(l, r)
            | Expression::BitwiseAnd(l, r)
            | Expression::BitwiseOr(l, r)
            | Expression::BitwiseXor(l, r)
            | Expression::And(l, r)
            | Expression::Or(l, r) => {
                l.visit(visit);
                r.visit(visit);
            }
            Expression::Ternary(cond, then, alt) => {
                cond.visit(visit);
                then.visit(visit);
                alt.visit(visit);
            }
        }
        visit(self);
    }

    /// All identifiers this expression reads, in first-use order.
    pub fn names(&self) -> Vec<String> {
        let mut res: Vec<String> = Vec::new();
        self.visit(&mut |e| {
            if let Expression::Identifier(name) = e {
                if !res.iter().any(|n| n == name) {
                    res.push(name.clone());
                }
            }
        });
        res
    }

    pub fn depends_on(&self, name: &str) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(e, Expression::Identifier(n) if n == name) {
                found = true;
            }
        });
        found
    }
}

impl BitField {
    pub fn eval_width(&self, vars: &Vartable) -> Result<u32, Error> {
        let width = self
            .width
            .as_ref()
            .ok_or_else(|| Error::Encode("infinite bit field has no width".into()))?
            .eval(vars)?;
        if !(0..=63).contains(&width) {
            return Err(Error::Encode(format!(
                "bit field width {width} not in 0..64"
            )));
        }
        Ok(width as u32)
    }

    pub fn eval_chop(&self, vars: &Vartable) -> Result<u32, Error> {
        match &self.chop {
            Some(chop) => {
                let chop = chop.eval(vars)?;
                if !(0..=63).contains(&chop) {
                    return Err(Error::Encode(format!(
                        "bit field chop {chop} not in 0..64"
                    )));
                }
                Ok(chop as u32)
            }
            None => Ok(0),
        }
    }

    /// The value this field puts on the wire, and its width in bits.
    pub fn to_value(&self, vars: &Vartable) -> Result<(i64, u32), Error> {
        let width = self.eval_width(vars)?;
        let chop = self.eval_chop(vars)?;
        let data = self.data.eval(vars)?;
        Ok((
            transform(data, width, chop, self.complement, self.reverse),
            width,
        ))
    }

    /// The value of this field used inside an expression. An infinite
    /// bit field is the data shifted right by the chop, unmasked.
    pub fn eval(&self, vars: &Vartable) -> Result<i64, Error> {
        if self.width.is_some() {
            return self.to_value(vars).map(|(value, _)| value);
        }

        let chop = self.eval_chop(vars)?;
        let data = self.data.eval(vars)? as u64;
        let value = if self.complement { !data } else { data };

        Ok(value.wrapping_shr(chop) as i64)
    }
}

/// Forward bit field transform: chop, complement, mask to width, then
/// reverse. [`untransform`] recovers the data bits it covered.
pub(crate) fn transform(data: i64, width: u32, chop: u32, complement: bool, reverse: bool) -> i64 {
    let mut x = (data as u64).wrapping_shr(chop);
    if complement {
        x = !x;
    }
    x &= mask(width);
    if reverse {
        x = bit_reverse(x, width);
    }
    x as i64
}

/// Undo [`transform`] on a received field value. Returns the recovered
/// data bits shifted back into position and the mask of known bits.
pub(crate) fn untransform(
    payload: u64,
    width: u32,
    chop: u32,
    complement: bool,
    reverse: bool,
) -> (u64, u64) {
    let mut y = payload & mask(width);
    if reverse {
        y = bit_reverse(y, width);
    }
    if complement {
        y = !y & mask(width);
    }
    (y << chop, mask(width) << chop)
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Unit::Units => Ok(()),
            Unit::Microseconds => write!(f, "u"),
            Unit::Milliseconds => write!(f, "m"),
            Unit::Pulses => write!(f, "p"),
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Duration::Constant(v, unit) => write!(f, "{v}{unit}"),
            Duration::Name(name, unit) => write!(f, "{name}{unit}"),
        }
    }
}

impl fmt::Display for BitField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.complement {
            write!(f, "~")?;
        }
        write!(f, "{}:", self.data)?;
        if self.reverse {
            write!(f, "-")?;
        }
        match &self.width {
            Some(width) => {
                write!(f, "{width}")?;
                if let Some(chop) = &self.chop {
                    write!(f, ":{chop}")?;
                }
            }
            None => {
                write!(f, ":")?;
                if let Some(chop) = &self.chop {
                    write!(f, "{chop}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for StreamItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StreamItem::Flash(d) => write!(f, "{d}"),
            StreamItem::Gap(d) => write!(f, "-{d}"),
            StreamItem::Extent(d) => write!(f, "^{d}"),
            StreamItem::Assignment(name, e) => write!(f, "{name}={e}"),
            StreamItem::BitField(bf) => write!(f, "{bf}"),
            StreamItem::Stream(stream) => write!(f, "{stream}"),
            StreamItem::Variation(variants) => {
                for variant in variants {
                    write!(f, "[{}]", variant.iter().join(","))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for BitSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<{}>",
            self.alternatives
                .iter()
                .map(|alt| alt.iter().join(","))
                .join("|")
        )
    }
}

impl fmt::Display for IrStream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(bit_spec) = &self.bit_spec {
            write!(f, "{bit_spec}")?;
        }
        write!(f, "({})", self.stream.iter().join(","))?;
        match &self.repeat {
            None => Ok(()),
            Some(RepeatMarker::Any) => write!(f, "*"),
            Some(RepeatMarker::OneOrMore) => write!(f, "+"),
            Some(RepeatMarker::Count(n)) => write!(f, "{n}"),
            Some(RepeatMarker::CountOrMore(n)) => write!(f, "{n}+"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Number(n) => write!(f, "{n}"),
            Expression::Identifier(name) => write!(f, "{name}"),
            Expression::BitField(bf) => write!(f, "{bf}"),
            Expression::Complement(e) => write!(f, "~{e}"),
            Expression::Not(e) => write!(f, "!{e}"),
            Expression::Negative(e) => write!(f, "-{e}"),
            Expression::BitCount(e) => write!(f, "#{e}"),
            Expression::Power(l, r) => write!(f, "({l} ** {r})"),
            Expression::Multiply(l, r) => write!(f, "({l} * {r})"),
            Expression::Divide(l, r) => write!(f, "({l} / {r})"),
            Expression::Modulo(l, r) => write!(f, "({l} % {r})"),
            Expression::Add(l, r) => write!(f, "({l} + {r})"),
            Expression::Subtract(l, r) => write!(f, "({l} - {r})"),
            Expression::ShiftLeft(l, r) => write!(f, "({l} << {r})"),
            Expression::ShiftRight(l, r) => write!(f, "({l} >> {r})"),
            Expression::LessEqual(l, r) => write!(f, "({l} <= {r})"),
            Expression::Less(l, r) => write!(f, "({l} < {r})"),
            Expression::Greater(l, r) => write!(f, "({l} > {r})"),
            Expression::GreaterEqual(l, r) => write!(f, "({l} >= {r})"),
            Expression::Equal(l, r) => write!(f, "({l} == {r})"),
            Expression::NotEqual(l, r) => write!(f, "({l} != {r})"),
            Expression::BitwiseAnd(l, r) => write!(f, "({l} & {r})"),
            Expression::BitwiseOr(l, r) => write!(f, "({l} | {r})"),
            Expression::BitwiseXor(l, r) => write!(f, "({l} ^ {r})"),
            Expression::And(l, r) => write!(f, "({l} && {r})"),
            Expression::Or(l, r) => write!(f, "({l} || {r})"),
            Expression::Ternary(cond, then, alt) => write!(f, "({cond} ? {then} : {alt})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment() {
        let mut vars = Vartable::new();
        vars.set("D".into(), 12);
        let def = Rc::new(Expression::Subtract(
            Rc::new(Expression::Number(255)),
            Rc::new(Expression::Identifier("D".into())),
        ));
        vars.set_definition("S".into(), &def);

        assert_eq!(vars.get("D"), Ok(12));
        assert_eq!(vars.get("S"), Ok(243));
        assert_eq!(vars.get("F"), Err(Error::Unassigned("F".into())));
    }

    #[test]
    fn arithmetic_failures() {
        let vars = Vartable::new();
        let div = Expression::Divide(
            Rc::new(Expression::Number(1)),
            Rc::new(Expression::Number(0)),
        );
        assert!(matches!(div.eval(&vars), Err(Error::Arithmetic(_))));

        let pow = Expression::Power(
            Rc::new(Expression::Number(2)),
            Rc::new(Expression::Number(-1)),
        );
        assert!(matches!(pow.eval(&vars), Err(Error::Arithmetic(_))));

        let big = Expression::Power(
            Rc::new(Expression::Number(2)),
            Rc::new(Expression::Number(64)),
        );
        assert!(matches!(big.eval(&vars), Err(Error::Arithmetic(_))));
    }

    #[test]
    fn transform_untransform_inverse() {
        for width in 1u32..=16 {
            for chop in 0u32..=4 {
                for &complement in &[false, true] {
                    for &reverse in &[false, true] {
                        for data in [0i64, 1, 0x5a, 0xa5, 0xffff, 0x12345] {
                            let sent = transform(data, width, chop, complement, reverse);
                            let (value, bitmask) =
                                untransform(sent as u64, width, chop, complement, reverse);
                            assert_eq!(
                                value,
                                (data as u64) & bitmask,
                                "width {width} chop {chop} complement {complement} reverse {reverse} data {data:#x}"
                            );
                            assert_eq!(bitmask, mask(width) << chop);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn bit_reversal() {
        assert_eq!(bit_reverse(0b1101, 4), 0b1011);
        assert_eq!(bit_reverse(0b1101, 6), 0b101100);
        assert_eq!(bit_reverse(1, 8), 0x80);
        assert_eq!(bit_reverse(0, 0), 0);
    }

    #[test]
    fn infinite_bit_field_value() {
        let mut vars = Vartable::new();
        vars.set("D".into(), 0xab);

        let shifted = BitField {
            data: Rc::new(Expression::Identifier("D".into())),
            width: None,
            chop: Some(Rc::new(Expression::Number(4))),
            complement: false,
            reverse: false,
        };

        assert_eq!(shifted.eval(&vars), Ok(0xa));

        let complemented = BitField {
            complement: true,
            ..shifted
        };

        assert_eq!(complemented.eval(&vars), Ok((!0xabu64 >> 4) as i64));
    }
}
