//! Solve a bit field's data expression for its single free name.
//!
//! Recognition observes the *value* of an expression like `255-D` or
//! `F^S` on the wire and must recover the name inside it. The solver
//! walks down the expression, undoing one operator per step, until a
//! bare identifier is left. Operators without a usable inverse stop the
//! walk: comparisons and booleans are a modelling error in the protocol,
//! a non-divisible product simply means the signal does not fit.

use crate::{
    ast::Expression,
    expression::{mask, untransform, Vartable},
    params::BitwiseParameter,
    Error,
};
use std::rc::Rc;

pub(crate) fn solve<'a>(
    expr: &'a Rc<Expression>,
    rhs: BitwiseParameter,
    vars: &Vartable<'a>,
) -> Result<(String, BitwiseParameter), Error> {
    let mut lhs = expr;
    let mut rhs = rhs;

    loop {
        match lhs.as_ref() {
            // A name that is itself a definition is chased further; the
            // free name may hide inside it, like S in `{X=255-S}`.
            Expression::Identifier(name) => match vars.definition(name) {
                Some(expr) if lhs.eval(vars).is_err() => lhs = expr,
                _ => return Ok((name.clone(), rhs)),
            },
            Expression::Complement(e) => {
                rhs = rhs.complement();
                lhs = e;
            }
            Expression::Negative(e) => {
                rhs = BitwiseParameter::full(rhs.value().wrapping_neg());
                lhs = e;
            }
            Expression::Add(l, r) => {
                if let Ok(v) = r.eval(vars) {
                    rhs = BitwiseParameter::full(rhs.value().wrapping_sub(v));
                    lhs = l;
                } else if let Ok(v) = l.eval(vars) {
                    rhs = BitwiseParameter::full(rhs.value().wrapping_sub(v));
                    lhs = r;
                } else {
                    return two_unknowns(lhs);
                }
            }
            Expression::Subtract(l, r) => {
                if let Ok(v) = r.eval(vars) {
                    rhs = BitwiseParameter::full(rhs.value().wrapping_add(v));
                    lhs = l;
                } else if let Ok(v) = l.eval(vars) {
                    rhs = BitwiseParameter::full(v.wrapping_sub(rhs.value()));
                    lhs = r;
                } else {
                    return two_unknowns(lhs);
                }
            }
            Expression::Multiply(l, r) => {
                let (operand, rest) = if let Ok(v) = r.eval(vars) {
                    (v, l)
                } else if let Ok(v) = l.eval(vars) {
                    (v, r)
                } else {
                    return two_unknowns(lhs);
                };
                if operand == 0 {
                    return Err(Error::Logic(format!("cannot solve {lhs}, factor is zero")));
                }
                if rhs.value() % operand != 0 {
                    return Err(Error::RecognitionFailure(format!(
                        "{} is not a multiple of {operand}",
                        rhs.value()
                    )));
                }
                rhs = BitwiseParameter::full(rhs.value() / operand);
                lhs = rest;
            }
            Expression::Divide(l, r) => {
                if let Ok(v) = r.eval(vars) {
                    rhs = BitwiseParameter::full(rhs.value().wrapping_mul(v));
                    lhs = l;
                } else if let Ok(v) = l.eval(vars) {
                    if rhs.value() == 0 {
                        return Err(Error::Logic(format!(
                            "cannot solve {lhs}, quotient is zero"
                        )));
                    }
                    rhs = BitwiseParameter::full(v.wrapping_div(rhs.value()));
                    lhs = r;
                } else {
                    return two_unknowns(lhs);
                }
            }
            Expression::BitwiseXor(l, r) => {
                if let Ok(v) = r.eval(vars) {
                    rhs = rhs.xor(v);
                    lhs = l;
                } else if let Ok(v) = l.eval(vars) {
                    rhs = rhs.xor(v);
                    lhs = r;
                } else {
                    return two_unknowns(lhs);
                }
            }
            Expression::BitField(bf) => {
                // Undo the field transform, then keep solving the data
                // expression. Only works once all output bits are known.
                let width = bf.eval_width(vars)?;
                let chop = bf.eval_chop(vars)?;
                if rhs.bitmask() & mask(width) != mask(width) {
                    return Err(Error::Logic(format!(
                        "cannot solve {lhs} from partial value"
                    )));
                }
                let (value, bitmask) = untransform(
                    rhs.value() as u64,
                    width,
                    chop,
                    bf.complement,
                    bf.reverse,
                );
                rhs = BitwiseParameter::new(value, bitmask);
                lhs = &bf.data;
            }
            _ => {
                return Err(Error::Logic(format!("no inverse for {lhs}")));
            }
        }
    }
}

fn two_unknowns(lhs: &Rc<Expression>) -> Result<(String, BitwiseParameter), Error> {
    Err(Error::Logic(format!(
        "cannot solve {lhs}, more than one unknown"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Irp;

    fn definition(irp: &str, name: &str) -> Rc<Expression> {
        let irp = Irp::parse(irp).unwrap();
        irp.definitions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e.clone())
            .unwrap()
    }

    #[test]
    fn checksum_style() {
        let expr = definition("{}<1|-1>(1){X=255-D}", "X");
        let vars = Vartable::new();

        let (name, value) = solve(&expr, BitwiseParameter::full(243), &vars).unwrap();
        assert_eq!(name, "D");
        assert_eq!(value.value(), 12);
    }

    #[test]
    fn nested_operators() {
        let expr = definition("{}<1|-1>(1){X=~(4*(D+3))}", "X");
        let vars = Vartable::new();

        // X = ~(4*(D+3)) observed as ~48 means D = 9
        let (name, value) = solve(&expr, BitwiseParameter::full(!48), &vars).unwrap();
        assert_eq!(name, "D");
        assert_eq!(value.value(), 9);
    }

    #[test]
    fn xor_with_known_operand() {
        let expr = definition("{}<1|-1>(1){X=D^S^37}", "X");
        let mut vars = Vartable::new();
        vars.set("S".into(), 0x5a);

        let (name, value) = solve(
            &expr,
            BitwiseParameter::new(0x12 ^ 0x5a ^ 37, 0xff),
            &vars,
        )
        .unwrap();
        assert_eq!(name, "D");
        assert_eq!(value.value(), 0x12);
        assert_eq!(value.bitmask(), 0xff);
    }

    #[test]
    fn not_divisible() {
        let expr = definition("{}<1|-1>(1){X=4*D}", "X");
        let vars = Vartable::new();

        assert_eq!(
            solve(&expr, BitwiseParameter::full(48), &vars)
                .unwrap()
                .1
                .value(),
            12
        );

        assert!(matches!(
            solve(&expr, BitwiseParameter::full(50), &vars),
            Err(Error::RecognitionFailure(_))
        ));
    }

    #[test]
    fn no_inverse() {
        let expr = definition("{}<1|-1>(1){X=D>5}", "X");
        let vars = Vartable::new();

        assert!(matches!(
            solve(&expr, BitwiseParameter::full(1), &vars),
            Err(Error::Logic(_))
        ));

        let expr = definition("{}<1|-1>(1){X=D+S}", "X");
        assert!(matches!(
            solve(&expr, BitwiseParameter::full(10), &vars),
            Err(Error::Logic(_))
        ));
    }
}
