//! Parser for IRP notation.

use crate::{
    ast::{
        BitField, BitSpec, Duration, Expression, GeneralSpec, Irp, IrStream, ParameterSpec,
        RepeatMarker, StreamItem, Unit,
    },
    expression::Vartable,
    variants::split_variants,
    Error,
};
use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
    str::FromStr,
};

#[derive(PartialEq)]
enum GeneralItem<'a> {
    Msb,
    Lsb,
    Value(f64, Option<&'a str>),
}

peg::parser! {
    grammar irp_parser() for str {
        pub(super) rule irp() -> (Vec<GeneralItem<'input>>, StreamItem, Vec<(String, Rc<Expression>)>, Vec<ParameterSpec>)
         = gs:general_spec() stream:bitspec_irstream() def:definitions()* specs:parameter_specs()? _
        {
            let defs: Vec<(String, Rc<Expression>)> = def.into_iter().flatten().collect();
            let specs = specs.unwrap_or_default();

            (gs, stream, defs, specs)
        }

        rule general_spec() -> Vec<GeneralItem<'input>>
         = _ "{" _ items:(general_item() ** ",") "}" _ { items }

        rule general_item() -> GeneralItem<'input>
         = _ "msb" _ { GeneralItem::Msb }
         / _ "lsb" _ { GeneralItem::Lsb }
         / _ v:number_decimals() _ u:$("u" / "p" / "k" / "%")? _ { GeneralItem::Value(v, u) }

        rule number_decimals() -> f64
         = n:$(['0'..='9']* "." ['0'..='9']+)
         {? f64::from_str(n).map_err(|_| "f64") }
         / n:$(['0'..='9']+)
         {? f64::from_str(n).map_err(|_| "f64") }

        rule definitions() -> Vec<(String, Rc<Expression>)>
         = "{" _ def:(definition() ** ("," _)) "}" _ { def }

        rule definition() -> (String, Rc<Expression>)
         = i:identifier() _ "=" _ e:expression() _ { (i.to_owned(), Rc::new(e)) }

        #[cache_left_rec]
        rule expression() -> Expression
         = cond:expression() "?" _ left:expression2() ":" _ right:expression2()
           { Expression::Ternary(Rc::new(cond), Rc::new(left), Rc::new(right)) }
         / expression2()

        #[cache_left_rec]
        rule expression2() -> Expression
         = left:expression2() "||" _ right:expression3()
           { Expression::Or(Rc::new(left), Rc::new(right)) }
         / expression3()

        #[cache_left_rec]
        rule expression3() -> Expression
         = left:expression3() "&&" _ right:expression4()
           { Expression::And(Rc::new(left), Rc::new(right)) }
         / expression4()

        #[cache_left_rec]
        rule expression4() -> Expression
         = left:expression4() "|" _ right:expression5()
           { Expression::BitwiseOr(Rc::new(left), Rc::new(right)) }
         / expression5()

        #[cache_left_rec]
        rule expression5() -> Expression
         = left:expression5() "&" _ right:expression6()
         { Expression::BitwiseAnd(Rc::new(left), Rc::new(right)) }
         / expression6()

        #[cache_left_rec]
        rule expression6() -> Expression
        = left:expression6() "^" _ right:expression7()
        { Expression::BitwiseXor(Rc::new(left), Rc::new(right)) }
        / expression7()

        #[cache_left_rec]
        rule expression7() -> Expression
         = left:expression7() "!=" _ right:expression8()
         { Expression::NotEqual(Rc::new(left), Rc::new(right)) }
         / left:expression7() "==" _ right:expression8()
         { Expression::Equal(Rc::new(left), Rc::new(right)) }
         / expression8()

        #[cache_left_rec]
        rule expression8() -> Expression
         = left:expression8() "<=" _ right:expression9()
         { Expression::LessEqual(Rc::new(left), Rc::new(right)) }
         / left:expression8() ">=" _ right:expression9()
         { Expression::GreaterEqual(Rc::new(left), Rc::new(right)) }
         / left:expression8() "<" _ right:expression9()
         { Expression::Less(Rc::new(left), Rc::new(right)) }
         / left:expression8() ">" _ right:expression9()
         { Expression::Greater(Rc::new(left), Rc::new(right)) }
         / expression9()

        #[cache_left_rec]
        rule expression9() -> Expression
         = left:expression9() "<<" _ right:expression10()
         { Expression::ShiftLeft(Rc::new(left), Rc::new(right)) }
         / left:expression9() ">>" _ right:expression10()
         { Expression::ShiftRight(Rc::new(left), Rc::new(right)) }
         / expression10()

        #[cache_left_rec]
        rule expression10() -> Expression
         = left:expression10() "+" _ right:expression11()
         { Expression::Add(Rc::new(left), Rc::new(right)) }
         / left:expression10() "-" _ right:expression11()
         { Expression::Subtract(Rc::new(left), Rc::new(right)) }
         / expression11()

        #[cache_left_rec]
        rule expression11() -> Expression
        = left:expression11() "*" _ right:expression12()
         { Expression::Multiply(Rc::new(left), Rc::new(right)) }
         / left:expression11() "/" _ right:expression12()
         { Expression::Divide(Rc::new(left), Rc::new(right)) }
         / left:expression11() "%" _ right:expression12()
         { Expression::Modulo(Rc::new(left), Rc::new(right)) }
         / expression12()

        #[cache_left_rec]
        rule expression12() -> Expression
         = left:expression13() "**" _ right:expression12()
         { Expression::Power(Rc::new(left), Rc::new(right)) }
         / expression13()

        #[cache_left_rec]
        rule expression13() -> Expression
         = "#" _ expr:expression14()
         { Expression::BitCount(Rc::new(expr)) }
         / expression14()

        #[cache_left_rec]
        rule expression14() -> Expression
         = "!" _ expr:expression15()
         { Expression::Not(Rc::new(expr)) }
         / expression15()

        #[cache_left_rec]
        rule expression15() -> Expression
         = "-" _ expr:expression16()
         { Expression::Negative(Rc::new(expr)) }
         / expression16()

        #[cache_left_rec]
        rule expression16() -> Expression
         = bf:complement_bit_field() { Expression::BitField(bf) }
         / "~" _ expr:expression17()
         { Expression::Complement(Rc::new(expr)) }
         / expression17()

        #[cache_left_rec]
        rule expression17() -> Expression
         = bf:bit_field() { Expression::BitField(bf) }
         / primary_item()

        rule bit_field() -> BitField
         = complement:"~"? _ data:primary_item() ":" _ reverse:"-"? width:primary_item() chop:chop()?
         {
            BitField {
                data: Rc::new(data),
                width: Some(Rc::new(width)),
                chop: chop.map(Rc::new),
                complement: complement.is_some(),
                reverse: reverse.is_some(),
            }
         }
         / complement:"~"? _ data:primary_item() "::" _ chop:primary_item()
         {
            BitField {
                data: Rc::new(data),
                width: None,
                chop: Some(Rc::new(chop)),
                complement: complement.is_some(),
                reverse: false,
            }
         }

        // Lets `~D:4` bind as a bit field of D rather than a bit field
        // of ~D, which is what IrpTransmogrifier does too.
        rule complement_bit_field() -> BitField
         = "~" _ data:primary_item() ":" _ reverse:"-"? width:primary_item() chop:chop()?
         {
            BitField {
                data: Rc::new(data),
                width: Some(Rc::new(width)),
                chop: chop.map(Rc::new),
                complement: true,
                reverse: reverse.is_some(),
            }
         }
         / "~" _ data:primary_item() "::" _ chop:primary_item()
         {
            BitField {
                data: Rc::new(data),
                width: None,
                chop: Some(Rc::new(chop)),
                complement: true,
                reverse: false,
            }
         }

        rule chop() -> Expression
         = ":" _ chop:primary_item() { chop }

        rule primary_item() -> Expression
         = number()
         / i:identifier() _ { Expression::Identifier(i.to_owned()) }
         / "(" _ e:expression() ")" _ { e }

        rule identifier() -> &'input str
         = quiet!{$(['_' | 'a'..='z' | 'A'..='Z']['_' | 'a'..='z' | 'A'..='Z' | '0'..='9']*)}
         / expected!("identifier")

        rule bare_number() -> i64
         = "0x" n:$(['0'..='9' | 'a'..='f' | 'A'..='F']+) _
         {? i64::from_str_radix(n, 16).map_err(|_| "i64") }
         / "0b" n:$(['0'..='1']+) _
         {? i64::from_str_radix(n, 2).map_err(|_| "i64") }
         / n:$("0" ['0'..='7']*) _
         {? i64::from_str_radix(n, 8).map_err(|_| "i64") }
         / n:$(['1'..='9'] ['0'..='9']*) _
         {? n.parse().map_err(|_| "i64") }
         / "UINT8_MAX" _ { u8::MAX as i64 }
         / "UINT16_MAX" _ { u16::MAX as i64 }
         / "UINT32_MAX" _ { u32::MAX as i64 }
         / "UINT64_MAX" _ { u64::MAX as i64 }

        rule number() -> Expression
         = n:bare_number() !(_ ['u'|'m'|'p']) { Expression::Number(n) }

        rule duration() -> StreamItem
         = id:identifier() _ unit:unit() { StreamItem::Flash(Duration::Name(id.to_owned(), unit)) }
         / "-" id:identifier() _ unit:unit() { StreamItem::Gap(Duration::Name(id.to_owned(), unit)) }
         / "^" id:identifier() _ unit:unit() { StreamItem::Extent(Duration::Name(id.to_owned(), unit)) }
         / number:number_decimals() _ unit:unit() { StreamItem::Flash(Duration::Constant(number, unit)) }
         / "-" number:number_decimals() _ unit:unit() { StreamItem::Gap(Duration::Constant(number, unit)) }
         / "^" number:number_decimals() _ unit:unit() { StreamItem::Extent(Duration::Constant(number, unit)) }

        rule unit() -> Unit
         = "m" _ { Unit::Milliseconds }
         / "u" _ { Unit::Microseconds }
         / "p" _ { Unit::Pulses }
         / _ { Unit::Units }

        rule bare_irstream() -> Vec<Rc<StreamItem>>
         = items:(irstream_item() ** ("," _)) { items }

        rule irstream() -> StreamItem
         = "(" _ stream:bare_irstream() ")" _ repeat:repeat_marker()?
         {
            StreamItem::Stream(IrStream {
                bit_spec: None,
                stream,
                repeat,
            })
         }

        rule repeat_marker() -> RepeatMarker
         = "*" _ { RepeatMarker::Any }
         / "+" _ { RepeatMarker::OneOrMore }
         / n:$(['0'..='9']+) _ more:"+"? _
         {?
            match n.parse() {
                Ok(n) if more.is_some() => Ok(RepeatMarker::CountOrMore(n)),
                Ok(n) => Ok(RepeatMarker::Count(n)),
                Err(_) => Err("i64")
            }
         }

        rule irstream_item() -> Rc<StreamItem>
         = item:(variation()
         / bf:bit_field() { StreamItem::BitField(bf) }
         / assignment()
         / duration()
         / irstream()
         / bitspec_irstream()) { Rc::new(item) }

        rule assignment() -> StreamItem
         = i:identifier() _ "=" _ e:expression() _ { StreamItem::Assignment(i.to_owned(), Rc::new(e)) }

        rule bare_bitspec() -> Vec<Rc<StreamItem>>
         = bitspec:(irstream_item() ** ("," _)) { bitspec }

        rule bitspec() -> BitSpec
         // !"||" keeps `<1|-1>` style alternatives apart from a `||` operator
         = "<" _ alternatives:(bare_bitspec() ++ (!"||" "|" _)) ">" _ { BitSpec { alternatives } }

        rule bitspec_irstream() -> StreamItem
         = bit_spec:bitspec() irstream:irstream() {
            if let StreamItem::Stream(mut stream) = irstream {
                stream.bit_spec = Some(bit_spec);

                StreamItem::Stream(stream)
            } else {
                unreachable!()
            }
         }

        rule variation() -> StreamItem
         = a1:alternative() a2:alternative() a3:alternative()?
         {
            let mut list = vec![a1, a2];

            if let Some(e) = a3 {
                list.push(e);
            }

            StreamItem::Variation(list)
         }

        rule alternative() -> Vec<Rc<StreamItem>>
         = "[" _ bare:bare_irstream() "]" _ { bare }

        rule parameter_specs() -> Vec<ParameterSpec>
         = "[" _ specs:(parameter_spec() ** ("," _)) "]" _ { specs }

        rule parameter_spec() -> ParameterSpec
         = id:identifier() _ memory:"@"? _ ":" _ min:bare_number() _ ".." _ max:bare_number() _ default:initializer()?
         {
            ParameterSpec {
                name: id.to_owned(),
                memory: memory.is_some(),
                min,
                max,
                default: default.map(Rc::new),
            }
        }

        rule initializer() -> Expression
         = "=" _ expr:expression() { expr }

        rule _ = quiet!{(commentline() / commentblock() / [' ' | '\n' | '\r' | '\t'])*}

        rule commentline() = "//" [^'\n']*
        rule commentblock() = "/*" ([_] !"*/")* [_] "*/"
    }
}

impl Irp {
    /// Parse and validate an IRP. The result can be used for rendering
    /// or recognizing.
    pub fn parse(input: &str) -> Result<Irp, Error> {
        match irp_parser::irp(input) {
            Ok((general, stream, definitions, parameters)) => {
                let general_spec = general_spec(&general)?;

                check_parameters(&parameters)?;
                check_definitions(&definitions, &parameters)?;
                check_stream(&stream, false)?;
                check_repeats(&stream)?;

                let stream = Rc::new(stream);
                let variants = split_variants(&stream)?;

                let memory = parameters
                    .iter()
                    .filter(|spec| spec.memory)
                    .filter_map(|spec| {
                        let default = spec.default.as_ref()?;
                        let value = default.eval(&Vartable::new()).ok()?;
                        Some((spec.name.clone(), value))
                    })
                    .collect();

                Ok(Irp {
                    general_spec,
                    stream,
                    definitions,
                    parameters,
                    variants,
                    memory,
                })
            }
            Err(pos) => Err(Error::Parse(format!("parse error at {pos}"))),
        }
    }
}

fn general_spec(items: &[GeneralItem]) -> Result<GeneralSpec, Error> {
    let mut res = GeneralSpec::default();

    let mut unit = None;
    let mut lsb = None;
    let mut carrier = None;

    for item in items {
        match item {
            GeneralItem::Lsb | GeneralItem::Msb => {
                if lsb.is_some() {
                    return Err(Error::Parse("bit order (lsb,msb) specified twice".into()));
                }

                lsb = Some(*item == GeneralItem::Lsb);
            }
            GeneralItem::Value(v, u) => {
                let v = *v;

                let u = match u {
                    Some("%") => {
                        if !(1.0..=99.0).contains(&v) {
                            return Err(Error::Parse(format!("duty cycle {v}% out of range")));
                        }
                        if res.duty_cycle.is_some() {
                            return Err(Error::Parse("duty cycle specified twice".into()));
                        }

                        res.duty_cycle = Some(v as u8);

                        continue;
                    }
                    Some("k") => {
                        if carrier.is_some() {
                            return Err(Error::Parse("carrier frequency specified twice".into()));
                        }

                        carrier = Some((v * 1000.0) as i64);

                        continue;
                    }
                    Some("p") => Unit::Pulses,
                    Some("u") => Unit::Units,
                    None => Unit::Units,
                    _ => unreachable!(),
                };

                unit = Some((v, u));
            }
        }
    }

    if let Some(carrier) = carrier {
        res.carrier = Some(carrier);
    }

    if let Some((p, u)) = unit {
        res.unit = match u {
            Unit::Pulses => match res.carrier {
                Some(carrier) if carrier > 0 => p * 1_000_000.0 / carrier as f64,
                _ => {
                    return Err(Error::Parse(
                        "pulse unit requires a carrier frequency".into(),
                    ))
                }
            },
            Unit::Milliseconds => p * 1000.0,
            Unit::Units | Unit::Microseconds => p,
        }
    }

    if Some(false) == lsb {
        res.lsb = false;
    }

    Ok(res)
}

fn check_parameters(parameters: &[ParameterSpec]) -> Result<(), Error> {
    let mut seen_names: Vec<&str> = Vec::new();
    let mut vars = Vartable::new();

    for parameter in parameters {
        if seen_names.contains(&parameter.name.as_str()) {
            return Err(Error::Parse(format!(
                "duplicate parameter called {}",
                parameter.name
            )));
        }
        seen_names.push(&parameter.name);

        let min = parameter.min;
        let max = parameter.max;

        if min < 0 || max < 0 || min > max {
            return Err(Error::Parse(format!(
                "invalid minimum {min} and maximum {max}"
            )));
        }

        if parameter.memory && parameter.default.is_none() {
            return Err(Error::Parse(format!(
                "memory parameter {} requires default value",
                parameter.name,
            )));
        }

        vars.set(parameter.name.to_owned(), min);
    }

    for parameter in parameters {
        if let Some(default) = &parameter.default {
            default.eval(&vars)?;
        }
    }

    Ok(())
}

fn check_definitions(
    definitions: &[(String, Rc<Expression>)],
    parameters: &[ParameterSpec],
) -> Result<(), Error> {
    let mut seen_names: Vec<&str> = Vec::new();
    let mut deps: HashMap<&str, Vec<String>> = HashMap::new();

    for (name, expr) in definitions {
        if seen_names.contains(&name.as_str()) {
            return Err(Error::Parse(format!("duplicate definition called {name}")));
        }
        seen_names.push(name);

        let dependents = expr.names();

        if dependents.iter().any(|dep| dep == name) {
            return Err(Error::Parse(format!(
                "definition {name}={expr} depends on its own value"
            )));
        }

        if parameters.iter().any(|parameter| &parameter.name == name) {
            return Err(Error::Parse(format!(
                "definition {name} overrides parameter with same name"
            )));
        }

        deps.insert(name, dependents);
    }

    for name in deps.keys() {
        fn check_dep<'a>(
            def_name: &str,
            dep_name: &'a str,
            deps: &'a HashMap<&str, Vec<String>>,
            visited: &mut HashSet<&'a str>,
        ) -> Result<(), Error> {
            if let Some(dep) = deps.get(dep_name) {
                for name in dep {
                    if visited.contains(name.as_str()) {
                        return Err(Error::Parse(format!(
                            "definition for {def_name} is circular via {dep_name}"
                        )));
                    }
                    let mut visited = visited.clone();
                    visited.insert(dep_name);
                    check_dep(def_name, name, deps, &mut visited)?;
                }
            }
            Ok(())
        }

        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(name);
        check_dep(name, name, &deps, &mut visited)?;
    }

    Ok(())
}

fn check_stream(item: &StreamItem, in_bit_spec: bool) -> Result<(), Error> {
    match item {
        StreamItem::Flash(..) | StreamItem::Gap(..) | StreamItem::Assignment(..) => (),
        StreamItem::Extent(..) => {
            if in_bit_spec {
                return Err(Error::Parse(format!("{item} not expected in bit spec")));
            }
        }
        StreamItem::BitField(bf) => {
            if let Some(width) = &bf.width {
                if let Ok(width) = width.eval(&Vartable::new()) {
                    if !(0..64).contains(&width) {
                        return Err(Error::Parse(format!(
                            "bitfield of width {width} not supported"
                        )));
                    }
                }
            }
        }
        StreamItem::Variation(list) => {
            if in_bit_spec {
                return Err(Error::Parse("variation not expected in bit spec".into()));
            }
            for variant in list {
                for item in variant {
                    match item.as_ref() {
                        StreamItem::Stream(..) | StreamItem::Variation(..) => {
                            return Err(Error::Parse(format!(
                                "{item} not expected in variation"
                            )));
                        }
                        _ => check_stream(item, in_bit_spec)?,
                    }
                }
            }
        }
        StreamItem::Stream(stream) => {
            match &stream.repeat {
                Some(RepeatMarker::Count(count)) | Some(RepeatMarker::CountOrMore(count))
                    if *count > 64 =>
                {
                    return Err(Error::Parse(format!("repeat count of {count} too large")));
                }
                _ => (),
            }

            for item in &stream.stream {
                check_stream(item, in_bit_spec)?;
            }

            if let Some(bit_spec) = &stream.bit_spec {
                if bit_spec.len() > 16 {
                    return Err(Error::Parse(format!(
                        "bitspec contains {} alternatives, no more than 16 supported",
                        bit_spec.len()
                    )));
                }

                for alternative in &bit_spec.alternatives {
                    for item in alternative {
                        check_stream(item, true)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// No more than one infinite repeat marker per protocol, and none at all
/// inside bit specs.
fn check_repeats(item: &StreamItem) -> Result<(), Error> {
    fn count(item: &StreamItem, in_bit_spec: bool) -> Result<u32, Error> {
        match item {
            StreamItem::Stream(stream) => {
                let mut total = match &stream.repeat {
                    Some(marker) if marker.is_infinite() => {
                        if in_bit_spec {
                            return Err(Error::UnsupportedRepeat(
                                "infinite repeat in bit spec".into(),
                            ));
                        }
                        1
                    }
                    _ => 0,
                };
                for item in &stream.stream {
                    total += count(item, in_bit_spec)?;
                }
                if let Some(bit_spec) = &stream.bit_spec {
                    for alternative in &bit_spec.alternatives {
                        for item in alternative {
                            total += count(item, true)?;
                        }
                    }
                }
                Ok(total)
            }
            StreamItem::Variation(list) => {
                let mut total = 0;
                for variant in list {
                    for item in variant {
                        total += count(item, in_bit_spec)?;
                    }
                }
                Ok(total)
            }
            _ => Ok(0),
        }
    }

    if count(item, false)? > 1 {
        return Err(Error::UnsupportedRepeat(
            "more than one infinite repeat".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{ast::Irp, Error};

    #[test]
    fn precedence() {
        let irp = Irp::parse("{}<1|-1>(1){A=B<<C+D*E}").unwrap();

        let (name, expr) = &irp.definitions[0];
        assert_eq!(format!("{name}={expr}"), "A=(B << (C + (D * E)))");

        let irp = Irp::parse("{}<1|-1>(1){A=F**G**H+128*~T>=8}").unwrap();

        let (name, expr) = &irp.definitions[0];
        assert_eq!(
            format!("{name}={expr}"),
            "A=(((F ** (G ** H)) + (128 * ~T)) >= 8)"
        );

        let irp = Irp::parse("{}<1|-1>(1){A=F||G&&H|I&J^K}").unwrap();

        let (name, expr) = &irp.definitions[0];
        assert_eq!(
            format!("{name}={expr}"),
            "A=(F || (G && (H | (I & (J ^ K)))))"
        );

        let irp = Irp::parse("{}<1|-1>(1){A=F>G*10&&H*20<J}").unwrap();

        let (name, expr) = &irp.definitions[0];
        assert_eq!(
            format!("{name}={expr}"),
            "A=((F > (G * 10)) && ((H * 20) < J))"
        );

        let irp = Irp::parse("{}<1|-1>(1){A=E*F+G<<2}").unwrap();

        let (name, expr) = &irp.definitions[0];
        assert_eq!(format!("{name}={expr}"), "A=(((E * F) + G) << 2)");

        let irp = Irp::parse("{}<1|-1>(1){A=E<<F+G*2}").unwrap();

        let (name, expr) = &irp.definitions[0];
        assert_eq!(format!("{name}={expr}"), "A=(E << (F + (G * 2)))");
    }

    #[test]
    fn bit_fields() {
        let irp = Irp::parse("{38.4k,564}<1,-1|1,-3>(16,-8,D:8,~F:8,S:4:2,X:-6,1,-78)").unwrap();

        let stream = format!("{}", irp.stream);
        assert_eq!(
            stream,
            "<1,-1|1,-3>(16,-8,D:8,~F:8,S:4:2,X:-6,1,-78)"
        );
    }

    #[test]
    fn rejects_bad_protocols() {
        assert_eq!(
            Irp::parse("{}<1|-1>(D:8)[D:0..255,D:0..3]"),
            Err(Error::Parse("duplicate parameter called D".into()))
        );

        assert_eq!(
            Irp::parse("{}<1|-1>(T:1)[T@:0..1]"),
            Err(Error::Parse(
                "memory parameter T requires default value".into()
            ))
        );

        assert_eq!(
            Irp::parse("{}<1|-1>(D:8){C=C+1}"),
            Err(Error::Parse(
                "definition C=(C + 1) depends on its own value".into()
            ))
        );

        assert!(matches!(
            Irp::parse("{}<1|-1>((D:8)*,(F:8)*)"),
            Err(Error::UnsupportedRepeat(_))
        ));

        assert!(Irp::parse("{}<1|-1>(D:64)").is_err());
    }

    #[test]
    fn general_spec_items() {
        let irp = Irp::parse("{38.4k,564,lsb,33%}<1,-1|1,-3>(D:8,1,-78)").unwrap();
        assert_eq!(irp.general_spec.carrier, Some(38400));
        assert_eq!(irp.general_spec.unit, 564.0);
        assert_eq!(irp.general_spec.duty_cycle, Some(33));
        assert!(irp.general_spec.lsb);

        let irp = Irp::parse("{40k,520,msb}<1,-10|1,-1,1,-8>(D:8,1,-78)").unwrap();
        assert!(!irp.general_spec.lsb);

        // 0.5 ms expressed in carrier pulses
        let irp = Irp::parse("{40k,20p}<1,-1|1,-3>(D:8,1,-78)").unwrap();
        assert_eq!(irp.general_spec.unit, 500.0);
    }
}
