//! Render a protocol to raw IR durations.
//!
//! Rendering walks the intro, repeat and ending pass trees produced by
//! variant splitting. Bit fields do not become durations immediately;
//! their bits collect in the bitstream of the enclosing bit spec scope
//! and are flushed through the bit spec's alternatives when a duration,
//! assignment or end of stream forces them out.

use crate::{
    ast::{BitSpec, Duration, GeneralSpec, Irp, IrStream, RepeatMarker, StreamItem, Unit},
    expression::{bit_reverse, Vartable},
    message::{Message, Signal},
    Error,
};
use bitvec::prelude::*;

impl Irp {
    /// Render the protocol to a single message: the intro, `repeats`
    /// copies of the repeat, and the ending, all concatenated.
    pub fn encode(&mut self, vars: Vartable, repeats: u64) -> Result<Message, Error> {
        let signal = self.encode_signal(vars)?;

        Ok(signal.to_message(repeats as usize))
    }

    /// Render the protocol to its intro, repeat and ending parts. Memory
    /// parameters are read from and written back to this instance, so
    /// encoding twice with the same parameters may produce different
    /// signals (that is what a toggle bit is for).
    pub fn encode_signal(&mut self, vars: Vartable) -> Result<Signal, Error> {
        let (signal, memory) = self.render(vars)?;

        for (name, value) in memory {
            self.memory.insert(name, value);
        }

        Ok(signal)
    }

    fn render<'a>(
        &'a self,
        mut vars: Vartable<'a>,
    ) -> Result<(Signal, Vec<(String, i64)>), Error> {
        self.check_parameters(&mut vars)?;

        let mut encoder = Encoder::new(&self.general_spec, vars);

        let mut intro = Vec::new();
        let mut repeat = Vec::new();
        let mut ending = Vec::new();

        if let Some(pass) = &self.variants.intro {
            encoder.pass(pass)?;
            intro = std::mem::take(&mut encoder.raw);
        }

        if let Some(pass) = &self.variants.repeat {
            encoder.pass(pass)?;
            repeat = std::mem::take(&mut encoder.raw);
        }

        if let Some(pass) = &self.variants.ending {
            encoder.pass(pass)?;
            ending = std::mem::take(&mut encoder.raw);
        }

        let mut memory = Vec::new();

        for param in &self.parameters {
            if param.memory {
                memory.push((param.name.clone(), encoder.vars.get(&param.name)?));
            }
        }

        Ok((
            Signal {
                carrier: self.general_spec.carrier,
                duty_cycle: self.general_spec.duty_cycle,
                intro,
                repeat,
                ending,
            },
            memory,
        ))
    }

    /// Fill in defaults and stored memory values, check the domain of
    /// every parameter and install the definitions.
    fn check_parameters<'a>(&'a self, vars: &mut Vartable<'a>) -> Result<(), Error> {
        for param in &self.parameters {
            let value = if let Ok(value) = vars.get(&param.name) {
                value
            } else if let Some(value) = self.memory.get(&param.name).copied() {
                vars.set(param.name.clone(), value);
                value
            } else if let Some(default) = &param.default {
                let value = default.eval(vars)?;
                vars.set(param.name.clone(), value);
                value
            } else {
                return Err(Error::Unassigned(param.name.clone()));
            };

            if value < param.min || value > param.max {
                return Err(Error::DomainViolation {
                    name: param.name.clone(),
                    value,
                    min: param.min,
                    max: param.max,
                });
            }
        }

        // When there is a parameter spec, reject stray variables; they
        // are almost certainly a misspelled parameter name.
        if !self.parameters.is_empty() {
            for (name, _) in vars.values() {
                if !self.parameters.iter().any(|param| param.name == name) {
                    return Err(Error::Logic(format!("no parameter called {name}")));
                }
            }
        }

        for (name, expr) in &self.definitions {
            vars.set_definition(name.clone(), expr);
        }

        Ok(())
    }
}

/// Accumulates raw durations. One encoder renders all three passes so
/// assignments in an earlier pass are visible in a later one.
struct Encoder<'a> {
    general_spec: &'a GeneralSpec,
    vars: Vartable<'a>,
    /// Even entries are flash, odd are gap.
    raw: Vec<u32>,
    /// Microseconds generated so far, including any dropped leading gap.
    total_length: f64,
    /// Extents measure from the top entry; one entry per open stream.
    extent_marker: Vec<f64>,
    scopes: Vec<BitspecScope<'a>>,
}

/// An open bit spec scope with the bits awaiting a flush.
struct BitspecScope<'a> {
    bit_spec: &'a BitSpec,
    bitstream: BitVec<usize, Msb0>,
}

impl<'a> Encoder<'a> {
    fn new(general_spec: &'a GeneralSpec, vars: Vartable<'a>) -> Self {
        Encoder {
            general_spec,
            vars,
            raw: Vec::new(),
            total_length: 0.0,
            extent_marker: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// Render one pass tree into `self.raw`.
    fn pass(&mut self, item: &'a StreamItem) -> Result<(), Error> {
        self.item(item)?;
        self.flush()?;

        if self.raw.len() % 2 == 1 {
            return Err(Error::Encode("stream must end with a gap".into()));
        }

        Ok(())
    }

    fn item(&mut self, item: &'a StreamItem) -> Result<(), Error> {
        match item {
            StreamItem::Flash(duration) => {
                self.flush()?;
                let length = self.duration(duration)?;
                self.add_flash(length)
            }
            StreamItem::Gap(duration) => {
                self.flush()?;
                let length = self.duration(duration)?;
                self.add_gap(length)
            }
            StreamItem::Extent(duration) => {
                self.flush()?;
                let length = self.duration(duration)?;
                self.add_extent(length)
            }
            StreamItem::Assignment(name, expr) => {
                self.flush()?;
                let value = expr.eval(&self.vars)?;
                self.vars.set(name.clone(), value);
                Ok(())
            }
            StreamItem::BitField(bit_field) => {
                if bit_field.width.is_none() {
                    return Err(Error::Encode("infinite bit field cannot be rendered".into()));
                }
                let (value, width) = bit_field.to_value(&self.vars)?;
                self.add_bits(value as u64, width)
            }
            StreamItem::Stream(stream) => self.stream(stream),
            StreamItem::Variation(..) => {
                Err(Error::Logic("variation not resolved before render".into()))
            }
        }
    }

    fn stream(&mut self, stream: &'a IrStream) -> Result<(), Error> {
        let repeats = match stream.repeat {
            None => 1,
            Some(RepeatMarker::Count(count)) => count,
            // Infinite markers are consumed by variant splitting.
            Some(_) => {
                return Err(Error::Encode("unexpected repeat marker".into()));
            }
        };

        if let Some(bit_spec) = &stream.bit_spec {
            self.scopes.push(BitspecScope {
                bit_spec,
                bitstream: BitVec::new(),
            });
        }

        for _ in 0..repeats {
            self.extent_marker.push(self.total_length);

            for item in &stream.stream {
                self.item(item)?;
            }

            self.flush()?;
            self.extent_marker.pop();
        }

        if stream.bit_spec.is_some() {
            self.scopes.pop();
        }

        Ok(())
    }

    /// Drain pending bits, innermost scope first. Each scope's bitstream
    /// is rendered through its bit spec with the outer scopes still
    /// active, so alternatives may themselves contain bit fields.
    fn flush(&mut self) -> Result<(), Error> {
        let Some(mut scope) = self.scopes.pop() else {
            return Ok(());
        };

        if !scope.bitstream.is_empty() {
            let bitstream = std::mem::take(&mut scope.bitstream);
            let chunk_size = scope.bit_spec.chunk_size() as usize;

            if chunk_size == 0 {
                return Err(Error::Encode(format!(
                    "bit spec with {} alternatives cannot encode bits",
                    scope.bit_spec.len()
                )));
            }

            if bitstream.len() % chunk_size != 0 {
                return Err(Error::Encode(format!(
                    "{} bits not divisible by chunk size {chunk_size}",
                    bitstream.len()
                )));
            }

            for chunk in bitstream.chunks(chunk_size) {
                let index = chunk
                    .iter()
                    .fold(0usize, |acc, bit| (acc << 1) | usize::from(*bit));

                let Some(alternative) = scope.bit_spec.alternatives.get(index) else {
                    return Err(Error::Encode(format!(
                        "no alternative for {index} in bit spec"
                    )));
                };

                for item in alternative {
                    self.item(item)?;
                }
            }
        }

        self.flush()?;
        self.scopes.push(scope);

        Ok(())
    }

    /// Append a bit field's payload in transmission order. With lsb bit
    /// ordering the least significant bit goes on the wire first, which
    /// is the same as reversing the field and sending it msb first.
    fn add_bits(&mut self, value: u64, width: u32) -> Result<(), Error> {
        let Some(scope) = self.scopes.last_mut() else {
            return Err(Error::Encode("bit field outside bit spec".into()));
        };

        let value = if self.general_spec.lsb {
            bit_reverse(value, width)
        } else {
            value
        };

        for bit in (0..width).rev() {
            scope.bitstream.push(value & (1 << bit) != 0);
        }

        Ok(())
    }

    fn add_flash(&mut self, length: f64) -> Result<(), Error> {
        if length <= 0.0 {
            return Err(Error::Encode("flash must have a positive length".into()));
        }

        self.total_length += length;

        let length = length.round() as u32;

        if self.raw.len() % 2 == 1 {
            if let Some(last) = self.raw.last_mut() {
                *last = last
                    .checked_add(length)
                    .ok_or_else(|| Error::Encode("duration overflow".into()))?;
            }
        } else {
            self.raw.push(length);
        }

        Ok(())
    }

    fn add_gap(&mut self, length: f64) -> Result<(), Error> {
        if length <= 0.0 {
            return Err(Error::Encode("gap must have a positive length".into()));
        }

        // A leading gap cannot be transmitted, but it still counts
        // towards any extent.
        self.total_length += length;

        if self.raw.is_empty() {
            return Ok(());
        }

        let length = length.round() as u32;

        if self.raw.len() % 2 == 0 {
            if let Some(last) = self.raw.last_mut() {
                *last = last
                    .checked_add(length)
                    .ok_or_else(|| Error::Encode("duration overflow".into()))?;
            }
        } else {
            self.raw.push(length);
        }

        Ok(())
    }

    /// An extent pads the stream with a gap to a total length, measured
    /// from the start of the innermost stream or the previous extent.
    fn add_extent(&mut self, extent: f64) -> Result<(), Error> {
        let marker = self.extent_marker.last().copied().unwrap_or(0.0);
        let elapsed = self.total_length - marker;

        if extent <= elapsed {
            return Err(Error::Encode(format!(
                "extent of {extent}us shorter than the {elapsed}us stream so far"
            )));
        }

        self.add_gap(extent - elapsed)?;

        if let Some(marker) = self.extent_marker.last_mut() {
            *marker = self.total_length;
        }

        Ok(())
    }

    fn duration(&self, duration: &Duration) -> Result<f64, Error> {
        let (value, unit) = match duration {
            Duration::Constant(value, unit) => (*value, *unit),
            Duration::Name(name, unit) => (self.vars.get(name)? as f64, *unit),
        };

        match unit {
            Unit::Units => Ok(value * self.general_spec.unit),
            Unit::Microseconds => Ok(value),
            Unit::Milliseconds => Ok(value * 1000.0),
            Unit::Pulses => match self.general_spec.carrier {
                Some(carrier) if carrier > 0 => Ok(value * 1_000_000.0 / carrier as f64),
                _ => Err(Error::Encode(
                    "pulses cannot be used without a carrier".into(),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Irp, Message, Vartable};

    #[test]
    fn nec_all_fields_given() {
        let mut vars = Vartable::new();

        vars.set("F".into(), 1);
        vars.set("D".into(), 0xe9);
        vars.set("S".into(), 0xfe);

        let mut irp = Irp::parse("{38.4k,564}<1,-1|1,-3>(16,-8,D:8,S:8,F:8,~F:8,1,^108m)* [D:0..255,S:0..255=255-D,F:0..255]").unwrap();

        let res = irp.encode(vars, 1).unwrap();

        // irptransmogrifier.sh --irp "{38.0k,564}<1,-1|1,-3>(16,-8,D:8,S:8,F:8,~F:8,1,^108m)+" encode -r -n F=1,D=0xe9,S=0xfe
        assert_eq!(
            res.raw,
            Message::parse("+9024,-4512,+564,-1692,+564,-564,+564,-564,+564,-1692,+564,-564,+564,-1692,+564,-1692,+564,-1692,+564,-564,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-564,+564,-564,+564,-564,+564,-564,+564,-564,+564,-564,+564,-564,+564,-564,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-35244").unwrap().raw
        );
    }

    #[test]
    fn nec_default_subdevice() {
        let mut vars = Vartable::new();

        vars.set("F".into(), 1);
        vars.set("D".into(), 0xe9);

        let mut irp = Irp::parse("{38.4k,564}<1,-1|1,-3>(16,-8,D:8,S:8,F:8,~F:8,1,^108m)* [D:0..255,S:0..255=255-D,F:0..255]").unwrap();

        let res = irp.encode(vars, 1).unwrap();

        // irptransmogrifier.sh --irp "{38.4k,564}<1,-1|1,-3>(16,-8,D:8,S:8,F:8,~F:8,1,^108m)* [D:0..255,S:0..255=255-D,F:0..255]" encode -r -n F=1,D=0xe9
        assert_eq!(
            res.raw,
            Message::parse("+9024,-4512,+564,-1692,+564,-564,+564,-564,+564,-1692,+564,-564,+564,-1692,+564,-1692,+564,-1692,+564,-564,+564,-1692,+564,-1692,+564,-564,+564,-1692,+564,-564,+564,-564,+564,-564,+564,-1692,+564,-564,+564,-564,+564,-564,+564,-564,+564,-564,+564,-564,+564,-564,+564,-564,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-1692,+564,-39756").unwrap().raw
        );
    }

    #[test]
    fn msb_with_chopped_complement() {
        let mut vars = Vartable::new();

        vars.set("F".into(), 1);
        vars.set("D".into(), 0xe9);
        vars.set("T".into(), 0);

        let mut irp = Irp::parse("{36k,msb,889}<1,-1|-1,1>(1:1,~F:1:6,T:1,D:5,F:6,^114m)+").unwrap();

        let res = irp.encode(vars, 0).unwrap();

        // irptransmogrifier.sh --irp "{36k,msb,889}<1,-1|-1,1>(1:1,~F:1:6,T:1,D:5,F:6,^114m)+" encode -r -n F=1,T=0,D=0xe9
        assert_eq!(
            res.raw,
            Message::parse("+889,-889,+1778,-889,+889,-1778,+1778,-889,+889,-1778,+1778,-889,+889,-889,+889,-889,+889,-889,+889,-1778,+889,-89108").unwrap().raw
        );
    }

    #[test]
    fn checksum_in_definitions() {
        let mut vars = Vartable::new();

        vars.set("F".into(), 1);
        vars.set("D".into(), 0xe9);
        vars.set("S".into(), 0x88);

        let mut irp = Irp::parse("{38k,400}<1,-1|1,-3>(8,-4,170:8,90:8,15:4,D:4,S:8,F:8,E:4,C:4,1,-48)+ {E=1,C=D^S:4:0^S:4:4^F:4:0^F:4:4^E:4}").unwrap();

        let res = irp.encode(vars, 0).unwrap();

        assert_eq!(
            res.raw,
            Message::parse("+3200,-1600,+400,-400,+400,-1200,+400,-400,+400,-1200,+400,  -400  +400,-1200,+400,-400,+400,-1200,+400,-400,+400,-1200,+400,-400,+400,-1200,+400,-1200,+400,-400,+400,-1200,+400,-400,+400,-1200,+400,-1200,+400,-1200,+400,-1200,+400,-1200,+400,-400,+400,-400,+400,-1200,+400,-400,+400,-400,+400,-400,+400,-1200,+400,-400,+400,-400,+400,-400,+400,-1200,+400,-1200,+400,-400,+400,-400,+400,-400,+400,-400,+400,-400,+400,-400,+400,-400,+400,-1200,+400,-400,+400,-400,+400,-400,+400,-1200,+400,-400,+400,-400,+400,-1200,+400,-19200").unwrap().raw
        );
    }

    #[test]
    fn wide_fields_with_constant_gaps() {
        let mut vars = Vartable::new();

        vars.set("A".into(), 1);
        vars.set("B".into(), 0xe9);

        let mut irp = Irp::parse("{38.1k,570,msb}<1,-1|1,-3>(16,-8,A:35,1,-20m,B:32,1,-20m)[A:0..0x7FFFFFFFF, B:0..UINT32_MAX]").unwrap();

        let res = irp.encode(vars, 1).unwrap();

        // irptransmogrifier.sh --irp "{38.1k,570,msb}<1,-1|1,-3>(16,-8,A:35,1,-20m,B:32,1,-20m)[A:0..0x7FFFFFFFF, B:0..UINT32_MAX]" encode -r -n A=1,B=0xe9
        assert_eq!(
            res.raw,
            Message::parse("+9120,-4560,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-1710,+570,-20000,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-570,+570,-1710,+570,-1710,+570,-1710,+570,-570,+570,-1710,+570,-570,+570,-570,+570,-1710,+570,-20000").unwrap().raw
        );
    }

    #[test]
    fn variant_passes() {
        let mut irp = Irp::parse("{}<1,-1|1,-3>([11][22][33],-100)+").unwrap();
        let res = irp.encode(Vartable::new(), 1).unwrap();

        assert_eq!(
            res.raw,
            Message::parse("+11 -100 +22 -100 +33 -100").unwrap().raw
        );

        // an empty variant cuts the stream short
        let mut irp = Irp::parse("{}<1,-1|1,-3>(111,-222,[11][][33],-100)+").unwrap();
        let res = irp.encode(Vartable::new(), 1).unwrap();

        assert_eq!(
            res.raw,
            Message::parse("+111 -222 +11 -100 +111 -222 +111 -222 +33 -100")
                .unwrap()
                .raw
        );
    }

    #[test]
    fn nested_bit_spec() {
        let mut vars = Vartable::new();

        vars.set("S".into(), 1);
        vars.set("F".into(), 0xe9);

        let mut irp = Irp::parse(
            "{40k,520,msb}<1,-10|1,-1,1,-8>(S:1,<1:2|2:2>(F:D),-90m)*{D=8}[S:0..1,F:1..255]",
        )
        .unwrap();

        assert!(irp.encode(vars, 1).is_ok());
    }

    #[test]
    fn parameter_checks() {
        let mut irp = Irp::parse(
            "{40k,520,msb}<1,-10|1,-1,1,-8>(S:1,<1:2|2:2>(F:D),-90m)*{D=8}[S:0..1,F:1..255]",
        )
        .unwrap();

        let mut vars = Vartable::new();
        vars.set("S".into(), 2);
        vars.set("F".into(), 0xe9);

        assert_eq!(
            irp.encode(vars, 1).unwrap_err().to_string(),
            "value 2 for `S` is not in 0..1"
        );

        let mut vars = Vartable::new();
        vars.set("S".into(), 1);
        vars.set("F".into(), 0);

        assert_eq!(
            irp.encode(vars, 1).unwrap_err().to_string(),
            "value 0 for `F` is not in 1..255"
        );

        let mut vars = Vartable::new();
        vars.set("S".into(), 1);

        assert_eq!(
            irp.encode(vars, 1).unwrap_err().to_string(),
            "name `F` is not assigned"
        );

        let mut vars = Vartable::new();
        vars.set("S".into(), 1);
        vars.set("F".into(), 2);
        vars.set("X".into(), 0);

        assert_eq!(
            irp.encode(vars, 1).unwrap_err().to_string(),
            "logic error: no parameter called X"
        );
    }

    #[test]
    fn extent_shorter_than_elapsed() {
        let mut irp = Irp::parse("{564}<1,-1|1,-3>(16,-8,D:8,1,^10m)[D:0..255]").unwrap();

        let mut vars = Vartable::new();
        vars.set("D".into(), 0xff);

        assert!(matches!(
            irp.encode(vars, 1),
            Err(crate::Error::Encode(_))
        ));
    }

    #[test]
    fn infinite_bit_field_cannot_render() {
        let mut irp = Irp::parse("{564}<1,-1|1,-3>(D::2,1,-100)[D:0..255]").unwrap();

        let mut vars = Vartable::new();
        vars.set("D".into(), 3);

        assert_eq!(
            irp.encode(vars, 1).unwrap_err().to_string(),
            "cannot encode: infinite bit field cannot be rendered"
        );
    }
}
