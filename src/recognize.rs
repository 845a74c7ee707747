//! Recognize raw IR against a protocol and recover its parameters.
//!
//! Recognition is the mirror image of rendering: the pass trees are
//! walked with a cursor over the received durations. Durations must
//! match within tolerance; bit fields decode chunks by trying each bit
//! spec alternative, and every alternative that matches forks its own
//! candidate state. A short alternative can match a prefix of a longer
//! duration, so ambiguous forks stay alive until a later item rules
//! them out. Values recovered from the wire go through the equation
//! solver and accumulate in a [`ParameterCollector`], which rejects
//! inconsistent observations of the same name.

use crate::{
    ast::{BitField, BitSpec, Duration, Irp, IrStream, RepeatMarker, StreamItem, Unit},
    expression::{bit_reverse, mask, untransform, Vartable},
    inverse::solve,
    message::Signal,
    params::{BitwiseParameter, ParameterCollector},
    Error,
};
use indexmap::IndexMap;
use log::trace;

/// How sloppy a signal may be and still match.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerances {
    /// Absolute duration tolerance in microseconds.
    pub absolute: u32,
    /// Relative duration tolerance, as a fraction of the expected value.
    pub relative: f64,
    /// Relative carrier frequency tolerance.
    pub frequency: f64,
    /// Gaps at least this long are leadouts; their exact length does not
    /// matter since receivers routinely truncate them.
    pub min_leadout: u32,
}

impl Default for Tolerances {
    fn default() -> Self {
        Tolerances {
            absolute: 100,
            relative: 0.2,
            frequency: 0.25,
            min_leadout: 20000,
        }
    }
}

impl Irp {
    /// Recognize a signal and recover the parameters it encodes, using
    /// default tolerances. Memory parameters are updated on a match.
    pub fn recognize(&mut self, signal: &Signal) -> Result<IndexMap<String, i64>, Error> {
        self.recognize_with(signal, &Tolerances::default())
    }

    pub fn recognize_with(
        &mut self,
        signal: &Signal,
        tolerances: &Tolerances,
    ) -> Result<IndexMap<String, i64>, Error> {
        let (params, memory) = {
            let recognizer = Recognizer::new(self, *tolerances);
            recognizer.signal(signal)?
        };

        for (name, value) in memory {
            self.memory.insert(name, value);
        }

        Ok(params)
    }
}

pub(crate) struct Recognizer<'a> {
    irp: &'a Irp,
    tolerances: Tolerances,
}

/// The cursor and everything recovered so far. Cloned for every trial
/// decode so a failed trial leaves no state behind.
#[derive(Clone)]
pub(crate) struct RecognizeState<'a> {
    raw: &'a [u32],
    /// Index into `raw`; even entries are flash, odd are gap.
    pub(crate) pos: usize,
    /// Microseconds of `raw[pos]` already matched by earlier items.
    consumed: f64,
    /// Microseconds matched in this pass, for extents.
    total: f64,
    extent_marker: Vec<f64>,
    /// Where the current pass started; the gap leading it is implied.
    pass_start: usize,
    /// Decoded bits not yet claimed by a bit field, oldest in the high
    /// positions. A dangling chunk on top of a 63 bit claim can push
    /// this past 64 bits, hence the wide accumulator.
    pending_bits: u128,
    pending_len: u32,
    vars: Vartable<'a>,
    collector: ParameterCollector,
}

impl<'a> RecognizeState<'a> {
    fn push_bits(&mut self, value: u64, width: u32) {
        self.pending_bits = (self.pending_bits << width) | u128::from(value & mask(width));
        self.pending_len += width;
    }

    fn take_bits(&mut self, width: u32) -> u64 {
        self.pending_len -= width;
        ((self.pending_bits >> self.pending_len) as u64) & mask(width)
    }

    /// Continue matching on the next segment of a signal.
    fn continue_with(&mut self, raw: &'a [u32]) {
        self.raw = raw;
        self.pos = 0;
        self.consumed = 0.0;
        self.total = 0.0;
        self.extent_marker.clear();
        self.pass_start = 0;
    }

    fn finished(&self) -> Result<(), Error> {
        if self.pos < self.raw.len() {
            return Err(Error::RecognitionFailure(format!(
                "{} durations not matched",
                self.raw.len() - self.pos
            )));
        }
        if self.pending_len != 0 {
            return Err(Error::RecognitionFailure(format!(
                "{} bits not claimed by any bit field",
                self.pending_len
            )));
        }
        Ok(())
    }
}

impl<'a> Recognizer<'a> {
    pub(crate) fn new(irp: &'a Irp, tolerances: Tolerances) -> Self {
        Recognizer { irp, tolerances }
    }

    pub(crate) fn start(&self, raw: &'a [u32]) -> RecognizeState<'a> {
        let mut vars = Vartable::new();

        for (name, expr) in &self.irp.definitions {
            vars.set_definition(name.clone(), expr);
        }

        RecognizeState {
            raw,
            pos: 0,
            consumed: 0.0,
            total: 0.0,
            extent_marker: Vec::new(),
            pass_start: 0,
            pending_bits: 0,
            pending_len: 0,
            vars,
            collector: ParameterCollector::new(),
        }
    }

    /// Match one pass tree from the cursor onwards.
    pub(crate) fn pass(
        &self,
        state: &mut RecognizeState<'a>,
        tree: &'a StreamItem,
    ) -> Result<(), Error> {
        state.pass_start = state.pos;
        state.total = 0.0;
        state.extent_marker.clear();

        let mut frontier = vec![state.clone()];
        self.item(&mut frontier, tree, &[], false)?;

        // Several candidates can survive an ambiguous bit spec; the one
        // that got furthest wins.
        let mut candidates = frontier.into_iter();
        let Some(mut best) = candidates.next() else {
            return Err(Error::RecognitionFailure("no match".into()));
        };
        for candidate in candidates {
            if candidate.pos > best.pos
                || (candidate.pos == best.pos && candidate.pending_len < best.pending_len)
            {
                best = candidate;
            }
        }
        *state = best;

        Ok(())
    }

    /// Like [`Recognizer::pass`] but on a clone, for trial matching.
    pub(crate) fn try_pass(
        &self,
        state: &RecognizeState<'a>,
        tree: &'a StreamItem,
    ) -> Result<RecognizeState<'a>, Error> {
        let mut next = state.clone();
        self.pass(&mut next, tree)?;
        Ok(next)
    }

    /// Match all three segments of a signal and build the parameters.
    /// Also returns the memory parameter updates a match implies.
    pub(crate) fn signal(
        &self,
        signal: &'a Signal,
    ) -> Result<(IndexMap<String, i64>, Vec<(String, i64)>), Error> {
        let mut state = self.start(&signal.intro);

        if !signal.intro.is_empty() {
            match (&self.irp.variants.intro, &self.irp.variants.repeat) {
                (Some(intro_tree), Some(repeat_tree)) => {
                    let mut trial = state.clone();
                    if self.pass(&mut trial, intro_tree).is_ok() && trial.finished().is_ok() {
                        state = trial;
                    } else {
                        // A capture that starts mid-transmission has a
                        // repeat frame in the intro slot.
                        self.pass(&mut state, repeat_tree)?;
                        state.finished()?;
                    }
                }
                (Some(tree), None) | (None, Some(tree)) => {
                    self.pass(&mut state, tree)?;
                    state.finished()?;
                }
                (None, None) => {
                    return Err(Error::RecognitionFailure(
                        "protocol has no intro or repeat".into(),
                    ));
                }
            }
        }

        if !signal.repeat.is_empty() {
            let Some(tree) = &self.irp.variants.repeat else {
                return Err(Error::RecognitionFailure(
                    "protocol does not repeat".into(),
                ));
            };
            state.continue_with(&signal.repeat);
            self.pass(&mut state, tree)?;
            state.finished()?;
        }

        if !signal.ending.is_empty() {
            let Some(tree) = &self.irp.variants.ending else {
                return Err(Error::RecognitionFailure("protocol has no ending".into()));
            };
            state.continue_with(&signal.ending);
            self.pass(&mut state, tree)?;
            state.finished()?;
        } else if let Some(tree) = &self.irp.variants.ending {
            // An ending of pure assignments leaves no trace in the
            // signal but still has an effect, e.g. flipping a toggle.
            state.continue_with(&[]);
            let mut trial = state.clone();
            if self.pass(&mut trial, tree).is_ok() && trial.finished().is_ok() {
                state = trial;
            }
        }

        let params = self.parameters(&state)?;

        let mut memory = Vec::new();

        for spec in &self.irp.parameters {
            if spec.memory {
                if let Ok(value) = state.vars.get(&spec.name) {
                    memory.push((spec.name.clone(), value));
                } else if let Some(value) = params.get(&spec.name) {
                    memory.push((spec.name.clone(), *value));
                }
            }
        }

        Ok((params, memory))
    }

    /// Resolve the final parameter list. Observed values win; otherwise
    /// stored memory, then the declared default.
    pub(crate) fn parameters(
        &self,
        state: &RecognizeState,
    ) -> Result<IndexMap<String, i64>, Error> {
        let mut res = IndexMap::new();

        if self.irp.parameters.is_empty() {
            for (name, param) in state.collector.iter() {
                res.insert(name.to_owned(), param.value());
            }
            return Ok(res);
        }

        for spec in &self.irp.parameters {
            let value = if let Some(param) = state.collector.get(&spec.name) {
                param.value()
            } else if let Some(value) = self.irp.memory.get(&spec.name) {
                *value
            } else if let Some(default) = &spec.default {
                let mut env = Vartable::new();
                for (name, value) in &res {
                    env.set(name.clone(), *value);
                }
                default.eval(&env)?
            } else {
                return Err(Error::Unassigned(spec.name.clone()));
            };

            if value < spec.min || value > spec.max {
                return Err(Error::DomainViolation {
                    name: spec.name.clone(),
                    value,
                    min: spec.min,
                    max: spec.max,
                });
            }

            res.insert(spec.name.clone(), value);
        }

        Ok(res)
    }

    fn item(
        &self,
        frontier: &mut Vec<RecognizeState<'a>>,
        item: &'a StreamItem,
        bitspecs: &[&'a BitSpec],
        in_bit_spec: bool,
    ) -> Result<(), Error> {
        match item {
            StreamItem::Flash(duration) => self.each(frontier, |state| {
                self.no_pending_bits(state, in_bit_spec)?;
                let expected = self.duration(&state.vars, duration)?;
                self.flash(state, expected)
            }),
            StreamItem::Gap(duration) => self.each(frontier, |state| {
                self.no_pending_bits(state, in_bit_spec)?;
                let expected = self.duration(&state.vars, duration)?;
                self.gap(state, expected)
            }),
            StreamItem::Extent(duration) => self.each(frontier, |state| {
                self.no_pending_bits(state, in_bit_spec)?;
                let extent = self.duration(&state.vars, duration)?;
                let marker = state.extent_marker.last().copied().unwrap_or(0.0);
                let elapsed = state.total - marker;

                if extent <= elapsed {
                    return Err(Error::RecognitionFailure(format!(
                        "extent of {extent}us already exceeded"
                    )));
                }

                self.gap(state, extent - elapsed)?;

                if let Some(marker) = state.extent_marker.last_mut() {
                    *marker = state.total;
                }

                Ok(())
            }),
            StreamItem::Assignment(name, expr) => self.each(frontier, |state| {
                self.no_pending_bits(state, in_bit_spec)?;
                let value = expr.eval(&state.vars)?;
                state.vars.set(name.clone(), value);
                Ok(())
            }),
            StreamItem::BitField(bit_field) => self.bit_field(frontier, bit_field, bitspecs),
            StreamItem::Stream(stream) => self.stream(frontier, stream, bitspecs, in_bit_spec),
            StreamItem::Variation(..) => {
                Err(Error::Logic("variation not resolved before recognize".into()))
            }
        }
    }

    /// Apply one deterministic step to every candidate, dropping the
    /// ones it rejects. Any error other than a failed match aborts the
    /// whole decode.
    fn each<F>(&self, frontier: &mut Vec<RecognizeState<'a>>, f: F) -> Result<(), Error>
    where
        F: Fn(&mut RecognizeState<'a>) -> Result<(), Error>,
    {
        let mut failure = None;
        let mut survivors = Vec::with_capacity(frontier.len());

        for mut state in frontier.drain(..) {
            match f(&mut state) {
                Ok(()) => survivors.push(state),
                Err(Error::RecognitionFailure(msg)) => failure = Some(msg),
                Err(other) => return Err(other),
            }
        }

        if survivors.is_empty() {
            return Err(Error::RecognitionFailure(
                failure.unwrap_or_else(|| "no match".into()),
            ));
        }

        *frontier = survivors;
        Ok(())
    }

    /// Durations and assignments at stream level require every decoded
    /// bit to have been claimed. Inside a bit spec alternative the
    /// pending bits belong to the outer scope and stay put.
    fn no_pending_bits(&self, state: &RecognizeState, in_bit_spec: bool) -> Result<(), Error> {
        if !in_bit_spec && state.pending_len != 0 {
            return Err(Error::RecognitionFailure(format!(
                "{} bits not claimed by any bit field",
                state.pending_len
            )));
        }
        Ok(())
    }

    fn stream(
        &self,
        frontier: &mut Vec<RecognizeState<'a>>,
        stream: &'a IrStream,
        bitspecs: &[&'a BitSpec],
        in_bit_spec: bool,
    ) -> Result<(), Error> {
        let repeats = match stream.repeat {
            None => 1,
            Some(RepeatMarker::Count(count)) => count,
            Some(_) => {
                return Err(Error::RecognitionFailure(
                    "unexpected repeat marker".into(),
                ));
            }
        };

        let mut specs = bitspecs.to_vec();

        if let Some(bit_spec) = &stream.bit_spec {
            specs.push(bit_spec);
        }

        for _ in 0..repeats {
            self.each(frontier, |state| {
                state.extent_marker.push(state.total);
                Ok(())
            })?;

            for item in &stream.stream {
                self.item(frontier, item, &specs, in_bit_spec)?;
            }

            self.each(frontier, |state| {
                self.no_pending_bits(state, in_bit_spec)?;
                state.extent_marker.pop();
                Ok(())
            })?;
        }

        Ok(())
    }

    fn bit_field(
        &self,
        frontier: &mut Vec<RecognizeState<'a>>,
        bit_field: &'a BitField,
        bitspecs: &[&'a BitSpec],
    ) -> Result<(), Error> {
        let mut survivors = Vec::new();
        let mut failure = None;

        for state in frontier.drain(..) {
            let width = bit_field.eval_width(&state.vars)?;
            let chop = bit_field.eval_chop(&state.vars)?;

            let mut gathered = Vec::new();

            match self.gather(state, width, bitspecs, &mut gathered) {
                Ok(()) => (),
                Err(Error::RecognitionFailure(msg)) => {
                    failure = Some(msg);
                    continue;
                }
                Err(other) => return Err(other),
            }

            for mut candidate in gathered {
                match self.claim(&mut candidate, bit_field, width, chop) {
                    Ok(()) => survivors.push(candidate),
                    Err(Error::RecognitionFailure(msg)) => failure = Some(msg),
                    Err(inconsistent @ Error::ParameterInconsistency(_)) => {
                        // A candidate that read conflicting values for
                        // the same name was a wrong fork.
                        failure = Some(inconsistent.to_string());
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        if survivors.is_empty() {
            return Err(Error::RecognitionFailure(failure.unwrap_or_else(|| {
                "no bit spec alternative matched".into()
            })));
        }

        *frontier = survivors;
        Ok(())
    }

    /// Decode chunks through the innermost bit spec until a candidate
    /// holds at least `width` pending bits. Every alternative that
    /// matches forks a candidate; a fork that chopped a duration no
    /// later item finishes dies further along the walk.
    fn gather(
        &self,
        state: RecognizeState<'a>,
        width: u32,
        bitspecs: &[&'a BitSpec],
        out: &mut Vec<RecognizeState<'a>>,
    ) -> Result<(), Error> {
        if state.pending_len >= width {
            out.push(state);
            return Ok(());
        }

        let Some((bit_spec, outer)) = bitspecs.split_last() else {
            return Err(Error::RecognitionFailure("bit field outside bit spec".into()));
        };

        let chunk_size = bit_spec.chunk_size();

        if chunk_size == 0 {
            return Err(Error::RecognitionFailure(format!(
                "bit spec with {} alternatives cannot decode bits",
                bit_spec.len()
            )));
        }

        'alternative: for (index, alternative) in bit_spec.alternatives.iter().enumerate() {
            let mut trial = vec![state.clone()];

            for item in alternative {
                match self.item(&mut trial, item, outer, true) {
                    Ok(()) => (),
                    Err(Error::RecognitionFailure(_)) => continue 'alternative,
                    Err(other) => return Err(other),
                }
            }

            for mut matched in trial {
                matched.push_bits(index as u64, chunk_size);

                match self.gather(matched, width, bitspecs, out) {
                    Ok(()) | Err(Error::RecognitionFailure(_)) => (),
                    Err(other) => return Err(other),
                }
            }
        }

        if out.is_empty() {
            trace!("no bit spec alternative matched at {}", state.pos);

            return Err(Error::RecognitionFailure(
                "no bit spec alternative matched".into(),
            ));
        }

        Ok(())
    }

    /// Take a field's bits off the pending store and either check them
    /// against a known value or hand them to the solver.
    fn claim(
        &self,
        state: &mut RecognizeState<'a>,
        bit_field: &'a BitField,
        width: u32,
        chop: u32,
    ) -> Result<(), Error> {
        let wire = state.take_bits(width);

        let payload = if self.irp.general_spec.lsb {
            bit_reverse(wire, width)
        } else {
            wire
        };

        let (bits, known) = untransform(
            payload,
            width,
            chop,
            bit_field.complement,
            bit_field.reverse,
        );

        if let Ok(expected) = bit_field.data.eval(&state.vars) {
            // Everything in the data expression is known, so this field
            // is a check, e.g. a checksum or a constant.
            if (expected as u64) & known != bits {
                return Err(Error::RecognitionFailure(format!(
                    "expected {expected:#x}, received {bits:#x}"
                )));
            }
        } else {
            let (name, param) = solve(
                &bit_field.data,
                BitwiseParameter::new(bits, known),
                &state.vars,
            )?;

            state.collector.add(&name, param)?;

            // Once all low bits of a name are in, later expressions can
            // use its value; a partial value with holes stays unbound.
            // A fully solved name carries an all-ones mask.
            if let Some(param) = state.collector.get(&name) {
                let bitmask = param.bitmask();
                if bitmask != 0 && bitmask & bitmask.wrapping_add(1) == 0 {
                    state.vars.set(name, param.value());
                }
            }
        }

        Ok(())
    }

    fn flash(&self, state: &mut RecognizeState, expected: f64) -> Result<(), Error> {
        if state.pos % 2 == 1 {
            return Err(Error::RecognitionFailure("expected flash, got gap".into()));
        }

        let Some(&observed) = state.raw.get(state.pos) else {
            return Err(Error::RecognitionFailure("signal too short".into()));
        };

        let remaining = observed as f64 - state.consumed;

        if self.close_enough(remaining, expected) {
            state.total += remaining;
            state.pos += 1;
            state.consumed = 0.0;
            Ok(())
        } else if remaining > expected {
            // The flash covers this item and more; consume our part.
            state.consumed += expected;
            state.total += expected;
            Ok(())
        } else {
            Err(Error::RecognitionFailure(format!(
                "expected flash of {expected}us, received {remaining}us"
            )))
        }
    }

    fn gap(&self, state: &mut RecognizeState, expected: f64) -> Result<(), Error> {
        // Receivers report nothing before the first flash, so the gap
        // leading a pass is implied. It still counts for extents.
        if state.pos == state.pass_start && state.consumed == 0.0 {
            state.total += expected;
            return Ok(());
        }

        if state.pos % 2 == 0 {
            return Err(Error::RecognitionFailure("expected gap, got flash".into()));
        }

        let Some(&observed) = state.raw.get(state.pos) else {
            // The receiver stopped counting after the last flash; a
            // trailing gap is implied.
            state.total += expected;
            state.pos += 1;
            return Ok(());
        };

        let remaining = observed as f64 - state.consumed;
        let min_leadout = self.tolerances.min_leadout as f64;

        if expected >= min_leadout && remaining >= min_leadout {
            state.total += remaining;
            state.pos += 1;
            state.consumed = 0.0;
            return Ok(());
        }

        if self.close_enough(remaining, expected) {
            state.total += remaining;
            state.pos += 1;
            state.consumed = 0.0;
            Ok(())
        } else if remaining > expected {
            state.consumed += expected;
            state.total += expected;
            Ok(())
        } else {
            Err(Error::RecognitionFailure(format!(
                "expected gap of {expected}us, received {remaining}us"
            )))
        }
    }

    fn close_enough(&self, observed: f64, expected: f64) -> bool {
        let tolerance = (self.tolerances.absolute as f64).max(expected * self.tolerances.relative);

        (observed - expected).abs() <= tolerance
    }

    fn duration(&self, vars: &Vartable, duration: &Duration) -> Result<f64, Error> {
        let (value, unit) = match duration {
            Duration::Constant(value, unit) => (*value, *unit),
            Duration::Name(name, unit) => (vars.get(name)? as f64, *unit),
        };

        match unit {
            Unit::Units => Ok(value * self.irp.general_spec.unit),
            Unit::Microseconds => Ok(value),
            Unit::Milliseconds => Ok(value * 1000.0),
            Unit::Pulses => match self.irp.general_spec.carrier {
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
    use crate::{Irp, Vartable};

    #[test]
    fn nec_roundtrip() {
        let irp = "{38.4k,564}<1,-1|1,-3>(16,-8,D:8,S:8,F:8,~F:8,1,^108m)* [D:0..255,S:0..255=255-D,F:0..255]";

        let mut vars = Vartable::new();
        vars.set("D".into(), 12);
        vars.set("S".into(), 243);
        vars.set("F".into(), 56);

        let signal = Irp::parse(irp).unwrap().encode_signal(vars).unwrap();

        let params = Irp::parse(irp).unwrap().recognize(&signal).unwrap();

        assert_eq!(params["D"], 12);
        assert_eq!(params["S"], 243);
        assert_eq!(params["F"], 56);
    }

    #[test]
    fn merged_flashes_and_chopped_fields() {
        // Adjacent flashes merge on the wire; recognizing them needs
        // partial duration consumption. ~F:1:6 also checks a complement
        // with chop against the F:6 observation.
        let irp = "{36k,msb,889}<1,-1|-1,1>(1:1,~F:1:6,T:1,D:5,F:6,^114m)+";

        let mut vars = Vartable::new();
        vars.set("F".into(), 1);
        vars.set("D".into(), 0xe9 & 0x1f);
        vars.set("T".into(), 0);

        let signal = Irp::parse(irp).unwrap().encode_signal(vars).unwrap();

        let params = Irp::parse(irp).unwrap().recognize(&signal).unwrap();

        assert_eq!(params["F"], 1);
        assert_eq!(params["D"], 0x09);
        assert_eq!(params["T"], 0);
    }

    #[test]
    fn inconsistent_complement_field() {
        let mut vars = Vartable::new();
        vars.set("D".into(), 0x5a);
        vars.set("F".into(), 3);

        // Rendered without the complement check, recognized with it.
        let signal = Irp::parse("{38.4k,564}<1,-1|1,-3>(16,-8,D:8,F:8,F:8,1,^108m)*[D:0..255,F:0..255]")
            .unwrap()
            .encode_signal(vars)
            .unwrap();

        let res = Irp::parse("{38.4k,564}<1,-1|1,-3>(16,-8,D:8,F:8,~F:8,1,^108m)*[D:0..255,F:0..255]")
            .unwrap()
            .recognize(&signal);

        assert!(res.is_err());
    }

    #[test]
    fn solved_definition() {
        // S is only on the wire as 255-S; the solver recovers it.
        let irp = "{38.4k,564}<1,-1|1,-3>(16,-8,D:8,X:8,1,^108m){X=255-S}[D:0..255,S:0..255]";

        let mut vars = Vartable::new();
        vars.set("D".into(), 2);
        vars.set("S".into(), 0x42);

        let signal = Irp::parse(irp).unwrap().encode_signal(vars).unwrap();
        let params = Irp::parse(irp).unwrap().recognize(&signal).unwrap();

        assert_eq!(params["D"], 2);
        assert_eq!(params["S"], 0x42);
    }

    #[test]
    fn within_and_outside_tolerance() {
        let irp = "{38.4k,564}<1,-1|1,-3>(16,-8,D:8,1,^108m)*[D:0..255]";

        let mut vars = Vartable::new();
        vars.set("D".into(), 0xa5);

        let mut signal = Irp::parse(irp).unwrap().encode_signal(vars).unwrap();

        // 15% off is within the default 20% relative tolerance.
        for duration in &mut signal.repeat {
            *duration = (*duration as f64 * 1.15) as u32;
        }

        let params = Irp::parse(irp).unwrap().recognize(&signal).unwrap();
        assert_eq!(params["D"], 0xa5);

        for duration in &mut signal.repeat {
            *duration = (*duration as f64 * 1.40) as u32;
        }

        assert!(Irp::parse(irp).unwrap().recognize(&signal).is_err());
    }

    #[test]
    fn missing_trailing_gap() {
        let irp = "{38.4k,564}<1,-1|1,-3>(16,-8,D:8,1,^108m)*[D:0..255]";

        let mut vars = Vartable::new();
        vars.set("D".into(), 7);

        let mut signal = Irp::parse(irp).unwrap().encode_signal(vars).unwrap();

        // Receivers commonly time out during the leadout.
        signal.repeat.pop();

        let params = Irp::parse(irp).unwrap().recognize(&signal).unwrap();
        assert_eq!(params["D"], 7);
    }

    #[test]
    fn nested_bit_spec_roundtrip() {
        let irp = "{40k,520,msb}<1,-10|1,-1,1,-8>(S:1,<1:2|2:2>(F:D),-90m)*{D=8}[S:0..1,F:1..255]";

        let mut vars = Vartable::new();
        vars.set("S".into(), 1);
        vars.set("F".into(), 0xe9);

        let signal = Irp::parse(irp).unwrap().encode_signal(vars).unwrap();
        let params = Irp::parse(irp).unwrap().recognize(&signal).unwrap();

        assert_eq!(params["S"], 1);
        assert_eq!(params["F"], 0xe9);
    }

    #[test]
    fn domain_checked_after_recognition() {
        let render = "{38.4k,564}<1,-1|1,-3>(16,-8,D:8,1,^108m)*[D:0..255]";
        let recognize = "{38.4k,564}<1,-1|1,-3>(16,-8,D:8,1,^108m)*[D:0..15]";

        let mut vars = Vartable::new();
        vars.set("D".into(), 200);

        let signal = Irp::parse(render).unwrap().encode_signal(vars).unwrap();

        assert!(matches!(
            Irp::parse(recognize).unwrap().recognize(&signal),
            Err(crate::Error::DomainViolation { .. })
        ));
    }

    #[test]
    fn gap_length_selects_alternative() {
        // A 564us gap is a prefix of a 1692us gap; the short alternative
        // must not swallow the start of the long one.
        let irp = "{564}<1,-1|1,-3>(16,-8,D:1,1,-78)[D:0..1]";

        for bit in [0, 1] {
            let mut vars = Vartable::new();
            vars.set("D".into(), bit);

            let signal = Irp::parse(irp).unwrap().encode_signal(vars).unwrap();
            let params = Irp::parse(irp).unwrap().recognize(&signal).unwrap();

            assert_eq!(params["D"], bit);
        }
    }

    #[test]
    fn solved_definition_extremes() {
        // S = 255 puts all-zero bits on the wire and the solver reports
        // the name fully known.
        let irp = "{38.4k,564}<1,-1|1,-3>(16,-8,X:8,1,-78){X=255-S}[S:0..255]";

        for s in [0, 255] {
            let mut vars = Vartable::new();
            vars.set("S".into(), s);

            let signal = Irp::parse(irp).unwrap().encode_signal(vars).unwrap();
            let params = Irp::parse(irp).unwrap().recognize(&signal).unwrap();

            assert_eq!(params["S"], s);
        }
    }

    #[test]
    fn dangling_chunk_bits_carry_into_wide_field() {
        // Four bits decode per chunk; the chunk straddling A and B
        // pushes the pending count past 64 while B is filled.
        let irp = "{msb}<1m,-100u|2m,-100u|4m,-100u|8m,-100u|16m,-100u|32m,-100u|64m,-100u|\
                   128m,-100u|256m,-100u|512m,-100u|1024m,-100u|2048m,-100u|4096m,-100u|\
                   8192m,-100u|16384m,-100u|32768m,-100u>(A:3,B:63,C:2,500u,-500u)";

        let mut vars = Vartable::new();
        vars.set("A".into(), 5);
        vars.set("B".into(), 0x4000_0000_0000_0001);
        vars.set("C".into(), 2);

        let signal = Irp::parse(irp).unwrap().encode_signal(vars).unwrap();
        let params = Irp::parse(irp).unwrap().recognize(&signal).unwrap();

        assert_eq!(params["A"], 5);
        assert_eq!(params["B"], 0x4000_0000_0000_0001);
        assert_eq!(params["C"], 2);
    }

    #[test]
    fn repeat_frame_in_intro_slot() {
        // A capture that starts mid-transmission has a repeat frame
        // where the intro is expected.
        let irp = "{564}<1,-1|1,-3>(16,-8,(D:8,1,-100)+)[D:0..255]";

        let mut vars = Vartable::new();
        vars.set("D".into(), 0x37);

        let signal = Irp::parse(irp).unwrap().encode_signal(vars).unwrap();

        let tail = crate::Signal {
            intro: signal.repeat.clone(),
            repeat: signal.repeat.clone(),
            ..Default::default()
        };

        let params = Irp::parse(irp).unwrap().recognize(&tail).unwrap();
        assert_eq!(params["D"], 0x37);
    }

    #[test]
    fn shifted_checksum_definition() {
        // The check field C is the high nibble of D via an infinite
        // bit field in the definitions.
        let irp = "{38.4k,564}<1,-1|1,-3>(16,-8,D:8,C:4,1,-78){C=D::4}[D:0..255]";

        let mut vars = Vartable::new();
        vars.set("D".into(), 0xab);

        let signal = Irp::parse(irp).unwrap().encode_signal(vars).unwrap();
        let params = Irp::parse(irp).unwrap().recognize(&signal).unwrap();

        assert_eq!(params["D"], 0xab);
    }

    #[test]
    fn tolerance_boundary() {
        let irp = "{38.4k,564}<1,-1|1,-3>(16,-8,D:8,1,^108m)*[D:0..255]";

        let mut vars = Vartable::new();
        vars.set("D".into(), 0x5a);

        let signal = Irp::parse(irp).unwrap().encode_signal(vars).unwrap();

        // Every duration stretched to the 20% relative limit.
        let mut stretched = signal.clone();
        for duration in &mut stretched.repeat {
            *duration = (*duration as f64 * 1.2) as u32;
        }

        let params = Irp::parse(irp).unwrap().recognize(&stretched).unwrap();
        assert_eq!(params["D"], 0x5a);

        // One more microsecond puts the lead-in flash out of reach.
        let mut beyond = signal.clone();
        for duration in &mut beyond.repeat {
            *duration = (*duration as f64 * 1.2) as u32 + 1;
        }

        assert!(Irp::parse(irp).unwrap().recognize(&beyond).is_err());
    }
}
