//! Decode received IR against a set of named protocols.
//!
//! A [`Decoder`] tries every decodable protocol against the input. A
//! segmented [`Signal`] is matched directly; a flat [`Message`], as it
//! comes out of a receiver, is matched positionally: intro if present,
//! then as many repeats as the signal holds, then the ending, and the
//! remainder is decoded recursively so concatenated transmissions come
//! out as a tree.

use crate::{
    recognize::{Recognizer, Tolerances},
    Error, Irp, Message, Signal,
};
use indexmap::IndexMap;
use log::{debug, trace};

/// A protocol with the decoding metadata IrpTransmogrifier's protocol
/// database carries: whether it should decode at all, which protocols it
/// wins against, and per-protocol tolerances.
#[derive(Debug)]
pub struct NamedProtocol {
    pub name: String,
    pub irp: Irp,
    pub decodable: bool,
    /// Require at least one repeat in the signal; filters out protocols
    /// that are a prefix of a longer one.
    pub reject_repeatless: bool,
    /// When both this protocol and a named one match, drop the other.
    pub prefer_over: Vec<String>,
    /// Overrides the decoder-wide tolerances when set.
    pub tolerances: Option<Tolerances>,
}

impl NamedProtocol {
    pub fn new(name: &str, irp: &str) -> Result<Self, Error> {
        Ok(NamedProtocol {
            name: name.to_owned(),
            irp: Irp::parse(irp)?,
            decodable: true,
            reject_repeatless: false,
            prefer_over: Vec::new(),
            tolerances: None,
        })
    }
}

/// One successful match.
#[derive(Debug, Clone, PartialEq)]
pub struct Decode {
    pub protocol: String,
    pub params: IndexMap<String, i64>,
    /// Span of raw durations covered, `begin..end`.
    pub begin: usize,
    pub end: usize,
    pub repeats: u64,
}

/// A match and all decodes of what follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeTree {
    pub decode: Decode,
    pub rest: Vec<DecodeTree>,
}

pub struct Decoder {
    protocols: Vec<NamedProtocol>,
    tolerances: Tolerances,
}

impl Decoder {
    pub fn new(protocols: Vec<NamedProtocol>) -> Self {
        Decoder {
            protocols,
            tolerances: Tolerances::default(),
        }
    }

    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    pub fn protocols(&self) -> &[NamedProtocol] {
        &self.protocols
    }

    /// Decode an already segmented signal. Decoding is speculative and
    /// leaves protocol memory untouched.
    pub fn decode_signal(&self, signal: &Signal) -> Vec<Decode> {
        let mut decodes = Vec::new();

        for protocol in &self.protocols {
            if !protocol.decodable {
                continue;
            }

            let tolerances = protocol.tolerances.unwrap_or(self.tolerances);

            if !carrier_close(&tolerances, signal.carrier, protocol.irp.general_spec.carrier) {
                continue;
            }

            let repeats = u64::from(!signal.repeat.is_empty());

            if protocol.reject_repeatless && repeats == 0 {
                continue;
            }

            let recognizer = Recognizer::new(&protocol.irp, tolerances);

            match recognizer.signal(signal) {
                Ok((params, _)) => {
                    let end = signal.intro.len() + signal.repeat.len() + signal.ending.len();

                    debug!("signal decodes as {}", protocol.name);

                    decodes.push(Decode {
                        protocol: protocol.name.clone(),
                        params,
                        begin: 0,
                        end,
                        repeats,
                    });
                }
                Err(failure) => {
                    trace!("{}: {failure}", protocol.name);
                }
            }
        }

        self.reduce(decodes)
    }

    /// Decode a flat message, possibly holding several transmissions
    /// back to back.
    pub fn decode_message(&self, message: &Message) -> Vec<DecodeTree> {
        self.decode_at(message, 0)
    }

    fn decode_at(&self, message: &Message, pos: usize) -> Vec<DecodeTree> {
        let mut res = Vec::new();

        for protocol in &self.protocols {
            if !protocol.decodable {
                continue;
            }

            let tolerances = protocol.tolerances.unwrap_or(self.tolerances);

            if !carrier_close(&tolerances, message.carrier, protocol.irp.general_spec.carrier) {
                continue;
            }

            let Some(decode) = self.flat_decode(protocol, &tolerances, &message.raw, pos) else {
                continue;
            };

            // The gap between two transmissions belongs to neither.
            let mut next = decode.end;
            if next < message.raw.len() && next % 2 == 1 {
                next += 1;
            }

            let rest = if next < message.raw.len() {
                self.decode_at(message, next)
            } else {
                Vec::new()
            };

            res.push(DecodeTree { decode, rest });
        }

        let preferred = self.removed_by_preference(res.iter().map(|tree| &tree.decode));
        res.retain(|tree| !preferred.contains(&tree.decode.protocol));

        res
    }

    fn flat_decode(
        &self,
        protocol: &NamedProtocol,
        tolerances: &Tolerances,
        raw: &[u32],
        pos: usize,
    ) -> Option<Decode> {
        let recognizer = Recognizer::new(&protocol.irp, *tolerances);

        let mut state = recognizer.start(raw);
        state.pos = pos;

        let mut matched_intro = false;

        if let Some(tree) = &protocol.irp.variants.intro {
            if let Ok(next) = recognizer.try_pass(&state, tree) {
                state = next;
                matched_intro = true;
            }
        }

        let mut repeats = 0;

        if let Some(tree) = &protocol.irp.variants.repeat {
            while let Ok(next) = recognizer.try_pass(&state, tree) {
                if next.pos <= state.pos {
                    break;
                }
                state = next;
                repeats += 1;
            }
        }

        if !matched_intro && repeats == 0 {
            return None;
        }

        if protocol.reject_repeatless && repeats == 0 {
            trace!("{}: match without repeats rejected", protocol.name);
            return None;
        }

        if let Some(tree) = &protocol.irp.variants.ending {
            if let Ok(next) = recognizer.try_pass(&state, tree) {
                state = next;
            }
        }

        let end = state.pos.min(raw.len());

        if end <= pos {
            return None;
        }

        let params = recognizer.parameters(&state).ok()?;

        debug!(
            "{} matches {pos}..{end} with {repeats} repeats",
            protocol.name
        );

        Some(Decode {
            protocol: protocol.name.clone(),
            params,
            begin: pos,
            end,
            repeats,
        })
    }

    fn reduce(&self, mut decodes: Vec<Decode>) -> Vec<Decode> {
        let removed = self.removed_by_preference(decodes.iter());
        decodes.retain(|decode| !removed.contains(&decode.protocol));
        decodes
    }

    /// Protocols beaten by a prefer-over entry of another match. The
    /// removal is pairwise over the original set of matches, never
    /// transitive: A preferring B and B preferring C removes B and C,
    /// not just C.
    fn removed_by_preference<'d>(
        &self,
        decodes: impl Iterator<Item = &'d Decode> + Clone,
    ) -> Vec<String> {
        let mut removed = Vec::new();

        for decode in decodes.clone() {
            let Some(protocol) = self.protocols.iter().find(|p| p.name == decode.protocol)
            else {
                continue;
            };

            for name in &protocol.prefer_over {
                if decodes.clone().any(|other| &other.protocol == name) {
                    removed.push(name.clone());
                }
            }
        }

        removed
    }
}

fn carrier_close(tolerances: &Tolerances, received: Option<i64>, expected: Option<i64>) -> bool {
    match (received, expected) {
        (Some(received), Some(expected)) if received > 0 && expected > 0 => {
            (received - expected).abs() as f64 <= expected as f64 * tolerances.frequency
        }
        _ => true,
    }
}
