//! Raw IR in flat and three-segment form.

use crate::Error;
use itertools::Itertools;

/// A flat sequence of IR durations in microseconds. Entries at even
/// offsets are flashes (carrier on), odd offsets are gaps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    /// Carrier in Hz. `None` means unknown; 0 means unmodulated.
    pub carrier: Option<i64>,
    /// Duty cycle of the carrier, between 1% and 99%.
    pub duty_cycle: Option<u8>,
    pub raw: Vec<u32>,
}

impl Message {
    pub fn new() -> Self {
        Default::default()
    }

    /// Parse a rawir string like `"+9024 -4512 +564 -564"`. Signs are
    /// optional; when present they must alternate starting with a flash.
    /// Durations may be separated by whitespace and/or commas.
    pub fn parse(input: &str) -> Result<Message, Error> {
        let mut raw = Vec::new();

        for token in input.split([' ', '\t', '\n', '\r', ',']) {
            if token.is_empty() {
                continue;
            }

            let (explicit, value) = match token.as_bytes()[0] {
                b'+' => (Some(true), &token[1..]),
                b'-' => (Some(false), &token[1..]),
                _ => (None, token),
            };

            let value: u32 = value
                .parse()
                .map_err(|_| Error::Parse(format!("invalid duration {token}")))?;

            if let Some(flash) = explicit {
                let expect_flash = raw.len() % 2 == 0;
                if flash != expect_flash {
                    return Err(Error::Parse(format!(
                        "expected {} duration, got {token}",
                        if expect_flash { "flash" } else { "gap" }
                    )));
                }
            }

            raw.push(value);
        }

        if raw.is_empty() {
            return Err(Error::Parse("no durations found".into()));
        }

        Ok(Message {
            carrier: None,
            duty_cycle: None,
            raw,
        })
    }

    /// Print in rawir format, e.g. `"+9024 -4512 +564"`.
    pub fn print_rawir(&self) -> String {
        self.raw
            .iter()
            .enumerate()
            .map(|(index, duration)| {
                if index % 2 == 0 {
                    format!("+{duration}")
                } else {
                    format!("-{duration}")
                }
            })
            .join(" ")
    }

    pub fn has_trailing_gap(&self) -> bool {
        self.raw.len() % 2 == 0 && !self.raw.is_empty()
    }

    /// Append another message, merging the durations at the boundary if
    /// both are the same polarity.
    pub fn extend(&mut self, other: &Message) {
        let mut iter = other.raw.iter();

        if !self.has_trailing_gap() && !self.raw.is_empty() {
            // self ends on a flash; merge with a leading flash
            if let Some(first) = iter.next() {
                if let Some(last) = self.raw.last_mut() {
                    *last += first;
                }
            }
        }

        self.raw.extend(iter);
    }
}

/// Rendered output split into its passes; also the natural input shape
/// for recognition when the capture hardware already segments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signal {
    pub carrier: Option<i64>,
    pub duty_cycle: Option<u8>,
    pub intro: Vec<u32>,
    pub repeat: Vec<u32>,
    pub ending: Vec<u32>,
}

impl Signal {
    /// Flatten into a single message with the repeat segment included
    /// the given number of times.
    pub fn to_message(&self, repeats: usize) -> Message {
        let mut message = Message {
            carrier: self.carrier,
            duty_cycle: self.duty_cycle,
            raw: self.intro.clone(),
        };

        for _ in 0..repeats {
            message.extend(&Message {
                carrier: self.carrier,
                duty_cycle: self.duty_cycle,
                raw: self.repeat.clone(),
            });
        }

        message.extend(&Message {
            carrier: self.carrier,
            duty_cycle: self.duty_cycle,
            raw: self.ending.clone(),
        });

        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rawir() {
        let msg = Message::parse("+9024 -4512 +564 -564").unwrap();
        assert_eq!(msg.raw, vec![9024, 4512, 564, 564]);

        let msg = Message::parse("9024,4512,564").unwrap();
        assert_eq!(msg.raw, vec![9024, 4512, 564]);

        assert!(Message::parse("-100 +200").is_err());
        assert!(Message::parse("+100 +200").is_err());
        assert!(Message::parse("").is_err());
        assert!(Message::parse("+100 -a").is_err());
    }

    #[test]
    fn print_roundtrip() {
        let msg = Message::parse("+9024 -4512 +564").unwrap();
        assert_eq!(msg.print_rawir(), "+9024 -4512 +564");
    }

    #[test]
    fn extend_merges_boundary() {
        let mut msg = Message::parse("+100 -200 +300").unwrap();
        msg.extend(&Message::parse("+50 -60").unwrap());
        assert_eq!(msg.raw, vec![100, 200, 350, 60]);

        let mut msg = Message::parse("+100 -200").unwrap();
        msg.extend(&Message::parse("+50 -60").unwrap());
        assert_eq!(msg.raw, vec![100, 200, 50, 60]);
    }

    #[test]
    fn signal_flattening() {
        let signal = Signal {
            carrier: Some(38000),
            duty_cycle: None,
            intro: vec![900, 450, 560, 2250],
            repeat: vec![900, 225, 560, 9000],
            ending: vec![],
        };

        let msg = signal.to_message(2);
        assert_eq!(
            msg.raw,
            vec![900, 450, 560, 2250, 900, 225, 560, 9000, 900, 225, 560, 9000]
        );
        assert_eq!(msg.carrier, Some(38000));
    }
}
