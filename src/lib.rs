//! This library parses IRP notation, renders IR with the provided parameters,
//! and recognizes received IR back into parameter values. A decoder is
//! included which matches raw receiver output against a set of protocols.
//!
//! ## About IRP
//!
//! [IRP Notation](http://hifi-remote.com/wiki/index.php?title=IRP_Notation) is a domain-specific language
//! which describes [Consumer IR](https://en.wikipedia.org/wiki/Consumer_IR) protocols. There is a extensive
//! [library](http://hifi-remote.com/wiki/index.php/DecodeIR) of protocols described using IRP.
//!
//! ## An example of how to render NEC1
//!
//! This example sets some parameters, renders and then simply prints the result.
//!
//! ```
//! use irpkit::{Irp, Vartable};
//!
//! let mut vars = Vartable::new();
//! vars.set(String::from("D"), 255);
//! vars.set(String::from("S"), 52);
//! vars.set(String::from("F"), 1);
//! let mut irp = Irp::parse(r#"
//!     {38.4k,564}<1,-1|1,-3>(16,-8,D:8,S:8,F:8,~F:8,1,^108m,(16,-4,1,^108m)*)
//!     [D:0..255,S:0..255=255-D,F:0..255]"#)
//!     .expect("parse should succeed");
//! let message = irp.encode(vars, 1).expect("encode should succeed");
//! if let Some(carrier) = &message.carrier {
//!     println!("carrier: {carrier}Hz");
//! }
//! println!("{}", message.print_rawir());
//! ```
//!
//! The output is in raw ir format, which looks like "+9024 -4512 +564 -1692 +564 -1692 +564 -1692 +564 ...". The first
//! entry in this array is *flash*, which means infrared light should be on for N microseconds, and every even entry
//! means *gap*, which means absense of light, i.e. off, for N microseconds. This continues to alternate. The leading
//! + and - also mean *flash* and *gap*.
//!
//! ## Recognizing a signal
//!
//! Recognizing is the inverse of rendering: given the durations a receiver
//! captured, recover the parameter values.
//!
//! ```
//! use irpkit::{Irp, Vartable};
//!
//! let mut irp = Irp::parse(
//!     "{38.4k,564}<1,-1|1,-3>(16,-8,D:8,S:8,F:8,~F:8,1,^108m)*[D:0..255,S:0..255=255-D,F:0..255]")
//!     .expect("parse should succeed");
//!
//! let mut vars = Vartable::new();
//! vars.set(String::from("D"), 12);
//! vars.set(String::from("F"), 196);
//! let signal = irp.encode_signal(vars).expect("encode should succeed");
//!
//! let params = irp.recognize(&signal).expect("signal should be recognized");
//! assert_eq!(params["D"], 12);
//! assert_eq!(params["S"], 243);
//! assert_eq!(params["F"], 196);
//! ```
//!
//! ## Decoding raw receiver output
//!
//! A [`Decoder`] holds named protocols and matches a flat message against
//! all of them, counting repeats and chaining decodes when several
//! transmissions were captured back to back.
//!
//! ```
//! use irpkit::{Decoder, Message, NamedProtocol};
//!
//! let decoder = Decoder::new(vec![NamedProtocol::new(
//!     "NEC1",
//!     "{38.4k,564}<1,-1|1,-3>(16,-8,D:8,S:8,F:8,~F:8,1,^108m)*[D:0..255,S:0..255=255-D,F:0..255]",
//! )
//! .expect("parse should succeed")]);
//!
//! let message = Message::parse(
//!     "+9024 -4512 +564 -564 +564 -564 +564 -1692 +564 -1692 +564 -564 +564 -564
//!      +564 -564 +564 -564 +564 -1692 +564 -1692 +564 -564 +564 -564 +564 -1692
//!      +564 -1692 +564 -1692 +564 -1692 +564 -564 +564 -564 +564 -1692 +564 -1692
//!      +564 -564 +564 -564 +564 -564 +564 -564 +564 -1692 +564 -1692 +564 -564
//!      +564 -564 +564 -1692 +564 -1692 +564 -1692 +564 -1692 +564 -39756",
//! )
//! .expect("parse should succeed");
//!
//! for tree in decoder.decode_message(&message) {
//!     println!("{}: {:?}", tree.decode.protocol, tree.decode.params);
//! }
//! ```

mod ast;
mod decoder;
mod error;
mod expression;
mod inverse;
mod message;
mod params;
mod parser;
mod recognize;
mod render;
mod variants;

pub use ast::Irp;
pub use decoder::{Decode, DecodeTree, Decoder, NamedProtocol};
pub use error::Error;
pub use expression::Vartable;
pub use message::{Message, Signal};
pub use recognize::Tolerances;
