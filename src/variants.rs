//! Split a protocol into its intro, repeat and ending passes.
//!
//! A protocol is rendered and recognized in up to three passes. The
//! split resolves `[..][..][..]` variations and consumes the infinite
//! repeat marker, so the pass trees only ever contain finite `Count`
//! markers. The repeat tree describes a single repetition.

use crate::{
    ast::{BitSpec, IrStream, RepeatMarker, StreamItem, Variants},
    Error,
};
use std::rc::Rc;

pub(crate) fn split_variants(root: &Rc<StreamItem>) -> Result<Variants, Error> {
    let StreamItem::Stream(stream) = root.as_ref() else {
        return Err(Error::Parse("protocol must be a stream".into()));
    };

    // Decompose into what comes before the repeating part, the repeating
    // part itself, and what comes after it.
    let mut prefix: Vec<Rc<StreamItem>> = Vec::new();
    let mut suffix: Vec<Rc<StreamItem>> = Vec::new();
    let mut unit: Option<&IrStream> = None;
    let mut marker: Option<RepeatMarker> = None;

    let root_repeating = stream.repeat.map(|m| m.is_infinite()).unwrap_or(false)
        || variation_count(&stream.stream) > 0;

    if root_repeating {
        unit = Some(stream);
        marker = stream.repeat;
    } else {
        for item in &stream.stream {
            match item.as_ref() {
                StreamItem::Stream(inner)
                    if unit.is_none()
                        && (inner.repeat.map(|m| m.is_infinite()).unwrap_or(false)
                            || variation_count(&inner.stream) > 0) =>
                {
                    marker = inner.repeat;
                    unit = Some(inner);
                }
                _ if unit.is_some() => suffix.push(item.clone()),
                _ => prefix.push(item.clone()),
            }
        }
    }

    let Some(unit) = unit else {
        // No repeat marker anywhere; the whole signal is sent once.
        return Ok(Variants {
            intro: Some(Rc::new(root.as_ref().clone())),
            repeat: None,
            ending: None,
        });
    };

    let outer_spec = if root_repeating {
        None
    } else {
        stream.bit_spec.as_ref()
    };

    if variation_count(&unit.stream) > 0 {
        let select = |variant: usize| -> Option<Vec<Rc<StreamItem>>> {
            let items = select_items(&unit.stream, variant)?;
            Some(vec![embed(unit.bit_spec.as_ref(), items)])
        };

        let intro = join(outer_spec, prefix, select(0));
        let repeat = join(outer_spec, Vec::new(), select(1));
        let ending = join(outer_spec, select(2).unwrap_or_default(), Some(suffix));

        return Ok(Variants {
            intro,
            repeat,
            ending,
        });
    }

    let one = embed(unit.bit_spec.as_ref(), unit.stream.clone());

    // A `+` style marker demands iterations up front; they belong to the
    // intro.
    match marker.map(|m| m.min()).unwrap_or(0) {
        0 => (),
        1 => prefix.push(one.clone()),
        n => prefix.push(Rc::new(StreamItem::Stream(IrStream {
            bit_spec: unit.bit_spec.clone(),
            stream: unit.stream.clone(),
            repeat: Some(RepeatMarker::Count(n)),
        }))),
    }

    Ok(Variants {
        intro: join(outer_spec, prefix, None),
        repeat: join(outer_spec, vec![one], None),
        ending: join(outer_spec, suffix, None),
    })
}

/// Wrap the items of a repeating unit together with its own bit spec.
/// Units without one are spliced into the surrounding stream unwrapped.
fn embed(bit_spec: Option<&BitSpec>, items: Vec<Rc<StreamItem>>) -> Rc<StreamItem> {
    Rc::new(StreamItem::Stream(IrStream {
        bit_spec: bit_spec.cloned(),
        stream: items,
        repeat: None,
    }))
}

/// Combine pass items under the outer bit spec. A pass without any
/// observable effect is `None`.
fn join(
    outer_spec: Option<&BitSpec>,
    mut items: Vec<Rc<StreamItem>>,
    more: Option<Vec<Rc<StreamItem>>>,
) -> Option<Rc<StreamItem>> {
    if let Some(more) = more {
        items.extend(more);
    }

    let empty = |item: &Rc<StreamItem>| match item.as_ref() {
        StreamItem::Stream(stream) => stream.stream.is_empty(),
        _ => false,
    };

    if items.is_empty() || items.iter().all(empty) {
        return None;
    }

    if outer_spec.is_none() && items.len() == 1 {
        if let StreamItem::Stream(..) = items[0].as_ref() {
            return Some(items.remove(0));
        }
    }

    Some(Rc::new(StreamItem::Stream(IrStream {
        bit_spec: outer_spec.cloned(),
        stream: items,
        repeat: None,
    })))
}

fn variation_count(items: &[Rc<StreamItem>]) -> usize {
    items
        .iter()
        .map(|item| match item.as_ref() {
            StreamItem::Variation(list) => list.len(),
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}

/// Resolve variations in a stream body for one variant. An empty (or
/// missing) variant cuts the stream short at the variation, like
/// IrpTransmogrifier does; `None` means the pass vanishes entirely.
fn select_items(items: &[Rc<StreamItem>], variant: usize) -> Option<Vec<Rc<StreamItem>>> {
    let mut res: Vec<Rc<StreamItem>> = Vec::new();

    for item in items {
        match item.as_ref() {
            StreamItem::Variation(list) => match list.get(variant) {
                Some(alternative) if !alternative.is_empty() => {
                    res.extend(alternative.iter().cloned());
                }
                _ => break,
            },
            _ => res.push(item.clone()),
        }
    }

    if res.is_empty() {
        None
    } else {
        Some(res)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::Irp;

    fn passes(irp: &str) -> [String; 3] {
        let irp = Irp::parse(irp).unwrap();
        let show = |pass: &Option<std::rc::Rc<crate::ast::StreamItem>>| match pass {
            Some(tree) => format!("{tree}"),
            None => String::new(),
        };
        [
            show(&irp.variants.intro),
            show(&irp.variants.repeat),
            show(&irp.variants.ending),
        ]
    }

    #[test]
    fn repeating_whole_stream() {
        let [intro, repeat, ending] =
            passes("{38.4k,564}<1,-1|1,-3>(16,-8,D:8,S:8,F:8,~F:8,1,^108m)*[D:0..255,S:0..255,F:0..255]");

        assert_eq!(intro, "");
        assert_eq!(repeat, "<1,-1|1,-3>(16,-8,D:8,S:8,F:8,~F:8,1,^108m)");
        assert_eq!(ending, "");
    }

    #[test]
    fn repeating_substream() {
        let [intro, repeat, ending] = passes(
            "{38.4k,564}<1,-1|1,-3>(16,-8,D:8,S:8,F:8,~F:8,1,^108m,(16,-4,1,^108m)*)[D:0..255,S:0..255,F:0..255]",
        );

        assert_eq!(intro, "<1,-1|1,-3>(16,-8,D:8,S:8,F:8,~F:8,1,^108m)");
        assert_eq!(repeat, "<1,-1|1,-3>((16,-4,1,^108m))");
        assert_eq!(ending, "");
    }

    #[test]
    fn trailing_assignment() {
        let [intro, repeat, ending] = passes(
            "{36k,msb,889}<1,-1|-1,1>((1,~F:1:6,T:1,D:5,F:6,^114m)*,T=1-T)[D:0..31,F:0..127,T@:0..1=0]",
        );

        assert_eq!(intro, "");
        assert_eq!(repeat, "<1,-1|-1,1>((1,~F:1:6,T:1,D:5,F:6,^114m))");
        assert_eq!(ending, "<1,-1|-1,1>(T=(1 - T))");
    }

    #[test]
    fn one_or_more() {
        let [intro, repeat, ending] =
            passes("{38k,525}<1,-1|1,-3>(16,-8,(D:8,F:8,1,-45)+)[D:0..255,F:0..255]");

        assert_eq!(intro, "<1,-1|1,-3>(16,-8,(D:8,F:8,1,-45))");
        assert_eq!(repeat, "<1,-1|1,-3>((D:8,F:8,1,-45))");
        assert_eq!(ending, "");
    }

    #[test]
    fn variations() {
        let [intro, repeat, ending] = passes("{}<1|-1>(([1][2][3],-100)*)[D:0..255]");

        assert_eq!(intro, "<1|-1>((1,-100))");
        assert_eq!(repeat, "<1|-1>((2,-100))");
        assert_eq!(ending, "<1|-1>((3,-100))");

        let [intro, repeat, ending] = passes("{}<1|-1>(([][2],-100)*)[D:0..255]");

        assert_eq!(intro, "");
        assert_eq!(repeat, "<1|-1>((2,-100))");
        assert_eq!(ending, "");
    }

    #[test]
    fn no_marker() {
        let [intro, repeat, ending] = passes("{40k,600}<1,-1|2,-1>(4,-1,F:8,^45m)[F:0..255]");

        assert_eq!(intro, "<1,-1|2,-1>(4,-1,F:8,^45m)");
        assert_eq!(repeat, "");
        assert_eq!(ending, "");
    }
}
