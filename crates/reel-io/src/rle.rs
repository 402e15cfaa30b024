//! Run-length packets shared by the raster codecs.
//!
//! Targa and IFF use the same byte-oriented scheme: a header byte whose high
//! bit marks a run and whose low seven bits hold the count minus one. SGI
//! only borrows the packet planning.

/// A stretch of items emitted as one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Packet {
    pub start: usize,
    pub len: usize,
    pub run: bool,
}

/// Splits `count` items into packets of at most `max` items.
///
/// `same(a, b)` compares two items. Two or more equal items form a run;
/// literal packets stop where the next run begins.
pub(crate) fn plan(count: usize, max: usize, same: impl Fn(usize, usize) -> bool) -> Vec<Packet> {
    let mut packets = Vec::new();
    let mut i = 0;
    while i < count {
        let limit = (count - i).min(max);
        let mut run = 1;
        while run < limit && same(i, i + run) {
            run += 1;
        }
        if run > 1 {
            packets.push(Packet { start: i, len: run, run: true });
            i += run;
            continue;
        }
        let mut n = 1;
        while n < limit && !(i + n + 1 < count && same(i + n, i + n + 1)) {
            n += 1;
        }
        packets.push(Packet { start: i, len: n, run: false });
        i += n;
    }
    packets
}

/// Appends `data` as packets of `item`-byte values.
pub(crate) fn encode(data: &[u8], item: usize, out: &mut Vec<u8>) {
    let at = |i: usize| &data[i * item..(i + 1) * item];
    for p in plan(data.len() / item, 128, |a, b| at(a) == at(b)) {
        if p.run {
            out.push(0x80 | (p.len - 1) as u8);
            out.extend_from_slice(at(p.start));
        } else {
            out.push((p.len - 1) as u8);
            out.extend_from_slice(&data[p.start * item..(p.start + p.len) * item]);
        }
    }
}

/// Expands packets of `item`-byte values until `out` is full.
///
/// Packets may overrun the end of a scanline; counts are clamped to the
/// space left. Returns the input bytes consumed, or `None` if the input
/// ends early.
pub(crate) fn decode(input: &[u8], out: &mut [u8], item: usize) -> Option<usize> {
    let mut i = 0;
    let mut pos = 0;
    while pos < out.len() {
        let packet = *input.get(i)?;
        i += 1;
        let count = ((packet & 0x7f) as usize + 1).min((out.len() - pos) / item);
        if packet & 0x80 != 0 {
            let value = input.get(i..i + item)?;
            for _ in 0..count {
                out[pos..pos + item].copy_from_slice(value);
                pos += item;
            }
            i += item;
        } else {
            let n = count * item;
            out[pos..pos + n].copy_from_slice(input.get(i..i + n)?);
            pos += n;
            i += n;
        }
        if count == 0 {
            // Less than one item of space left.
            return None;
        }
    }
    Some(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan() {
        let data = [5, 5, 5, 1, 2, 3, 3];
        let packets = plan(data.len(), 128, |a, b| data[a] == data[b]);
        let summary: Vec<_> = packets.iter().map(|p| (p.start, p.len, p.run)).collect();
        assert_eq!(summary, vec![(0, 3, true), (3, 2, false), (5, 2, true)]);
        assert!(plan(0, 128, |_, _| true).is_empty());
    }

    #[test]
    fn test_encode_packets() {
        let mut out = Vec::new();
        encode(&[5, 5, 5, 1, 2, 3, 3], 1, &mut out);
        assert_eq!(out, vec![0x82, 5, 0x01, 1, 2, 0x81, 3]);

        out.clear();
        encode(&[9u8; 300], 1, &mut out);
        assert_eq!(out, vec![0xff, 9, 0xff, 9, 0xab, 9]);
    }

    #[test]
    fn test_encode_decode() {
        let data: Vec<u8> = (0..90u32).map(|i| if i % 30 < 12 { 7 } else { i as u8 }).collect();
        let mut packed = Vec::new();
        encode(&data, 3, &mut packed);
        let mut back = vec![0u8; data.len()];
        assert_eq!(decode(&packed, &mut back, 3), Some(packed.len()));
        assert_eq!(back, data);
    }

    #[test]
    fn test_decode_truncated() {
        let mut out = [0u8; 4];
        assert_eq!(decode(&[0x83], &mut out, 1), None);
        assert_eq!(decode(&[0x03, 1, 2], &mut out, 1), None);
        assert_eq!(decode(&[0x81, 1, 0x00, 2, 0x00, 3], &mut out[..3], 1), Some(4));
    }
}
