use heapless::Vec;

use super::{
    patch_lengths, Datagram, Error, FragmentHeader, HeaderCompression,
    MAX_UNCOMPRESSED_HEADER_LEN,
};
use crate::config::{FRAG_REASSEMBLY_TIMEOUT, REASS_BUFFER_SIZE};
use crate::time::Instant;

const BLOCKS: usize = REASS_BUFFER_SIZE.div_ceil(8);
const BLOCK_WORDS: usize = BLOCKS.div_ceil(32);

/// A datagram being reassembled.
struct Entry {
    size: u16,
    tag: u16,
    deadline: Instant,
    received: usize,
    /// One bit per 8-octet block of the datagram.
    blocks: [u32; BLOCK_WORDS],
    buffer: Datagram,
}

impl Entry {
    fn new(size: u16, tag: u16, deadline: Instant) -> Result<Self, Error> {
        let mut buffer = Datagram::new();
        buffer
            .resize(size as usize, 0)
            .map_err(|_| Error::TooLarge)?;

        Ok(Self {
            size,
            tag,
            deadline,
            received: 0,
            blocks: [0; BLOCK_WORDS],
            buffer,
        })
    }

    fn block_range(offset: usize, len: usize) -> core::ops::Range<usize> {
        offset / 8..(offset + len).div_ceil(8)
    }

    fn overlaps(&self, offset: usize, len: usize) -> bool {
        Self::block_range(offset, len).any(|b| self.blocks[b / 32] & (1 << (b % 32)) != 0)
    }

    fn mark(&mut self, offset: usize, len: usize) {
        for b in Self::block_range(offset, len) {
            self.blocks[b / 32] |= 1 << (b % 32);
        }
    }

    /// Place `parts` one after the other at `offset`.
    fn write(&mut self, offset: usize, parts: &[&[u8]]) -> Result<(), Error> {
        let len: usize = parts.iter().map(|p| p.len()).sum();
        if len == 0 || offset + len > self.size as usize {
            return Err(Error::Malformed);
        }
        if self.overlaps(offset, len) {
            return Err(Error::Overlap);
        }

        let mut at = offset;
        for part in parts {
            self.buffer[at..at + part.len()].copy_from_slice(part);
            at += part.len();
        }
        self.mark(offset, len);
        self.received += len;
        Ok(())
    }
}

/// A bounded set of datagrams being reassembled, keyed by datagram size and
/// tag.
///
/// Entries are created by the first fragment seen of a datagram, whatever its
/// offset, and released on completion, on timeout or by [`clear`]. When every
/// entry is in use, fragments of new datagrams are dropped; entries in
/// progress are never evicted.
///
/// [`clear`]: ReassemblyCache::clear
pub struct ReassemblyCache<const N: usize> {
    entries: Vec<Entry, N>,
}

impl<const N: usize> Default for ReassemblyCache<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ReassemblyCache<N> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of datagrams in progress.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every datagram in progress.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Earliest deadline of the datagrams in progress.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Drop datagrams whose deadline passed. Returns how many were dropped.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| {
            if e.deadline <= now {
                debug!("reassembly of tag {} timed out", e.tag);
                false
            } else {
                true
            }
        });
        before - self.entries.len()
    }

    /// Process a fragment. Returns the datagram once it is complete.
    ///
    /// Fragments that are malformed, overlap received data or do not fit are
    /// dropped with an error. A datagram already in progress stays so; one
    /// the rejected fragment would have started is not kept.
    pub fn input<H: HeaderCompression>(
        &mut self,
        fragment: &[u8],
        now: Instant,
        hc: &H,
    ) -> Result<Option<Datagram>, Error> {
        self.expire(now);

        let header = FragmentHeader::parse(fragment)?;
        if header.size == 0 {
            return Err(Error::Malformed);
        }
        if header.size as usize > REASS_BUFFER_SIZE {
            return Err(Error::TooLarge);
        }
        let payload = &fragment[header.header_len()..];

        let (index, created) = match self
            .entries
            .iter()
            .position(|e| e.size == header.size && e.tag == header.tag)
        {
            Some(index) => (index, false),
            None => {
                let entry = Entry::new(header.size, header.tag, now + FRAG_REASSEMBLY_TIMEOUT)?;
                if self.entries.push(entry).is_err() {
                    debug!("reassembly cache full, dropping tag {}", header.tag);
                    return Err(Error::CacheFull);
                }
                (self.entries.len() - 1, true)
            }
        };
        let entry = &mut self.entries[index];

        let written = match header.offset {
            None => {
                let mut restored = [0u8; MAX_UNCOMPRESSED_HEADER_LEN];
                hc.decompress(payload, &mut restored)
                    .and_then(|(consumed, written)| {
                        entry.write(0, &[&restored[..written], &payload[consumed..]])
                    })
            }
            Some(offset) => entry.write(offset, &[payload]),
        };
        if let Err(err) = written {
            // A rejected first fragment leaves no entry behind.
            if created {
                self.entries.swap_remove(index);
            }
            return Err(err);
        }

        let entry = &self.entries[index];
        if entry.received < entry.size as usize {
            return Ok(None);
        }

        let mut entry = self.entries.swap_remove(index);
        patch_lengths(&mut entry.buffer);
        Ok(Some(entry.buffer))
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;
    use crate::sixlowpan::tests::udp_datagram;
    use crate::sixlowpan::{compress, Fragmenter, Uncompressed};
    use crate::time::Duration;

    fn fragments(packet: &[u8], capacity: usize, tag: u16) -> Vec<Vec<u8>> {
        let mut compressed_buffer = vec![0u8; packet.len() + 1];
        let compressed = compress(&Uncompressed, packet, &mut compressed_buffer).unwrap();
        let mut fragmenter = Fragmenter::new(&compressed_buffer, compressed, tag).unwrap();
        let mut out = [0u8; 127];
        let mut fragments = Vec::new();
        while let Some(len) = fragmenter.next_fragment(capacity, &mut out).unwrap() {
            fragments.push(out[..len].to_vec());
        }
        fragments
    }

    fn reassemble(
        cache: &mut ReassemblyCache<2>,
        fragments: &[Vec<u8>],
        now: Instant,
    ) -> Option<Datagram> {
        let mut result = None;
        for fragment in fragments {
            assert!(result.is_none(), "completed before the last fragment");
            result = cache.input(fragment, now, &Uncompressed).unwrap();
        }
        result
    }

    #[test]
    fn reassembly_is_idempotent() {
        // Payloads around the block size, a frame and ten frames.
        for len in [1, 7, 8, 9, 100, 126, 1270] {
            let packet = udp_datagram(len);
            let fragments = fragments(&packet, 48, len as u16);
            assert!(fragments.len() >= 2, "{len} octets were not fragmented");

            for fragment in &fragments[1..fragments.len() - 1] {
                assert_eq!((fragment.len() - 5) % 8, 0);
            }

            let mut cache = ReassemblyCache::<2>::new();
            let datagram = reassemble(&mut cache, &fragments, Instant::from_ms(0)).unwrap();
            assert_eq!(&datagram[..], &packet[..], "payload of {len} octets");
            assert!(cache.is_empty());
        }
    }

    #[test]
    fn out_of_order_fragments() {
        let packet = udp_datagram(300);
        let mut fragments = fragments(&packet, 100, 42);
        fragments.reverse();

        let mut cache = ReassemblyCache::<2>::new();
        let datagram = reassemble(&mut cache, &fragments, Instant::from_ms(0)).unwrap();
        assert_eq!(&datagram[..], &packet[..]);
    }

    #[test]
    fn overlapping_fragment_is_dropped() {
        let packet = udp_datagram(300);
        let fragments = fragments(&packet, 100, 1);
        let mut cache = ReassemblyCache::<2>::new();
        let now = Instant::from_ms(0);

        assert_eq!(cache.input(&fragments[1], now, &Uncompressed), Ok(None));
        assert_eq!(
            cache.input(&fragments[1], now, &Uncompressed),
            Err(Error::Overlap)
        );

        // A fragment running past the datagram size.
        let mut beyond = fragments[2].clone();
        beyond[4] = 40;
        assert_eq!(
            cache.input(&beyond, now, &Uncompressed),
            Err(Error::Malformed)
        );

        for fragment in fragments.iter().filter(|f| **f != fragments[1]) {
            let _ = cache.input(fragment, now, &Uncompressed);
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_bound_does_not_evict() {
        let packet = udp_datagram(300);
        let now = Instant::from_ms(0);
        let mut cache = ReassemblyCache::<2>::new();

        let first = fragments(&packet, 100, 1);
        let second = fragments(&packet, 100, 2);
        let third = fragments(&packet, 100, 3);

        assert_eq!(cache.input(&first[0], now, &Uncompressed), Ok(None));
        assert_eq!(cache.input(&second[0], now, &Uncompressed), Ok(None));
        assert_eq!(
            cache.input(&third[0], now, &Uncompressed),
            Err(Error::CacheFull)
        );
        assert_eq!(cache.len(), 2);

        let datagram = reassemble(&mut cache, &first[1..], now).unwrap();
        assert_eq!(&datagram[..], &packet[..]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn rejected_fragments_release_their_entry() {
        let packet = udp_datagram(300);
        let now = Instant::from_ms(0);
        let mut cache = ReassemblyCache::<2>::new();

        // FRAGN of a 100-octet datagram at offset 320.
        for tag in [7u8, 8] {
            let fragment = [0xe0, 100, 0x00, tag, 40, 0xaa, 0xbb];
            assert_eq!(
                cache.input(&fragment, now, &Uncompressed),
                Err(Error::Malformed)
            );
        }
        assert!(cache.is_empty());

        // FRAG1 with a dispatch the compressor does not know.
        let fragment = [0xc0, 100, 0x00, 9, 0x7f, 0x00];
        assert_eq!(
            cache.input(&fragment, now, &Uncompressed),
            Err(Error::UnsupportedDispatch)
        );
        assert!(cache.is_empty());

        let fragments = fragments(&packet, 100, 10);
        assert_eq!(cache.input(&fragments[0], now, &Uncompressed), Ok(None));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn timeout_discards_partial_datagrams() {
        let packet = udp_datagram(300);
        let fragments = fragments(&packet, 100, 9);
        let mut cache = ReassemblyCache::<2>::new();
        let start = Instant::from_ms(0);

        cache.input(&fragments[0], start, &Uncompressed).unwrap();
        assert_eq!(cache.next_deadline(), Some(start + FRAG_REASSEMBLY_TIMEOUT));

        // The rest arrives too late: it starts a new datagram that never
        // completes.
        let late = start + FRAG_REASSEMBLY_TIMEOUT + Duration::from_ms(1);
        for fragment in &fragments[1..] {
            assert_eq!(cache.input(fragment, late, &Uncompressed), Ok(None));
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.expire(late + FRAG_REASSEMBLY_TIMEOUT), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn oversized_datagram_is_refused() {
        let mut cache = ReassemblyCache::<2>::new();
        let fragment = [0xc7, 0xff, 0x00, 0x01, 0x41];
        assert_eq!(
            cache.input(&fragment, Instant::from_ms(0), &Uncompressed),
            Err(Error::TooLarge)
        );
        assert!(cache.is_empty());
    }
}
