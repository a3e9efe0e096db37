//! Stream resynchronizer for the particulate sensor's serial link.
//!
//! Serial reads return whatever happened to arrive: nothing, half a frame,
//! or several frames with line noise in between. [`FrameReader`] keeps the
//! unconsumed tail between reads and drains every complete frame out of it
//! after each chunk, trimming the buffer the way [`decode`] says to.

use heapless::Vec;

use crate::frame::{decode, Decode, DecodedReading, FRAME_LEN};

/// Accumulation buffer size. After a drain at most `FRAME_LEN - 1` bytes
/// remain, so a chunk of up to `BUF_CAP - FRAME_LEN` always fits.
pub const BUF_CAP: usize = FRAME_LEN * 8;

/// Per-chunk bookkeeping returned by [`FrameReader::feed`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedStats {
    /// Valid frames handed to the callback
    pub frames: u32,
    /// Windows dropped on checksum mismatch
    pub corrupt: u32,
    /// Checksum-valid frames dropped by the sanity ceiling
    pub implausible: u32,
}

/// Frame resynchronizer state machine.
/// Accumulates bytes until a full frame is present, then yields it.
pub struct FrameReader {
    buf: Vec<u8, BUF_CAP>,
}

impl FrameReader {
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Bytes currently held waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Feed one chunk from the link. `on_frame` is called once per valid
    /// frame, in stream order. Corrupt and implausible frames are skipped
    /// silently apart from the returned counts.
    pub fn feed(&mut self, mut chunk: &[u8], mut on_frame: impl FnMut(DecodedReading)) -> FeedStats {
        let mut stats = FeedStats::default();

        // Also runs once for an empty chunk, which is a no-op drain.
        loop {
            let room = BUF_CAP - self.buf.len();
            let take = room.min(chunk.len());
            // Cannot fail: `take` is bounded by the remaining capacity.
            let _ = self.buf.extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];

            self.drain(&mut stats, &mut on_frame);

            if chunk.is_empty() {
                return stats;
            }
        }
    }

    fn drain(&mut self, stats: &mut FeedStats, on_frame: &mut impl FnMut(DecodedReading)) {
        loop {
            match decode(&self.buf) {
                Decode::Frame { reading, consumed } => {
                    stats.frames += 1;
                    self.discard(consumed);
                    on_frame(reading);
                }
                Decode::Corrupt { consumed } => {
                    stats.corrupt += 1;
                    log::debug!("Dropped frame with bad checksum");
                    self.discard(consumed);
                }
                Decode::Implausible { reading, consumed } => {
                    stats.implausible += 1;
                    log::debug!("Dropped implausible frame: {:?}", reading.atm);
                    self.discard(consumed);
                }
                Decode::NotFound { keep_from } => {
                    self.discard(keep_from);
                    return;
                }
            }
        }
    }

    fn discard(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.copy_within(n.., 0);
        self.buf.truncate(self.buf.len() - n);
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}
