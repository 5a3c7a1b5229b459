//! Playback sources and mixing.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::device::StreamFormat;
use crate::error::AudioError;
use crate::format::convert;
use crate::{AudioResult, MAX_QUEUED_BUFFERS};

/// Opaque handle to a playback source.
///
/// Ids carry a generation so a destroyed source's id never aliases a newer
/// source that reuses the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId {
    index: u32,
    generation: u32,
}

impl SourceId {
    /// The reserved source used for one-shot sounds.
    pub const MAIN: SourceId = SourceId {
        index: 0,
        generation: 0,
    };

    /// Returns true for the reserved one-shot source.
    pub fn is_main(self) -> bool {
        self == Self::MAIN
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source#{}.{}", self.index, self.generation)
    }
}

/// A buffer in device format plus a read cursor.
#[derive(Debug)]
struct QueuedBuffer {
    samples: Vec<i16>,
    position: usize,
}

impl QueuedBuffer {
    fn remaining(&self) -> &[i16] {
        &self.samples[self.position..]
    }

    fn is_exhausted(&self) -> bool {
        self.position >= self.samples.len()
    }
}

/// One mixable stream.
#[derive(Debug, Default)]
struct PlaybackSource {
    queue: VecDeque<QueuedBuffer>,
    active: bool,
}

impl PlaybackSource {
    /// Add this source's next samples into `mix`; returns samples written.
    fn mix_into(&mut self, mix: &mut [f32]) -> usize {
        let mut written = 0;

        for buffer in self.queue.iter_mut() {
            if written == mix.len() {
                break;
            }
            let take = buffer.remaining().len().min(mix.len() - written);
            for (m, &s) in mix[written..written + take]
                .iter_mut()
                .zip(&buffer.remaining()[..take])
            {
                *m += s as f32 / 32768.0;
            }
            buffer.position += take;
            written += take;
        }

        written
    }

    fn pending_buffers(&self) -> usize {
        self.queue.iter().filter(|b| !b.is_exhausted()).count()
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.active = false;
    }
}

struct Slot {
    generation: u32,
    source: Option<PlaybackSource>,
}

/// Counters maintained by the mixer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerStats {
    /// Buffers fully rendered and retired by [`Mixer::sweep`].
    pub buffers_played: u64,

    /// Render periods in which an active source ran out of data.
    pub underruns: u64,
}

/// Arena of playback sources mixed into the output device format.
pub struct Mixer {
    format: StreamFormat,
    volume: f32,
    slots: Vec<Slot>,
    free: Vec<u32>,
    scratch: Vec<f32>,
    stats: MixerStats,
}

impl Mixer {
    /// Create a mixer producing `format`, holding only the main source.
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            volume: 1.0,
            slots: vec![Slot {
                generation: 0,
                source: Some(PlaybackSource::default()),
            }],
            free: Vec::new(),
            scratch: Vec::new(),
            stats: MixerStats::default(),
        }
    }

    /// Output format.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Change the output format. Queued audio is in the old format and is dropped.
    pub fn set_format(&mut self, format: StreamFormat) {
        if self.format != format {
            self.clear_all();
            self.format = format;
        }
    }

    /// Master volume (0.0 - 1.0).
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Set master volume, clamped to [0, 1].
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = 0f32.max(1f32.min(volume));
    }

    /// Allocate a peer source.
    pub fn create_source(&mut self) -> SourceId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.source = Some(PlaybackSource::default());
            return SourceId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            source: Some(PlaybackSource::default()),
        });
        SourceId {
            index,
            generation: 0,
        }
    }

    /// Release a peer source. Returns false for unknown ids and the main source.
    pub fn destroy_source(&mut self, id: SourceId) -> bool {
        if id.is_main() || self.source_mut(id).is_none() {
            return false;
        }
        self.slots[id.index as usize].source = None;
        self.free.push(id.index);
        true
    }

    /// Returns true if `id` names a live source.
    pub fn contains(&self, id: SourceId) -> bool {
        self.source(id).is_some()
    }

    /// Number of live peer sources.
    pub fn peer_count(&self) -> usize {
        self.slots
            .iter()
            .skip(1)
            .filter(|s| s.source.is_some())
            .count()
    }

    /// Append PCM in `format` to the source's queue.
    pub fn enqueue(&mut self, id: SourceId, pcm: &[i16], format: StreamFormat) -> AudioResult<()> {
        if !self.contains(id) {
            return Err(AudioError::UnknownSource(id));
        }
        let samples = convert(pcm, format, self.format)?;

        let source = self.source_mut(id).ok_or(AudioError::UnknownSource(id))?;
        if source.queue.len() >= MAX_QUEUED_BUFFERS {
            trace!(%id, "Playback queue full, dropping oldest buffer");
            source.queue.pop_front();
        }
        source.queue.push_back(QueuedBuffer {
            samples,
            position: 0,
        });
        source.active = true;
        Ok(())
    }

    /// Replace the source's queue with a single buffer.
    pub fn replace(&mut self, id: SourceId, pcm: &[i16], format: StreamFormat) -> AudioResult<()> {
        if !self.contains(id) {
            return Err(AudioError::UnknownSource(id));
        }
        let samples = convert(pcm, format, self.format)?;

        let source = self.source_mut(id).ok_or(AudioError::UnknownSource(id))?;
        source.clear();
        source.queue.push_back(QueuedBuffer {
            samples,
            position: 0,
        });
        source.active = true;
        Ok(())
    }

    /// Drop everything queued on one source.
    pub fn clear(&mut self, id: SourceId) {
        if let Some(source) = self.source_mut(id) {
            source.clear();
        }
    }

    /// Drop everything queued on every source.
    pub fn clear_all(&mut self) {
        for source in self.slots.iter_mut().filter_map(|s| s.source.as_mut()) {
            source.clear();
        }
    }

    /// Buffers on the source that still have samples to play.
    pub fn queued_buffers(&self, id: SourceId) -> Option<usize> {
        self.source(id).map(PlaybackSource::pending_buffers)
    }

    /// Returns true while the source has audio left to play.
    pub fn is_active(&self, id: SourceId) -> bool {
        self.source(id).is_some_and(|s| s.active)
    }

    /// Mix all sources into `out` (interleaved, in [`format`](Self::format)).
    pub fn render(&mut self, out: &mut [i16]) {
        self.scratch.clear();
        self.scratch.resize(out.len(), 0.0);

        let mut starved = false;
        for source in self.slots.iter_mut().filter_map(|s| s.source.as_mut()) {
            if !source.active {
                continue;
            }
            let written = source.mix_into(&mut self.scratch);
            if written < out.len() {
                starved = true;
            }
        }
        if starved {
            self.stats.underruns += 1;
        }

        for (o, &m) in out.iter_mut().zip(&self.scratch) {
            let sample = soft_clip(m * self.volume);
            *o = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        }
    }

    /// Retire exhausted buffers and deactivate drained sources.
    ///
    /// Returns the number of buffers retired.
    pub fn sweep(&mut self) -> usize {
        let mut retired = 0;

        for source in self.slots.iter_mut().filter_map(|s| s.source.as_mut()) {
            while source.queue.front().is_some_and(QueuedBuffer::is_exhausted) {
                source.queue.pop_front();
                retired += 1;
            }
            if source.queue.is_empty() {
                source.active = false;
            }
        }

        self.stats.buffers_played += retired as u64;
        retired
    }

    /// Counters since creation.
    pub fn stats(&self) -> MixerStats {
        self.stats
    }

    fn source(&self, id: SourceId) -> Option<&PlaybackSource> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.source.as_ref()
    }

    fn source_mut(&mut self, id: SourceId) -> Option<&mut PlaybackSource> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.source.as_mut()
    }
}

/// Soft clipping function to prevent harsh digital clipping.
fn soft_clip(sample: f32) -> f32 {
    if sample > 1.0 {
        1.0 - (-sample + 1.0).exp() * 0.5
    } else if sample < -1.0 {
        -1.0 + (sample + 1.0).exp() * 0.5
    } else {
        sample
    }
}
