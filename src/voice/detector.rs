//! Energy-gated speech segmentation
//!
//! Splits a continuous sample stream into utterance segments: speech begins
//! when RMS energy crosses a threshold and ends after a sustained silence
//! window. Both the wake engine and the speech engine run on these segments.

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to keep a segment (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// Silence duration with no speech at all before the cycle times out
const IDLE_TIMEOUT_SAMPLES: usize = 80_000; // 5 seconds

/// Outcome of feeding one chunk into the segmenter
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvent {
    /// Still waiting or accumulating
    Pending,
    /// A complete utterance segment (speech followed by silence)
    Segment(Vec<f32>),
    /// Silence accumulated without enough speech; cycle timed out
    TimedOut,
}

/// State of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmenterState {
    /// Waiting for speech
    Idle,
    /// Detected potential speech, accumulating
    Accumulating,
}

/// Segments speech out of a continuous audio stream
pub struct SpeechSegmenter {
    state: SegmenterState,
    speech_buffer: Vec<f32>,
    /// Samples in chunks that crossed the energy threshold; trailing silence
    /// is buffered but does not count toward the minimum
    speech_samples: usize,
    silence_counter: usize,
    /// Silence observed while idle; a full listening window of it times the
    /// cycle out
    idle_counter: usize,
}

impl SpeechSegmenter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SegmenterState::Idle,
            speech_buffer: Vec::new(),
            speech_samples: 0,
            silence_counter: 0,
            idle_counter: 0,
        }
    }

    /// Feed a chunk of samples; returns a segment when one completes
    pub fn feed(&mut self, samples: &[f32]) -> SegmentEvent {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmenterState::Idle => {
                if is_speech {
                    self.state = SegmenterState::Accumulating;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.speech_samples = samples.len();
                    self.silence_counter = 0;
                    self.idle_counter = 0;
                    tracing::trace!(energy, "speech detected, accumulating");
                    return SegmentEvent::Pending;
                }

                self.idle_counter += samples.len();
                if self.idle_counter > IDLE_TIMEOUT_SAMPLES {
                    tracing::trace!("no speech within the listening window");
                    self.idle_counter = 0;
                    return SegmentEvent::TimedOut;
                }
                SegmentEvent::Pending
            }
            SegmenterState::Accumulating => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                tracing::trace!(
                    buffer_len = self.speech_buffer.len(),
                    speech = self.speech_samples,
                    silence = self.silence_counter,
                    is_speech,
                    energy,
                    "accumulating"
                );

                // Enough speech followed by sustained silence completes the segment
                if self.silence_counter > SILENCE_SAMPLES && self.speech_samples > MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(samples = self.speech_buffer.len(), "speech segment complete");
                    self.state = SegmenterState::Idle;
                    self.speech_samples = 0;
                    self.silence_counter = 0;
                    return SegmentEvent::Segment(std::mem::take(&mut self.speech_buffer));
                }

                // Too much silence without enough speech
                if self.silence_counter > SILENCE_SAMPLES * 2 {
                    tracing::trace!("segment timeout, resetting");
                    self.reset();
                    return SegmentEvent::TimedOut;
                }

                SegmentEvent::Pending
            }
        }
    }

    /// Reset to idle, discarding any accumulated speech
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.speech_buffer.clear();
        self.speech_samples = 0;
        self.silence_counter = 0;
        self.idle_counter = 0;
    }
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
