use crate::frame::Frame;

use super::mask::ForegroundMask;

/// Background segmenter trait.
///
/// A model owns the statistics of exactly one stream of frames. Callers must
/// feed frames of one size per stream; `dimensions` reports the size a model
/// has locked onto so a caller can `reset` (or build a new model) before a
/// change instead of violating that contract.
pub trait BackgroundModel: Send {
    /// Model identifier.
    fn name(&self) -> &'static str;

    /// Classify every pixel of `frame` and fold it into the model.
    ///
    /// Panics when `frame` differs in size from earlier frames of the stream.
    fn apply(&mut self, frame: &Frame) -> ForegroundMask;

    /// Forget all statistics; the next frame starts a new stream.
    fn reset(&mut self);

    /// Frame size of the current stream, `None` before the first frame.
    fn dimensions(&self) -> Option<(u32, u32)>;
}
