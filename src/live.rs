//! Capture → annotate → preview loop shared by `verify` and `recognize`.
//!
//! The loop is a two state machine. It leaves `Running` only when a frame
//! cannot be captured or the preview reports quit. Annotators swallow their
//! own per-frame failures, so analysis errors never stop the loop.

use anyhow::Result;
use image::RgbImage;

use crate::preview::Preview;
use crate::FrameSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    CaptureFailed,
    QuitRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: u64,
    pub reason: StopReason,
}

/// Per-frame analysis that draws its verdict onto the frame.
pub trait FrameAnnotator {
    fn annotate(&mut self, frame: &mut RgbImage);
}

/// Owns the frame source and the preview; both are released on drop.
pub struct LiveLoop<S, P> {
    source: S,
    preview: P,
    state: LoopState,
    frames: u64,
}

impl<S: FrameSource, P: Preview> LiveLoop<S, P> {
    pub fn new(source: S, preview: P) -> Self {
        Self {
            source,
            preview,
            state: LoopState::Running,
            frames: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Run one iteration. Returns why the loop stopped, if it did.
    ///
    /// Errors only come from the preview; those are fatal.
    pub fn step(&mut self, annotator: &mut impl FrameAnnotator) -> Result<Option<StopReason>> {
        if self.state == LoopState::Stopped {
            return Ok(None);
        }

        let mut frame = match self.source.frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("failed to grab frame: {:#}", e);
                self.state = LoopState::Stopped;
                return Ok(Some(StopReason::CaptureFailed));
            }
        };
        self.frames += 1;

        annotator.annotate(&mut frame);
        self.preview.show(&frame)?;

        if self.preview.quit_requested() {
            self.state = LoopState::Stopped;
            return Ok(Some(StopReason::QuitRequested));
        }
        Ok(None)
    }

    /// Loop until stopped, then release the camera and the preview.
    pub fn run(mut self, annotator: &mut impl FrameAnnotator) -> Result<LoopSummary> {
        loop {
            if let Some(reason) = self.step(annotator)? {
                let summary = LoopSummary {
                    frames: self.frames,
                    reason,
                };
                log::info!("stopped after {} frame(s): {:?}", summary.frames, reason);
                return Ok(summary);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    struct Counting(usize);

    impl FrameAnnotator for Counting {
        fn annotate(&mut self, frame: &mut RgbImage) {
            self.0 += 1;
            frame.put_pixel(0, 0, image::Rgb([255, 255, 255]));
        }
    }

    #[test]
    fn test_capture_failure_stops_and_releases() {
        let source = ScriptedSource::new(3, 4, 4);
        let released = source.released.clone();
        let mut annotator = Counting(0);

        let summary = LiveLoop::new(source, RecordingPreview::default())
            .run(&mut annotator)
            .unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.reason, StopReason::CaptureFailed);
        assert_eq!(annotator.0, 3);
        assert!(released.get());
    }

    #[test]
    fn test_quit_key_stops() {
        let preview = RecordingPreview {
            quit_after: Some(2),
            ..Default::default()
        };
        let mut live = LiveLoop::new(ScriptedSource::new(10, 4, 4), preview);
        let mut annotator = Counting(0);

        assert_eq!(live.step(&mut annotator).unwrap(), None);
        assert_eq!(live.state(), LoopState::Running);
        assert_eq!(
            live.step(&mut annotator).unwrap(),
            Some(StopReason::QuitRequested)
        );
        assert_eq!(live.state(), LoopState::Stopped);

        // Stopped is terminal
        assert_eq!(live.step(&mut annotator).unwrap(), None);
        assert_eq!(live.frames(), 2);
        assert_eq!(annotator.0, 2);
    }

    #[test]
    fn test_annotated_frame_is_shown() {
        let mut live = LiveLoop::new(ScriptedSource::new(1, 2, 2), RecordingPreview::default());
        live.step(&mut Counting(0)).unwrap();
        assert_eq!(live.preview.shown.len(), 1);
        assert_eq!(live.preview.shown[0].get_pixel(0, 0).0, [255, 255, 255]);
    }
}
