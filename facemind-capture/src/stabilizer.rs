use anyhow::Result;
use log::debug;

use crate::embedding::Embedding;
use crate::source::FrameSource;

/// Capture progress for a stream of frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Searching,
    Stabilizing { count: u32 },
    Captured,
}

/// Waits for a face to stay in view for a number of consecutive frames before
/// handing its embedding out for enrollment.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    required_frames: u32,
    state: CaptureState,
    captured: Option<Embedding>,
}

impl Default for Stabilizer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FRAMES)
    }
}

impl Stabilizer {
    pub const DEFAULT_FRAMES: u32 = 20;

    pub fn new(required_frames: u32) -> Self {
        Self {
            required_frames: required_frames.max(1),
            state: CaptureState::Searching,
            captured: None,
        }
    }

    /// Feed one frame. A frame without a face resets progress; once captured,
    /// further frames are ignored.
    pub fn observe(&mut self, face: Option<Embedding>) -> CaptureState {
        if self.state == CaptureState::Captured {
            return self.state;
        }

        self.state = match (self.state, face) {
            (_, None) => CaptureState::Searching,
            (CaptureState::Searching, Some(embedding)) => self.advance(1, embedding),
            (CaptureState::Stabilizing { count }, Some(embedding)) => {
                self.advance(count + 1, embedding)
            }
            (CaptureState::Captured, Some(_)) => CaptureState::Captured,
        };
        self.state
    }

    fn advance(&mut self, count: u32, embedding: Embedding) -> CaptureState {
        if count >= self.required_frames {
            self.captured = Some(embedding);
            CaptureState::Captured
        } else {
            CaptureState::Stabilizing { count }
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn required_frames(&self) -> u32 {
        self.required_frames
    }

    pub fn captured(&self) -> Option<&Embedding> {
        self.captured.as_ref()
    }

    pub fn into_captured(self) -> Option<Embedding> {
        self.captured
    }
}

/// Drain `source` until a face has been stable for `required_frames` frames.
/// Returns `None` if the stream ends first.
pub fn capture<S: FrameSource + ?Sized>(
    source: &mut S,
    required_frames: u32,
) -> Result<Option<Embedding>> {
    let mut stabilizer = Stabilizer::new(required_frames);
    let mut frames = 0usize;

    while let Some(frame) = source.next_frame()? {
        frames += 1;
        let state = stabilizer.observe(frame.into_face());
        debug!("frame {}: {:?}", frames, state);
        if state == CaptureState::Captured {
            return Ok(stabilizer.into_captured());
        }
    }

    debug!("frame stream ended after {} frames without a stable face", frames);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32) -> Option<Embedding> {
        Some(Embedding::new(vec![x, 1.0]).unwrap())
    }

    #[test]
    fn test_counts_consecutive_faces() {
        let mut s = Stabilizer::new(3);
        assert_eq!(s.state(), CaptureState::Searching);
        assert_eq!(s.observe(face(1.0)), CaptureState::Stabilizing { count: 1 });
        assert_eq!(s.observe(face(2.0)), CaptureState::Stabilizing { count: 2 });
        assert_eq!(s.observe(face(3.0)), CaptureState::Captured);
        assert_eq!(s.captured().unwrap().to_vec(), vec![3.0, 1.0]);
    }

    #[test]
    fn test_missing_face_resets() {
        let mut s = Stabilizer::new(2);
        s.observe(face(1.0));
        assert_eq!(s.observe(None), CaptureState::Searching);
        assert_eq!(s.observe(face(1.0)), CaptureState::Stabilizing { count: 1 });
        assert!(s.captured().is_none());
    }

    #[test]
    fn test_captured_is_terminal() {
        let mut s = Stabilizer::new(1);
        assert_eq!(s.observe(face(1.0)), CaptureState::Captured);
        assert_eq!(s.observe(None), CaptureState::Captured);
        assert_eq!(s.observe(face(9.0)), CaptureState::Captured);
        assert_eq!(s.into_captured().unwrap().to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_zero_frames_means_one() {
        let s = Stabilizer::new(0);
        assert_eq!(s.required_frames(), 1);
        assert_eq!(Stabilizer::default().required_frames(), 20);
    }
}
