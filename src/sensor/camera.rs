//! Camera sample source

use tracing::trace;

use super::{Reading, SampleOutcome, SampleSource};
use crate::error::Result;
use crate::hal::Camera;

/// Sample source wrapping a continuous-capture camera
///
/// Frames are passed through untouched; JPEG validity is the driver's concern.
pub struct CameraSource<C: Camera> {
    camera: C,
    captured: u64,
}

impl<C: Camera> CameraSource<C> {
    pub fn new(camera: C) -> Self {
        Self { camera, captured: 0 }
    }

    /// Number of frames captured so far
    pub fn captured(&self) -> u64 {
        self.captured
    }
}

impl<C: Camera + 'static> SampleSource for CameraSource<C> {
    fn name(&self) -> &'static str {
        "camera"
    }

    fn sample(&mut self) -> Result<SampleOutcome> {
        match self.camera.capture()? {
            // An empty capture cannot be framed; treat it as a dropped frame
            Some(image) if image.is_empty() => Ok(SampleOutcome::Skipped),
            Some(image) => {
                self.captured += 1;
                trace!("Captured frame {} ({} bytes)", self.captured, image.len());
                Ok(SampleOutcome::Ready(Reading::ImageFrame(image)))
            }
            None => Ok(SampleOutcome::Exhausted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ListCamera(VecDeque<Vec<u8>>);

    impl Camera for ListCamera {
        fn capture(&mut self) -> Result<Option<Vec<u8>>> {
            Ok(self.0.pop_front())
        }
    }

    #[test]
    fn test_camera_source_yields_frames_then_exhausts() {
        let camera = ListCamera(vec![b"img1".to_vec(), Vec::new(), b"img2".to_vec()].into());
        let mut source = CameraSource::new(camera);

        assert_eq!(
            source.sample().unwrap(),
            SampleOutcome::Ready(Reading::ImageFrame(b"img1".to_vec()))
        );
        assert_eq!(source.sample().unwrap(), SampleOutcome::Skipped);
        assert_eq!(
            source.sample().unwrap(),
            SampleOutcome::Ready(Reading::ImageFrame(b"img2".to_vec()))
        );
        assert_eq!(source.sample().unwrap(), SampleOutcome::Exhausted);
        assert_eq!(source.captured(), 2);
    }
}
