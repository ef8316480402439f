use crate::frame::{FrameSample, frame_timestamp};
use crate::video::VideoDecoder;

/// Number of frames sampled from a video when the caller does not say otherwise.
pub const DEFAULT_NUM_FRAMES: usize = 8;

/// Returns the frame indices visited when sampling `num_frames` frames out of
/// `total` frames.
///
/// Indices start at 0 and advance by `max(1, total / num_frames)`, stopping at
/// the end of the video or once `num_frames` indices have been produced.
pub fn sample_indices(total: usize, num_frames: usize) -> impl Iterator<Item = usize> {
    let stride = (total / num_frames.max(1)).max(1);
    (0..total).step_by(stride).take(num_frames)
}

/// Extracts evenly spaced frames from `decoder`.
///
/// Frames that fail to decode are skipped, so the result may hold fewer than
/// `num_frames` samples and is empty for a video without frames.
pub fn sample_frames<D: VideoDecoder + ?Sized>(
    decoder: &mut D,
    num_frames: usize,
) -> Vec<FrameSample> {
    let total = decoder.frame_count();
    let fps = decoder.fps();

    let mut samples = Vec::with_capacity(num_frames.min(total));
    for index in sample_indices(total, num_frames) {
        let Some(frame) = decoder.decode_frame(index) else {
            log::debug!("Skipping frame {} that could not be decoded", index);
            continue;
        };

        let image = match frame.into_rgb() {
            Ok(image) => image,
            Err(e) => {
                log::debug!("Skipping frame {} with a malformed buffer: {}", index, e);
                continue;
            }
        };

        samples.push(FrameSample {
            image,
            timestamp: frame_timestamp(index, fps),
            frame_index: index,
        });
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DecodedFrame, PixelFormat};
    use std::collections::HashSet;

    struct FakeDecoder {
        total: usize,
        fps: f64,
        broken: HashSet<usize>,
        seeks: Vec<usize>,
    }

    impl FakeDecoder {
        fn new(total: usize, fps: f64) -> Self {
            Self {
                total,
                fps,
                broken: HashSet::new(),
                seeks: Vec::new(),
            }
        }
    }

    impl VideoDecoder for FakeDecoder {
        fn frame_count(&self) -> usize {
            self.total
        }

        fn fps(&self) -> f64 {
            self.fps
        }

        fn decode_frame(&mut self, index: usize) -> Option<DecodedFrame> {
            self.seeks.push(index);
            if self.broken.contains(&index) {
                return None;
            }
            Some(DecodedFrame {
                width: 1,
                height: 1,
                format: PixelFormat::Bgr24,
                data: vec![0, 0, (index % 256) as u8],
            })
        }
    }

    #[test]
    fn samples_are_bounded_and_increasing() {
        for total in [0, 1, 5, 7, 8, 9, 15, 16, 17, 100, 241, 1000] {
            for n in [1, 3, 8, 10] {
                let mut decoder = FakeDecoder::new(total, 30.0);
                let samples = sample_frames(&mut decoder, n);

                assert!(samples.len() <= n, "total={total} n={n}");
                assert!(samples.iter().all(|s| s.frame_index < total));
                assert!(
                    samples
                        .windows(2)
                        .all(|w| w[0].frame_index < w[1].frame_index)
                );
                if total > 0 {
                    assert_eq!(samples.len(), n.min(total));
                }
            }
        }
    }

    #[test]
    fn stride_is_floor_of_total_over_count() {
        let indices: Vec<_> = sample_indices(100, 8).collect();
        assert_eq!(indices, vec![0, 12, 24, 36, 48, 60, 72, 84]);

        let indices: Vec<_> = sample_indices(90, 10).collect();
        assert_eq!(indices, vec![0, 9, 18, 27, 36, 45, 54, 63, 72, 81]);
    }

    #[test]
    fn empty_video_yields_no_samples() {
        let mut decoder = FakeDecoder::new(0, 30.0);
        assert!(sample_frames(&mut decoder, 8).is_empty());
        assert!(decoder.seeks.is_empty());
    }

    #[test]
    fn broken_frames_are_skipped_not_replaced() {
        let mut decoder = FakeDecoder::new(80, 10.0);
        decoder.broken.insert(20);
        decoder.broken.insert(50);

        let samples = sample_frames(&mut decoder, 8);
        let indices: Vec<_> = samples.iter().map(|s| s.frame_index).collect();
        assert_eq!(indices, vec![0, 10, 30, 40, 60, 70]);
        assert_eq!(decoder.seeks.len(), 8);
    }

    #[test]
    fn timestamps_and_colour_layout() {
        let mut decoder = FakeDecoder::new(240, 30.0);
        let samples = sample_frames(&mut decoder, 8);
        let third = &samples[3];
        assert_eq!(third.frame_index, 90);
        assert_eq!(third.timestamp, 3.0);
        // decoder hands out BGR, samples carry RGB
        assert_eq!(third.image.as_slice(), &[90, 0, 0]);

        let mut decoder = FakeDecoder::new(240, 0.0);
        let samples = sample_frames(&mut decoder, 8);
        assert!(samples.iter().all(|s| s.timestamp == 0.0));
    }
}
