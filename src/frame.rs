use kornia_image::{Image, ImageError, ImageSize, allocator::CpuAllocator};

/// Interleaved 8-bit RGB image, as consumed by the vision-language models.
pub type RgbImage = Image<u8, 3, CpuAllocator>;

/// Pixel layout of a raw frame as produced by a video decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit blue, green, red. The native layout of most decoders.
    Bgr24,
    /// Packed 8-bit red, green, blue.
    Rgb24,
}

impl PixelFormat {
    /// Returns the name ffmpeg uses for this layout.
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgb24 => "rgb24",
        }
    }

    pub fn channels(&self) -> usize {
        3
    }
}

/// A frame exactly as it came out of the decoder.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl DecodedFrame {
    /// Converts the frame to a display-oriented RGB image.
    ///
    /// Fails when the buffer does not hold `width * height` pixels.
    pub fn into_rgb(self) -> Result<RgbImage, ImageError> {
        let size = ImageSize {
            width: self.width,
            height: self.height,
        };
        let image: RgbImage = Image::new(size, self.data, CpuAllocator)?;

        match self.format {
            PixelFormat::Rgb24 => Ok(image),
            PixelFormat::Bgr24 => {
                // swapping red and blue goes both ways
                let mut rgb: RgbImage = Image::from_size_val(size, 0u8, CpuAllocator)?;
                kornia_imgproc::color::bgr_from_rgb(&image, &mut rgb)?;
                Ok(rgb)
            }
        }
    }
}

/// Lays out a sequence of images on a grid, left to right then top to
/// bottom, in input order.
///
/// Every cell has the size of the first image; larger images are cropped
/// and smaller ones are padded with black. Used by single-image backends to
/// present a whole frame sequence in one pass. Returns `None` for an empty
/// sequence.
pub fn mosaic(images: &[RgbImage], columns: usize) -> Result<Option<RgbImage>, ImageError> {
    let Some(first) = images.first() else {
        return Ok(None);
    };
    let columns = columns.clamp(1, images.len());
    let rows = images.len().div_ceil(columns);
    let (cell_w, cell_h) = (first.width(), first.height());

    let mut out: RgbImage = Image::from_size_val(
        ImageSize {
            width: cell_w * columns,
            height: cell_h * rows,
        },
        0u8,
        CpuAllocator,
    )?;
    let out_w = out.width();
    let dst = out.as_slice_mut();

    for (i, image) in images.iter().enumerate() {
        if image.width() == 0 {
            continue;
        }
        let (cx, cy) = (i % columns, i / columns);
        let src = image.as_slice();
        let copy_w = image.width().min(cell_w) * 3;

        for (y, row) in src
            .chunks_exact(image.width() * 3)
            .take(cell_h)
            .enumerate()
        {
            let offset = ((cy * cell_h + y) * out_w + cx * cell_w) * 3;
            dst[offset..offset + copy_w].copy_from_slice(&row[..copy_w]);
        }
    }

    Ok(Some(out))
}

/// A frame picked by the sampler together with its position in the video.
pub struct FrameSample {
    pub image: RgbImage,
    /// Seconds from the start of the video.
    pub timestamp: f64,
    /// Offset of the frame in the source video.
    pub frame_index: usize,
}

/// Presentation time of `frame_index`, or 0 when the frame rate is unknown.
pub fn frame_timestamp(frame_index: usize, fps: f64) -> f64 {
    if fps > 0.0 {
        frame_index as f64 / fps
    } else {
        0.0
    }
}
