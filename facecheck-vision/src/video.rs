use anyhow::{Context, Result};
use image::RgbImage;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// Anything that yields RGB frames one at a time.
pub trait FrameSource {
    fn frame(&mut self) -> Result<RgbImage>;
}

/// Exclusively owned V4L2 capture stream. Dropping it releases the device.
pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
}

/// `"0"` names `/dev/video0`, anything else is taken as a device path.
pub fn device_path(device: &str) -> String {
    if !device.is_empty() && device.chars().all(|c| c.is_ascii_digit()) {
        format!("/dev/video{}", device)
    } else {
        device.to_string()
    }
}

impl Camera {
    pub fn open(device: &str) -> Result<Self> {
        let path = device_path(device);
        let dev = Device::with_path(&path).with_context(|| format!("open camera {}", path))?;
        let mut fmt = dev.format().context("get format")?;
        // Prefer RGB, fallback to YUYV, else accept existing format
        let desired = Format::new(fmt.width, fmt.height, FourCC::new(b"RGB3"));
        fmt = dev.set_format(&desired).unwrap_or(fmt);
        if fmt.fourcc != FourCC::new(b"RGB3") {
            let yuyv = Format::new(fmt.width, fmt.height, FourCC::new(b"YUYV"));
            fmt = dev.set_format(&yuyv).unwrap_or(fmt);
        }
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("stream")?;
        log::info!(
            "camera {} opened: {}x{} {}",
            path,
            fmt.width,
            fmt.height,
            fmt.fourcc
        );
        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            fourcc: fmt.fourcc,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameSource for Camera {
    fn frame(&mut self) -> Result<RgbImage> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::debug!(
            "captured frame: seq={} len={}",
            meta.sequence,
            data.len()
        );
        to_rgb(self.fourcc, self.width, self.height, data)
    }
}

/// Convert a raw capture buffer into an RGB image.
pub fn to_rgb(fourcc: FourCC, width: u32, height: u32, data: &[u8]) -> Result<RgbImage> {
    let mut buf = match &fourcc.repr {
        b"RGB3" => data.to_vec(),
        b"YUYV" => yuyv_to_rgb(width, height, data)?,
        b"GREY" => grey_to_rgb(width, height, data)?,
        other => {
            log::warn!(
                "unexpected pixel format {:?}, passing through raw len={}",
                String::from_utf8_lossy(other),
                data.len()
            );
            data.to_vec()
        }
    };

    let expected = (width * height * 3) as usize;
    if buf.len() < expected {
        anyhow::bail!(
            "buffer too small: got {}, expected {} (fourcc {})",
            buf.len(),
            expected,
            fourcc
        );
    }
    buf.truncate(expected);
    RgbImage::from_raw(width, height, buf).ok_or_else(|| anyhow::anyhow!("failed to build image buffer"))
}

fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        anyhow::bail!("short YUYV buffer");
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            out.push(clamp(y + 1.402 * v));
            out.push(clamp(y - 0.344136 * u - 0.714136 * v));
            out.push(clamp(y + 1.772 * u));
        }
    }
    Ok(out)
}

fn clamp(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        anyhow::bail!("short GREY buffer");
    }
    Ok(data[..expected].iter().flat_map(|&y| [y, y, y]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path() {
        assert_eq!(device_path("0"), "/dev/video0");
        assert_eq!(device_path("12"), "/dev/video12");
        assert_eq!(device_path("/dev/video2"), "/dev/video2");
    }

    #[test]
    fn test_yuyv_neutral_chroma_is_grey() {
        // Two pixels, Y=100 and Y=200, no chroma
        let data = [100, 128, 200, 128];
        let img = to_rgb(FourCC::new(b"YUYV"), 2, 1, &data).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [100, 100, 100]);
        assert_eq!(img.get_pixel(1, 0).0, [200, 200, 200]);
    }

    #[test]
    fn test_grey_and_short_buffers() {
        let img = to_rgb(FourCC::new(b"GREY"), 2, 1, &[7, 9]).unwrap();
        assert_eq!(img.get_pixel(1, 0).0, [9, 9, 9]);

        assert!(to_rgb(FourCC::new(b"GREY"), 2, 2, &[7, 9]).is_err());
        assert!(to_rgb(FourCC::new(b"RGB3"), 2, 1, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_oversized_rgb_truncated() {
        let img = to_rgb(FourCC::new(b"RGB3"), 1, 1, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [1, 2, 3]);
    }
}
