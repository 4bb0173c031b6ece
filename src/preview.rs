use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};

use anyhow::{Context, Result};
use image::RgbImage;

use crate::config;

/// Where annotated frames go, and where the quit key comes from.
pub trait Preview {
    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// True once the user asked to stop (quit key, closed window).
    fn quit_requested(&mut self) -> bool;
}

impl<P: Preview + ?Sized> Preview for Box<P> {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        (**self).show(frame)
    }

    fn quit_requested(&mut self) -> bool {
        (**self).quit_requested()
    }
}

impl<P: Preview + ?Sized> Preview for &mut P {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        (**self).show(frame)
    }

    fn quit_requested(&mut self) -> bool {
        (**self).quit_requested()
    }
}

/// Preview without a display. Typing `q` + Enter on stdin stops the loop;
/// the latest frame can be mirrored to a snapshot file.
pub struct HeadlessPreview {
    quit: Receiver<()>,
    quitting: bool,
    snapshot: Option<PathBuf>,
}

impl HeadlessPreview {
    pub fn new(snapshot: Option<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                        let _ = tx.send(());
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::debug!("stdin closed: {}", e);
                        return;
                    }
                }
            }
        });
        Self::with_signal(rx, snapshot)
    }

    pub(crate) fn with_signal(quit: Receiver<()>, snapshot: Option<PathBuf>) -> Self {
        Self {
            quit,
            quitting: false,
            snapshot,
        }
    }
}

impl Preview for HeadlessPreview {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        if let Some(path) = &self.snapshot {
            frame
                .save(path)
                .with_context(|| format!("writing snapshot {}", path.display()))?;
        }
        Ok(())
    }

    fn quit_requested(&mut self) -> bool {
        if !self.quitting && self.quit.try_recv().is_ok() {
            self.quitting = true;
        }
        self.quitting
    }
}

#[cfg(feature = "window")]
pub use window::WindowPreview;

#[cfg(feature = "window")]
mod window {
    use anyhow::Result;
    use image::RgbImage;
    use minifb::{Key, Window, WindowOptions};

    use super::Preview;

    /// Live preview window. `q` or closing the window stops the loop.
    pub struct WindowPreview {
        title: String,
        window: Option<Window>,
        size: (usize, usize),
        buffer: Vec<u32>,
    }

    impl WindowPreview {
        pub fn new(title: impl Into<String>) -> Self {
            Self {
                title: title.into(),
                window: None,
                size: (0, 0),
                buffer: Vec::new(),
            }
        }
    }

    impl Preview for WindowPreview {
        fn show(&mut self, frame: &RgbImage) -> Result<()> {
            let size = (frame.width() as usize, frame.height() as usize);
            if self.window.is_none() || self.size != size {
                let mut window = Window::new(&self.title, size.0, size.1, WindowOptions::default())
                    .map_err(|e| anyhow::anyhow!("opening preview window: {}", e))?;
                window.set_target_fps(60);
                self.window = Some(window);
                self.size = size;
            }
            let Some(window) = self.window.as_mut() else {
                anyhow::bail!("preview window unavailable");
            };

            self.buffer.clear();
            self.buffer.extend(
                frame
                    .pixels()
                    .map(|p| (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32),
            );
            window
                .update_with_buffer(&self.buffer, size.0, size.1)
                .map_err(|e| anyhow::anyhow!("updating preview window: {}", e))
        }

        fn quit_requested(&mut self) -> bool {
            match &self.window {
                Some(window) => !window.is_open() || window.is_key_down(Key::Q),
                None => false,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Window,
    Headless,
}

/// Backend for `cfg`. A window needs both `preview.window` and the `window` feature.
pub fn backend(cfg: &config::Preview) -> Backend {
    if cfg.window && cfg!(feature = "window") {
        Backend::Window
    } else {
        if cfg.window {
            log::warn!(
                "preview.window is set but facecheck was built without the `window` feature; running headless"
            );
        }
        Backend::Headless
    }
}

/// Preview backend chosen by the config.
pub fn open(cfg: &config::Preview, title: &str) -> Box<dyn Preview> {
    match backend(cfg) {
        #[cfg(feature = "window")]
        Backend::Window => Box::new(WindowPreview::new(title)),
        _ => {
            log::info!("{}: type q + Enter to quit", title);
            Box::new(HeadlessPreview::new(cfg.snapshot.clone()))
        }
    }
}
