use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Pixel, Size};

use crate::error::DrawError;

// upper bound for one RGBA buffer; a larger surface is refused rather than allocated
const MAX_CANVAS_BYTES: usize = 512 * 1024 * 1024;

fn canvas_bytes(size: RenderSurfaceSize) -> Option<usize> {
    (size.width as usize)
        .checked_mul(size.height as usize)?
        .checked_mul(4)
        .filter(|bytes| *bytes <= MAX_CANVAS_BYTES)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderSurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        RenderSurfaceSize { width, height }
    }

    fn pack(self) -> u64 {
        (u64::from(self.width) << 32) | u64::from(self.height)
    }

    fn unpack(packed: u64) -> Self {
        RenderSurfaceSize {
            width: (packed >> 32) as u32,
            height: packed as u32,
        }
    }
}

/// Surface size shared between the resize caller and the render thread.
///
/// Both dimensions live in one atomic word, so a reader sees either the old
/// or the new size, never a mix of the two.
#[derive(Debug, Clone, Default)]
pub struct SharedSurfaceSize {
    packed: Arc<AtomicU64>,
}

impl SharedSurfaceSize {
    pub fn new(size: RenderSurfaceSize) -> Self {
        SharedSurfaceSize { packed: Arc::new(AtomicU64::new(size.pack())) }
    }

    pub fn store(&self, size: RenderSurfaceSize) {
        self.packed.store(size.pack(), Ordering::Release);
    }

    pub fn load(&self) -> RenderSurfaceSize {
        RenderSurfaceSize::unpack(self.packed.load(Ordering::Acquire))
    }
}

/// RGBA pixel buffer the render loop paints into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(size: RenderSurfaceSize) -> Result<Self, DrawError> {
        let mut canvas = Canvas::default();
        canvas.resize(size)?;
        Ok(canvas)
    }

    pub fn size(&self) -> RenderSurfaceSize {
        RenderSurfaceSize::new(self.width, self.height)
    }

    /// Resizes the buffer; the contents are undefined afterwards until the next clear.
    /// Fails with [`DrawError::TooLarge`] and leaves the canvas untouched if the buffer for
    /// `size` would not fit in memory.
    pub fn resize(&mut self, size: RenderSurfaceSize) -> Result<(), DrawError> {
        if self.size() == size {
            return Ok(());
        }

        let bytes = canvas_bytes(size).ok_or(DrawError::TooLarge)?;
        self.width = size.width;
        self.height = size.height;
        self.pixels.resize(bytes, 0);
        Ok(())
    }

    /// Pixels as RGBA bytes, row by row.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb888> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let offset = (y as usize * self.width as usize + x as usize) * 4;
        Some(Rgb888::new(self.pixels[offset], self.pixels[offset + 1], self.pixels[offset + 2]))
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where I: IntoIterator<Item = Pixel<Self::Color>>
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 || point.x as u32 >= self.width || point.y as u32 >= self.height {
                continue;
            }

            let offset = (point.y as usize * self.width as usize + point.x as usize) * 4;
            self.pixels[offset..offset + 4].copy_from_slice(&[color.r(), color.g(), color.b(), 0xff]);
        }

        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&[color.r(), color.g(), color.b(), 0xff]);
        }

        Ok(())
    }
}

/// A drawing target whose lifetime is controlled by the hosting environment.
///
/// The render loop locks a canvas for each frame, paints it and posts it
/// back. Either call fails once the host has invalidated the surface.
pub trait DrawSurface: Send + 'static {
    fn lock_canvas(&mut self, size: RenderSurfaceSize) -> Result<Canvas, DrawError>;

    fn unlock_canvas_and_post(&mut self, canvas: Canvas) -> Result<(), DrawError>;
}

#[derive(Default)]
struct FramebufferInner {
    valid: bool,
    // the canvas not currently lent to the render loop; None while a frame is being painted
    back: Option<Canvas>,
    front: Option<Canvas>,
    generation: u64,
}

/// Double buffered in-memory surface: the render loop paints the back
/// buffer, the host window displays the front buffer.
#[derive(Clone)]
pub struct FramebufferSurface {
    inner: Arc<Mutex<FramebufferInner>>,
}

impl FramebufferSurface {
    pub fn new() -> Self {
        let inner = FramebufferInner {
            valid: true,
            back: Some(Canvas::default()),
            front: None,
            generation: 0,
        };

        FramebufferSurface { inner: Arc::new(Mutex::new(inner)) }
    }

    /// Marks the surface as destroyed; further locks and posts fail.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock().expect("Failed to lock framebuffer");
        inner.valid = false;
        inner.front = None;
    }

    pub fn is_valid(&self) -> bool {
        self.inner.lock().expect("Failed to lock framebuffer").valid
    }

    /// Copy of the most recently posted frame together with its generation counter, which
    /// increases with every post.
    pub fn front(&self) -> Option<(u64, Canvas)> {
        let inner = self.inner.lock().expect("Failed to lock framebuffer");
        inner.front.as_ref().map(|canvas| (inner.generation, canvas.clone()))
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().expect("Failed to lock framebuffer").generation
    }
}

impl Default for FramebufferSurface {
    fn default() -> Self {
        FramebufferSurface::new()
    }
}

impl DrawSurface for FramebufferSurface {
    fn lock_canvas(&mut self, size: RenderSurfaceSize) -> Result<Canvas, DrawError> {
        let mut inner = self.inner.lock().map_err(|_| DrawError::SurfaceInvalid)?;
        if !inner.valid {
            return Err(DrawError::SurfaceInvalid);
        }

        let mut canvas = inner.back.take().ok_or(DrawError::Busy)?;
        if let Err(err) = canvas.resize(size) {
            inner.back = Some(canvas);
            return Err(err);
        }
        Ok(canvas)
    }

    fn unlock_canvas_and_post(&mut self, canvas: Canvas) -> Result<(), DrawError> {
        let mut inner = self.inner.lock().map_err(|_| DrawError::SurfaceInvalid)?;
        if !inner.valid {
            inner.back = Some(canvas);
            return Err(DrawError::SurfaceInvalid);
        }

        let previous = inner.front.replace(canvas);
        inner.back = Some(previous.unwrap_or_default());
        inner.generation += 1;
        Ok(())
    }
}
