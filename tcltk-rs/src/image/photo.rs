//! Photo images.

use crate::error::{Error, Result};
use crate::image::block::{Axis, PixelArray, PixelBlock, Pixels};
use crate::image::pixel::{Colorant, Pixel};
use crate::interp::Interp;
use crate::obj::TclObj;
use crate::sys::{self, Composite, InterpPtr, PhotoHandle, RawBlock, Status};

/// A named photo image in one interpreter.
#[derive(Debug, Clone)]
pub struct Photo {
    interp: Interp,
    name: String,
}

impl Photo {
    /// Create a blank `width × height` photo.  The toolkit must be
    /// initialized in `interp`.
    pub fn new(interp: &Interp, width: usize, height: usize) -> Result<Self> {
        let cmd = crate::tcl_cmd!("image", "create", "photo"; width = width, height = height);
        let name: String = interp.exec(cmd)?;
        tracing::debug!(%name, width, height, "photo created");
        Ok(Self { interp: interp.clone(), name })
    }

    /// Wrap an existing photo by name.
    pub fn find(interp: &Interp, name: &str) -> Result<Option<Self>> {
        let ptr = interp.check()?;
        Ok(sys::find_photo(ptr, name).map(|_| Self { interp: interp.clone(), name: name.to_owned() }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interp(&self) -> &Interp {
        &self.interp
    }

    fn handle(&self) -> Result<(InterpPtr, PhotoHandle)> {
        let ptr = self.interp.check()?;
        let handle = sys::find_photo(ptr, &self.name).ok_or(Error::NullHandle("photo"))?;
        Ok((ptr, handle))
    }

    /// `(width, height)` in pixels.
    pub fn size(&self) -> Result<(usize, usize)> {
        let (_, h) = self.handle()?;
        Ok(sys::photo_get_size(&h))
    }

    /// Change the dimensions.  Contents are discarded when either dimension
    /// changes; resizing to the current size does nothing.
    pub fn resize(&self, width: usize, height: usize) -> Result<()> {
        let (ptr, h) = self.handle()?;
        if sys::photo_get_size(&h) == (width, height) {
            return Ok(());
        }
        self.check_status(ptr, sys::photo_set_size(ptr, &h, width, height))
    }

    /// Make every pixel transparent black.
    pub fn blank(&self) -> Result<()> {
        let (_, h) = self.handle()?;
        sys::photo_blank(&h);
        Ok(())
    }

    /// Read a selection; see [`PixelBlock::read`].
    pub fn read<P: Pixel>(&self, x: impl Into<Axis>, y: impl Into<Axis>) -> Result<Pixels<P>> {
        let (x, y) = (x.into(), y.into());
        let (_, h) = self.handle()?;
        sys::photo_get_image(&h, |raw| PixelBlock::from_raw(raw)?.read(x, y))
    }

    /// The whole image.
    pub fn read_all<P: Pixel>(&self) -> Result<PixelArray<P>> {
        let (_, h) = self.handle()?;
        sys::photo_get_image(&h, |raw| Ok(PixelBlock::from_raw(raw)?.read_all()))
    }

    /// Replace the selected region with `pixels`, whose dimensions must
    /// match the selection.
    pub fn write<P: Pixel>(
        &self,
        x: impl Into<Axis>,
        y: impl Into<Axis>,
        pixels: &PixelArray<P>,
    ) -> Result<()> {
        let (ptr, h) = self.handle()?;
        let (width, height) = sys::photo_get_size(&h);
        let xs = x.into().resolve(width, "column")?;
        let ys = y.into().resolve(height, "row")?;
        if pixels.dims() != (xs.len, ys.len) {
            return Err(Error::OutOfRange(format!(
                "{}x{} pixels written to a {}x{} region",
                pixels.width(),
                pixels.height(),
                xs.len,
                ys.len
            )));
        }
        if pixels.is_empty() {
            return Ok(());
        }
        let (colorant, buf) = encode(pixels.as_slice());
        let block = colorant_block(colorant, &buf, xs.len, ys.len);
        let status =
            sys::photo_put_block(ptr, &h, &block, xs.start, ys.start, xs.len, ys.len, Composite::Set);
        self.check_status(ptr, status)
    }

    /// Set the pixel at 1-based `(x, y)`.
    pub fn write_pixel<P: Pixel>(&self, x: usize, y: usize, pixel: P) -> Result<()> {
        self.write(Axis::At(x), Axis::At(y), &PixelArray::filled(1, 1, pixel))
    }

    /// Write `pixels` scaled up by `zoom` with its top-left corner at 1-based
    /// `(x, y)`.  The photo grows to fit.
    pub fn write_zoomed<P: Pixel>(
        &self,
        x: usize,
        y: usize,
        pixels: &PixelArray<P>,
        zoom: usize,
    ) -> Result<()> {
        if x == 0 || y == 0 {
            return Err(Error::OutOfRange(format!("corner ({x}, {y}) is not 1-based")));
        }
        if zoom == 0 {
            return Err(Error::OutOfRange("zoom must be positive".to_owned()));
        }
        let (ptr, h) = self.handle()?;
        if pixels.is_empty() {
            return Ok(());
        }
        let (w, ht) = pixels.dims();
        let too_large = || Error::OutOfRange(format!("{w}x{ht} pixels zoomed by {zoom} is too large"));
        let zoomed_w = w.checked_mul(zoom).ok_or_else(too_large)?;
        let zoomed_h = ht.checked_mul(zoom).ok_or_else(too_large)?;
        let (colorant, buf) = encode(pixels.as_slice());
        let block = colorant_block(colorant, &buf, w, ht);
        let status = sys::photo_put_zoomed_block(
            ptr,
            &h,
            &block,
            x - 1,
            y - 1,
            zoomed_w,
            zoomed_h,
            zoom,
            zoom,
            1,
            1,
            Composite::Set,
        );
        self.check_status(ptr, status)
    }

    /// Remove the image from its interpreter.
    pub fn delete(self) -> Result<()> {
        self.interp.exec::<()>(["image", "delete", self.name.as_str()])
    }

    fn check_status(&self, ptr: InterpPtr, status: Status) -> Result<()> {
        match status {
            Status::Ok => Ok(()),
            _ => Err(Error::Eval(TclObj::from_raw(sys::get_obj_result(ptr)).to_string())),
        }
    }
}

/// Convert pixels to the richest photo colorant their type carries.
fn encode<P: Pixel>(pixels: &[P]) -> (Colorant, Vec<u8>) {
    let colorant = P::LAYOUT.colorant();
    let mut buf = Vec::with_capacity(pixels.len() * colorant.pixel_size());
    for p in pixels {
        let [r, g, b, a] = p.to_rgba();
        match colorant {
            Colorant::Gray => buf.push(r),
            Colorant::GrayAlpha => buf.extend_from_slice(&[r, a]),
            Colorant::Rgba => buf.extend_from_slice(&[r, g, b, a]),
        }
    }
    (colorant, buf)
}

fn colorant_block(colorant: Colorant, buf: &[u8], width: usize, height: usize) -> RawBlock<'_> {
    let size = colorant.pixel_size();
    RawBlock {
        pixels: buf,
        width,
        height,
        pitch: width * size,
        pixel_size: size,
        offset: colorant.offsets(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
