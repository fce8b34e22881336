//! Strided pixel block views.
//!
//! A [`PixelBlock`] borrows pixel memory described the way the native photo
//! layer describes it: a row pitch, a pixel size and the byte offsets of the
//! red, green, blue and alpha channels within a pixel.  Reads dispatch on the
//! detected [`Layout`]:
//!
//! | Block layout vs. target pixel | Path                                   |
//! |-------------------------------|----------------------------------------|
//! | identical                     | packed copy, one `from_bytes` per pixel |
//! | other known layout            | fixed-offset decode to RGBA, convert    |
//! | [`Layout::Generic`]           | per-channel offsets, convert            |
//!
//! Every path produces the same pixels as [`PixelBlock::read_generic`].
//!
//! Coordinates in [`Axis`] are 1-based and inclusive.

use std::ops::RangeInclusive;

use crate::error::{Error, Result};
use crate::image::pixel::{Layout, Pixel};
use crate::sys::RawBlock;

// ── Selection ─────────────────────────────────────────────────────────────────

/// Selection along one image axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Axis {
    All,
    /// `first..=last`; empty when `first > last`.
    Span(RangeInclusive<usize>),
    At(usize),
}

impl From<usize> for Axis {
    fn from(i: usize) -> Self {
        Axis::At(i)
    }
}

impl From<RangeInclusive<usize>> for Axis {
    fn from(r: RangeInclusive<usize>) -> Self {
        Axis::Span(r)
    }
}

/// 0-based start and length of a resolved selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Extent {
    pub start: usize,
    pub len: usize,
    pub scalar: bool,
}

impl Axis {
    pub(crate) fn resolve(&self, size: usize, what: &str) -> Result<Extent> {
        let out_of_range = |i: usize| Error::OutOfRange(format!("{what} {i} not in 1..={size}"));
        match self {
            Axis::All => Ok(Extent { start: 0, len: size, scalar: false }),
            Axis::Span(r) => {
                let (first, last) = (*r.start(), *r.end());
                if first > last {
                    return Ok(Extent { start: 0, len: 0, scalar: false });
                }
                if first == 0 || first > size {
                    return Err(out_of_range(first));
                }
                if last > size {
                    return Err(out_of_range(last));
                }
                Ok(Extent { start: first - 1, len: last - first + 1, scalar: false })
            }
            Axis::At(i) => {
                if *i == 0 || *i > size {
                    return Err(out_of_range(*i));
                }
                Ok(Extent { start: i - 1, len: 1, scalar: true })
            }
        }
    }
}

// ── Arrays ────────────────────────────────────────────────────────────────────

/// Row-major 2-D pixel array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PixelArray<P> {
    width: usize,
    height: usize,
    data: Vec<P>,
}

impl<P: Pixel> PixelArray<P> {
    pub fn new(width: usize, height: usize, data: Vec<P>) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::OutOfRange(format!(
                "{} pixels do not fill {width}x{height}",
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    pub fn filled(width: usize, height: usize, pixel: P) -> Self {
        Self { width, height, data: vec![pixel; width * height] }
    }

    /// Build from `f(x, y)` with 0-based coordinates.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> P) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    /// A single row.
    pub fn row(pixels: Vec<P>) -> Self {
        Self { width: pixels.len(), height: 1, data: pixels }
    }

    /// A single column.
    pub fn column(pixels: Vec<P>) -> Self {
        Self { width: 1, height: pixels.len(), data: pixels }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pixel at 0-based `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> Option<P> {
        (x < self.width && y < self.height).then(|| self.data[y * self.width + x])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[P]> {
        self.data.chunks(self.width.max(1)).take(self.height)
    }

    pub fn as_slice(&self) -> &[P] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<P> {
        self.data
    }
}

/// Result of a read, shaped by which axes were scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pixels<P> {
    Grid(PixelArray<P>),
    /// One axis scalar: a row or column in selection order.
    Line(Vec<P>),
    Single(P),
}

impl<P: Pixel> Pixels<P> {
    pub fn len(&self) -> usize {
        match self {
            Pixels::Grid(a) => a.as_slice().len(),
            Pixels::Line(v) => v.len(),
            Pixels::Single(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixels in row-major order.
    pub fn into_vec(self) -> Vec<P> {
        match self {
            Pixels::Grid(a) => a.into_vec(),
            Pixels::Line(v) => v,
            Pixels::Single(p) => vec![p],
        }
    }
}

// ── Block ─────────────────────────────────────────────────────────────────────

/// Validated strided view of borrowed pixel memory.
#[derive(Debug, Clone, Copy)]
pub struct PixelBlock<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    pitch: usize,
    pixel_size: usize,
    offset: [isize; 4],
    layout: Layout,
}

impl<'a> PixelBlock<'a> {
    /// Wrap `data`.  A negative alpha offset means there is no alpha
    /// channel.  Fails unless every addressed byte lies inside `data`.
    pub fn new(
        data: &'a [u8],
        width: usize,
        height: usize,
        pitch: usize,
        pixel_size: usize,
        offset: [isize; 4],
    ) -> Result<Self> {
        if pixel_size == 0 {
            return Err(Error::OutOfRange("pixel size must be positive".to_owned()));
        }
        let channels = if offset[3] < 0 { &offset[..3] } else { &offset[..] };
        if let Some(bad) = channels
            .iter()
            .find(|&&o| usize::try_from(o).map_or(true, |o| o >= pixel_size))
        {
            return Err(Error::OutOfRange(format!(
                "channel offset {bad} outside a {pixel_size}-byte pixel"
            )));
        }
        if width > 0 && height > 0 {
            let too_large = || Error::OutOfRange(format!("{width}x{height} block is too large"));
            let row = width.checked_mul(pixel_size).ok_or_else(too_large)?;
            if height > 1 && pitch < row {
                return Err(Error::OutOfRange(format!(
                    "pitch {pitch} shorter than a {width}-pixel row"
                )));
            }
            let needed = (height - 1)
                .checked_mul(pitch)
                .and_then(|n| n.checked_add(row))
                .ok_or_else(too_large)?;
            if data.len() < needed {
                return Err(Error::OutOfRange(format!(
                    "{width}x{height} block needs {needed} bytes, buffer has {}",
                    data.len()
                )));
            }
        }
        let layout = Layout::detect(pixel_size, offset);
        Ok(Self { data, width, height, pitch, pixel_size, offset, layout })
    }

    /// Tightly packed pixels of `layout`.
    pub fn packed(data: &'a [u8], width: usize, height: usize, layout: Layout) -> Result<Self> {
        let (size, offset) = layout
            .packing()
            .ok_or_else(|| Error::OutOfRange("generic layout has no packing".to_owned()))?;
        let pitch = width
            .checked_mul(size)
            .ok_or_else(|| Error::OutOfRange(format!("{width}-pixel row is too large")))?;
        Self::new(data, width, height, pitch, size, offset)
    }

    pub(crate) fn from_raw(raw: RawBlock<'a>) -> Result<Self> {
        Self::new(raw.pixels, raw.width, raw.height, raw.pitch, raw.pixel_size, raw.offset)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn pixel_size(&self) -> usize {
        self.pixel_size
    }

    pub fn offsets(&self) -> [isize; 4] {
        self.offset
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    fn pixel_bytes(&self, x: usize, y: usize) -> &'a [u8] {
        let data = self.data;
        let base = y * self.pitch + x * self.pixel_size;
        &data[base..base + self.pixel_size]
    }

    /// RGBA of the pixel at 0-based `(x, y)` using the channel offsets.
    fn rgba_generic(&self, x: usize, y: usize) -> [u8; 4] {
        let px = self.pixel_bytes(x, y);
        let at = |o: isize| px[o.unsigned_abs()];
        let a = if self.offset[3] < 0 { 255 } else { at(self.offset[3]) };
        [at(self.offset[0]), at(self.offset[1]), at(self.offset[2]), a]
    }

    /// RGBA of the pixel at 0-based `(x, y)`, decoded with fixed offsets
    /// for known layouts.
    fn decode(&self, layout: Layout, x: usize, y: usize) -> [u8; 4] {
        let p = self.pixel_bytes(x, y);
        match layout {
            Layout::Gray => [p[0], p[0], p[0], 255],
            Layout::GrayAlpha => [p[0], p[0], p[0], p[1]],
            Layout::AlphaGray => [p[1], p[1], p[1], p[0]],
            Layout::Rgb => [p[0], p[1], p[2], 255],
            Layout::Bgr => [p[2], p[1], p[0], 255],
            Layout::Rgba => [p[0], p[1], p[2], p[3]],
            Layout::Argb => [p[1], p[2], p[3], p[0]],
            Layout::Bgra => [p[2], p[1], p[0], p[3]],
            Layout::Abgr => [p[3], p[2], p[1], p[0]],
            Layout::Generic => self.rgba_generic(x, y),
        }
    }

    /// Read a selection.  `x` selects columns, `y` rows.
    pub fn read<P: Pixel>(&self, x: impl Into<Axis>, y: impl Into<Axis>) -> Result<Pixels<P>> {
        self.read_with(x.into(), y.into(), false)
    }

    /// Like [`read`](Self::read) but always through the per-offset path.
    pub fn read_generic<P: Pixel>(
        &self,
        x: impl Into<Axis>,
        y: impl Into<Axis>,
    ) -> Result<Pixels<P>> {
        self.read_with(x.into(), y.into(), true)
    }

    /// The whole block.
    pub fn read_all<P: Pixel>(&self) -> PixelArray<P> {
        let mut out = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            self.read_row(y, 0, self.width, self.layout, &mut out);
        }
        PixelArray { width: self.width, height: self.height, data: out }
    }

    fn read_with<P: Pixel>(&self, x: Axis, y: Axis, generic: bool) -> Result<Pixels<P>> {
        let xs = x.resolve(self.width, "column")?;
        let ys = y.resolve(self.height, "row")?;
        let layout = if generic { Layout::Generic } else { self.layout };
        let mut out = Vec::with_capacity(xs.len * ys.len);
        for row in ys.start..ys.start + ys.len {
            self.read_row(row, xs.start, xs.len, layout, &mut out);
        }
        Ok(match (xs.scalar, ys.scalar) {
            (true, true) => Pixels::Single(out[0]),
            (true, false) | (false, true) => Pixels::Line(out),
            (false, false) => Pixels::Grid(PixelArray { width: xs.len, height: ys.len, data: out }),
        })
    }

    fn read_row<P: Pixel>(&self, y: usize, x0: usize, n: usize, layout: Layout, out: &mut Vec<P>) {
        if n == 0 {
            return;
        }
        if layout == P::LAYOUT && self.pixel_size == P::CHANNELS {
            let start = y * self.pitch + x0 * self.pixel_size;
            let row = &self.data[start..start + n * self.pixel_size];
            out.extend(row.chunks_exact(self.pixel_size).map(P::from_bytes));
            return;
        }
        for x in x0..x0 + n {
            out.push(P::from_rgba(self.decode(layout, x, y)));
        }
    }
}

/// Pack `pixels` into a buffer laid out as `P` (for building test and
/// benchmark blocks).
pub fn pack<P: Pixel>(pixels: &[P]) -> Vec<u8> {
    let mut buf = vec![0u8; pixels.len() * P::CHANNELS];
    for (p, out) in pixels.iter().zip(buf.chunks_exact_mut(P::CHANNELS)) {
        p.write_bytes(out);
    }
    buf
}

// ── Tests ─────────────────────────────────────────────────────────────────────
