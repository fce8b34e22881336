//! 8-bit pixel types and channel layouts.

use std::fmt;

/// Packed channel arrangement of a pixel block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    Gray,
    GrayAlpha,
    AlphaGray,
    Rgb,
    Bgr,
    Rgba,
    Argb,
    Bgra,
    Abgr,
    /// Any other combination of pixel size and channel offsets.
    Generic,
}

/// Native photo storage format chosen for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorant {
    Gray,
    GrayAlpha,
    Rgba,
}

impl Colorant {
    pub fn pixel_size(self) -> usize {
        match self {
            Colorant::Gray => 1,
            Colorant::GrayAlpha => 2,
            Colorant::Rgba => 4,
        }
    }

    /// Red, green, blue, alpha offsets; alpha is −1 when absent.
    pub fn offsets(self) -> [isize; 4] {
        match self {
            Colorant::Gray => [0, 0, 0, -1],
            Colorant::GrayAlpha => [0, 0, 0, 1],
            Colorant::Rgba => [0, 1, 2, 3],
        }
    }
}

impl Layout {
    pub const SPECIALIZED: [Layout; 9] = [
        Layout::Gray,
        Layout::GrayAlpha,
        Layout::AlphaGray,
        Layout::Rgb,
        Layout::Bgr,
        Layout::Rgba,
        Layout::Argb,
        Layout::Bgra,
        Layout::Abgr,
    ];

    /// Pixel size and channel offsets of a packed layout.
    pub fn packing(self) -> Option<(usize, [isize; 4])> {
        Some(match self {
            Layout::Gray => (1, [0, 0, 0, -1]),
            Layout::GrayAlpha => (2, [0, 0, 0, 1]),
            Layout::AlphaGray => (2, [1, 1, 1, 0]),
            Layout::Rgb => (3, [0, 1, 2, -1]),
            Layout::Bgr => (3, [2, 1, 0, -1]),
            Layout::Rgba => (4, [0, 1, 2, 3]),
            Layout::Argb => (4, [1, 2, 3, 0]),
            Layout::Bgra => (4, [2, 1, 0, 3]),
            Layout::Abgr => (4, [3, 2, 1, 0]),
            Layout::Generic => return None,
        })
    }

    /// Recognize a packed layout.  Any negative alpha offset means "no alpha".
    pub fn detect(pixel_size: usize, offset: [isize; 4]) -> Self {
        let alpha = if offset[3] < 0 { -1 } else { offset[3] };
        let key = [offset[0], offset[1], offset[2], alpha];
        Self::SPECIALIZED
            .into_iter()
            .find(|l| l.packing() == Some((pixel_size, key)))
            .unwrap_or(Layout::Generic)
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            Layout::GrayAlpha
                | Layout::AlphaGray
                | Layout::Rgba
                | Layout::Argb
                | Layout::Bgra
                | Layout::Abgr
        )
    }

    /// The photo colorant that preserves every channel of this layout.
    pub fn colorant(self) -> Colorant {
        match self {
            Layout::Gray => Colorant::Gray,
            Layout::GrayAlpha | Layout::AlphaGray => Colorant::GrayAlpha,
            _ => Colorant::Rgba,
        }
    }
}

/// Luma of an RGB triple (Rec. 601 weights).  Exact for gray input.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114;
    ((y + 500) / 1000) as u8
}

fn unit(v: u8) -> f32 {
    f32::from(v) / 255.0
}

fn byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// A pixel with 8-bit channels and a fixed packed layout.
pub trait Pixel: Copy + Default + PartialEq + fmt::Debug + 'static {
    const LAYOUT: Layout;

    /// Bytes per packed pixel.
    const CHANNELS: usize;

    fn from_rgba(rgba: [u8; 4]) -> Self;

    fn to_rgba(self) -> [u8; 4];

    /// Decode one packed pixel; `bytes` holds at least `CHANNELS` bytes.
    fn from_bytes(bytes: &[u8]) -> Self;

    /// Encode into `out`, which holds at least `CHANNELS` bytes.
    fn write_bytes(self, out: &mut [u8]);

    /// Channels as `[0, 1]` floats in RGBA order.
    fn to_rgba_f32(self) -> [f32; 4] {
        self.to_rgba().map(unit)
    }

    /// Build from `[0, 1]` RGBA floats; values are clamped and rounded.
    fn from_rgba_f32(rgba: [f32; 4]) -> Self {
        Self::from_rgba(rgba.map(byte))
    }
}

// ── Gray ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Gray {
    pub v: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct GrayA {
    pub v: u8,
    pub a: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct AGray {
    pub a: u8,
    pub v: u8,
}

impl Gray {
    pub fn new(v: u8) -> Self {
        Self { v }
    }

    pub fn value(self) -> f32 {
        unit(self.v)
    }
}

impl GrayA {
    pub fn new(v: u8, a: u8) -> Self {
        Self { v, a }
    }

    pub fn value(self) -> f32 {
        unit(self.v)
    }

    pub fn alpha(self) -> f32 {
        unit(self.a)
    }
}

impl AGray {
    pub fn new(a: u8, v: u8) -> Self {
        Self { a, v }
    }

    pub fn value(self) -> f32 {
        unit(self.v)
    }

    pub fn alpha(self) -> f32 {
        unit(self.a)
    }
}

impl Pixel for Gray {
    const LAYOUT: Layout = Layout::Gray;
    const CHANNELS: usize = 1;

    fn from_rgba([r, g, b, _]: [u8; 4]) -> Self {
        Self { v: luma(r, g, b) }
    }

    fn to_rgba(self) -> [u8; 4] {
        [self.v, self.v, self.v, 255]
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self { v: bytes[0] }
    }

    fn write_bytes(self, out: &mut [u8]) {
        out[0] = self.v;
    }
}

impl Pixel for GrayA {
    const LAYOUT: Layout = Layout::GrayAlpha;
    const CHANNELS: usize = 2;

    fn from_rgba([r, g, b, a]: [u8; 4]) -> Self {
        Self { v: luma(r, g, b), a }
    }

    fn to_rgba(self) -> [u8; 4] {
        [self.v, self.v, self.v, self.a]
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self { v: bytes[0], a: bytes[1] }
    }

    fn write_bytes(self, out: &mut [u8]) {
        out[0] = self.v;
        out[1] = self.a;
    }
}

impl Pixel for AGray {
    const LAYOUT: Layout = Layout::AlphaGray;
    const CHANNELS: usize = 2;

    fn from_rgba([r, g, b, a]: [u8; 4]) -> Self {
        Self { a, v: luma(r, g, b) }
    }

    fn to_rgba(self) -> [u8; 4] {
        [self.v, self.v, self.v, self.a]
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self { a: bytes[0], v: bytes[1] }
    }

    fn write_bytes(self, out: &mut [u8]) {
        out[0] = self.a;
        out[1] = self.v;
    }
}

// ── Color ─────────────────────────────────────────────────────────────────────

/// Defines a color pixel whose fields are stored in declaration order.
macro_rules! color_pixel {
    ($name:ident, $layout:ident, alpha: $alpha:tt, [$($field:ident),+]) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        #[repr(C)]
        pub struct $name {
            $(pub $field: u8,)+
        }

        impl $name {
            pub fn new($($field: u8),+) -> Self {
                Self { $($field),+ }
            }

            pub fn red(self) -> f32 {
                unit(self.r)
            }

            pub fn green(self) -> f32 {
                unit(self.g)
            }

            pub fn blue(self) -> f32 {
                unit(self.b)
            }
        }

        impl Pixel for $name {
            const LAYOUT: Layout = Layout::$layout;
            const CHANNELS: usize = [$(stringify!($field)),+].len();

            fn from_rgba(rgba: [u8; 4]) -> Self {
                let [r, g, b, _a] = rgba;
                color_pixel!(@build $alpha, r, g, b, _a)
            }

            fn to_rgba(self) -> [u8; 4] {
                [self.r, self.g, self.b, color_pixel!(@alpha $alpha, self)]
            }

            fn from_bytes(bytes: &[u8]) -> Self {
                let mut i = 0;
                $(let $field = bytes[i]; i += 1;)+
                let _ = i;
                Self { $($field),+ }
            }

            fn write_bytes(self, out: &mut [u8]) {
                let mut i = 0;
                $(out[i] = self.$field; i += 1;)+
                let _ = i;
            }
        }
    };
    (@build yes, $r:ident, $g:ident, $b:ident, $a:ident) => { Self { r: $r, g: $g, b: $b, a: $a } };
    (@build no, $r:ident, $g:ident, $b:ident, $a:ident) => { Self { r: $r, g: $g, b: $b } };
    (@alpha yes, $s:ident) => { $s.a };
    (@alpha no, $s:ident) => { 255 };
}

color_pixel!(Rgb, Rgb, alpha: no, [r, g, b]);
color_pixel!(Bgr, Bgr, alpha: no, [b, g, r]);
color_pixel!(Rgba, Rgba, alpha: yes, [r, g, b, a]);
color_pixel!(Argb, Argb, alpha: yes, [a, r, g, b]);
color_pixel!(Bgra, Bgra, alpha: yes, [b, g, r, a]);
color_pixel!(Abgr, Abgr, alpha: yes, [a, b, g, r]);

macro_rules! alpha_accessor {
    ($($name:ident),+) => {$(
        impl $name {
            pub fn alpha(self) -> f32 {
                unit(self.a)
            }
        }
    )+};
}

alpha_accessor!(Rgba, Argb, Bgra, Abgr);

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn packed_round_trip<P: Pixel>(p: P) {
        let mut buf = [0u8; 4];
        p.write_bytes(&mut buf);
        assert_eq!(P::from_bytes(&buf), p);
        let (size, offsets) = P::LAYOUT.packing().unwrap();
        assert_eq!(size, P::CHANNELS);
        // Offsets agree with the field order.
        let rgba = p.to_rgba();
        for c in 0..3 {
            assert_eq!(buf[offsets[c] as usize], rgba[c]);
        }
        if offsets[3] >= 0 {
            assert_eq!(buf[offsets[3] as usize], rgba[3]);
        }
    }

    #[test]
    fn packing_matches_field_order() {
        packed_round_trip(Gray::new(9));
        packed_round_trip(GrayA::new(9, 200));
        packed_round_trip(AGray::new(200, 9));
        packed_round_trip(Rgb::new(1, 2, 3));
        packed_round_trip(Bgr::new(3, 2, 1));
        packed_round_trip(Rgba::new(1, 2, 3, 4));
        packed_round_trip(Argb::new(4, 1, 2, 3));
        packed_round_trip(Bgra::new(3, 2, 1, 4));
        packed_round_trip(Abgr::new(4, 3, 2, 1));
    }

    #[test]
    fn detect_recognizes_every_packing() {
        for layout in Layout::SPECIALIZED {
            let (size, offsets) = layout.packing().unwrap();
            assert_eq!(Layout::detect(size, offsets), layout);
        }
        assert_eq!(Layout::detect(1, [0, 0, 0, -7]), Layout::Gray);
        assert_eq!(Layout::detect(4, [0, 1, 2, -1]), Layout::Generic);
        assert_eq!(Layout::detect(5, [0, 1, 2, 3]), Layout::Generic);
    }

    #[test]
    fn gray_is_exact_through_rgba() {
        for v in [0u8, 1, 127, 128, 254, 255] {
            assert_eq!(Gray::from_rgba(Gray::new(v).to_rgba()), Gray::new(v));
        }
        assert_eq!(luma(255, 0, 0), 76);
    }

    #[test]
    fn colorant_by_channels() {
        assert_eq!(Layout::Gray.colorant(), Colorant::Gray);
        assert_eq!(Layout::AlphaGray.colorant(), Colorant::GrayAlpha);
        assert_eq!(Layout::Bgr.colorant(), Colorant::Rgba);
        assert_eq!(Colorant::GrayAlpha.pixel_size(), 2);
    }

    #[test]
    fn normalized_accessors() {
        let p = Rgba::new(255, 0, 51, 255);
        assert_eq!(p.red(), 1.0);
        assert_eq!(p.green(), 0.0);
        assert!((p.blue() - 0.2).abs() < 1e-6);
        assert_eq!(Rgb::from_rgba_f32([1.0, 0.5, 2.0, 0.0]), Rgb::new(255, 128, 255));
        assert_eq!(Gray::new(51).to_rgba_f32()[3], 1.0);
    }
}
