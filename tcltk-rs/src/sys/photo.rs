//! Photo images (`Tk_FindPhoto`, `Tk_PhotoPutBlock`, …) and the `image`
//! command.
//!
//! A photo stores 8-bit RGBA pixels row-major.  Blocks handed to
//! [`photo_put_block`] describe foreign memory with a pitch, a pixel size and
//! per-channel byte offsets; an alpha offset outside the pixel means the
//! block is opaque.

use std::rc::Rc;

use super::commands::{arg, fail, int_arg, wrong_args};
use super::heap::{self, ObjPtr};
use super::interp::{self, data, InterpPtr, Status};
use super::enter;

/// In-memory image owned by an interpreter.
#[derive(Debug, Clone, Default)]
pub struct PhotoImage {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

const NO_MEMORY: &str = "not enough free memory for image buffer";

impl PhotoImage {
    fn new(width: usize, height: usize) -> Result<Self, String> {
        let len = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(4))
            .filter(|&n| isize::try_from(n).is_ok())
            .ok_or_else(|| NO_MEMORY.to_owned())?;
        Ok(Self { width, height, pixels: vec![0; len] })
    }

    fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [u8] {
        let at = (y * self.width + x) * 4;
        &mut self.pixels[at..at + 4]
    }

    /// Grow to at least `width × height`, keeping existing pixels.
    fn expand(&mut self, width: usize, height: usize) -> Result<(), String> {
        if width <= self.width && height <= self.height {
            return Ok(());
        }
        let mut grown = PhotoImage::new(width.max(self.width), height.max(self.height))?;
        for y in 0..self.height {
            let src = &self.pixels[y * self.width * 4..(y + 1) * self.width * 4];
            let at = y * grown.width * 4;
            grown.pixels[at..at + src.len()].copy_from_slice(src);
        }
        *self = grown;
        Ok(())
    }
}

/// `Tk_PhotoHandle`: names a photo in one interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhotoHandle {
    interp: InterpPtr,
    name: String,
}

/// `Tk_PhotoImageBlock`.
#[derive(Debug, Clone, Copy)]
pub struct RawBlock<'a> {
    pub pixels: &'a [u8],
    pub width: usize,
    pub height: usize,
    /// Bytes between the starts of consecutive rows.
    pub pitch: usize,
    /// Bytes between the starts of consecutive pixels.
    pub pixel_size: usize,
    /// Byte offsets of red, green, blue and alpha within a pixel.
    pub offset: [isize; 4],
}

impl RawBlock<'_> {
    fn has_alpha(&self) -> bool {
        usize::try_from(self.offset[3]).is_ok_and(|a| a < self.pixel_size)
    }

    fn validate(&self) -> Result<(), String> {
        let color_ok = self.offset[..3]
            .iter()
            .all(|&o| usize::try_from(o).is_ok_and(|o| o < self.pixel_size));
        if self.pixel_size == 0 || !color_ok {
            return Err("invalid pixel block layout".to_owned());
        }
        if self.width > 0 && self.height > 0 {
            let needed = (self.height - 1)
                .checked_mul(self.pitch)
                .zip(self.width.checked_mul(self.pixel_size))
                .and_then(|(rows, last)| rows.checked_add(last))
                .ok_or_else(|| "pixel block is too large".to_owned())?;
            if self.pixels.len() < needed {
                return Err(format!(
                    "pixel block needs {needed} bytes but only {} given",
                    self.pixels.len()
                ));
            }
        }
        Ok(())
    }

    fn rgba(&self, x: usize, y: usize) -> [u8; 4] {
        let base = y * self.pitch + x * self.pixel_size;
        let at = |o: isize| self.pixels[base + o.unsigned_abs()];
        let alpha = if self.has_alpha() { at(self.offset[3]) } else { 255 };
        [at(self.offset[0]), at(self.offset[1]), at(self.offset[2]), alpha]
    }
}

/// How block pixels combine with existing photo pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    /// Blend by the block's alpha.
    Overlay,
    /// Replace the destination pixel.
    Set,
}

fn with_photo<R>(handle: &PhotoHandle, f: impl FnOnce(&mut PhotoImage) -> R) -> R {
    let d = data(handle.interp);
    let mut photos = d.photos.borrow_mut();
    let photo = photos
        .get_mut(&handle.name)
        .unwrap_or_else(|| panic!("tcl: photo image \"{}\" no longer exists", handle.name));
    f(photo)
}

// ── Native entry points ───────────────────────────────────────────────────────

/// `Tk_FindPhoto`.
pub fn find_photo(interp: InterpPtr, name: &str) -> Option<PhotoHandle> {
    enter();
    data(interp)
        .photos
        .borrow()
        .contains_key(name)
        .then(|| PhotoHandle { interp, name: name.to_owned() })
}

/// `Tk_PhotoGetSize`.
pub fn photo_get_size(handle: &PhotoHandle) -> (usize, usize) {
    enter();
    with_photo(handle, |p| (p.width, p.height))
}

/// `Tk_PhotoSetSize`.  The image is blank afterwards.
pub fn photo_set_size(interp: InterpPtr, handle: &PhotoHandle, width: usize, height: usize) -> Status {
    enter();
    let resized = PhotoImage::new(width, height).map(|image| with_photo(handle, |p| *p = image));
    resize_status(interp, resized)
}

/// `Tk_PhotoExpand`.  Grows the image, keeping its contents.
pub fn photo_expand(interp: InterpPtr, handle: &PhotoHandle, width: usize, height: usize) -> Status {
    enter();
    resize_status(interp, with_photo(handle, |p| p.expand(width, height)))
}

fn resize_status(interp: InterpPtr, outcome: Result<(), String>) -> Status {
    match outcome {
        Ok(()) => Status::Ok,
        Err(msg) => {
            interp::set_string_result(interp, &msg);
            Status::Error
        }
    }
}

/// `Tk_PhotoBlank`.
pub fn photo_blank(handle: &PhotoHandle) {
    enter();
    with_photo(handle, |p| p.pixels.fill(0));
}

/// `Tk_PhotoGetImage`.  The block borrows the photo's RGBA storage for the
/// duration of `f`.
pub fn photo_get_image<R>(handle: &PhotoHandle, f: impl FnOnce(RawBlock<'_>) -> R) -> R {
    enter();
    with_photo(handle, |p| {
        f(RawBlock {
            pixels: &p.pixels,
            width: p.width,
            height: p.height,
            pitch: p.width * 4,
            pixel_size: 4,
            offset: [0, 1, 2, 3],
        })
    })
}

/// `Tk_PhotoPutBlock`.  Copies the top-left `width × height` of `block` to
/// `(x, y)`, growing the photo as needed.
#[allow(clippy::too_many_arguments)]
pub fn photo_put_block(
    interp: InterpPtr,
    handle: &PhotoHandle,
    block: &RawBlock<'_>,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    rule: Composite,
) -> Status {
    photo_put_zoomed_block(interp, handle, block, x, y, width, height, 1, 1, 1, 1, rule)
}

/// `Tk_PhotoPutZoomedBlock`.  Each source pixel is replicated `zoom` times
/// and every `subsample`-th pixel is taken; a region larger than the zoomed
/// block is tiled.
#[allow(clippy::too_many_arguments)]
pub fn photo_put_zoomed_block(
    interp: InterpPtr,
    handle: &PhotoHandle,
    block: &RawBlock<'_>,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    zoom_x: usize,
    zoom_y: usize,
    sub_x: usize,
    sub_y: usize,
    rule: Composite,
) -> Status {
    enter();
    if let Err(msg) = block.validate() {
        interp::set_string_result(interp, &msg);
        return Status::Error;
    }
    if zoom_x == 0 || zoom_y == 0 || sub_x == 0 || sub_y == 0 {
        interp::set_string_result(interp, "zoom and subsample factors must be positive");
        return Status::Error;
    }
    if width == 0 || height == 0 || block.width == 0 || block.height == 0 {
        return Status::Ok;
    }
    let Some((right, bottom)) = x.checked_add(width).zip(y.checked_add(height)) else {
        interp::set_string_result(interp, NO_MEMORY);
        return Status::Error;
    };
    let written = with_photo(handle, |p| -> Result<(), String> {
        p.expand(right, bottom)?;
        for j in 0..height {
            let sy = (j / zoom_y * sub_y) % block.height;
            for i in 0..width {
                let sx = (i / zoom_x * sub_x) % block.width;
                let src = block.rgba(sx, sy);
                let dst = p.pixel_mut(x + i, y + j);
                match rule {
                    Composite::Set => dst.copy_from_slice(&src),
                    Composite::Overlay => blend(dst, src),
                }
            }
        }
        Ok(())
    });
    resize_status(interp, written)
}

fn blend(dst: &mut [u8], src: [u8; 4]) {
    let a = u32::from(src[3]);
    for c in 0..3 {
        let mixed = (u32::from(src[c]) * a + u32::from(dst[c]) * (255 - a) + 127) / 255;
        dst[c] = mixed as u8;
    }
    dst[3] = dst[3].max(src[3]);
}

// ── `image` command ───────────────────────────────────────────────────────────

fn parse_color(spec: &str) -> Option<[u8; 4]> {
    let named = match spec.to_ascii_lowercase().as_str() {
        "black" => Some([0, 0, 0]),
        "white" => Some([255, 255, 255]),
        "red" => Some([255, 0, 0]),
        "green" => Some([0, 128, 0]),
        "blue" => Some([0, 0, 255]),
        "gray" | "grey" => Some([190, 190, 190]),
        _ => None,
    };
    if let Some([r, g, b]) = named {
        return Some([r, g, b, 255]);
    }
    let hex = spec.strip_prefix('#')?;
    let digit = |i: usize, n: usize| u8::from_str_radix(hex.get(i..i + n)?, 16).ok();
    match hex.len() {
        3 => Some([digit(0, 1)? * 17, digit(1, 1)? * 17, digit(2, 1)? * 17, 255]),
        6 => Some([digit(0, 2)?, digit(2, 2)?, digit(4, 2)?, 255]),
        _ => None,
    }
}

fn usize_arg(interp: InterpPtr, objv: &[ObjPtr], i: usize) -> Result<usize, Status> {
    let v = int_arg(interp, objv, i)?;
    usize::try_from(v).map_err(|_| fail(interp, &format!("value \"{v}\" must be non-negative")))
}

fn set_result_obj(interp: InterpPtr, obj: ObjPtr) -> Status {
    interp::set_obj_result(interp, obj);
    Status::Ok
}

pub(super) fn cmd_image(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    if objv.len() < 2 {
        return wrong_args(interp, "image option ?args?");
    }
    let sub = arg(objv, 1);
    match sub.as_str() {
        "create" => image_create(interp, objv),
        "delete" => {
            for &name in &objv[2..] {
                let name = heap::get_string(name);
                if data(interp).photos.borrow_mut().remove(&name).is_none() {
                    return fail(interp, &format!("image \"{name}\" doesn't exist"));
                }
                interp::delete_command(interp, &name);
            }
            interp::reset_result(interp);
            Status::Ok
        }
        "width" | "height" | "type" => {
            if objv.len() != 3 {
                return wrong_args(interp, &format!("image {sub} name"));
            }
            let name = arg(objv, 2);
            let Some(handle) = find_photo(interp, &name) else {
                return fail(interp, &format!("image \"{name}\" doesn't exist"));
            };
            let (w, h) = photo_get_size(&handle);
            let result = match sub.as_str() {
                "width" => heap::new_wide_int_obj(w as i64),
                "height" => heap::new_wide_int_obj(h as i64),
                _ => heap::new_string_obj("photo"),
            };
            set_result_obj(interp, result)
        }
        "names" => {
            let names: Vec<ObjPtr> = data(interp)
                .photos
                .borrow()
                .keys()
                .map(|n| heap::new_string_obj(n))
                .collect();
            set_result_obj(interp, heap::new_list_obj(&names))
        }
        other => fail(
            interp,
            &format!(
                "bad option \"{other}\": must be create, delete, height, names, type, or width"
            ),
        ),
    }
}

fn image_create(interp: InterpPtr, objv: &[ObjPtr]) -> Status {
    const USAGE: &str = "image create type ?name? ?-option value ...?";
    if objv.len() < 3 {
        return wrong_args(interp, USAGE);
    }
    let kind = arg(objv, 2);
    if kind != "photo" {
        return fail(interp, &format!("image type \"{kind}\" doesn't exist"));
    }
    let mut i = 3;
    let d = data(interp);
    let name = if objv.len() > 3 && !arg(objv, 3).starts_with('-') {
        i = 4;
        arg(objv, 3)
    } else {
        let seq = d.image_seq.get() + 1;
        d.image_seq.set(seq);
        format!("image{seq}")
    };
    let (mut width, mut height) = (0, 0);
    while i < objv.len() {
        let option = arg(objv, i);
        if i + 1 >= objv.len() {
            return fail(interp, &format!("value for \"{option}\" missing"));
        }
        let value = match usize_arg(interp, objv, i + 1) {
            Ok(v) => v,
            Err(status) => return status,
        };
        match option.as_str() {
            "-width" => width = value,
            "-height" => height = value,
            _ => {
                return fail(
                    interp,
                    &format!("unknown option \"{option}\": must be -height or -width"),
                )
            }
        }
        i += 2;
    }

    let image = match PhotoImage::new(width, height) {
        Ok(image) => image,
        Err(msg) => return fail(interp, &msg),
    };
    d.photos.borrow_mut().insert(name.clone(), image);
    drop(d);
    let instance = name.clone();
    interp::create_obj_command(
        interp,
        &name,
        Rc::new(move |interp: InterpPtr, objv: &[ObjPtr]| {
            photo_instance(interp, &instance, objv)
        }),
    );
    set_result_obj(interp, heap::new_string_obj(&name))
}

fn photo_instance(interp: InterpPtr, name: &str, objv: &[ObjPtr]) -> Status {
    let Some(handle) = find_photo(interp, name) else {
        return fail(interp, &format!("image \"{name}\" doesn't exist"));
    };
    if objv.len() < 2 {
        return wrong_args(interp, &format!("{name} option ?arg ...?"));
    }
    match arg(objv, 1).as_str() {
        "blank" => {
            photo_blank(&handle);
            interp::reset_result(interp);
            Status::Ok
        }
        "get" => {
            if objv.len() != 4 {
                return wrong_args(interp, &format!("{name} get x y"));
            }
            let (x, y) = match (usize_arg(interp, objv, 2), usize_arg(interp, objv, 3)) {
                (Ok(x), Ok(y)) => (x, y),
                (Err(status), _) | (_, Err(status)) => return status,
            };
            let (w, h) = photo_get_size(&handle);
            if x >= w || y >= h {
                return fail(interp, &format!("{name} get: coordinates out of range"));
            }
            let rgb = photo_get_image(&handle, |block| block.rgba(x, y));
            let elems: Vec<ObjPtr> = rgb[..3]
                .iter()
                .map(|&c| heap::new_wide_int_obj(i64::from(c)))
                .collect();
            set_result_obj(interp, heap::new_list_obj(&elems))
        }
        "put" => {
            let (x, y, region) = match objv.len() {
                3 => {
                    let (w, h) = photo_get_size(&handle);
                    (0, 0, (w, h))
                }
                6 if arg(objv, 3) == "-to" => {
                    match (usize_arg(interp, objv, 4), usize_arg(interp, objv, 5)) {
                        (Ok(x), Ok(y)) => (x, y, (1, 1)),
                        (Err(status), _) | (_, Err(status)) => return status,
                    }
                }
                _ => return wrong_args(interp, &format!("{name} put color ?-to x y?")),
            };
            let spec = arg(objv, 2);
            let Some(color) = parse_color(&spec) else {
                return fail(interp, &format!("unknown color name \"{spec}\""));
            };
            let block = RawBlock {
                pixels: &color,
                width: 1,
                height: 1,
                pitch: 4,
                pixel_size: 4,
                offset: [0, 1, 2, 3],
            };
            let status =
                photo_put_block(interp, &handle, &block, x, y, region.0, region.1, Composite::Set);
            if status == Status::Ok {
                interp::reset_result(interp);
            }
            status
        }
        other => fail(
            interp,
            &format!("bad option \"{other}\": must be blank, get, or put"),
        ),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
