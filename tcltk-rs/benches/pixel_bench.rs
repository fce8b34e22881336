use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tcltk::image::{pack, Gray, Layout, Pixel, Rgb, Rgba};
use tcltk::{Axis, PixelBlock};

const SIDE: usize = 256;

fn make_rgba(side: usize) -> Vec<Rgba> {
    (0..side * side)
        .map(|i| {
            let v = i as u8;
            Rgba::from_rgba([v, v.wrapping_mul(3), v.wrapping_add(17), 255 - v])
        })
        .collect()
}

fn bench_read(c: &mut Criterion) {
    let rgba = pack(&make_rgba(SIDE));
    let rgb: Vec<u8> = rgba
        .chunks_exact(4)
        .flat_map(|p| [p[0], p[1], p[2]])
        .collect();

    let rgba_block = PixelBlock::packed(&rgba, SIDE, SIDE, Layout::Rgba).unwrap();
    let rgb_block = PixelBlock::packed(&rgb, SIDE, SIDE, Layout::Rgb).unwrap();

    let mut g = c.benchmark_group("pixel_read");

    g.bench_function("rgba_specialized", |b| {
        b.iter(|| black_box(&rgba_block).read_all::<Rgba>())
    });
    g.bench_function("rgba_generic", |b| {
        b.iter(|| black_box(&rgba_block).read_generic::<Rgba>(Axis::All, Axis::All))
    });

    g.bench_function("rgb_to_rgba_specialized", |b| {
        b.iter(|| black_box(&rgb_block).read_all::<Rgba>())
    });
    g.bench_function("rgb_to_rgba_generic", |b| {
        b.iter(|| black_box(&rgb_block).read_generic::<Rgba>(Axis::All, Axis::All))
    });

    g.bench_function("rgb_native", |b| {
        b.iter(|| black_box(&rgb_block).read_all::<Rgb>())
    });
    g.bench_function("rgba_to_gray", |b| {
        b.iter(|| black_box(&rgba_block).read_all::<Gray>())
    });

    g.bench_function("rgba_row", |b| {
        b.iter(|| black_box(&rgba_block).read::<Rgba>(Axis::All, Axis::At(black_box(SIDE / 2))))
    });
    g.bench_function("rgba_column", |b| {
        b.iter(|| black_box(&rgba_block).read::<Rgba>(Axis::At(black_box(SIDE / 2)), Axis::All))
    });

    g.finish();
}

criterion_group!(benches, bench_read);
criterion_main!(benches);
