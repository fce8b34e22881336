use proptest::prelude::*;
use tcltk::image::{pack, Abgr, Argb, Bgr, Bgra, Gray, GrayA, AGray, Layout, Pixel, Rgb, Rgba};
use tcltk::{sys, Axis, Interp, Photo, PixelArray, PixelBlock, TclObj, Value};

proptest! {
    #[test]
    fn booleans_round_trip(b in any::<bool>()) {
        prop_assert_eq!(TclObj::new(b).unwrap().get::<bool>().unwrap(), b);
    }

    #[test]
    fn integers_round_trip(n in any::<i64>()) {
        prop_assert_eq!(TclObj::new(n).unwrap().get::<i64>().unwrap(), n);
    }

    #[test]
    fn narrow_integers_round_trip(n in any::<i16>()) {
        prop_assert_eq!(TclObj::new(n).unwrap().get::<i16>().unwrap(), n);
    }

    #[test]
    fn doubles_round_trip(d in any::<f64>().prop_filter("finite", |d| d.is_finite())) {
        prop_assert_eq!(TclObj::new(d).unwrap().get::<f64>().unwrap(), d);
    }

    #[test]
    fn floats_round_trip(d in any::<f32>().prop_filter("finite", |d| d.is_finite())) {
        prop_assert_eq!(TclObj::new(d).unwrap().get::<f32>().unwrap(), d);
    }

    /// An integer object equals the object built from its decimal string,
    /// and the literal itself.
    #[test]
    fn equality_ignores_representation(n in any::<i64>()) {
        let text = n.to_string();
        let int = TclObj::new(n).unwrap();
        let string = TclObj::new(text.as_str()).unwrap();
        prop_assert_eq!(&int, &string);
        prop_assert!(int == text.as_str());
    }

    /// Putting a shared handle in a list adds exactly one reference, and
    /// copy-on-write appends never drop below the starting count.
    #[test]
    fn list_membership_counts(extra in 1usize..4, items in prop::collection::vec(any::<i32>(), 0..6)) {
        let shared = TclObj::new("shared").unwrap();
        let aliases: Vec<TclObj> = (0..extra).map(|_| shared.clone()).collect();
        let before = shared.ref_count();
        prop_assert_eq!(before, 1 + extra as i32);

        let mut values: Vec<Value> = items.iter().map(|&i| Value::from(i)).collect();
        values.push(Value::from(&shared));
        let mut list = TclObj::new(values).unwrap();
        prop_assert_eq!(shared.ref_count(), before + 1);

        let alias = list.clone();
        list.lappend(&shared).unwrap();
        prop_assert!(shared.ref_count() >= before + 1);
        prop_assert_eq!(alias.llength().unwrap(), items.len() + 1);
        prop_assert_eq!(list.llength().unwrap(), items.len() + 2);
        drop(aliases);
    }

    #[test]
    fn dispose_twice_is_harmless(s in "[a-z]{0,12}") {
        let keep = TclObj::new(s.as_str()).unwrap();
        let mut other = keep.clone();
        other.dispose();
        other.dispose();
        prop_assert_eq!(keep.ref_count(), 1);
        prop_assert!(other.get::<String>().is_err());
    }

    /// Out-of-range positions are missing, never errors.
    #[test]
    fn list_index_bounds(items in prop::collection::vec("[a-z]{1,4}", 0..8), first in -3i64..10, last in -3i64..10) {
        let list = TclObj::new(items.clone()).unwrap();
        let len = items.len() as i64;
        prop_assert!(list.lindex(-1).unwrap().is_none());
        prop_assert!(list.lindex(len).unwrap().is_none());
        let got: Vec<String> = list
            .lrange(first, last)
            .unwrap()
            .iter()
            .map(|o| o.to_string())
            .collect();
        let expected: Vec<String> = (first..=last)
            .filter(|&i| i >= 0 && i < len)
            .map(|i| items[i as usize].clone())
            .collect();
        prop_assert_eq!(got, expected);
    }

    /// Nothing built while converting lists outlives the handles.
    #[test]
    fn list_building_is_leak_free(items in prop::collection::vec(any::<u64>(), 0..8)) {
        let baseline = sys::live_objects();
        {
            let list = TclObj::new(items.clone()).unwrap();
            let back: Vec<u64> = list.get().unwrap();
            prop_assert_eq!(back, items);
        }
        prop_assert_eq!(sys::live_objects(), baseline);
    }
}

// ── Pixels ────────────────────────────────────────────────────────────────────

fn rgba_grid() -> impl Strategy<Value = (usize, usize, Vec<[u8; 4]>)> {
    (1usize..6, 1usize..6).prop_flat_map(|(w, h)| {
        (Just(w), Just(h), prop::collection::vec(any::<[u8; 4]>(), w * h))
    })
}

fn equivalent<P: Pixel>(w: usize, h: usize, raw: &[[u8; 4]]) -> Result<(), TestCaseError> {
    let pixels: Vec<P> = raw.iter().map(|&c| P::from_rgba(c)).collect();
    let buf = pack(&pixels);
    let block = PixelBlock::packed(&buf, w, h, P::LAYOUT).unwrap();
    prop_assert_eq!(block.read_all::<P>().into_vec(), pixels);
    for (x, y) in [
        (Axis::All, Axis::All),
        (Axis::Span(1..=w), Axis::At(h)),
        (Axis::At(w), Axis::Span(1..=h)),
        (Axis::Span(w.div_ceil(2)..=w), Axis::Span(1..=h.div_ceil(2))),
    ] {
        prop_assert_eq!(
            block.read::<P>(x.clone(), y.clone()).unwrap(),
            block.read_generic::<P>(x.clone(), y.clone()).unwrap()
        );
        prop_assert_eq!(
            block.read::<Rgba>(x.clone(), y.clone()).unwrap(),
            block.read_generic::<Rgba>(x, y).unwrap()
        );
    }
    Ok(())
}

fn photo_round_trip<P: Pixel>(
    photo: &Photo,
    w: usize,
    h: usize,
    raw: &[[u8; 4]],
) -> Result<(), TestCaseError> {
    let pixels: Vec<P> = raw.iter().map(|&c| P::from_rgba(c)).collect();
    let array = PixelArray::new(w, h, pixels).unwrap();
    photo.write(Axis::Span(2..=w + 1), Axis::Span(1..=h), &array).unwrap();
    let back = photo.read_all::<P>().unwrap();
    for y in 0..h {
        for x in 0..w {
            prop_assert_eq!(back.get(x + 1, y), array.get(x, y));
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn specialized_reads_match_generic((w, h, raw) in rgba_grid()) {
        equivalent::<Gray>(w, h, &raw)?;
        equivalent::<GrayA>(w, h, &raw)?;
        equivalent::<AGray>(w, h, &raw)?;
        equivalent::<Rgb>(w, h, &raw)?;
        equivalent::<Bgr>(w, h, &raw)?;
        equivalent::<Rgba>(w, h, &raw)?;
        equivalent::<Argb>(w, h, &raw)?;
        equivalent::<Bgra>(w, h, &raw)?;
        equivalent::<Abgr>(w, h, &raw)?;
    }

    #[test]
    fn photo_writes_read_back((w, h, raw) in rgba_grid()) {
        let interp = Interp::new();
        interp.init_tk().unwrap();
        let photo = Photo::new(&interp, 6, 6).unwrap();
        photo_round_trip::<Gray>(&photo, w, h, &raw)?;
        photo_round_trip::<GrayA>(&photo, w, h, &raw)?;
        photo_round_trip::<AGray>(&photo, w, h, &raw)?;
        photo_round_trip::<Rgb>(&photo, w, h, &raw)?;
        photo_round_trip::<Bgr>(&photo, w, h, &raw)?;
        photo_round_trip::<Rgba>(&photo, w, h, &raw)?;
        photo_round_trip::<Argb>(&photo, w, h, &raw)?;
        photo_round_trip::<Bgra>(&photo, w, h, &raw)?;
        photo_round_trip::<Abgr>(&photo, w, h, &raw)?;
        interp.delete().unwrap();
    }
}

#[test]
fn every_specialized_layout_is_detected() {
    for layout in Layout::SPECIALIZED {
        let (size, offsets) = layout.packing().unwrap();
        let buf = vec![0u8; size * 4];
        let block = PixelBlock::new(&buf, 2, 2, size * 2, size, offsets).unwrap();
        assert_eq!(block.layout(), layout);
    }
}
