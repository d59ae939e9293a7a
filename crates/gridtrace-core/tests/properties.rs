//! Property tests over random small masks.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gridtrace_core::grid::{Buffers, Grid, worker_pool};
use gridtrace_core::seed::seed;
use gridtrace_core::{
    BinaryImage, ChainDirection, Contour, ContourTracer, Dimensions, PatternKind, PixelPoint,
    ReduceDirection, SeederKind, TraceConfig, TraceResult, TracerKind,
};
use proptest::prelude::*;

fn arb_mask() -> impl Strategy<Value = BinaryImage> {
    (1u32..12, 1u32..12).prop_flat_map(|(width, height)| {
        proptest::collection::vec(any::<bool>(), (width * height) as usize).prop_map(
            move |bits| BinaryImage::from_fn(width, height, |x, y| bits[(y * width + x) as usize]),
        )
    })
}

fn arb_pattern() -> impl Strategy<Value = PatternKind> {
    proptest::sample::select(PatternKind::ALL.to_vec())
}

fn traced(image: &BinaryImage, config: &TraceConfig) -> TraceResult {
    let contours = TracerKind::Grid.trace(image, config).unwrap();
    TraceResult {
        contours,
        dimensions: Dimensions {
            width: image.width(),
            height: image.height(),
        },
    }
}

proptest! {
    #[test]
    fn inverse_is_an_involution(raw in 1u8..=8) {
        let direction = ChainDirection::from_raw(raw).unwrap();
        let inverse = direction.inverse().unwrap();
        prop_assert_ne!(inverse, direction);
        prop_assert_eq!(inverse.inverse(), Some(direction));
    }

    #[test]
    fn every_step_conserves_points(
        image in arb_mask(),
        horizontal in any::<bool>(),
        kind in arb_pattern(),
    ) {
        let start = if horizontal {
            ReduceDirection::Horizontal
        } else {
            ReduceDirection::Vertical
        };
        let pattern = kind.with_density(kind.min_density());
        let pool = worker_pool(2).unwrap();
        let seeded = seed(&image, &SeederKind::Lookup, pattern, &pool).unwrap();
        let (mut buffers, regions) = Buffers::new(seeded).unwrap();
        let mut grid = Grid::new(image.size(), pattern, regions, start, &buffers).unwrap();
        let total = grid.total_points();

        let steps = grid.reduce(&mut buffers, &pool).unwrap();
        prop_assert!(grid.is_reduced());
        for stats in &steps {
            prop_assert_eq!(stats.points, total);
        }

        let contours = grid.contours(&buffers).unwrap();
        let traced: usize = contours.iter().map(Contour::len).sum();
        prop_assert_eq!(traced, total);
    }

    #[test]
    fn every_foreground_pixel_with_a_background_side_is_visited(image in arb_mask()) {
        let contours = TracerKind::Grid.trace(&image, &TraceConfig::default()).unwrap();
        let visited: std::collections::HashSet<_> =
            contours.iter().flat_map(|c| c.points().iter().copied()).collect();
        for y in 0..image.height() {
            for x in 0..image.width() {
                let p = PixelPoint::new(i32::try_from(x).unwrap(), i32::try_from(y).unwrap());
                if !image.is_foreground(p) {
                    prop_assert!(!visited.contains(&p));
                    continue;
                }
                let exposed = ChainDirection::CLOCKWISE
                    .into_iter()
                    .filter(|d| d.is_cardinal())
                    .any(|d| !image.is_foreground(p.neighbor(d).unwrap()));
                let isolated = ChainDirection::CLOCKWISE
                    .into_iter()
                    .all(|d| !image.is_foreground(p.neighbor(d).unwrap()));
                prop_assert_eq!(visited.contains(&p), exposed || isolated, "{}", p);
            }
        }
    }

    #[test]
    fn start_direction_is_irrelevant(image in arb_mask()) {
        let horizontal = TraceConfig {
            start_direction: ReduceDirection::Horizontal,
            ..TraceConfig::default()
        };
        let vertical = TraceConfig {
            start_direction: ReduceDirection::Vertical,
            ..TraceConfig::default()
        };
        prop_assert_eq!(
            traced(&image, &horizontal).canonical_contours(),
            traced(&image, &vertical).canonical_contours()
        );
    }

    #[test]
    fn density_is_irrelevant(image in arb_mask(), density in 4u32..10) {
        let sparse = TraceConfig {
            density,
            ..TraceConfig::default()
        };
        prop_assert_eq!(
            traced(&image, &sparse).contours,
            traced(&image, &TraceConfig::default()).contours
        );
    }

    #[test]
    fn pattern_is_irrelevant(image in arb_mask(), kind in arb_pattern()) {
        let config = TraceConfig {
            pattern: kind,
            density: kind.min_density(),
            ..TraceConfig::default()
        };
        prop_assert_eq!(
            traced(&image, &config).canonical_contours(),
            traced(&image, &TraceConfig::default()).canonical_contours()
        );
    }
}
