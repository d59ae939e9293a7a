//! End-to-end reductions on small hand-built images.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gridtrace_core::grid::{Buffers, Grid, worker_pool};
use gridtrace_core::region::PatternSize;
use gridtrace_core::seed::seed;
use gridtrace_core::{
    BinaryImage, ChainDirection, Contour, ContourTracer, Dimensions, PatternKind, PixelPoint,
    ReduceDirection, SeederKind, TraceConfig, TraceResult, TracerKind,
};

/// Build a mask from rows of `#` (foreground) and `.` (background).
fn mask(rows: &[&str]) -> BinaryImage {
    let height = u32::try_from(rows.len()).unwrap();
    let width = u32::try_from(rows[0].len()).unwrap();
    BinaryImage::from_fn(width, height, |x, y| {
        rows[y as usize].as_bytes()[x as usize] == b'#'
    })
}

fn trace(image: &BinaryImage, config: &TraceConfig) -> Vec<Contour> {
    TracerKind::Grid.trace(image, config).unwrap()
}

fn adjacent(a: PixelPoint, b: PixelPoint) -> bool {
    ChainDirection::CLOCKWISE
        .into_iter()
        .any(|d| a.neighbor(d) == Some(b))
}

fn sorted_lengths(contours: &[Contour]) -> Vec<usize> {
    let mut lengths: Vec<usize> = contours.iter().map(Contour::len).collect();
    lengths.sort_unstable();
    lengths
}

#[test]
fn isolated_pixel_is_one_closed_run_of_one_point() {
    let image = mask(&[
        ".....", //
        ".....",
        "..#..",
        ".....",
    ]);
    let contours = trace(&image, &TraceConfig::default());
    assert_eq!(contours, vec![Contour::new(vec![PixelPoint::new(2, 2)])]);
}

#[test]
fn straddling_pair_joins_when_their_cells_merge() {
    // Pixels 1 and 2 sit in different 2-wide cells after the first step
    // and only meet in the second.
    let image = mask(&[".##."]);
    let pool = worker_pool(2).unwrap();
    let seeded = seed(&image, &SeederKind::Lookup, PatternSize::W1H1, &pool).unwrap();
    let (mut buffers, regions) = Buffers::new(seeded).unwrap();
    let mut grid = Grid::new(
        image.size(),
        PatternSize::W1H1,
        regions,
        ReduceDirection::Horizontal,
        &buffers,
    )
    .unwrap();

    let first = grid.step(&mut buffers, &pool).unwrap();
    assert_eq!(first.runs, 2);
    assert_eq!(grid.regions()[0][0].runs_count, 1);
    assert_eq!(grid.regions()[0][1].runs_count, 1);

    let steps = grid.reduce(&mut buffers, &pool).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].runs, 1);

    let contours = grid.contours(&buffers).unwrap();
    assert_eq!(contours.len(), 1);
    let points = contours[0].points();
    assert_eq!(points.len(), 2);
    assert!(points.contains(&PixelPoint::new(1, 0)));
    assert!(points.contains(&PixelPoint::new(2, 0)));
    // The border runs out and back, so each point is followed by a
    // neighbour, the last wrapping round to the first.
    for (i, &p) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        assert!(adjacent(p, next), "{p} then {next}");
    }
}

#[test]
fn ring_yields_outer_and_inner_border_at_any_density() {
    let image = mask(&[
        ".....", //
        ".###.",
        ".#.#.",
        ".###.",
        ".....",
    ]);
    for density in [4, 6, 9] {
        let config = TraceConfig {
            density,
            ..TraceConfig::default()
        };
        let contours = trace(&image, &config);
        assert_eq!(sorted_lengths(&contours), vec![4, 8], "density {density}");
    }
}

#[test]
fn ring_yields_the_same_borders_for_every_core() {
    let image = mask(&[
        ".....", //
        ".###.",
        ".#.#.",
        ".###.",
        ".....",
    ]);
    let unit = TraceResult {
        contours: trace(&image, &TraceConfig::default()),
        dimensions: Dimensions { width: 5, height: 5 },
    };
    for pattern in [PatternKind::W2H1, PatternKind::W2H2, PatternKind::W4H2] {
        let config = TraceConfig {
            pattern,
            density: pattern.min_density(),
            ..TraceConfig::default()
        };
        let contours = trace(&image, &config);
        assert_eq!(sorted_lengths(&contours), vec![4, 8], "{pattern}");
        for contour in &contours {
            let points = contour.points();
            for (i, &p) in points.iter().enumerate() {
                assert!(adjacent(p, points[(i + 1) % points.len()]), "{pattern}: {contour:?}");
            }
        }
        let wide = TraceResult {
            contours,
            dimensions: unit.dimensions,
        };
        assert_eq!(wide.canonical_contours(), unit.canonical_contours(), "{pattern}");
    }
}

#[test]
fn ring_inner_border_visits_the_hole_neighbours() {
    let image = mask(&[
        ".....", //
        ".###.",
        ".#.#.",
        ".###.",
        ".....",
    ]);
    let contours = trace(&image, &TraceConfig::default());
    let inner = contours.iter().find(|c| c.len() == 4).unwrap();
    let mut points = inner.points().to_vec();
    points.sort_unstable();
    assert_eq!(
        points,
        vec![
            PixelPoint::new(1, 2),
            PixelPoint::new(2, 1),
            PixelPoint::new(2, 3),
            PixelPoint::new(3, 2),
        ]
    );
}

#[test]
fn solid_blocks_trace_their_perimeter() {
    for (width, height) in [(2, 2), (3, 5), (8, 3), (7, 7)] {
        let image = BinaryImage::from_fn(width + 3, height + 2, |x, y| {
            (2..width + 2).contains(&x) && (1..height + 1).contains(&y)
        });
        let contours = trace(&image, &TraceConfig::default());
        assert_eq!(contours.len(), 1, "{width}x{height}");
        assert_eq!(
            contours[0].len(),
            (2 * (width + height) - 4) as usize,
            "{width}x{height}"
        );
    }
}

#[test]
fn block_touching_the_image_edge_still_closes() {
    let image = BinaryImage::from_fn(6, 4, |x, _| x >= 3);
    let contours = trace(&image, &TraceConfig::default());
    assert_eq!(contours.len(), 1);
    assert_eq!(contours[0].len(), 2 * (3 + 4) - 4);
}

#[test]
fn consecutive_points_are_neighbours() {
    let image = mask(&[
        "..........",
        ".####..#..",
        ".#..#.###.",
        ".####..#..",
        "......##..",
        "..........",
    ]);
    for contour in trace(&image, &TraceConfig::default()) {
        let points = contour.points();
        for (i, p) in points.iter().enumerate() {
            let q = points[(i + 1) % points.len()];
            let (dx, dy) = ((q.x - p.x).abs(), (q.y - p.y).abs());
            assert!(
                points.len() == 1 || (dx <= 1 && dy <= 1 && (dx, dy) != (0, 0)),
                "{p} -> {q} in {contour:?}"
            );
        }
    }
}

#[test]
fn start_direction_does_not_change_the_result() {
    let image = mask(&[
        "...........",
        ".###...#.#.",
        ".#.#....#..",
        ".###...#.#.",
        "...........",
        "..#####....",
        "..#...#..#.",
        "..#####....",
    ]);
    let horizontal = TraceConfig {
        start_direction: ReduceDirection::Horizontal,
        ..TraceConfig::default()
    };
    let vertical = TraceConfig {
        start_direction: ReduceDirection::Vertical,
        ..TraceConfig::default()
    };
    let canonical = |config: &TraceConfig| {
        TraceResult {
            contours: trace(&image, config),
            dimensions: Dimensions {
                width: image.width(),
                height: image.height(),
            },
        }
        .canonical_contours()
    };
    assert_eq!(canonical(&horizontal), canonical(&vertical));
}

#[test]
fn thread_count_does_not_change_the_result() {
    let image = BinaryImage::from_fn(23, 17, |x, y| (x * x + 3 * y) % 7 < 3);
    let single = TraceConfig {
        threads: 1,
        ..TraceConfig::default()
    };
    let many = TraceConfig {
        threads: 4,
        ..TraceConfig::default()
    };
    assert_eq!(trace(&image, &single), trace(&image, &many));
}

#[test]
fn kernel_and_lookup_seeders_agree() {
    let image = BinaryImage::from_fn(19, 13, |x, y| (x ^ y) % 3 == 0);
    let kernel = TraceConfig {
        seeder: SeederKind::Kernel,
        ..TraceConfig::default()
    };
    assert_eq!(
        trace(&image, &kernel),
        trace(&image, &TraceConfig::default())
    );
}
