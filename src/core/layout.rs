/// Layout engine — organic non-overlapping scatter and the row-major collage grid.
///
/// Scatter uses sample-and-check: each image draws random candidates until one
/// clears every rectangle accepted before it, or its attempt budget runs out.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema::placement::{Placement, Rect, SizedImage};
use crate::schema::prompt::{ImageId, ImageInfo};

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("could not place '{image}' without overlap after {attempts} attempts")]
    LayoutInfeasible { image: ImageId, attempts: u32 },
    #[error("{images} images exceed the {cells} available grid cells")]
    CapacityExceeded { images: usize, cells: usize },
    #[error("invalid layout parameters: {0}")]
    InvalidParameters(String),
}

/// Bands kept clear along each canvas edge.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Insets {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub insets: Insets,
}

impl Canvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            insets: Insets::default(),
        }
    }

    pub fn with_insets(mut self, insets: Insets) -> Self {
        self.insets = insets;
        self
    }

    /// The region images may occupy.
    pub fn usable(&self) -> Rect {
        Rect {
            x: self.insets.left,
            y: self.insets.top,
            width: self.width - self.insets.left - self.insets.right,
            height: self.height - self.insets.top - self.insets.bottom,
        }
    }
}

/// Inclusive range of image widths; heights follow from aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeRange {
    pub min: f64,
    pub max: f64,
}

impl SizeRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationRange {
    pub min_degrees: f64,
    pub max_degrees: f64,
}

/// Parameters for one scatter call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterSpec {
    pub canvas: Canvas,
    pub size_range: SizeRange,
    pub max_attempts_per_image: u32,
    /// When set, each accepted image gets an angle drawn from this range.
    #[serde(default)]
    pub rotation: Option<RotationRange>,
    /// Minimum clear distance between accepted rectangles.
    #[serde(default)]
    pub min_gap: f64,
}

impl ScatterSpec {
    pub fn new(canvas: Canvas, size_range: SizeRange, max_attempts_per_image: u32) -> Self {
        Self {
            canvas,
            size_range,
            max_attempts_per_image,
            rotation: None,
            min_gap: 0.0,
        }
    }

    pub fn with_rotation(mut self, min_degrees: f64, max_degrees: f64) -> Self {
        self.rotation = Some(RotationRange {
            min_degrees,
            max_degrees,
        });
        self
    }

    pub fn with_min_gap(mut self, gap: f64) -> Self {
        self.min_gap = gap;
        self
    }

    fn validate(&self) -> Result<Rect, LayoutError> {
        let SizeRange { min, max } = self.size_range;
        if !(min.is_finite() && max.is_finite()) || min <= 0.0 || min > max {
            return Err(LayoutError::InvalidParameters(format!(
                "size range [{min}, {max}] is not a positive interval"
            )));
        }
        let Canvas {
            width,
            height,
            insets,
        } = self.canvas;
        let edges = [width, height, insets.top, insets.right, insets.bottom, insets.left];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(LayoutError::InvalidParameters(format!(
                "canvas {width}x{height} with insets {insets:?} is not finite"
            )));
        }
        let area = self.canvas.usable();
        if !(area.width.is_finite() && area.height.is_finite())
            || !(area.width > 0.0 && area.height > 0.0)
        {
            return Err(LayoutError::InvalidParameters(format!(
                "canvas leaves no usable area ({}x{})",
                area.width, area.height
            )));
        }
        if self.max_attempts_per_image == 0 {
            return Err(LayoutError::InvalidParameters(
                "max attempts per image must be at least 1".to_string(),
            ));
        }
        if !self.min_gap.is_finite() || self.min_gap < 0.0 {
            return Err(LayoutError::InvalidParameters(format!(
                "min gap {} must be a non-negative number",
                self.min_gap
            )));
        }
        if let Some(r) = self.rotation {
            if !(r.min_degrees.is_finite() && r.max_degrees.is_finite())
                || r.min_degrees > r.max_degrees
            {
                return Err(LayoutError::InvalidParameters(format!(
                    "rotation range [{}, {}] is empty",
                    r.min_degrees, r.max_degrees
                )));
            }
        }
        Ok(area)
    }
}

/// Scatter `images`, in input order, so that no two bounding rectangles
/// overlap and every rectangle lies inside the canvas' usable area.
///
/// Rotation is decorative: the overlap test always uses the unrotated
/// rectangle. Reusing the same RNG state and inputs reproduces the output.
pub fn place_non_overlapping(
    images: &[ImageInfo],
    spec: &ScatterSpec,
    rng: &mut StdRng,
) -> Result<Vec<Placement>, LayoutError> {
    let area = spec.validate()?;
    let mut accepted: Vec<Placement> = Vec::with_capacity(images.len());

    for image in images {
        if !image.aspect_ratio.is_finite() || image.aspect_ratio <= 0.0 {
            return Err(LayoutError::InvalidParameters(format!(
                "image '{}' has unusable aspect ratio {}",
                image.id, image.aspect_ratio
            )));
        }

        let mut placed = None;
        for attempt in 0..spec.max_attempts_per_image {
            let Some(candidate) = sample_candidate(image.aspect_ratio, &area, spec.size_range, rng)
            else {
                continue;
            };
            let padded = candidate.inflate(spec.min_gap);
            if accepted.iter().all(|p| !padded.intersects(&p.rect())) {
                debug!(image = %image.id, attempt, "placed image");
                placed = Some(candidate);
                break;
            }
        }

        let Some(rect) = placed else {
            warn!(
                image = %image.id,
                attempts = spec.max_attempts_per_image,
                "scatter layout exhausted its attempts"
            );
            return Err(LayoutError::LayoutInfeasible {
                image: image.id.clone(),
                attempts: spec.max_attempts_per_image,
            });
        };

        let rotation_degrees = match spec.rotation {
            Some(r) if r.max_degrees > r.min_degrees => rng.gen_range(r.min_degrees..=r.max_degrees),
            Some(r) => r.min_degrees,
            None => 0.0,
        };

        accepted.push(Placement {
            image_id: image.id.clone(),
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            rotation_degrees,
        });
    }

    Ok(accepted)
}

/// Draw one candidate rectangle. `None` when the drawn size cannot fit the
/// usable area at all; that still spends an attempt.
fn sample_candidate(
    aspect_ratio: f64,
    area: &Rect,
    size_range: SizeRange,
    rng: &mut StdRng,
) -> Option<Rect> {
    let width = rng.gen_range(size_range.min..=size_range.max);
    let height = width / aspect_ratio;
    if width > area.width || height > area.height {
        return None;
    }
    let x = area.x + rng.gen_range(0.0..=area.width - width);
    let y = area.y + rng.gen_range(0.0..=area.height - height);
    Some(Rect {
        x,
        y,
        width,
        height,
    })
}

/// A fixed grid of `columns` x `rows` cells anchored at an origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub columns: u32,
    pub rows: u32,
    #[serde(default)]
    pub origin_x: f64,
    #[serde(default)]
    pub origin_y: f64,
}

impl GridSpec {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self {
            columns,
            rows,
            origin_x: 0.0,
            origin_y: 0.0,
        }
    }

    pub fn at(mut self, origin_x: f64, origin_y: f64) -> Self {
        self.origin_x = origin_x;
        self.origin_y = origin_y;
        self
    }

    pub fn cell_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }
}

/// Assign images to grid cells in row-major order, keeping each image's
/// recorded size. Cells are as large as the largest image in each axis and
/// every image is centred in its cell, so preserved sizes never collide.
pub fn place_grid(images: &[SizedImage], grid: &GridSpec) -> Result<Vec<Placement>, LayoutError> {
    let cells = grid.cell_count();
    if images.len() > cells {
        return Err(LayoutError::CapacityExceeded {
            images: images.len(),
            cells,
        });
    }
    if let Some(bad) = images
        .iter()
        .find(|i| !(i.width.is_finite() && i.height.is_finite()) || i.width <= 0.0 || i.height <= 0.0)
    {
        return Err(LayoutError::InvalidParameters(format!(
            "image '{}' has size {}x{}",
            bad.id, bad.width, bad.height
        )));
    }

    let cell_width = images.iter().map(|i| i.width).fold(0.0, f64::max);
    let cell_height = images.iter().map(|i| i.height).fold(0.0, f64::max);
    let columns = grid.columns as usize;

    Ok(images
        .iter()
        .enumerate()
        .map(|(i, image)| {
            let row = (i / columns) as f64;
            let col = (i % columns) as f64;
            Placement {
                image_id: image.id.clone(),
                x: grid.origin_x + col * cell_width + (cell_width - image.width) / 2.0,
                y: grid.origin_y + row * cell_height + (cell_height - image.height) / 2.0,
                width: image.width,
                height: image.height,
                rotation_degrees: 0.0,
            }
        })
        .collect())
}

/// True when no two placements share positive area.
pub fn is_overlap_free(placements: &[Placement]) -> bool {
    placements.iter().enumerate().all(|(i, a)| {
        placements[i + 1..]
            .iter()
            .all(|b| a.rect().intersection_area(&b.rect()) == 0.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn images(n: usize) -> Vec<ImageInfo> {
        (0..n)
            .map(|i| ImageInfo {
                id: ImageId(format!("img{i}.png")),
                aspect_ratio: [0.75, 1.0, 1.5][i % 3],
            })
            .collect()
    }

    fn live_spec() -> ScatterSpec {
        ScatterSpec::new(
            Canvas::new(1820.0, 750.0).with_insets(Insets {
                top: 120.0,
                right: 60.0,
                bottom: 150.0,
                left: 60.0,
            }),
            SizeRange::new(80.0, 180.0),
            200,
        )
    }

    #[test]
    fn scatter_never_overlaps_and_stays_inside() {
        let spec = live_spec();
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let placed = place_non_overlapping(&images(15), &spec, &mut rng).unwrap();
            assert_eq!(placed.len(), 15);
            assert!(is_overlap_free(&placed), "overlap with seed {seed}");
            let area = spec.canvas.usable();
            for p in &placed {
                assert!(area.contains(&p.rect()), "{:?} escapes canvas", p);
                assert!(p.width >= 80.0 && p.width <= 180.0);
                assert_eq!(p.rotation_degrees, 0.0);
            }
        }
    }

    #[test]
    fn scatter_keeps_aspect_ratio() {
        let mut rng = StdRng::seed_from_u64(4);
        let placed = place_non_overlapping(&images(3), &live_spec(), &mut rng).unwrap();
        for (p, info) in placed.iter().zip(images(3)) {
            assert!((p.width / p.height - info.aspect_ratio).abs() < 1e-9);
        }
    }

    #[test]
    fn scatter_is_reproducible_for_a_seed() {
        let spec = live_spec();
        let a = place_non_overlapping(&images(8), &spec, &mut StdRng::seed_from_u64(77)).unwrap();
        let b = place_non_overlapping(&images(8), &spec, &mut StdRng::seed_from_u64(77)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn scatter_preserves_input_order() {
        let mut rng = StdRng::seed_from_u64(2);
        let input = images(5);
        let placed = place_non_overlapping(&input, &live_spec(), &mut rng).unwrap();
        let ids: Vec<_> = placed.iter().map(|p| p.image_id.clone()).collect();
        let expected: Vec<_> = input.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn crowded_canvas_is_infeasible() {
        let spec = ScatterSpec::new(Canvas::new(200.0, 200.0), SizeRange::new(150.0, 150.0), 50);
        let mut rng = StdRng::seed_from_u64(1);
        let square = vec![
            ImageInfo {
                id: "a".into(),
                aspect_ratio: 1.0,
            },
            ImageInfo {
                id: "b".into(),
                aspect_ratio: 1.0,
            },
        ];
        let err = place_non_overlapping(&square, &spec, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::LayoutInfeasible { ref image, attempts: 50 } if image.as_str() == "b"
        ));
    }

    #[test]
    fn image_larger_than_canvas_is_infeasible() {
        let spec = ScatterSpec::new(Canvas::new(100.0, 100.0), SizeRange::new(120.0, 140.0), 10);
        let mut rng = StdRng::seed_from_u64(1);
        let err = place_non_overlapping(&images(1), &spec, &mut rng).unwrap_err();
        assert!(matches!(err, LayoutError::LayoutInfeasible { .. }));
    }

    #[test]
    fn rotation_sampled_within_range() {
        let spec = live_spec().with_rotation(-12.0, 12.0);
        let mut rng = StdRng::seed_from_u64(5);
        let placed = place_non_overlapping(&images(10), &spec, &mut rng).unwrap();
        assert!(placed
            .iter()
            .all(|p| (-12.0..=12.0).contains(&p.rotation_degrees)));
        assert!(placed.iter().any(|p| p.rotation_degrees != 0.0));
        assert!(is_overlap_free(&placed));
    }

    #[test]
    fn min_gap_keeps_images_apart() {
        let spec = live_spec().with_min_gap(25.0);
        let mut rng = StdRng::seed_from_u64(8);
        let placed = place_non_overlapping(&images(6), &spec, &mut rng).unwrap();
        for (i, a) in placed.iter().enumerate() {
            for b in &placed[i + 1..] {
                assert!(!a.rect().inflate(24.9).intersects(&b.rect()));
            }
        }
    }

    #[test]
    fn bad_parameters_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let inverted = ScatterSpec::new(Canvas::new(100.0, 100.0), SizeRange::new(50.0, 10.0), 5);
        assert!(matches!(
            place_non_overlapping(&images(1), &inverted, &mut rng),
            Err(LayoutError::InvalidParameters(_))
        ));
        let no_attempts = ScatterSpec::new(Canvas::new(100.0, 100.0), SizeRange::new(5.0, 10.0), 0);
        assert!(place_non_overlapping(&images(1), &no_attempts, &mut rng).is_err());
        let swallowed = ScatterSpec::new(
            Canvas::new(100.0, 100.0).with_insets(Insets {
                top: 60.0,
                right: 0.0,
                bottom: 60.0,
                left: 0.0,
            }),
            SizeRange::new(5.0, 10.0),
            5,
        );
        assert!(place_non_overlapping(&images(1), &swallowed, &mut rng).is_err());
        let unbounded = ScatterSpec::new(Canvas::new(f64::INFINITY, 500.0), SizeRange::new(5.0, 10.0), 5);
        assert!(matches!(
            place_non_overlapping(&images(1), &unbounded, &mut rng),
            Err(LayoutError::InvalidParameters(_))
        ));
        let nan_inset = ScatterSpec::new(
            Canvas::new(100.0, 100.0).with_insets(Insets {
                top: f64::NAN,
                ..Insets::default()
            }),
            SizeRange::new(5.0, 10.0),
            5,
        );
        assert!(matches!(
            place_non_overlapping(&images(1), &nan_inset, &mut rng),
            Err(LayoutError::InvalidParameters(_))
        ));
    }

    fn sized(n: usize) -> Vec<SizedImage> {
        (0..n)
            .map(|i| SizedImage {
                id: ImageId(format!("img{i}.png")),
                width: 80.0 + (i * 7 % 100) as f64,
                height: 60.0 + (i * 13 % 90) as f64,
            })
            .collect()
    }

    #[test]
    fn grid_fills_every_cell_row_major() {
        let grid = GridSpec::new(3, 5);
        let input = sized(15);
        let placed = place_grid(&input, &grid).unwrap();
        assert_eq!(placed.len(), 15);
        assert!(is_overlap_free(&placed));

        let cell_w = input.iter().map(|i| i.width).fold(0.0, f64::max);
        let cell_h = input.iter().map(|i| i.height).fold(0.0, f64::max);
        let mut cells = rustc_hash::FxHashSet::default();
        for (i, p) in placed.iter().enumerate() {
            let (cx, cy) = p.center();
            let col = (cx / cell_w).floor() as usize;
            let row = (cy / cell_h).floor() as usize;
            assert_eq!((row, col), (i / 3, i % 3));
            assert!(cells.insert((row, col)));
            assert_eq!(p.width, input[i].width);
            assert_eq!(p.height, input[i].height);
            assert_eq!(p.rotation_degrees, 0.0);
        }
        assert_eq!(cells.len(), 15);
    }

    #[test]
    fn grid_rejects_sixteen_images() {
        let err = place_grid(&sized(16), &GridSpec::new(3, 5)).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::CapacityExceeded {
                images: 16,
                cells: 15
            }
        ));
    }

    #[test]
    fn grid_respects_origin() {
        let placed = place_grid(&sized(1), &GridSpec::new(3, 5).at(40.0, 100.0)).unwrap();
        assert_eq!(placed[0].x, 40.0);
        assert_eq!(placed[0].y, 100.0);
    }

    #[test]
    fn empty_grid_is_empty() {
        assert!(place_grid(&[], &GridSpec::new(3, 5)).unwrap().is_empty());
    }
}
