//! Point geometry helpers shared by the camera model and the clip browser.
//!
//! Point batches are `(N, D)` arrays in either cartesian (`D` columns) or
//! homogeneous (`D + 1` columns) form.

use ndarray::{s, Array2, ArrayView2, Axis};

/// Axis-aligned rectangle as `(x1, y1, x2, y2)`.
pub type Rect = (f64, f64, f64, f64);

/// Convert a batch of points to homogeneous coordinates.
///
/// Points already in homogeneous form are returned unchanged.
///
/// # Panics
/// Panics if the points are neither `d` nor `d + 1` columns wide.
pub fn ensure_homogeneous(points: ArrayView2<'_, f64>, d: usize) -> Array2<f64> {
    let cols = points.ncols();
    if cols == d + 1 {
        return points.to_owned();
    }
    assert!(cols == d, "expected {} or {} columns, got {}", d, d + 1, cols);
    let mut homogeneous = Array2::ones((points.nrows(), d + 1));
    homogeneous.slice_mut(s![.., ..d]).assign(&points);
    homogeneous
}

/// Convert a batch of points to cartesian coordinates by dividing through
/// by the homogeneous coordinate.
///
/// Points already in cartesian form are returned unchanged.
///
/// # Panics
/// Panics if the points are neither `d` nor `d + 1` columns wide.
pub fn to_cartesian(points: ArrayView2<'_, f64>, d: usize) -> Array2<f64> {
    let cols = points.ncols();
    if cols == d {
        return points.to_owned();
    }
    assert!(cols == d + 1, "expected {} or {} columns, got {}", d, d + 1, cols);
    let w = points.column(d);
    let mut cartesian = points.slice(s![.., ..d]).to_owned();
    for (mut row, w) in cartesian.axis_iter_mut(Axis(0)).zip(w.iter()) {
        row.mapv_inplace(|v| v / w);
    }
    cartesian
}

/// Apply an affine transformation to a batch of 2D points.
pub fn transform_points_2d(points: ArrayView2<'_, f64>, transform: ArrayView2<'_, f64>) -> Array2<f64> {
    let homogeneous = ensure_homogeneous(points, 2);
    to_cartesian(homogeneous.dot(&transform.t()).view(), 2)
}

/// Apply an affine transformation to a batch of 3D points.
pub fn transform_points_3d(points: ArrayView2<'_, f64>, transform: ArrayView2<'_, f64>) -> Array2<f64> {
    let homogeneous = ensure_homogeneous(points, 3);
    to_cartesian(homogeneous.dot(&transform.t()).view(), 3)
}

/// 3x3 affine transform builders for 2D points.
pub mod mat3 {
    use ndarray::{array, Array2};

    /// Translation by `(tx, ty)`.
    pub fn translate(tx: f64, ty: f64) -> Array2<f64> {
        array![[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]]
    }

    /// Uniform scaling about the origin.
    pub fn scale(s: f64) -> Array2<f64> {
        array![[s, 0.0, 0.0], [0.0, s, 0.0], [0.0, 0.0, 1.0]]
    }
}

/// Scale a rectangle about its centre.
///
/// Values of `zoom` less than 1 expand the rectangle.
pub fn zoom_roi(roi: Rect, zoom: f64) -> Rect {
    if zoom == 1.0 {
        return roi;
    }
    let (x1, y1, x2, y2) = roi;
    let cx = (x1 + x2) / 2.0;
    let cy = (y1 + y2) / 2.0;
    let transform = mat3::translate(cx, cy)
        .dot(&mat3::scale(1.0 / zoom))
        .dot(&mat3::translate(-cx, -cy));
    let corners = ndarray::array![[x1, y1], [x2, y2]];
    let corners = transform_points_2d(corners.view(), transform.view());
    (corners[[0, 0]], corners[[0, 1]], corners[[1, 0]], corners[[1, 1]])
}

/// Find the axis-aligned bounding box containing a set of 2D points.
///
/// # Panics
/// Panics if `points` is empty or `zoom` is negative.
pub fn roi_containing_points_2d(points: ArrayView2<'_, f64>, zoom: f64) -> Rect {
    assert!(zoom >= 0.0, "zoom must be non-negative");
    let cartesian = to_cartesian(points, 2);
    assert!(cartesian.nrows() > 0, "cannot compute an ROI for zero points");
    let mut x1 = f64::INFINITY;
    let mut y1 = f64::INFINITY;
    let mut x2 = f64::NEG_INFINITY;
    let mut y2 = f64::NEG_INFINITY;
    for row in cartesian.rows() {
        x1 = x1.min(row[0]);
        y1 = y1.min(row[1]);
        x2 = x2.max(row[0]);
        y2 = y2.max(row[1]);
    }
    zoom_roi((x1, y1, x2, y2), zoom)
}

/// Find the smallest square containing a rectangle, sharing its centre.
pub fn square_containing_rectangle(rect: Rect) -> Rect {
    let (x1, y1, x2, y2) = rect;
    let cx = (x1 + x2) / 2.0;
    let cy = (y1 + y2) / 2.0;
    let s = ((x2 - x1).max(y2 - y1)) / 2.0;
    (cx - s, cy - s, cx + s, cy + s)
}
