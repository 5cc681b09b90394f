//! Skeleton rendering onto raster images.

use image::{Rgb, RgbImage};
use ndarray::ArrayView2;

use crate::skeleton::{JointGroup, Skeleton};

/// Colour used for joint markers.
pub const JOINT_COLOUR: Rgb<u8> = Rgb([128, 128, 128]);

/// Bone colour for a joint group. Distinct left/right colours make it easy to
/// tell which way the subject is facing.
#[must_use]
pub fn group_colour(group: JointGroup) -> Rgb<u8> {
    match group {
        JointGroup::Centre => Rgb([255, 0, 255]),
        JointGroup::Left => Rgb([0, 0, 255]),
        JointGroup::Right => Rgb([255, 0, 0]),
    }
}

/// Draw a 2D pose onto an image: one line per bone, coloured by joint group,
/// with grey joint markers on top.
///
/// `joints_2d` is a `(joints, 2)` array of image-space coordinates.
/// Coordinates outside the image are clipped, not an error.
pub fn draw_joints_2d(image: &mut RgbImage, joints_2d: ArrayView2<'_, f64>, skeleton: &Skeleton) {
    for joint_id in 0..skeleton.joint_count() {
        let parent_id = skeleton.parent(joint_id);
        let (x0, y0) = (joints_2d[[joint_id, 0]], joints_2d[[joint_id, 1]]);
        let (x1, y1) = (joints_2d[[parent_id, 0]], joints_2d[[parent_id, 1]]);
        // Zero-length bones (e.g. the root to itself) have nothing to draw.
        if (x1 - x0).hypot(y1 - y0) < 1.0 {
            continue;
        }
        draw_line(image, (x0, y0), (x1, y1), group_colour(skeleton.group(joint_id)));
    }
    for row in joints_2d.rows() {
        draw_marker(image, row[0], row[1], JOINT_COLOUR);
    }
}

/// Render a 3D pose as an orthographic front-view figure on a blank canvas.
///
/// World x maps to image x and world y to image y (the dataset's y axis
/// points down), scaled uniformly to fit with a small margin.
#[must_use]
pub fn render_pose_3d(
    joints_3d: ArrayView2<'_, f32>,
    skeleton: &Skeleton,
    width: u32,
    height: u32,
) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

    let xs: Vec<f64> = joints_3d.rows().into_iter().map(|r| f64::from(r[0])).collect();
    let ys: Vec<f64> = joints_3d.rows().into_iter().map(|r| f64::from(r[1])).collect();
    let (min_x, max_x) = bounds(&xs);
    let (min_y, max_y) = bounds(&ys);
    let extent = (max_x - min_x).max(max_y - min_y).max(f64::EPSILON);
    let margin = 0.05;
    let scale = f64::from(width.min(height)) * (1.0 - 2.0 * margin) / extent;
    let centre_x = (min_x + max_x) / 2.0;
    let centre_y = (min_y + max_y) / 2.0;

    let project = |x: f64, y: f64| {
        (
            (x - centre_x) * scale + f64::from(width) / 2.0,
            (y - centre_y) * scale + f64::from(height) / 2.0,
        )
    };
    let mut joints_2d = ndarray::Array2::<f64>::zeros((joints_3d.nrows(), 2));
    for (i, row) in joints_3d.rows().into_iter().enumerate() {
        let (x, y) = project(f64::from(row[0]), f64::from(row[1]));
        joints_2d[[i, 0]] = x;
        joints_2d[[i, 1]] = y;
    }
    draw_joints_2d(&mut image, joints_2d.view(), skeleton);
    image
}

fn bounds(values: &[f64]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if min > max {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}

fn put_pixel_clipped(image: &mut RgbImage, x: i64, y: i64, colour: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < i64::from(image.width()) && y < i64::from(image.height()) {
        image.put_pixel(x as u32, y as u32, colour);
    }
}

fn draw_marker(image: &mut RgbImage, x: f64, y: f64, colour: Rgb<u8>) {
    let (cx, cy) = (x.round() as i64, y.round() as i64);
    for dy in -1..=1 {
        for dx in -1..=1 {
            put_pixel_clipped(image, cx + dx, cy + dy, colour);
        }
    }
}

// Bresenham line drawing, clipped to the image bounds.
fn draw_line(image: &mut RgbImage, from: (f64, f64), to: (f64, f64), colour: Rgb<u8>) {
    let (mut x0, mut y0) = (from.0.round() as i64, from.1.round() as i64);
    let (x1, y1) = (to.0.round() as i64, to.1.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put_pixel_clipped(image, x0, y0, colour);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::ASPSET_17J;
    use ndarray::Array2;

    #[test]
    fn test_group_colours_are_distinct() {
        assert_ne!(group_colour(JointGroup::Left), group_colour(JointGroup::Right));
        assert_ne!(group_colour(JointGroup::Left), group_colour(JointGroup::Centre));
    }

    #[test]
    fn test_draw_line_endpoints() {
        let mut image = RgbImage::new(32, 32);
        draw_line(&mut image, (2.0, 2.0), (20.0, 11.0), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(2, 2), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(20, 11), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_draw_line_clips_out_of_bounds() {
        let mut image = RgbImage::new(8, 8);
        draw_line(&mut image, (-10.0, 4.0), (20.0, 4.0), Rgb([0, 255, 0]));
        assert_eq!(*image.get_pixel(0, 4), Rgb([0, 255, 0]));
        assert_eq!(*image.get_pixel(7, 4), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_draw_joints_2d_paints_markers() {
        let mut image = RgbImage::new(64, 64);
        let mut joints = Array2::<f64>::zeros((17, 2));
        for (i, mut row) in joints.rows_mut().into_iter().enumerate() {
            row[0] = 10.0 + i as f64 * 2.0;
            row[1] = 32.0;
        }
        draw_joints_2d(&mut image, joints.view(), &ASPSET_17J);
        assert_eq!(*image.get_pixel(10, 32), JOINT_COLOUR);
    }

    #[test]
    fn test_render_pose_3d() {
        let mut pose = Array2::<f32>::zeros((17, 3));
        for (i, mut row) in pose.rows_mut().into_iter().enumerate() {
            row[0] = i as f32 * 10.0;
            row[1] = (i % 5) as f32 * 25.0;
        }
        let image = render_pose_3d(pose.view(), &ASPSET_17J, 128, 96);
        assert_eq!(image.dimensions(), (128, 96));
        let non_white = image
            .pixels()
            .filter(|p| **p != Rgb([255, 255, 255]))
            .count();
        assert!(non_white > 0);
    }

    #[test]
    fn test_render_degenerate_pose() {
        // All joints at one point must not panic or divide by zero.
        let pose = Array2::<f32>::ones((17, 3));
        let image = render_pose_3d(pose.view(), &ASPSET_17J, 64, 64);
        assert_eq!(image.dimensions(), (64, 64));
    }
}
