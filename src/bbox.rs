use nalgebra as na;
use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug + Copy + PartialEq {}

/// Left-top-right-bottom format, contains left top and right bottom corners
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

/// X-y-width-height format, contains coordinates of the center of bbox and width-height
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Xywh;
impl BBoxFormat for Xywh {}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BBox<F: BBoxFormat>([f32; 4], PhantomData<F>);

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        BBox([left, top, right, bottom], PhantomData)
    }

    #[inline]
    pub fn as_xywh(&self) -> BBox<Xywh> {
        self.into()
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        (self.0[2] - self.0[0]).max(0.0)
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        (self.0[3] - self.0[1]).max(0.0)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    #[inline]
    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new(
            (self.0[0] + self.0[2]) / 2.0,
            (self.0[1] + self.0[3]) / 2.0,
        )
    }

    /// Same box moved by `offset` pixels.
    #[inline]
    pub fn translated(&self, offset: na::Vector2<f32>) -> Self {
        Self::ltrb(
            self.0[0] + offset.x,
            self.0[1] + offset.y,
            self.0[2] + offset.x,
            self.0[3] + offset.y,
        )
    }

    /// Intersection over union, 0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BBox<Ltrb>) -> f32 {
        let i_left = self.left().max(other.left());
        let i_top = self.top().max(other.top());
        let i_right = self.right().min(other.right());
        let i_bottom = self.bottom().min(other.bottom());

        if i_right <= i_left || i_bottom <= i_top {
            return 0.0;
        }

        let i_area = (i_right - i_left) * (i_bottom - i_top);
        let union = self.area() + other.area() - i_area;

        if union <= 0.0 {
            0.0
        } else {
            i_area / union
        }
    }

    /// Integer pixel region `(x, y, w, h)` of this box inside a `width` x `height`
    /// image, `None` when nothing of the box is left after clamping.
    pub fn clamped_region(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.left().max(0.0).floor() as u32;
        let y1 = self.top().max(0.0).floor() as u32;
        let x2 = (self.right().max(0.0).ceil() as u32).min(width);
        let y2 = (self.bottom().max(0.0).ceil() as u32).min(height);

        if x2 <= x1 || y2 <= y1 {
            None
        } else {
            Some((x1, y1, x2 - x1, y2 - y1))
        }
    }
}

impl BBox<Xywh> {
    #[inline]
    pub fn xywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        BBox([cx, cy, w, h], PhantomData)
    }

    #[inline(always)]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }
}

impl<'a> From<&'a BBox<Ltrb>> for BBox<Xywh> {
    #[inline]
    fn from(v: &'a BBox<Ltrb>) -> Self {
        let center = v.center();
        BBox::xywh(center.x, center.y, v.width(), v.height())
    }
}

impl<'a> From<&'a BBox<Xywh>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Xywh>) -> Self {
        let [cx, cy, w, h] = v.0;
        let (half_w, half_h) = (w / 2.0, h / 2.0);
        BBox::ltrb(cx - half_w, cy - half_h, cx + half_w, cy + half_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BBox::ltrb(10.0, 10.0, 50.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BBox::ltrb(0.0, 0.0, 10.0, 10.0);
        let b = BBox::ltrb(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = BBox::ltrb(0.0, 0.0, 10.0, 10.0);
        let b = BBox::ltrb(5.0, 0.0, 15.0, 10.0);
        // 50 / 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn xywh_and_ltrb_convert_both_ways() {
        let b = BBox::xywh(20.0, 30.0, 10.0, 6.0);
        let ltrb = b.as_ltrb();
        assert_eq!(ltrb.as_slice(), &[15.0, 27.0, 25.0, 33.0]);
        assert_eq!(ltrb.as_xywh(), b);
    }

    #[test]
    fn clamped_region_cuts_at_image_border() {
        let b = BBox::ltrb(-5.0, 10.0, 30.0, 200.0);
        assert_eq!(b.clamped_region(20, 100), Some((0, 10, 20, 90)));
        assert_eq!(BBox::ltrb(50.0, 50.0, 60.0, 60.0).clamped_region(20, 20), None);
    }
}
