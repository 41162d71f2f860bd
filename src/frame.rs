use image::RgbImage;

pub struct Frame {
    /// 1-based position in the source, counting skipped frames too
    pub index: u64,
    pub timestamp: f64, // in seconds
    pub image: RgbImage,
}

impl Frame {
    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
