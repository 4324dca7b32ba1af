use sha2::{Digest, Sha256};

/// Bytes per packed RGB pixel
pub const BYTES_PER_PIXEL: usize = 3;

/// Packed 24-bit RGB readback buffer.
///
/// Rows are stored top to bottom, channels in R, G, B order, which is what
/// the PNG encoder expects.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PixelBuffer {
    /// Create new buffer with given dimensions
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; Self::byte_len(width, height)],
        }
    }

    /// `3 * width * height`
    pub fn byte_len(width: u32, height: u32) -> usize {
        BYTES_PER_PIXEL * width as usize * height as usize
    }

    /// Reallocate for new dimensions; contents are cleared
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(Self::byte_len(width, height), 0);
    }

    /// Clear buffer with color
    pub fn clear(&mut self, color: [u8; 3]) {
        for chunk in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Set pixel at position
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if let Some(idx) = self.index(x, y) {
            self.pixels[idx..idx + BYTES_PER_PIXEL].copy_from_slice(&color);
        }
    }

    /// Get pixel at position
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        self.index(x, y).map(|idx| {
            let mut pixel = [0u8; 3];
            pixel.copy_from_slice(&self.pixels[idx..idx + BYTES_PER_PIXEL]);
            pixel
        })
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL)
    }

    /// Get buffer dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get raw pixel data
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable raw pixel data, for backends writing a whole image
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Copy row-padded RGBA8 readback rows into packed RGB, dropping alpha
    pub fn copy_from_rgba_rows(&mut self, data: &[u8], padded_bytes_per_row: usize) {
        let row_len = self.width as usize * BYTES_PER_PIXEL;
        for (y, dst) in self.pixels.chunks_exact_mut(row_len).enumerate() {
            let src = &data[y * padded_bytes_per_row..];
            for (dst_px, src_px) in dst
                .chunks_exact_mut(BYTES_PER_PIXEL)
                .zip(src.chunks_exact(4))
            {
                dst_px.copy_from_slice(&src_px[..BYTES_PER_PIXEL]);
            }
        }
    }

    /// SHA-256 of the pixel bytes, hex encoded
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(&self.pixels);
        hash.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_buffer_creation() {
        let buf = PixelBuffer::new(1280, 720);
        assert_eq!(buf.dimensions(), (1280, 720));
        assert_eq!(buf.as_bytes().len(), 3 * 1280 * 720);
    }

    #[test]
    fn test_resize_reallocates() {
        let mut buf = PixelBuffer::new(64, 32);
        buf.clear([9, 9, 9]);
        buf.resize(100, 50);
        assert_eq!(buf.as_bytes().len(), 3 * 100 * 50);
        assert_eq!(buf.get_pixel(0, 0), Some([0, 0, 0]));
    }

    #[test]
    fn test_set_get_pixel() {
        let mut buf = PixelBuffer::new(100, 100);
        buf.set_pixel(10, 20, [100, 150, 200]);

        assert_eq!(buf.get_pixel(10, 20), Some([100, 150, 200]));
        assert_eq!(buf.get_pixel(100, 100), None); // Out of bounds
    }

    #[test]
    fn test_copy_from_padded_rgba() {
        let mut buf = PixelBuffer::new(2, 2);
        // 2 pixels of RGBA per row, padded to 12 bytes
        let data = [
            1, 2, 3, 255, 4, 5, 6, 255, 0, 0, 0, 0, //
            7, 8, 9, 255, 10, 11, 12, 255, 0, 0, 0, 0,
        ];
        buf.copy_from_rgba_rows(&data, 12);
        assert_eq!(buf.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_digest_tracks_content() {
        let mut a = PixelBuffer::new(4, 4);
        let b = a.clone();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
        a.set_pixel(1, 1, [1, 0, 0]);
        assert_ne!(a.digest(), b.digest());
    }
}
