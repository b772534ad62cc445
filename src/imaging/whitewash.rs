use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::VecDeque;
use std::io::Cursor;
use tracing::warn;

/// Decode, flood-fill the background to pure white, re-encode as PNG.
/// Returns `None` when the bytes are not a decodable raster image.
pub fn whiten_background(bytes: &[u8], tolerance: u8) -> Option<Vec<u8>> {
    let decoded = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(err) => {
            warn!(target: "rickhouse.image", error = %err, "whitewash skipped: undecodable image");
            return None;
        }
    };
    let mut rgba = decoded.to_rgba8();
    flood_fill_white(&mut rgba, tolerance);

    let mut out = Cursor::new(Vec::new());
    if let Err(err) = image::DynamicImage::ImageRgba8(rgba).write_to(&mut out, ImageFormat::Png) {
        warn!(target: "rickhouse.image", error = %err, "whitewash skipped: encode failed");
        return None;
    }
    Some(out.into_inner())
}

/// Flood fill from all four borders across near-white (or transparent)
/// pixels, forcing each reached pixel to opaque pure white. Enclosed regions
/// never touched by the border flood stay as they are.
pub fn flood_fill_white(img: &mut RgbaImage, tolerance: u8) {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let mut visited = vec![false; (width * height) as usize];
    let mut queue: VecDeque<(u32, u32)> = VecDeque::new();

    let mut seed = |x: u32, y: u32, img: &RgbaImage, visited: &mut [bool], queue: &mut VecDeque<(u32, u32)>| {
        let idx = (y * width + x) as usize;
        if !visited[idx] && is_background(img.get_pixel(x, y), tolerance) {
            visited[idx] = true;
            queue.push_back((x, y));
        }
    };

    for x in 0..width {
        seed(x, 0, img, &mut visited, &mut queue);
        seed(x, height - 1, img, &mut visited, &mut queue);
    }
    for y in 0..height {
        seed(0, y, img, &mut visited, &mut queue);
        seed(width - 1, y, img, &mut visited, &mut queue);
    }

    while let Some((x, y)) = queue.pop_front() {
        img.put_pixel(x, y, Rgba([255, 255, 255, 255]));

        let neighbors = [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ];
        for (nx, ny) in neighbors {
            if nx >= width || ny >= height {
                continue;
            }
            let idx = (ny * width + nx) as usize;
            if !visited[idx] && is_background(img.get_pixel(nx, ny), tolerance) {
                visited[idx] = true;
                queue.push_back((nx, ny));
            }
        }
    }
}

fn is_background(pixel: &Rgba<u8>, tolerance: u8) -> bool {
    let [r, g, b, a] = pixel.0;
    if a == 0 {
        return true;
    }
    let floor = 255 - tolerance;
    r >= floor && g >= floor && b >= floor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(rgba))
    }

    #[test]
    fn border_connected_near_white_becomes_pure_white() {
        let mut img = solid(5, 5, [245, 246, 244, 255]);
        img.put_pixel(2, 2, Rgba([40, 30, 20, 255]));
        flood_fill_white(&mut img, 24);

        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(4, 2).0, [255, 255, 255, 255]);
        // the bottle pixel stays untouched
        assert_eq!(img.get_pixel(2, 2).0, [40, 30, 20, 255]);
    }

    #[test]
    fn enclosed_near_white_region_is_preserved() {
        // dark frame around a near-white center: the center never connects
        // to the border flood
        let mut img = solid(5, 5, [10, 10, 10, 255]);
        img.put_pixel(2, 2, Rgba([250, 250, 250, 255]));
        flood_fill_white(&mut img, 24);

        assert_eq!(img.get_pixel(2, 2).0, [250, 250, 250, 255]);
        assert_eq!(img.get_pixel(0, 0).0, [10, 10, 10, 255]);
    }

    #[test]
    fn transparent_border_counts_as_background() {
        let mut img = solid(3, 3, [0, 0, 0, 0]);
        img.put_pixel(1, 1, Rgba([90, 60, 30, 255]));
        flood_fill_white(&mut img, 24);

        assert_eq!(img.get_pixel(0, 1).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(1, 1).0, [90, 60, 30, 255]);
    }

    #[test]
    fn pixels_beyond_tolerance_are_left_alone() {
        let mut img = solid(3, 3, [200, 200, 200, 255]);
        flood_fill_white(&mut img, 24);
        assert_eq!(img.get_pixel(0, 0).0, [200, 200, 200, 255]);
    }

    #[test]
    fn round_trips_through_png() {
        let img = solid(4, 4, [246, 246, 246, 255]);
        let mut cursor = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .unwrap();

        let whitened = whiten_background(&cursor.into_inner(), 24).unwrap();
        let reloaded = image::load_from_memory(&whitened).unwrap().to_rgba8();
        assert_eq!(reloaded.get_pixel(1, 1).0, [255, 255, 255, 255]);
    }

    #[test]
    fn undecodable_bytes_return_none() {
        assert!(whiten_background(b"definitely not an image", 24).is_none());
    }
}
