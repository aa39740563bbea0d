//! Placement of an image inside its viewport

use vellum_core::{Affine, AspectRatio, Rect};

/// Where an image's pixel grid lands in user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    /// Maps image pixel coordinates to user space
    pub transform: Affine,
    /// Viewport clip, present when `slice` crops the image
    pub clip: Option<Rect>,
}

/// Fit an image of `width` x `height` pixels into `viewport`
///
/// A zero-sized viewport dimension takes the intrinsic size. `slice` crops to
/// the viewport unless overflow is visible.
pub fn place_image(
    width: u32,
    height: u32,
    viewport: &Rect,
    aspect: &AspectRatio,
    overflow_visible: bool,
) -> ImagePlacement {
    let (iw, ih) = (width as f64, height as f64);
    let viewport = Rect::new(
        viewport.x(),
        viewport.y(),
        if viewport.width() > 0.0 { viewport.width() } else { iw },
        if viewport.height() > 0.0 { viewport.height() } else { ih },
    );

    let transform = aspect.view_box_transform(&Rect::new(0.0, 0.0, iw, ih), &viewport);
    let clip = (aspect.slice && !overflow_visible).then_some(viewport);
    ImagePlacement { transform, clip }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::{Align, Point};

    #[test]
    fn test_none_stretches_to_viewport() {
        let p = place_image(10, 20, &Rect::new(5.0, 5.0, 100.0, 100.0), &AspectRatio::NONE, false);
        assert_eq!(p.transform.transform_point(Point::new(10.0, 20.0)), Point::new(105.0, 105.0));
        assert_eq!(p.clip, None);
    }

    #[test]
    fn test_slice_clips_unless_overflow_visible() {
        let aspect = AspectRatio {
            align: Align::XMidYMid,
            slice: true,
        };
        let viewport = Rect::new(0.0, 0.0, 50.0, 100.0);
        let p = place_image(100, 100, &viewport, &aspect, false);
        assert_eq!(p.clip, Some(viewport));
        assert_eq!(p.transform.a(), 1.0);
        assert_eq!(p.transform.e(), -25.0);

        let p = place_image(100, 100, &viewport, &aspect, true);
        assert_eq!(p.clip, None);
    }

    #[test]
    fn test_zero_viewport_uses_intrinsic_size() {
        let p = place_image(40, 30, &Rect::new(1.0, 2.0, 0.0, 0.0), &AspectRatio::default(), false);
        assert!(p.transform.approx_eq(&Affine::translation(1.0, 2.0), 1e-12));
    }
}
