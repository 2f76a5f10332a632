use crate::image::ColorModel;

use super::header::ComponentId;

/// Bias removed from chroma samples before scaling
const CHROMA_OFFSET: f32 = -128.0;

/// How much of a component sample goes into one output channel: `(value + offset) * factor`
#[derive(Debug, Clone, Copy)]
struct Scale {
    factor: f32,
    offset: f32,
}

const NONE: Scale = Scale {
    factor: 0.0,
    offset: 0.0,
};
const LUMA: Scale = Scale {
    factor: 1.0,
    offset: 0.0,
};

const fn chroma(factor: f32) -> Scale {
    Scale {
        factor,
        offset: CHROMA_OFFSET,
    }
}

// JFIF (T.871) YCbCr to RGB, one row per component, one column per output channel
const Y_TO_RGB: [Scale; 3] = [LUMA, LUMA, LUMA];
const CB_TO_RGB: [Scale; 3] = [NONE, chroma(-0.34414), chroma(1.772)];
const CR_TO_RGB: [Scale; 3] = [chroma(1.402), chroma(-0.71414), NONE];

/// Contribution of a sample of `component` to output channel `channel`. The value of a pixel in
/// a channel is the sum of the contributions of all components.
pub fn contribution(
    color_model: ColorModel,
    channel: usize,
    component: ComponentId,
    value: f32,
) -> f32 {
    let scale = match (color_model, component) {
        (ColorModel::Grayscale, ComponentId::Y) if channel == 0 => LUMA,
        (ColorModel::Grayscale, _) => NONE,
        (ColorModel::Rgb, ComponentId::Y) => Y_TO_RGB[channel],
        (ColorModel::Rgb, ComponentId::Cb) => CB_TO_RGB[channel],
        (ColorModel::Rgb, ComponentId::Cr) => CR_TO_RGB[channel],
    };
    (value + scale.offset) * scale.factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_rgb(y: f32, cb: f32, cr: f32) -> [f32; 3] {
        let mut rgb = [0f32; 3];
        for (channel, value) in rgb.iter_mut().enumerate() {
            *value = contribution(ColorModel::Rgb, channel, ComponentId::Y, y)
                + contribution(ColorModel::Rgb, channel, ComponentId::Cb, cb)
                + contribution(ColorModel::Rgb, channel, ComponentId::Cr, cr);
        }
        rgb
    }

    fn assert_close(actual: [f32; 3], expected: [f32; 3]) {
        for i in 0..3 {
            assert!(
                (actual[i] - expected[i]).abs() < 0.5,
                "{:?} != {:?}",
                actual,
                expected
            );
        }
    }

    #[test]
    fn luminance_goes_to_luminance_plane_only() {
        for v in [0.0, 17.5, 128.0, 255.0, 300.0] {
            assert_eq!(contribution(ColorModel::Grayscale, 0, ComponentId::Y, v), v);
            assert_eq!(contribution(ColorModel::Grayscale, 1, ComponentId::Y, v), 0.0);
            assert_eq!(contribution(ColorModel::Grayscale, 2, ComponentId::Y, v), 0.0);
        }
    }

    #[test]
    fn neutral_chroma_is_gray() {
        for v in [0.0, 64.0, 200.0] {
            assert_eq!(to_rgb(v, 128.0, 128.0), [v, v, v]);
        }
    }

    #[test]
    fn primaries() {
        assert_close(to_rgb(76.245, 84.972, 255.5), [255.0, 0.0, 0.0]);
        assert_close(to_rgb(149.685, 43.528, 21.235), [0.0, 255.0, 0.0]);
        assert_close(to_rgb(29.07, 255.5, 107.265), [0.0, 0.0, 255.0]);
    }

    #[test]
    fn channels_are_red_green_blue() {
        // No blue difference in red, no red difference in blue
        assert_eq!(contribution(ColorModel::Rgb, 0, ComponentId::Cb, 200.0), 0.0);
        assert_eq!(contribution(ColorModel::Rgb, 2, ComponentId::Cr, 200.0), 0.0);
        assert!(contribution(ColorModel::Rgb, 1, ComponentId::Cr, 200.0) < 0.0);
    }
}
