#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, RegionClass};
use crate::frame::FrameView;

/// Settings for one single-class ONNX region model.
#[derive(Clone, Debug)]
pub struct TractSettings {
    pub model_path: PathBuf,
    pub class: RegionClass,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    /// Boxes narrower or shorter than this (frame pixels) are dropped.
    pub min_size: f32,
}

/// Tract-based backend for ONNX inference.
///
/// The model takes a `1x3xHxW` float tensor (RGB scaled to 0..1) and returns
/// rows of `(cx, cy, w, h, score)` normalized to the input size. Frames are
/// resized to the model input before inference and boxes are mapped back to
/// frame pixel coordinates.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    settings: TractSettings,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load(settings: TractSettings) -> Result<Self> {
        let model = load_model(
            &settings.model_path,
            settings.input_width,
            settings.input_height,
        )?;
        log::info!(
            "loaded {} model from {} ({}x{})",
            settings.class.as_str(),
            settings.model_path.display(),
            settings.input_width,
            settings.input_height
        );
        Ok(Self { model, settings })
    }

    fn build_input(&self, frame: &FrameView<'_>) -> Result<Tensor> {
        let pixels = frame.rgb()?;
        let image = RgbImage::from_raw(frame.width(), frame.height(), pixels.to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let resized = image::imageops::resize(
            &image,
            self.settings.input_width,
            self.settings.input_height,
            FilterType::Triangle,
        );

        let width = self.settings.input_width as usize;
        let height = self.settings.input_height as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, height, width), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });

        Ok(input.into_tensor())
    }

    fn extract_boxes(
        &self,
        outputs: TVec<TValue>,
        frame: &FrameView<'_>,
    ) -> Result<Vec<BoundingBox>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let row_len = *scores
            .shape()
            .last()
            .ok_or_else(|| anyhow!("model output has no dimensions"))?;
        let values: Vec<f32> = scores.iter().copied().collect();
        decode_rows(
            &values,
            row_len,
            frame.width() as f32,
            frame.height() as f32,
            &self.settings,
        )
    }
}

/// Decode `(cx, cy, w, h, score, ..)` rows normalized to 0..1 into boxes in
/// frame pixels. Rows below the confidence threshold or the minimum size are
/// dropped; values past the fifth in a row are ignored.
pub(crate) fn decode_rows(
    values: &[f32],
    row_len: usize,
    frame_w: f32,
    frame_h: f32,
    settings: &TractSettings,
) -> Result<Vec<BoundingBox>> {
    if row_len < 5 {
        return Err(anyhow!(
            "model output rows have {} values, expected at least 5",
            row_len
        ));
    }

    let mut boxes = Vec::new();
    for row in values.chunks_exact(row_len) {
        let (cx, cy, w, h, score) = (row[0], row[1], row[2], row[3], row[4]);
        if !score.is_finite() || score < settings.confidence_threshold {
            continue;
        }
        let width = w * frame_w;
        let height = h * frame_h;
        if width < settings.min_size || height < settings.min_size {
            continue;
        }
        boxes.push(BoundingBox::new(
            settings.class,
            (cx - w / 2.0) * frame_w,
            (cy - h / 2.0) * frame_h,
            width,
            height,
        ));
    }
    Ok(boxes)
}

fn load_model(
    model_path: &Path,
    width: u32,
    height: u32,
) -> Result<SimplePlan<TypedFact, Box<dyn TypedOp>>> {
    tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, 3, height as usize, width as usize),
            ),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, class: RegionClass) -> bool {
        class == self.settings.class
    }

    fn detect(&mut self, frame: &FrameView<'_>, class: RegionClass) -> Result<Vec<BoundingBox>> {
        if class != self.settings.class {
            return Err(anyhow!(
                "{} model cannot detect {} regions",
                self.settings.class.as_str(),
                class.as_str()
            ));
        }
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_boxes(outputs, frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TractSettings {
        TractSettings {
            model_path: PathBuf::from("/models/face.onnx"),
            class: RegionClass::Face,
            input_width: 320,
            input_height: 240,
            confidence_threshold: 0.3,
            min_size: 50.0,
        }
    }

    #[test]
    fn rows_map_to_frame_pixels() -> Result<()> {
        // 640x480 frame: a 0.25 x 0.5 box centred at (0.5, 0.5).
        let rows = [0.5, 0.5, 0.25, 0.5, 0.9];
        let boxes = decode_rows(&rows, 5, 640.0, 480.0, &settings())?;
        assert_eq!(
            boxes,
            vec![BoundingBox::new(RegionClass::Face, 240.0, 120.0, 160.0, 240.0)]
        );
        Ok(())
    }

    #[test]
    fn low_confidence_rows_are_dropped() -> Result<()> {
        let rows = [
            0.5, 0.5, 0.25, 0.5, 0.29, // below threshold
            0.5, 0.5, 0.25, 0.5, f32::NAN, // unusable score
            0.2, 0.2, 0.25, 0.5, 0.3, // at threshold
        ];
        let boxes = decode_rows(&rows, 5, 640.0, 480.0, &settings())?;
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].x, (0.2 - 0.125) * 640.0);
        Ok(())
    }

    #[test]
    fn boxes_below_min_size_are_dropped() -> Result<()> {
        // 0.05 * 640 = 32 px wide, under the 50 px minimum.
        let narrow = [0.5, 0.5, 0.05, 0.5, 0.9];
        assert!(decode_rows(&narrow, 5, 640.0, 480.0, &settings())?.is_empty());
        // 0.1 * 480 = 48 px tall.
        let short = [0.5, 0.5, 0.25, 0.1, 0.9];
        assert!(decode_rows(&short, 5, 640.0, 480.0, &settings())?.is_empty());
        Ok(())
    }

    #[test]
    fn extra_row_values_are_ignored() -> Result<()> {
        let rows = [0.5, 0.5, 0.25, 0.5, 0.9, 7.0, 0.5, 0.5, 0.25, 0.5, 0.1, 7.0];
        let boxes = decode_rows(&rows, 6, 640.0, 480.0, &settings())?;
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].class, RegionClass::Face);
        Ok(())
    }

    #[test]
    fn short_rows_are_rejected() {
        let err = decode_rows(&[0.5, 0.5, 0.25, 0.5], 4, 640.0, 480.0, &settings())
            .expect_err("four-value rows");
        assert!(err.to_string().contains("expected at least 5"));
    }
}
