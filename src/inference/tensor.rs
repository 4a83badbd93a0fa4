//! Tensor descriptors and image-to-tensor conversion

use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::Array4;

/// Element type of a tensor buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorType {
    /// Not yet configured
    #[default]
    None,
    F32,
    U8,
}

/// Per-channel normalization coefficients. A pixel value `v` in `[0, 255]`
/// becomes `(v / 255 - mean[c]) / norm[c]` in the model input.
#[derive(Debug, Clone, Copy)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub norm: [f32; 3],
}

impl Default for Normalize {
    fn default() -> Self {
        Self {
            mean: [0.0; 3],
            norm: [1.0; 3],
        }
    }
}

/// Describes one model input and carries the staged image frame for the
/// current call
#[derive(Debug, Clone)]
pub struct InputTensorInfo {
    pub name: String,
    pub tensor_type: TensorType,
    /// Batch-first dims: `[n, h, w, c]`, or `[n, c, h, w]` when `is_nchw`
    pub dims: Vec<i64>,
    pub is_nchw: bool,
    /// Channel order the model expects; `false` means BGR
    pub is_rgb: bool,
    pub normalize: Normalize,
    /// RGB frame staged by the engine's pre-process step, already at the
    /// tensor's spatial size
    pub frame: Option<RgbImage>,
}

impl InputTensorInfo {
    pub fn new(name: &str, tensor_type: TensorType, dims: Vec<i64>, is_nchw: bool) -> Self {
        Self {
            name: name.to_string(),
            tensor_type,
            dims,
            is_nchw,
            is_rgb: true,
            normalize: Normalize::default(),
            frame: None,
        }
    }

    pub fn width(&self) -> u32 {
        let idx = if self.is_nchw { 3 } else { 2 };
        self.dims.get(idx).copied().unwrap_or(0).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        let idx = if self.is_nchw { 2 } else { 1 };
        self.dims.get(idx).copied().unwrap_or(0).max(0) as u32
    }

    pub fn channels(&self) -> u32 {
        let idx = if self.is_nchw { 1 } else { 3 };
        self.dims.get(idx).copied().unwrap_or(0).max(0) as u32
    }

    /// Shape must be non-empty and strictly positive before inference may run
    pub fn validate(&self) -> Result<()> {
        if self.dims.is_empty() {
            anyhow::bail!("input tensor {}: empty shape", self.name);
        }
        if self.dims.iter().any(|&d| d <= 0) {
            anyhow::bail!("input tensor {}: non-positive dim in {:?}", self.name, self.dims);
        }
        if self.tensor_type == TensorType::None {
            anyhow::bail!("input tensor {}: element type not set", self.name);
        }
        Ok(())
    }
}

/// Describes one model output; `dims` and `data` are filled by the backend
#[derive(Debug, Clone)]
pub struct OutputTensorInfo {
    pub name: String,
    pub tensor_type: TensorType,
    pub dims: Vec<i64>,
    pub data: Vec<f32>,
}

impl OutputTensorInfo {
    pub fn new(name: &str, tensor_type: TensorType) -> Self {
        Self {
            name: name.to_string(),
            tensor_type,
            dims: Vec::new(),
            data: Vec::new(),
        }
    }

    fn dim(&self, idx: usize) -> i64 {
        self.dims.get(idx).copied().unwrap_or(1)
    }

    /// Spatial accessors assume NHWC layout
    pub fn height(&self) -> u32 {
        self.dim(1).max(0) as u32
    }

    pub fn width(&self) -> u32 {
        self.dim(2).max(0) as u32
    }

    pub fn channels(&self) -> u32 {
        self.dim(3).max(0) as u32
    }
}

/// Convert the staged frame into the float tensor the model expects:
/// normalization, NHWC/NCHW layout, and RGB/BGR channel order.
pub fn to_tensor_data(info: &InputTensorInfo) -> Result<Array4<f32>> {
    let frame = info
        .frame
        .as_ref()
        .with_context(|| format!("input tensor {}: no frame staged", info.name))?;
    let (w, h, c) = (info.width() as usize, info.height() as usize, info.channels() as usize);
    if frame.width() as usize != w || frame.height() as usize != h {
        anyhow::bail!(
            "input tensor {}: staged frame is {}x{}, descriptor wants {}x{}",
            info.name,
            frame.width(),
            frame.height(),
            w,
            h
        );
    }
    if c != 3 {
        anyhow::bail!("input tensor {}: expected 3 channels, got {}", info.name, c);
    }

    let shape = if info.is_nchw { (1, c, h, w) } else { (1, h, w, c) };
    let mut tensor = Array4::<f32>::zeros(shape);

    for y in 0..h {
        for x in 0..w {
            let pixel = frame.get_pixel(x as u32, y as u32);
            for ch in 0..c {
                // `ch` indexes the model channel; swap when the model is BGR
                let src = if info.is_rgb { ch } else { 2 - ch };
                let v = (pixel[src] as f32 / 255.0 - info.normalize.mean[ch]) / info.normalize.norm[ch];
                if info.is_nchw {
                    tensor[[0, ch, y, x]] = v;
                } else {
                    tensor[[0, y, x, ch]] = v;
                }
            }
        }
    }

    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn staged_info(is_nchw: bool, is_rgb: bool, normalize: Normalize) -> InputTensorInfo {
        let dims = if is_nchw {
            vec![1, 3, 2, 2]
        } else {
            vec![1, 2, 2, 3]
        };
        let mut info = InputTensorInfo::new("in", TensorType::F32, dims, is_nchw);
        info.is_rgb = is_rgb;
        info.normalize = normalize;
        let mut frame = RgbImage::new(2, 2);
        frame.put_pixel(0, 0, Rgb([255, 0, 0]));
        frame.put_pixel(1, 0, Rgb([0, 255, 0]));
        frame.put_pixel(0, 1, Rgb([0, 0, 255]));
        frame.put_pixel(1, 1, Rgb([51, 102, 153]));
        info.frame = Some(frame);
        info
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        let mut info = InputTensorInfo::new("in", TensorType::F32, vec![], false);
        assert!(info.validate().is_err());
        info.dims = vec![1, 0, 4, 3];
        assert!(info.validate().is_err());
        info.dims = vec![1, -1, 4, 3];
        assert!(info.validate().is_err());
        info.dims = vec![1, 4, 4, 3];
        assert!(info.validate().is_ok());
        info.tensor_type = TensorType::None;
        assert!(info.validate().is_err());
    }

    #[test]
    fn test_spatial_accessors_by_layout() {
        let nhwc = InputTensorInfo::new("in", TensorType::F32, vec![1, 62, 48, 3], false);
        assert_eq!((nhwc.width(), nhwc.height(), nhwc.channels()), (48, 62, 3));
        let nchw = InputTensorInfo::new("in", TensorType::F32, vec![1, 3, 62, 48], true);
        assert_eq!((nchw.width(), nchw.height(), nchw.channels()), (48, 62, 3));
    }

    #[test]
    fn test_to_tensor_nhwc_identity_range() {
        // mean 0 / norm 1/255 reproduces raw pixel values
        let normalize = Normalize {
            mean: [0.0; 3],
            norm: [1.0 / 255.0; 3],
        };
        let info = staged_info(false, true, normalize);
        let t = to_tensor_data(&info).unwrap();
        assert_eq!(t[[0, 0, 0, 0]], 255.0);
        assert_eq!(t[[0, 0, 1, 1]], 255.0);
        assert_eq!(t[[0, 1, 1, 2]], 153.0);
    }

    #[test]
    fn test_to_tensor_nchw_placement() {
        let info = staged_info(true, true, Normalize::default());
        let t = to_tensor_data(&info).unwrap();
        // red pixel at (0,0) lands in channel plane 0
        assert!((t[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(t[[0, 1, 0, 0]].abs() < 1e-6);
        // green pixel at (1,0) lands in channel plane 1
        assert!((t[[0, 1, 0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_to_tensor_bgr_swap() {
        let info = staged_info(false, false, Normalize::default());
        let t = to_tensor_data(&info).unwrap();
        // red pixel at (0,0): channel 0 is B, channel 2 is R
        assert!(t[[0, 0, 0, 0]].abs() < 1e-6);
        assert!((t[[0, 0, 0, 2]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_to_tensor_mean_norm_formula() {
        let normalize = Normalize {
            mean: [0.485, 0.456, 0.406],
            norm: [0.229, 0.224, 0.225],
        };
        let info = staged_info(false, true, normalize);
        let t = to_tensor_data(&info).unwrap();
        let expected = (51.0 / 255.0 - 0.485) / 0.229;
        assert!((t[[0, 1, 1, 0]] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_to_tensor_requires_matching_frame() {
        let mut info = InputTensorInfo::new("in", TensorType::F32, vec![1, 4, 4, 3], false);
        assert!(to_tensor_data(&info).is_err());
        info.frame = Some(RgbImage::new(2, 2));
        assert!(to_tensor_data(&info).is_err());
    }
}
