use image::RgbImage;
use ndarray::{Array2, Array3};
use std::path::Path;
use std::sync::Mutex;
use tch::{CModule, Device, IValue, Kind, Tensor};

use crate::imaging::loader::CanonicalImage;
use crate::inference::annotate::Annotator;
use crate::inference::postprocess::{self, DecodeParams, RawOutput};
use crate::inference::{InferenceError, ModelLoadError, Segmenter};

/// A YOLO segmentation network exported to TorchScript.
pub struct TorchSegmenter {
    module: Mutex<CModule>,
    device: Device,
    params: DecodeParams,
    annotator: Annotator,
}

impl TorchSegmenter {
    pub fn load(
        model_path: &Path,
        params: DecodeParams,
        annotator: Annotator,
    ) -> Result<Self, ModelLoadError> {
        if !model_path.is_file() {
            return Err(ModelLoadError::Missing(model_path.display().to_string()));
        }
        let device = Device::cuda_if_available();
        log::info!("Loading {} on {:?}", model_path.display(), device);

        let mut module = CModule::load_on_device(model_path, device).map_err(|e| {
            ModelLoadError::Runtime {
                path: model_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        module.set_eval();

        Ok(Self {
            module: Mutex::new(module),
            device,
            params,
            annotator,
        })
    }

    fn preprocess(&self, image: &CanonicalImage) -> Tensor {
        let rgb = image.as_rgb();
        let (w, h) = rgb.dimensions();
        let chw = Tensor::from_slice(rgb.as_raw())
            .view([h as i64, w as i64, 3])
            .permute([2, 0, 1])
            .to_kind(Kind::Float);
        (chw / 255.0).unsqueeze(0).to_device(self.device)
    }

    fn forward(&self, input: Tensor) -> Result<IValue, InferenceError> {
        let module = self.module.lock().map_err(|_| InferenceError::Poisoned)?;
        tch::no_grad(|| module.forward_is(&[IValue::Tensor(input)]))
            .map_err(|e| InferenceError::Runtime(e.to_string()))
    }
}

impl Segmenter for TorchSegmenter {
    fn segment(&self, image: &CanonicalImage, confidence: f32) -> Result<RgbImage, InferenceError> {
        let input = self.preprocess(image);
        let output = self.forward(input)?;
        let raw = raw_output(output)?;

        let params = DecodeParams {
            confidence,
            ..self.params
        };
        let detections = postprocess::decode(&raw, &params)
            .map_err(|e| InferenceError::Output(e.to_string()))?;
        log::info!("Model produced {} detections", detections.len());

        Ok(self.annotator.render(image.as_rgb(), &detections))
    }
}

/// Accepts either `preds` alone or `(preds, protos)`, batch dimension included.
fn raw_output(output: IValue) -> Result<RawOutput, InferenceError> {
    let tensors = match output {
        IValue::Tensor(t) => vec![t],
        IValue::Tuple(items) | IValue::GenericList(items) => items
            .into_iter()
            .filter_map(|item| match item {
                IValue::Tensor(t) => Some(t),
                _ => None,
            })
            .collect(),
        IValue::TensorList(items) => items,
        other => {
            return Err(InferenceError::Output(format!(
                "unexpected model output {:?}",
                other
            )))
        }
    };

    let mut tensors = tensors.into_iter();
    let predictions = tensors
        .next()
        .ok_or_else(|| InferenceError::Output("model returned no tensors".to_string()))?;
    let (shape, data) = to_host(&predictions)?;
    let predictions = match shape.as_slice() {
        [1, rows, cols] | [rows, cols] => Array2::from_shape_vec((*rows, *cols), data),
        _ => return Err(InferenceError::Output(format!("bad prediction shape {:?}", shape))),
    }
    .map_err(|e| InferenceError::Output(e.to_string()))?;

    let prototypes = match tensors.next() {
        Some(protos) => {
            let (shape, data) = to_host(&protos)?;
            let protos = match shape.as_slice() {
                [1, nm, ph, pw] | [nm, ph, pw] => Array3::from_shape_vec((*nm, *ph, *pw), data),
                _ => return Err(InferenceError::Output(format!("bad prototype shape {:?}", shape))),
            }
            .map_err(|e| InferenceError::Output(e.to_string()))?;
            Some(protos)
        }
        None => None,
    };

    Ok(RawOutput {
        predictions,
        prototypes,
    })
}

fn to_host(tensor: &Tensor) -> Result<(Vec<usize>, Vec<f32>), InferenceError> {
    let shape = tensor.size().into_iter().map(|d| d as usize).collect();
    let flat = tensor
        .to_device(Device::Cpu)
        .to_kind(Kind::Float)
        .contiguous()
        .view([-1]);
    let data = Vec::<f32>::try_from(&flat).map_err(|e| InferenceError::Output(e.to_string()))?;
    Ok((shape, data))
}
