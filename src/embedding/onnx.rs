//! ONNX sentence encoder (BERT-style, mean pooled) via tract.
//!
//! Expects `model.onnx` and `tokenizer.json` in the model directory, e.g. an
//! export of `intfloat/e5-small-v2`. The model is loaded on first use so the
//! server can start before the files are in place.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tokenizers::Tokenizer;
use tract_onnx::prelude::tract_ndarray::{Axis, Ix3};
use tract_onnx::prelude::*;

use super::local::SentenceEncoder;
use crate::core::errors::ApiError;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

struct LoadedModel {
    plan: OnnxPlan,
    tokenizer: Tokenizer,
    input_count: usize,
}

struct TokenizedInput {
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    token_type_ids: Vec<i64>,
}

pub struct OnnxSentenceEncoder {
    model_dir: PathBuf,
    max_sequence_length: usize,
    loaded: OnceLock<Result<LoadedModel, String>>,
}

impl OnnxSentenceEncoder {
    pub fn new(model_dir: PathBuf, max_sequence_length: usize) -> Self {
        Self {
            model_dir,
            max_sequence_length: max_sequence_length.max(1),
            loaded: OnceLock::new(),
        }
    }

    fn model(&self) -> Result<&LoadedModel, ApiError> {
        self.loaded
            .get_or_init(|| load_model(&self.model_dir))
            .as_ref()
            .map_err(|e| ApiError::Misconfigured(e.clone()))
    }

    fn tokenize(&self, tokenizer: &Tokenizer, text: &str) -> Result<TokenizedInput, ApiError> {
        let encoding = tokenizer
            .encode(text, true)
            .map_err(|e| ApiError::Internal(format!("Failed to tokenize text: {}", e)))?;

        let limit = self.max_sequence_length;
        let take = |values: &[u32]| -> Vec<i64> {
            values.iter().take(limit).map(|&v| v as i64).collect()
        };

        Ok(TokenizedInput {
            input_ids: take(encoding.get_ids()),
            attention_mask: take(encoding.get_attention_mask()),
            token_type_ids: take(encoding.get_type_ids()),
        })
    }
}

fn load_model(model_dir: &Path) -> Result<LoadedModel, String> {
    let model_path = model_dir.join("model.onnx");
    let tokenizer_path = model_dir.join("tokenizer.json");
    if !model_path.exists() || !tokenizer_path.exists() {
        return Err(format!(
            "embedding model not found: expected model.onnx and tokenizer.json in {}",
            model_dir.display()
        ));
    }

    let plan = tract_onnx::onnx()
        .model_for_path(&model_path)
        .and_then(|model| model.into_optimized())
        .and_then(|model| model.into_runnable())
        .map_err(|e| format!("Failed to load {}: {}", model_path.display(), e))?;
    let tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| format!("Failed to load {}: {}", tokenizer_path.display(), e))?;
    let input_count = plan.model().inputs.len();

    tracing::info!(
        "Loaded ONNX embedding model from {} ({} inputs)",
        model_dir.display(),
        input_count
    );
    Ok(LoadedModel {
        plan,
        tokenizer,
        input_count,
    })
}

fn batch_tensor<F>(inputs: &[TokenizedInput], seq_len: usize, field: F) -> Result<Tensor, ApiError>
where
    F: Fn(&TokenizedInput) -> &[i64],
{
    let mut data = Vec::with_capacity(inputs.len() * seq_len);
    for input in inputs {
        let values = field(input);
        data.extend_from_slice(values);
        data.extend(std::iter::repeat(0i64).take(seq_len - values.len()));
    }
    Tensor::from_shape(&[inputs.len(), seq_len], &data).map_err(ApiError::internal)
}

impl SentenceEncoder for OnnxSentenceEncoder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model()?;

        let tokenized = texts
            .iter()
            .map(|text| self.tokenize(&model.tokenizer, text))
            .collect::<Result<Vec<_>, _>>()?;
        let seq_len = tokenized
            .iter()
            .map(|t| t.input_ids.len())
            .max()
            .unwrap_or(0)
            .max(1);

        let mut inputs: TVec<TValue> = tvec![
            batch_tensor(&tokenized, seq_len, |t| &t.input_ids)?.into(),
            batch_tensor(&tokenized, seq_len, |t| &t.attention_mask)?.into(),
        ];
        if model.input_count > 2 {
            inputs.push(batch_tensor(&tokenized, seq_len, |t| &t.token_type_ids)?.into());
        }

        let outputs = model
            .plan
            .run(inputs)
            .map_err(|e| ApiError::Internal(format!("Embedding inference failed: {}", e)))?;
        let hidden = outputs[0]
            .to_array_view::<f32>()
            .map_err(ApiError::internal)?
            .into_dimensionality::<Ix3>()
            .map_err(ApiError::internal)?;

        // Masked mean over tokens: (batch, seq, hidden) -> (batch, hidden).
        let mut embeddings = Vec::with_capacity(tokenized.len());
        for (i, input) in tokenized.iter().enumerate() {
            let tokens = hidden.index_axis(Axis(0), i);
            let hidden_size = tokens.shape()[1];
            let mut sum = vec![0.0f32; hidden_size];
            let mut count = 0.0f32;

            for (j, &mask) in input.attention_mask.iter().enumerate() {
                if mask > 0 {
                    for (k, value) in tokens.row(j).iter().enumerate() {
                        sum[k] += value;
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                sum.iter_mut().for_each(|v| *v /= count);
            }
            embeddings.push(sum);
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_files_are_a_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = OnnxSentenceEncoder::new(tmp.path().join("e5-small-v2"), 512);

        let err = encoder.encode(&["query: hello".to_string()]).unwrap_err();
        assert!(matches!(err, ApiError::Misconfigured(ref msg) if msg.contains("model.onnx")));
    }

    #[test]
    fn batch_tensor_right_pads_with_zeros() {
        let inputs = vec![
            TokenizedInput {
                input_ids: vec![101, 7592, 102],
                attention_mask: vec![1, 1, 1],
                token_type_ids: vec![0, 0, 0],
            },
            TokenizedInput {
                input_ids: vec![101, 102],
                attention_mask: vec![1, 1],
                token_type_ids: vec![0, 0],
            },
        ];

        let tensor = batch_tensor(&inputs, 3, |t| &t.attention_mask).unwrap();
        assert_eq!(tensor.shape(), &[2, 3]);
        assert_eq!(tensor.as_slice::<i64>().unwrap(), &[1, 1, 1, 1, 1, 0]);
    }
}
