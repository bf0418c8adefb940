use std::{fmt, sync::Arc};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ErrorKind, StoreError};

type Decoder<T> = Arc<dyn Fn(Value) -> Result<T, StoreError> + Send + Sync>;
type Step<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Converts a raw server response into the shape the consumer wants.
///
/// A pipeline is a decoder (`Value -> T`) followed by an ordered list of
/// typed steps (`T -> T`). Each store instance owns exactly one pipeline.
/// Any sorting done in a step must be stable and consistent across pages so
/// that appended pages stay monotonic.
pub struct TransformPipeline<T> {
    decode: Decoder<T>,
    steps: Vec<Step<T>>,
}

impl<T> TransformPipeline<T> {
    /// Pipeline with a custom decoder.
    pub fn with_decoder(
        decode: impl Fn(Value) -> Result<T, StoreError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            decode: Arc::new(decode),
            steps: Vec::new(),
        }
    }

    /// Append a typed transform step.
    pub fn step(mut self, step: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Run the decoder and every step in order.
    pub fn run(&self, raw: Value) -> Result<T, StoreError> {
        let mut value = (self.decode)(raw)?;
        for step in &self.steps {
            value = step(value);
        }
        Ok(value)
    }
}

impl<T: DeserializeOwned> TransformPipeline<T> {
    /// Pipeline decoding the whole response via serde.
    pub fn deserializing() -> Self {
        Self::with_decoder(|raw| {
            serde_json::from_value(raw).map_err(|err| decode_error(err.to_string()))
        })
    }

    /// Pipeline decoding one top-level field of the response via serde.
    pub fn deserializing_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::with_decoder(move |raw| {
            let value = raw
                .get(&field)
                .cloned()
                .ok_or_else(|| decode_error(format!("missing field '{field}'")))?;
            serde_json::from_value(value).map_err(|err| decode_error(err.to_string()))
        })
    }
}

impl<T: DeserializeOwned> Default for TransformPipeline<T> {
    fn default() -> Self {
        Self::deserializing()
    }
}

impl<T> Clone for TransformPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            decode: Arc::clone(&self.decode),
            steps: self.steps.clone(),
        }
    }
}

impl<T> fmt::Debug for TransformPipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformPipeline")
            .field("steps", &self.steps.len())
            .finish()
    }
}

fn decode_error(detail: String) -> StoreError {
    StoreError::new(
        ErrorKind::Validation,
        "the server response had an unexpected shape",
    )
    .with_detail(detail)
}
