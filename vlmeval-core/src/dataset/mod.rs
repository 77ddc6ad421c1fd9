//! Benchmark datasets: each turns its annotation records into prepared samples.

mod docvqa;
mod milebench;
mod ocrvqa;

use serde_json::{Map, Value};

pub use docvqa::DocVqaDataset;
pub use milebench::MileBenchDataset;
pub use ocrvqa::OcrVqaDataset;

use crate::{message::InputItem, sample::SampleId, Result};

pub const ANLS_DOCVQA: &str = "ANLS_DocVQA";
pub const ROUGE_OCR_VQA: &str = "Rouge_OCR_VQA";

/// Suffix asking for the short answers ANLS and ROUGE are scored on.
pub(crate) const SHORT_ANSWER_PROMPT: &str = "\nAnswer the question using a single word or phrase.";

/// A sample ready for generation: its output record and the message to send.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSample {
    pub sample_id: SampleId,
    pub record: Map<String, Value>,
    pub message: Vec<InputItem>,
}

/// Random access to prepared samples.
pub trait EvalDataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Result<PreparedSample>;
}
