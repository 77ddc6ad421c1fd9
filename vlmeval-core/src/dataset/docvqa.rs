use std::{
    fs,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};

use super::{EvalDataset, PreparedSample, SHORT_ANSWER_PROMPT};
use crate::{message::InputItem, sample::SampleId, Error, Result};

/// Single-page DocVQA validation questions, read from a JSON export of the imdb file.
///
/// Records without a `question_id` (the imdb header entry) are skipped.
pub struct DocVqaDataset {
    records: Vec<Map<String, Value>>,
    img_dir: PathBuf,
}

impl DocVqaDataset {
    pub fn load(annotation: impl AsRef<Path>, img_dir: impl Into<PathBuf>) -> Result<Self> {
        let annotation = annotation.as_ref();
        if annotation.extension().is_some_and(|ext| ext == "npy") {
            return Err(Error::Annotation {
                path: annotation.to_path_buf(),
                reason: "numpy annotations are not read directly, export the records to JSON first"
                    .to_string(),
            });
        }
        let raw = fs::read_to_string(annotation).map_err(|e| Error::io(annotation, e))?;
        let entries: Vec<Value> = serde_json::from_str(&raw).map_err(|e| Error::Annotation {
            path: annotation.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_records(entries, img_dir))
    }

    pub fn from_records(entries: Vec<Value>, img_dir: impl Into<PathBuf>) -> Self {
        let records = entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(map) if map.contains_key("question_id") => Some(map),
                _ => None,
            })
            .collect();
        Self {
            records,
            img_dir: img_dir.into(),
        }
    }

    fn image_path(&self, record: &Map<String, Value>) -> Option<String> {
        let name = record
            .get("image_name")
            .or_else(|| record.get("image"))
            .and_then(Value::as_str)?;
        let mut path = self.img_dir.join(name);
        if path.extension().is_none() {
            path.set_extension("png");
        }
        Some(path.to_string_lossy().into_owned())
    }
}

impl EvalDataset for DocVqaDataset {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn get(&self, index: usize) -> Result<PreparedSample> {
        let source = &self.records[index];
        let malformed = |reason: &str| Error::Annotation {
            path: self.img_dir.clone(),
            reason: format!("docvqa record {index}: {reason}"),
        };

        let sample_id = SampleId::try_from(&source["question_id"]).map_err(|e| malformed(e.as_str()))?;
        let question = source
            .get("question")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing question"))?;
        let image = self
            .image_path(source)
            .ok_or_else(|| malformed("missing image name"))?;

        let mut record = Map::new();
        record.insert("sample_id".to_string(), source["question_id"].clone());
        record.insert("question".to_string(), Value::String(question.to_string()));
        record.insert(
            "answers".to_string(),
            source.get("answers").cloned().unwrap_or(Value::Array(Vec::new())),
        );
        record.insert("image".to_string(), Value::String(image.clone()));

        Ok(PreparedSample {
            sample_id,
            record,
            message: vec![
                InputItem::image(image),
                InputItem::text(format!("{question}{SHORT_ANSWER_PROMPT}")),
            ],
        })
    }
}
