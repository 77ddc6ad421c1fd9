use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Value};
use tracing::{info, warn};

use crate::{dataset::ROUGE_OCR_VQA, prediction::Prediction, Error, Result};

/// Where a run's predictions go: `<output_dir>/<model_name>/<dataset_name>/pred.json`.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    path: PathBuf,
    overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Written { path: PathBuf, count: usize },
    /// The file already existed and overwriting was not requested. Nothing was written.
    Exists(PathBuf),
}

impl OutputTarget {
    pub fn new(output_dir: &Path, model_name: &str, dataset_name: &str, overwrite: bool) -> Self {
        Self {
            path: output_dir
                .join(model_name)
                .join(dataset_name)
                .join("pred.json"),
            overwrite,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An existing result file is only replaced on request.
    pub fn is_blocked(&self) -> bool {
        self.path.exists() && !self.overwrite
    }

    pub fn save(&self, mut results: Vec<Prediction>, dataset_name: &str) -> Result<SaveOutcome> {
        if self.is_blocked() {
            warn!(
                "{} exists. Please pass `--overwrite` to avoid unwanted overwriting.",
                self.path.display()
            );
            return Ok(SaveOutcome::Exists(self.path.clone()));
        }

        // OCR-VQA scoring does not need the image paths.
        if dataset_name == ROUGE_OCR_VQA {
            for result in &mut results {
                result.record.insert(
                    "image".to_string(),
                    Value::Array(vec![Value::String("skip".to_string())]),
                );
            }
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = File::create(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let mut writer = BufWriter::new(file);
        let mut ser =
            serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
        results.serialize(&mut ser)?;
        writer.flush().map_err(|e| Error::io(&self.path, e))?;

        info!("Saved {} results to {}", results.len(), self.path.display());
        Ok(SaveOutcome::Written {
            path: self.path.clone(),
            count: results.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::*;
    use crate::sample::SampleId;

    fn prediction(id: &str, image: Value) -> Prediction {
        let mut record = Map::new();
        record.insert("sample_id".into(), Value::from(id));
        record.insert("image".into(), image);
        Prediction::new(SampleId::from(id), record, "ü".into(), "m")
    }

    #[test]
    fn path_convention() {
        let target = OutputTarget::new(Path::new("outputs"), "qwen2-vl", "ALFRED", false);
        assert_eq!(target.path(), Path::new("outputs/qwen2-vl/ALFRED/pred.json"));
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let target = OutputTarget::new(dir.path(), "m", "ALFRED", false);
        fs::create_dir_all(target.path().parent().unwrap()).unwrap();
        fs::write(target.path(), "previous").unwrap();

        assert!(target.is_blocked());
        let outcome = target
            .save(vec![prediction("a", json!("x.jpg"))], "ALFRED")
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Exists(target.path().to_path_buf()));
        assert_eq!(fs::read_to_string(target.path()).unwrap(), "previous");
    }

    #[test]
    fn overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = OutputTarget::new(dir.path(), "m", "ALFRED", true);
        fs::create_dir_all(target.path().parent().unwrap()).unwrap();
        fs::write(target.path(), "previous content that is rather long").unwrap();

        let outcome = target
            .save(vec![prediction("a", json!("x.jpg"))], "ALFRED")
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::Written { count: 1, .. }));

        let written = fs::read_to_string(target.path()).unwrap();
        assert!(written.contains("\n    {\n        \"sample_id\": \"a\""));
        assert!(written.contains("\"answer\": \"ü\""));
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed[0]["image"], "x.jpg");
    }

    #[test]
    fn ocr_vqa_images_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let target = OutputTarget::new(dir.path(), "m", ROUGE_OCR_VQA, false);
        target
            .save(vec![prediction("a", json!(["/data/a.jpg"]))], ROUGE_OCR_VQA)
            .unwrap();
        let parsed: Value = serde_json::from_str(&fs::read_to_string(target.path()).unwrap()).unwrap();
        assert_eq!(parsed[0]["image"], json!(["skip"]));
    }
}
