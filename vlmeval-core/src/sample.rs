use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Identifier of a benchmark sample. Annotation files use either integers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleId {
    Int(i64),
    Str(String),
}

impl Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for SampleId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for SampleId {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for SampleId {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl TryFrom<&Value> for SampleId {
    type Error = String;

    fn try_from(value: &Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .ok_or_else(|| format!("non-integer sample id {n}")),
            Value::String(s) => Ok(Self::Str(s.clone())),
            other => Err(format!("unsupported sample id {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub images_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_list: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One MileBench item. Unknown fields are kept so they can be written back with the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub sample_id: SampleId,
    #[serde(default)]
    pub task_instruction_id: usize,
    pub task_instance: TaskInstance,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Sample {
    pub fn n_images(&self) -> usize {
        self.task_instance.images_path.len()
    }

    /// The sample as a JSON object, the base of its prediction record.
    pub fn to_record(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => unreachable!("samples always serialize to objects"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    #[serde(default)]
    pub task_instruction: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A MileBench annotation file: `{"meta_data": {...}, "data": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub meta_data: MetaData,
    pub data: Vec<Sample>,
}

impl Annotation {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| Error::Annotation {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Location of a MileBench annotation file inside `dataset_dir`.
///
/// `combine_image` of `None` or `Some(1)` selects the plain `<name>.json`.
pub fn annotation_path(dataset_dir: &Path, dataset_name: &str, combine_image: Option<usize>) -> PathBuf {
    match combine_image {
        Some(n) if n != 1 => dataset_dir.join(format!("{dataset_name}_combined_{n}.json")),
        _ => dataset_dir.join(format!("{dataset_name}.json")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_keeps_unknown_fields() {
        let raw = r#"{
            "sample_id": 7,
            "task_instruction_id": 1,
            "task_instance": {"context": "ctx {image#1}", "images_path": ["a.jpg"], "level": 3},
            "response": "B"
        }"#;
        let sample: Sample = serde_json::from_str(raw).unwrap();
        assert_eq!(sample.sample_id, SampleId::Int(7));
        assert_eq!(sample.n_images(), 1);

        let record = sample.to_record().unwrap();
        assert_eq!(record["response"], "B");
        assert_eq!(record["task_instance"]["level"], 3);
        assert_eq!(record["sample_id"], 7);
        assert!(record["task_instance"].get("choice_list").is_none());
    }

    #[test]
    fn string_and_integer_ids() {
        let id: SampleId = serde_json::from_str("\"abc_1\"").unwrap();
        assert_eq!(id, SampleId::from("abc_1"));
        let id: SampleId = serde_json::from_str("12").unwrap();
        assert_eq!(id.to_string(), "12");
        assert!(SampleId::try_from(&serde_json::json!(1.5)).is_err());
    }

    #[test]
    fn annotation_file_name() {
        let dir = Path::new("data/MileBench/ALFRED");
        assert_eq!(
            annotation_path(dir, "ALFRED", None),
            dir.join("ALFRED.json")
        );
        assert_eq!(
            annotation_path(dir, "ALFRED", Some(1)),
            dir.join("ALFRED.json")
        );
        assert_eq!(
            annotation_path(dir, "ALFRED", Some(4)),
            dir.join("ALFRED_combined_4.json")
        );
    }
}
