use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::sample::SampleId;

/// A sample's output record: its original fields plus `answer` and `gen_model_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub sample_id: SampleId,
    pub record: Map<String, Value>,
}

impl Prediction {
    pub fn new(
        sample_id: SampleId,
        mut record: Map<String, Value>,
        answer: String,
        model_name: &str,
    ) -> Self {
        record.insert("answer".to_string(), Value::String(answer));
        record.insert(
            "gen_model_id".to_string(),
            Value::String(model_name.to_string()),
        );
        Self { sample_id, record }
    }

    pub fn answer(&self) -> Option<&str> {
        self.record.get("answer").and_then(Value::as_str)
    }
}

impl Serialize for Prediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.record.serialize(serializer)
    }
}

/// Drop repeated sample ids. The last entry wins but keeps the slot of the first one.
pub fn dedup_by_sample_id(predictions: Vec<Prediction>) -> Vec<Prediction> {
    let mut unique: IndexMap<SampleId, Prediction> = IndexMap::with_capacity(predictions.len());
    for prediction in predictions {
        unique.insert(prediction.sample_id.clone(), prediction);
    }
    unique.into_values().collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn pred(id: i64, answer: &str) -> Prediction {
        Prediction::new(SampleId::Int(id), Map::new(), answer.to_string(), "m")
    }

    #[test]
    fn last_write_wins_in_first_position() {
        let out = dedup_by_sample_id(vec![pred(1, "a"), pred(2, "b"), pred(1, "c")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sample_id, SampleId::Int(1));
        assert_eq!(out[0].answer(), Some("c"));
        assert_eq!(out[1].answer(), Some("b"));
    }

    #[test]
    fn no_duplicates_survive() {
        let input: Vec<_> = (0..50).map(|i| pred(i % 7, "x")).collect();
        let unique_in: HashSet<_> = input.iter().map(|p| p.sample_id.clone()).collect();
        let out = dedup_by_sample_id(input);
        assert_eq!(out.len(), unique_in.len());
    }

    #[test]
    fn serializes_as_flat_record() {
        let mut record = Map::new();
        record.insert("sample_id".into(), Value::from(3));
        let p = Prediction::new(SampleId::Int(3), record, "yes".into(), "qwen2-vl");
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"sample_id": 3, "answer": "yes", "gen_model_id": "qwen2-vl"})
        );
    }
}
