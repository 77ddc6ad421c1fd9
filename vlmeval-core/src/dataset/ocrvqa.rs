use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{EvalDataset, PreparedSample, SHORT_ANSWER_PROMPT};
use crate::{message::InputItem, sample::SampleId, Error, Result};

const TEST_SPLIT: u8 = 3;

#[derive(Debug, Deserialize)]
struct Book {
    #[serde(rename = "imageURL", default)]
    image_url: String,
    #[serde(default)]
    questions: Vec<String>,
    #[serde(default)]
    answers: Vec<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    genre: String,
    split: u8,
}

struct Question {
    sample_id: String,
    image: String,
    question: String,
    answer: String,
    title: String,
    genre: String,
}

/// OCR-VQA test questions, one sample per question of every test-split book cover.
pub struct OcrVqaDataset {
    questions: Vec<Question>,
}

impl OcrVqaDataset {
    /// Reads `<dir>/dataset.json`; covers live in `<dir>/images`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let annotation = dir.join("dataset.json");
        let raw = fs::read_to_string(&annotation).map_err(|e| Error::io(&annotation, e))?;
        let books: Map<String, Value> =
            serde_json::from_str(&raw).map_err(|e| Error::Annotation {
                path: annotation.clone(),
                reason: e.to_string(),
            })?;
        Self::from_books(books, dir.join("images")).map_err(|reason| Error::Annotation {
            path: annotation,
            reason,
        })
    }

    fn from_books(books: Map<String, Value>, img_dir: PathBuf) -> std::result::Result<Self, String> {
        let mut questions = Vec::new();
        for (id, value) in books {
            let book: Book = serde_json::from_value(value).map_err(|e| format!("book {id}: {e}"))?;
            if book.split != TEST_SPLIT {
                continue;
            }
            let ext = Path::new(&book.image_url)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("jpg");
            let image = img_dir
                .join(format!("{id}.{ext}"))
                .to_string_lossy()
                .into_owned();
            for (idx, (question, answer)) in book.questions.iter().zip(&book.answers).enumerate() {
                questions.push(Question {
                    sample_id: format!("{id}_{idx}"),
                    image: image.clone(),
                    question: question.clone(),
                    answer: answer.clone(),
                    title: book.title.clone(),
                    genre: book.genre.clone(),
                });
            }
        }
        Ok(Self { questions })
    }
}

impl EvalDataset for OcrVqaDataset {
    fn len(&self) -> usize {
        self.questions.len()
    }

    fn get(&self, index: usize) -> Result<PreparedSample> {
        let q = &self.questions[index];
        let mut record = Map::new();
        record.insert("sample_id".to_string(), Value::String(q.sample_id.clone()));
        record.insert("question".to_string(), Value::String(q.question.clone()));
        record.insert(
            "answers".to_string(),
            Value::Array(vec![Value::String(q.answer.clone())]),
        );
        record.insert("title".to_string(), Value::String(q.title.clone()));
        record.insert("genre".to_string(), Value::String(q.genre.clone()));
        record.insert(
            "image".to_string(),
            Value::Array(vec![Value::String(q.image.clone())]),
        );

        Ok(PreparedSample {
            sample_id: SampleId::Str(q.sample_id.clone()),
            record,
            message: vec![
                InputItem::image(&q.image),
                InputItem::text(format!("{}{SHORT_ANSWER_PROMPT}", q.question)),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn only_test_split_questions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("dataset.json"),
            json!({
                "0001": {
                    "imageURL": "http://images.amazon.com/0001.jpg",
                    "questions": ["Who wrote this book?", "What is the title?"],
                    "answers": ["Jane Doe", "Rust"],
                    "title": "Rust",
                    "genre": "Computers",
                    "split": 3
                },
                "0002": {
                    "imageURL": "http://images.amazon.com/0002.png",
                    "questions": ["Is this a novel?"],
                    "answers": ["No"],
                    "split": 1
                }
            })
            .to_string(),
        )
        .unwrap();

        let ds = OcrVqaDataset::load(dir.path()).unwrap();
        assert_eq!(ds.len(), 2);

        let second = ds.get(1).unwrap();
        assert_eq!(second.sample_id, SampleId::from("0001_1"));
        assert_eq!(second.record["answers"], json!(["Rust"]));
        assert!(second.message[0].value.ends_with("images/0001.jpg"));
        assert_eq!(
            second.message[1],
            InputItem::text("What is the title?\nAnswer the question using a single word or phrase.")
        );
    }

    #[test]
    fn missing_dataset_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            OcrVqaDataset::load(dir.path()),
            Err(Error::Io { .. })
        ));
    }
}
