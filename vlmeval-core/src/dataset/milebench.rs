use std::path::PathBuf;

use regex::Regex;

use super::{EvalDataset, PreparedSample};
use crate::{message::InputItem, sample::Sample, Error, Result};

/// MileBench samples of one image-count group.
pub struct MileBenchDataset {
    samples: Vec<Sample>,
    task_instructions: Vec<String>,
    img_dir: PathBuf,
    combine_image: bool,
    placeholder: Regex,
}

impl MileBenchDataset {
    pub fn new(
        samples: Vec<Sample>,
        task_instructions: Vec<String>,
        img_dir: impl Into<PathBuf>,
        combine_image: Option<usize>,
    ) -> Self {
        Self {
            samples,
            task_instructions,
            img_dir: img_dir.into(),
            combine_image: matches!(combine_image, Some(n) if n != 1),
            placeholder: Regex::new(r"\{(?:image|table)#(\d+)\}").expect("valid placeholder regex"),
        }
    }

    fn prompt(&self, sample: &Sample) -> Result<String> {
        let instruction = self
            .task_instructions
            .get(sample.task_instruction_id)
            .ok_or_else(|| Error::Annotation {
                path: self.img_dir.clone(),
                reason: format!(
                    "sample {} uses task instruction {} of {}",
                    sample.sample_id,
                    sample.task_instruction_id,
                    self.task_instructions.len()
                ),
            })?;

        let instance = &sample.task_instance;
        let mut context = instance.context.clone();
        if let Some(choices) = &instance.choice_list {
            let listed = choices
                .iter()
                .enumerate()
                .map(|(idx, choice)| format!("{}. {choice}", choice_label(idx)))
                .collect::<Vec<_>>()
                .join("\n");
            context.push_str("\nChoice list: \n");
            context.push_str(&listed);
            context.push_str("\nYour answer is: ");
        }
        Ok(format!("{instruction}\n{context}"))
    }

    fn image_path(&self, image: &str) -> String {
        self.img_dir.join(image).to_string_lossy().into_owned()
    }

    /// Interleave text and images. `{image#N}`/`{table#N}` mark where the N-th image goes;
    /// images that are never referenced come first.
    fn interleave(&self, prompt: &str, images: &[String]) -> Vec<InputItem> {
        let images: Vec<String> = images.iter().map(|i| self.image_path(i)).collect();

        if self.combine_image {
            let text = self.placeholder.replace_all(prompt, "");
            let mut items: Vec<InputItem> = images.iter().map(InputItem::image).collect();
            items.push(InputItem::text(text));
            return items;
        }

        let mut used = vec![false; images.len()];
        let mut body = Vec::new();
        let mut last = 0;
        for caps in self.placeholder.captures_iter(prompt) {
            let whole = caps.get(0).expect("group 0 always matches");
            let image = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .filter(|&idx| idx < images.len());
            let Some(idx) = image else {
                continue;
            };
            if whole.start() > last {
                body.push(InputItem::text(&prompt[last..whole.start()]));
            }
            body.push(InputItem::image(&images[idx]));
            used[idx] = true;
            last = whole.end();
        }
        if last < prompt.len() {
            body.push(InputItem::text(&prompt[last..]));
        }

        let mut items: Vec<InputItem> = images
            .iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .map(|(image, _)| InputItem::image(image))
            .collect();
        items.extend(body);
        items
    }
}

/// `A`, `B`, ... for the first 26 choices, then the 1-based position.
fn choice_label(idx: usize) -> String {
    match u8::try_from(idx) {
        Ok(offset) if offset < 26 => char::from(b'A' + offset).to_string(),
        _ => (idx + 1).to_string(),
    }
}

impl EvalDataset for MileBenchDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<PreparedSample> {
        let sample = &self.samples[index];
        let prompt = self.prompt(sample)?;
        Ok(PreparedSample {
            sample_id: sample.sample_id.clone(),
            record: sample.to_record()?,
            message: self.interleave(&prompt, &sample.task_instance.images_path),
        })
    }
}
