//! Grouping of samples by image count, so every batch of a group carries the same number of images.

use indexmap::IndexMap;

use crate::sample::Sample;

/// Split samples by their number of images, e.g. `{2: [s1, ...], 3: [s2, ...]}`.
///
/// Groups are ordered by the first appearance of their image count and keep the
/// relative order of their samples.
pub fn split_by_image_count(data: Vec<Sample>) -> IndexMap<usize, Vec<Sample>> {
    let mut groups: IndexMap<usize, Vec<Sample>> = IndexMap::new();
    for sample in data {
        groups.entry(sample.n_images()).or_default().push(sample);
    }
    groups
}

/// Number of samples per batch so that a batch holds at most `batch_image` images,
/// but never fewer than one sample.
pub fn batch_size_for(batch_image: usize, n_img: usize) -> usize {
    (batch_image / n_img.max(1)).max(1)
}
