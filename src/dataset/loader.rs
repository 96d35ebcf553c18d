//! Image Folder Loader
//!
//! Discovers a labeled dataset laid out as one directory per class and
//! computes the inverse-frequency class weights used by the training loss.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::{ClassifierError, Result};

/// File extensions recognized as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "ppm", "bmp", "pgm", "tif", "tiff", "webp",
];

/// A single image sample with its label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
}

/// Labeled dataset discovered from a class-per-directory layout
///
/// ```text
/// root_dir/
/// ├── Africa/
/// │   ├── image1.jpg
/// │   └── nested/image2.png
/// ├── Asia/
/// │   └── ...
/// └── ...
/// ```
///
/// Class indices follow the sorted order of the directory names, which is
/// the order written to the label list.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// Class names ordered by label index
    pub classes: Vec<String>,
    /// All samples in the dataset
    pub samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scan `root_dir` for class directories and the images inside them
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading image folder from: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(ClassifierError::DatasetMissing(root_dir));
        }

        let mut classes: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    classes.push(name.to_string());
                }
            }
        }
        classes.sort();

        if classes.is_empty() {
            return Err(ClassifierError::Dataset(format!(
                "no class directories found in {:?}",
                root_dir
            )));
        }

        info!("Found {} classes", classes.len());

        let mut samples = Vec::new();
        for (label, class_name) in classes.iter().enumerate() {
            let class_dir = root_dir.join(class_name);
            let before = samples.len();

            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.into_path();
                if is_image_file(&path) {
                    samples.push(ImageSample { path, label });
                }
            }

            debug!(
                "Class '{}' (label {}): {} samples",
                class_name,
                label,
                samples.len() - before
            );
        }

        info!("Loaded {} total samples", samples.len());

        Ok(Self {
            root_dir,
            classes,
            samples,
        })
    }

    /// Get the number of samples in the dataset
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the number of classes
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Number of samples per class, indexed by label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    /// Inverse-frequency loss weights, see [`ClassWeights::from_counts`]
    pub fn class_weights(&self) -> Result<ClassWeights> {
        ClassWeights::from_counts(&self.classes, &self.class_counts())
    }

    /// Get statistics about the dataset
    pub fn get_stats(&self) -> DatasetStats {
        DatasetStats {
            total_samples: self.samples.len(),
            num_classes: self.num_classes(),
            class_counts: self.class_counts(),
            class_names: self
                .classes
                .iter()
                .enumerate()
                .map(|(idx, name)| (idx, name.clone()))
                .collect(),
        }
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Per-class loss weights: `total_samples / count[c]`
///
/// Rare classes weigh more, so each class contributes roughly equally to
/// the loss regardless of how many images it has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    pub weights: Vec<f32>,
}

impl ClassWeights {
    /// Compute weights from per-class counts
    ///
    /// A class with no samples would get an infinite weight, so it is
    /// rejected with a dataset error naming the class.
    pub fn from_counts(classes: &[String], counts: &[usize]) -> Result<Self> {
        let total: usize = counts.iter().sum();

        let weights = counts
            .iter()
            .enumerate()
            .map(|(idx, &count)| {
                if count == 0 {
                    let name = classes.get(idx).map(String::as_str).unwrap_or("?");
                    Err(ClassifierError::Dataset(format!(
                        "class '{}' contains no images",
                        name
                    )))
                } else {
                    Ok(total as f32 / count as f32)
                }
            })
            .collect::<Result<Vec<f32>>>()?;

        Ok(Self { weights })
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }
}

/// Statistics about the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub num_classes: usize,
    pub class_counts: Vec<usize>,
    pub class_names: HashMap<usize, String>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\n📊 Dataset Statistics:");
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.num_classes);
        println!("\n  Samples per class:");

        let mut sorted: Vec<_> = self.class_names.iter().collect();
        sorted.sort_by_key(|(idx, _)| *idx);

        for (idx, name) in sorted {
            let count = self.class_counts[*idx];
            let bar_len = if self.total_samples > 0 {
                (count as f32 / self.total_samples as f32 * 40.0) as usize
            } else {
                0
            };
            println!("    {:3}. {:30} {:5} {}", idx, name, count, "█".repeat(bar_len));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"not really an image").unwrap();
    }

    #[test]
    fn test_discovers_sorted_classes_and_nested_images() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Oceania/a.jpg"));
        touch(&root.join("Asia/b.PNG"));
        touch(&root.join("Asia/nested/c.jpeg"));
        touch(&root.join("Asia/notes.txt"));
        touch(&root.join("Europe/d.webp"));

        let folder = ImageFolder::new(root).unwrap();

        assert_eq!(folder.classes, vec!["Asia", "Europe", "Oceania"]);
        assert_eq!(folder.len(), 4);
        assert_eq!(folder.class_counts(), vec![2, 1, 1]);
        assert!(folder.samples.iter().all(|s| s.path.extension().unwrap() != "txt"));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageFolder::new(dir.path().join("train")).unwrap_err();
        assert!(matches!(err, ClassifierError::DatasetMissing(_)));
    }

    #[test]
    fn test_class_weights_inverse_frequency() {
        let classes = vec!["A".to_string(), "B".to_string()];
        let weights = ClassWeights::from_counts(&classes, &[30, 10]).unwrap();
        assert_eq!(weights.as_slice(), &[40.0 / 30.0, 4.0]);
    }

    #[test]
    fn test_class_weights_reject_empty_class() {
        let classes = vec!["A".to_string(), "Empty".to_string()];
        let err = ClassWeights::from_counts(&classes, &[5, 0]).unwrap_err();
        assert!(err.to_string().contains("Empty"));
    }
}
