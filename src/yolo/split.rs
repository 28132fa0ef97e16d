//! Train/validation partitioning of exported frames.

use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

/// Shuffles `frames` and splits them into `(train, val)`.
///
/// The training side receives `round(ratio * n)` frames (ties to even). A
/// fixed `seed` makes the split reproducible.
pub fn trainval_split<T: Clone>(frames: &[T], ratio: f64, seed: Option<u64>) -> (Vec<T>, Vec<T>) {
    let total_train = ((ratio * frames.len() as f64).round_ties_even() as usize).min(frames.len());

    let mut shuffled = frames.to_vec();
    if let Some(seed) = seed {
        let mut rng = StdRng::seed_from_u64(seed);
        shuffled.shuffle(&mut rng);
    } else {
        let mut rng = rand::rng();
        shuffled.shuffle(&mut rng);
    }

    let val = shuffled.split_off(total_train);
    (shuffled, val)
}

/// Per-class annotation counts on each side of a split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassSplit {
    pub name: String,
    pub train: usize,
    pub val: usize,
}

impl ClassSplit {
    pub fn total(&self) -> usize {
        self.train + self.val
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SplitReport {
    pub classes: Vec<ClassSplit>,
    pub train_frames: usize,
    pub val_frames: usize,
}

impl SplitReport {
    /// Builds the report from per-frame class counts on each side.
    pub fn new<'a>(
        classes: &[String],
        train: impl IntoIterator<Item = &'a BTreeMap<String, usize>>,
        val: impl IntoIterator<Item = &'a BTreeMap<String, usize>>,
    ) -> Self {
        let mut per_class: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        let mut train_frames = 0;
        let mut val_frames = 0;

        for counts in train {
            train_frames += 1;
            for (class, count) in counts {
                per_class.entry(class.as_str()).or_default().0 += count;
            }
        }
        for counts in val {
            val_frames += 1;
            for (class, count) in counts {
                per_class.entry(class.as_str()).or_default().1 += count;
            }
        }

        let classes = classes
            .iter()
            .map(|name| {
                let (train, val) = per_class.get(name.as_str()).copied().unwrap_or_default();
                ClassSplit {
                    name: name.clone(),
                    train,
                    val,
                }
            })
            .collect();

        Self {
            classes,
            train_frames,
            val_frames,
        }
    }
}

impl fmt::Display for SplitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CLASSES:")?;
        for class in &self.classes {
            let total = class.total();
            let ratio = if total == 0 {
                "-,-".to_string()
            } else {
                let train_pct = 100.0 * class.train as f64 / total as f64;
                format!("{:.0}%,{:.0}%", train_pct, 100.0 - train_pct)
            };
            writeln!(
                f,
                "  {:>20}: TRAIN:VAL {}:{} ({}) Total: {}",
                class.name, class.train, class.val, ratio, total
            )?;
        }
        write!(
            f,
            "FRAMES: training: {}, validation: {}, total: {}",
            self.train_frames,
            self.val_frames,
            self.train_frames + self.val_frames
        )
    }
}
