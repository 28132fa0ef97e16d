//! Localization CSV to YOLO training directory.
//!
//! Output layout:
//!
//! ```text
//! outdir/
//!   images/<frame>.<ext>   symlink, copy or moved file
//!   labels/<frame>.txt     class cx cy w h (normalized)
//!   train.txt, val.txt     absolute image paths
//!   dataset.yaml
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::split::{trainval_split, SplitReport};
use super::{ClassSource, DatasetYaml, LABEL_EXTENSION};
use crate::error::TatorError;
use crate::geom::BBox;
use crate::table::{LocalizationColumns, Table};

/// How source images are placed under `images/`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ImageIoMode {
    #[default]
    Symlink,
    Copy,
    Move,
}

#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub outdir: PathBuf,
    pub classes: ClassSource,
    /// Fraction of frames assigned to training, in `[0, 1]`.
    pub training_split: f64,
    /// Remove an existing `outdir` first.
    pub clobber: bool,
    pub io_mode: ImageIoMode,
    pub columns: LocalizationColumns,
    pub yaml_file: String,
    pub train_list: String,
    pub val_list: String,
    pub seed: Option<u64>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            outdir: PathBuf::from("yolo"),
            classes: ClassSource::Auto,
            training_split: 0.8,
            clobber: false,
            io_mode: ImageIoMode::Symlink,
            columns: LocalizationColumns::default(),
            yaml_file: "dataset.yaml".to_string(),
            train_list: "train.txt".to_string(),
            val_list: "val.txt".to_string(),
            seed: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExportSummary {
    pub classes: Vec<String>,
    pub localizations: usize,
    pub report: SplitReport,
    pub dataset_yaml: PathBuf,
}

struct LabelRow {
    class: String,
    bbox: BBox,
}

struct FrameGroup {
    source: PathBuf,
    rows: Vec<LabelRow>,
}

/// Writes a YOLO training directory from a localization table whose boxes are
/// normalized top-left corner boxes.
pub fn export_training_dir(
    table: &Table,
    opts: &ExportOptions,
) -> Result<ExportSummary, TatorError> {
    if !(0.0..=1.0).contains(&opts.training_split) {
        return Err(TatorError::InvalidArgument(format!(
            "--training-split must be between 0 and 1, got {}",
            opts.training_split
        )));
    }

    let groups = group_by_image(table, &opts.columns)?;
    let classes = select_classes(&groups, &opts.classes)?;
    let class_index: HashMap<&str, usize> = classes
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();

    prepare_outdir(&opts.outdir, opts.clobber)?;
    let images_dir = opts.outdir.join("images");
    let labels_dir = opts.outdir.join("labels");
    fs::create_dir(&images_dir).map_err(TatorError::Io)?;
    fs::create_dir(&labels_dir).map_err(TatorError::Io)?;

    let root = absolute_dir(&opts.outdir)?;
    let mut dst_frames = Vec::with_capacity(groups.len());
    let mut frame_counts = Vec::with_capacity(groups.len());
    let mut label_paths: HashSet<PathBuf> = HashSet::new();
    let mut localizations = 0;

    for group in &groups {
        let file_name = group.source.file_name().ok_or_else(|| {
            TatorError::InvalidArgument(format!(
                "image path '{}' has no file name",
                group.source.display()
            ))
        })?;
        let dst = images_dir.join(file_name);
        if dst.symlink_metadata().is_ok() {
            return Err(TatorError::YoloLayoutInvalid {
                path: dst,
                message: "two source images share this file name".to_string(),
            });
        }
        let label_path = labels_dir.join(Path::new(file_name).with_extension(LABEL_EXTENSION));
        if !label_paths.insert(label_path.clone()) {
            return Err(TatorError::YoloLayoutInvalid {
                path: label_path,
                message: format!(
                    "source image '{}' shares a file stem with an earlier image",
                    group.source.display()
                ),
            });
        }
        place_image(&group.source, &dst, opts.io_mode)?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut file = fs::File::create(&label_path).map_err(TatorError::Io)?;
        for row in &group.rows {
            let idx = class_index[row.class.as_str()];
            let (cx, cy, w, h) = row.bbox.to_cxcywh();
            writeln!(file, "{idx} {cx:.6} {cy:.6} {w:.6} {h:.6}").map_err(TatorError::Io)?;
            *counts.entry(row.class.clone()).or_default() += 1;
            localizations += 1;
        }
        debug!(image = %dst.display(), boxes = group.rows.len(), "wrote label file");

        dst_frames.push(root.join("images").join(file_name));
        frame_counts.push(counts);
    }

    let indices: Vec<usize> = (0..dst_frames.len()).collect();
    let (train, val) = trainval_split(&indices, opts.training_split, opts.seed);
    info!(
        training = train.len(),
        validation = val.len(),
        "distributed frames"
    );

    write_image_list(&opts.outdir.join(&opts.train_list), &train, &dst_frames)?;
    write_image_list(&opts.outdir.join(&opts.val_list), &val, &dst_frames)?;

    let report = SplitReport::new(
        &classes,
        train.iter().map(|&i| &frame_counts[i]),
        val.iter().map(|&i| &frame_counts[i]),
    );

    let dataset_yaml = opts.outdir.join(&opts.yaml_file);
    DatasetYaml::new(
        root.to_string_lossy(),
        opts.train_list.as_str(),
        opts.val_list.as_str(),
        &classes,
    )
    .write(&dataset_yaml)?;

    Ok(ExportSummary {
        classes,
        localizations,
        report,
        dataset_yaml,
    })
}

/// Groups rows by canonical image path in first-seen order, failing with every
/// missing image at once.
fn group_by_image(
    table: &Table,
    columns: &LocalizationColumns,
) -> Result<Vec<FrameGroup>, TatorError> {
    let x_col = table.require_column(&columns.x)?;
    let y_col = table.require_column(&columns.y)?;
    let w_col = table.require_column(&columns.width)?;
    let h_col = table.require_column(&columns.height)?;
    let class_col = table.require_column(&columns.class)?;
    let path_col = table.require_column(&columns.imagepath)?;

    let mut missing: Vec<PathBuf> = Vec::new();
    let mut groups: Vec<FrameGroup> = Vec::new();
    let mut by_path: HashMap<PathBuf, usize> = HashMap::new();

    for row in 0..table.len() {
        let image = PathBuf::from(table.cell(row, path_col));
        if !image.is_file() {
            if !missing.contains(&image) {
                missing.push(image);
            }
            continue;
        }
        let canonical = fs::canonicalize(&image).map_err(TatorError::Io)?;

        let bbox = BBox::from_corner(
            table.f64_at(row, x_col)?,
            table.f64_at(row, y_col)?,
            table.f64_at(row, w_col)?,
            table.f64_at(row, h_col)?,
        );
        let label = LabelRow {
            class: table.cell(row, class_col).to_string(),
            bbox,
        };

        let slot = *by_path.entry(canonical.clone()).or_insert_with(|| {
            groups.push(FrameGroup {
                source: canonical,
                rows: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].rows.push(label);
    }

    if !missing.is_empty() {
        return Err(TatorError::MissingImages { paths: missing });
    }
    Ok(groups)
}

fn select_classes(groups: &[FrameGroup], source: &ClassSource) -> Result<Vec<String>, TatorError> {
    let seen: BTreeSet<&str> = groups
        .iter()
        .flat_map(|group| group.rows.iter().map(|row| row.class.as_str()))
        .collect();

    match source {
        ClassSource::Auto => Ok(seen.into_iter().map(str::to_string).collect()),
        ClassSource::List(classes) => {
            if let Some(unknown) = seen.iter().find(|class| !classes.iter().any(|c| c == *class)) {
                return Err(TatorError::UnknownClass {
                    class: unknown.to_string(),
                });
            }
            Ok(classes.clone())
        }
    }
}

fn prepare_outdir(outdir: &Path, clobber: bool) -> Result<(), TatorError> {
    if outdir.exists() {
        if !clobber {
            return Err(TatorError::YoloLayoutInvalid {
                path: outdir.to_path_buf(),
                message: "output directory already exists (use --clobber to replace it)"
                    .to_string(),
            });
        }
        info!(outdir = %outdir.display(), "removing existing output directory");
        fs::remove_dir_all(outdir).map_err(TatorError::Io)?;
    }
    fs::create_dir_all(outdir).map_err(TatorError::Io)
}

fn absolute_dir(dir: &Path) -> Result<PathBuf, TatorError> {
    if dir.is_absolute() {
        Ok(dir.to_path_buf())
    } else {
        Ok(std::env::current_dir().map_err(TatorError::Io)?.join(dir))
    }
}

fn place_image(src: &Path, dst: &Path, mode: ImageIoMode) -> Result<(), TatorError> {
    let placed = match mode {
        ImageIoMode::Symlink => symlink(src, dst),
        ImageIoMode::Copy => fs::copy(src, dst).map(|_| ()),
        ImageIoMode::Move => fs::rename(src, dst).or_else(|_| {
            // rename fails across filesystems
            fs::copy(src, dst)?;
            fs::remove_file(src)
        }),
    };
    placed.map_err(TatorError::Io)
}

#[cfg(unix)]
fn symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}

fn write_image_list(path: &Path, picks: &[usize], frames: &[PathBuf]) -> Result<(), TatorError> {
    let lines: Vec<String> = picks
        .iter()
        .map(|&i| frames[i].to_string_lossy().into_owned())
        .collect();
    fs::write(path, lines.join("\n")).map_err(TatorError::Io)
}
