//! Tatorsync: move annotations between a Tator server, CSV files and YOLO
//! training directories.
//!
//! Every remote command refers to server records (projects, media, versions,
//! localization and state types, users) by name, by numeric ID, or with the
//! `list` sentinel. The [`resolve`] module turns those references into
//! records and memoizes the answers for the lifetime of one command.
//!
//! # Modules
//!
//! - [`api`]: Server records, the [`api::AnnotationApi`] seam and its REST client
//! - [`resolve`]: Memoizing name/ID/`list` resolver
//! - [`transfer`]: Localization and state download and upload
//! - [`yolo`]: CSV to YOLO training directory and back
//! - [`transform`]: CSV fix-ups (box conventions, class checks, image paths)
//! - [`table`]: Header-addressed CSV tables
//! - [`error`]: Error types for tatorsync operations

pub mod api;
pub mod config;
pub mod error;
pub mod geom;
pub mod lookup;
pub mod resolve;
pub mod table;
pub mod transfer;
pub mod transform;
pub mod yolo;

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use api::client::TatorClient;
use config::ConnectionArgs;
use lookup::LookupRequest;
use resolve::{Autocreate, Query, Resolver, Scope};
use table::{LocalizationColumns, Table};
use transfer::{ColumnEdits, LocalizationFilter, StateFilter, StateTarget};
use transform::TransformAction;
use yolo::export::{ExportOptions, ImageIoMode};
use yolo::ClassSource;

pub use error::TatorError;

/// The tatorsync CLI application.
#[derive(Parser)]
#[command(name = "tatorsync")]
#[command(version, about)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG
    /// overrides it.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Resolve names, IDs or `list` for server records.
    Lookup(LookupArgs),
    /// Download localizations to CSV, optionally with frames and chips.
    DownloadLocalizations(DownloadLocalizationsArgs),
    /// Upload localizations from a CSV file.
    UploadLocalizations(UploadLocalizationsArgs),
    /// Upload frame states from a CSV file.
    UploadStates(UploadStatesArgs),
    /// Download frame states to CSV.
    DownloadStates(DownloadStatesArgs),
    /// Build a YOLO training directory from a localization CSV.
    CsvToYolo(CsvToYoloArgs),
    /// Convert a directory of YOLO label files into a localization CSV.
    YoloToCsv(YoloToCsvArgs),
    /// Apply fix-up actions to a localization CSV.
    Transform(TransformArgs),
}

#[derive(clap::Args)]
struct LookupArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Username or ID of a user, or 'list'.
    #[arg(long)]
    user: Option<Query>,

    /// Name or ID of the project, or 'list'. Scopes the other lookups.
    #[arg(long, short = 'p')]
    project: Option<Query>,

    /// Name or ID of a media, or 'list' for the project's videos.
    #[arg(long, short = 'm')]
    media: Option<Query>,

    /// Name or ID of a localization type, or 'list'.
    #[arg(long, short = 'l')]
    loctype: Option<Query>,

    /// Name or ID of a version, or 'list'.
    #[arg(long)]
    version: Option<Query>,

    /// Name or ID of a state type, or 'list'.
    #[arg(long, short = 's')]
    statetype: Option<Query>,
}

#[derive(clap::Args)]
struct DownloadLocalizationsArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Project name or ID.
    #[arg(long, short = 'p')]
    project: String,

    /// Media name or ID.
    #[arg(long, short = 'm')]
    media: Option<Query>,

    /// Frame number.
    #[arg(long, short = 'f')]
    frame: Option<u64>,

    /// Localization type name or ID (required when the project has several).
    #[arg(long, short = 'l')]
    loctype: Option<Query>,

    /// Version name or ID.
    #[arg(long)]
    version: Option<Query>,

    /// Attribute equality filter; may be repeated.
    #[arg(long, num_args = 2, value_names = ["ATT", "VAL"], action = ArgAction::Append)]
    att: Vec<String>,

    /// Limit the returned results to a window.
    #[arg(long, num_args = 2, value_names = ["START", "STOP"])]
    pagination: Option<Vec<u64>>,

    /// A localization ID, or a file listing one ID per line.
    #[arg(long)]
    id: Option<String>,

    /// Only download localizations on frames covered by states of this type.
    #[arg(long, short = 's')]
    statetype: Option<Query>,

    /// Further filter states by attribute equality; may be repeated.
    #[arg(long, num_args = 2, value_names = ["ATT", "VAL"], action = ArgAction::Append)]
    state_att: Vec<String>,

    /// Directory to download localization chips to.
    #[arg(long)]
    chips_download_dir: Option<PathBuf>,

    /// Directory to download frames to; adds an `imagepath` column.
    #[arg(long)]
    frame_download_dir: Option<PathBuf>,

    /// Output CSV (default: stdout).
    #[arg(long, short = 'o')]
    outfile: Option<PathBuf>,
}

#[derive(clap::Args)]
struct UploadLocalizationsArgs {
    /// CSV file of localizations to upload.
    src: PathBuf,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Project name or ID.
    #[arg(long, short = 'p')]
    project: String,

    /// Localization type name or ID.
    #[arg(long, short = 'l')]
    loctype: Query,

    /// Version name or ID.
    #[arg(long)]
    version: Query,

    /// Create the version if it does not exist, with an optional description.
    #[arg(long, num_args = 0..=1, value_name = "DESCRIPTION")]
    force_version: Option<Option<String>>,

    /// Columns excluded from the uploaded attributes.
    #[arg(long, num_args = 1.., value_name = "COL")]
    col_drop: Vec<String>,

    /// Rename a column; may be repeated.
    #[arg(long, num_args = 2, value_names = ["OLD", "NEW"], action = ArgAction::Append)]
    col_rename: Vec<String>,

    /// Add a column filled with CONTENT; may be repeated.
    #[arg(long, num_args = 2, value_names = ["NAME", "CONTENT"], action = ArgAction::Append)]
    col_add: Vec<String>,
}

#[derive(clap::Args)]
struct UploadStatesArgs {
    /// CSV file with `media_id` and `frame` columns.
    src: PathBuf,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Project name or ID.
    #[arg(long, short = 'p')]
    project: String,

    /// Version for every row (otherwise a `version_id` column is required).
    #[arg(long, requires = "statetype")]
    version: Option<Query>,

    /// State type for every row (otherwise a `statetype_id` column is required).
    #[arg(long, short = 's', requires = "version")]
    statetype: Option<Query>,
}

#[derive(clap::Args)]
struct DownloadStatesArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Project name or ID.
    #[arg(long, short = 'p')]
    project: String,

    /// State type name or ID.
    #[arg(long, short = 's')]
    statetype: Query,

    /// Version name or ID.
    #[arg(long)]
    version: Option<Query>,

    /// Media name or ID.
    #[arg(long, short = 'm')]
    media: Option<Query>,

    /// Attribute equality filter; may be repeated.
    #[arg(long, num_args = 2, value_names = ["ATT", "VAL"], action = ArgAction::Append)]
    state_att: Vec<String>,

    /// Output CSV (default: stdout).
    #[arg(long, short = 'o')]
    outfile: Option<PathBuf>,
}

#[derive(clap::Args)]
struct CsvToYoloArgs {
    /// Localization CSV with normalized top-left boxes and image paths.
    src: PathBuf,

    /// Output training directory.
    outdir: PathBuf,

    /// 'auto' (sorted CSV classes) or a YAML/text class file.
    #[arg(long, default_value = "auto")]
    classes: String,

    /// Fraction of frames used for training.
    #[arg(long, default_value_t = 0.8)]
    training_split: f64,

    /// Replace an existing output directory.
    #[arg(long)]
    clobber: bool,

    /// How images are placed in the output directory.
    #[arg(long, value_enum, default_value_t = ImageIoMode::Symlink)]
    imgiomode: ImageIoMode,

    #[command(flatten)]
    columns: LocalizationColumns,

    /// Dataset YAML file name.
    #[arg(long, default_value = "dataset.yaml")]
    yamlfile: String,

    /// Training image list file name.
    #[arg(long, default_value = "train.txt")]
    imglistfile_train: String,

    /// Validation image list file name.
    #[arg(long, default_value = "val.txt")]
    imglistfile_val: String,

    /// Seed for a reproducible train/val split.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(clap::Args)]
struct YoloToCsvArgs {
    /// Directory of YOLO label files.
    src: PathBuf,

    /// Output CSV.
    outfile: PathBuf,

    /// Class list: a YAML file with `names`, or one class per line.
    #[arg(long)]
    classfile: PathBuf,
}

#[derive(clap::Args)]
struct TransformArgs {
    /// Localization CSV to transform.
    src: PathBuf,

    /// Action to apply, in the given order; may be repeated.
    #[arg(long, value_enum, required = true, action = ArgAction::Append)]
    action: Vec<TransformAction>,

    /// Rename a class label before any action; may be repeated.
    #[arg(long, num_args = 2, value_names = ["OLD", "NEW"], action = ArgAction::Append)]
    rename_class: Vec<String>,

    #[command(flatten)]
    columns: LocalizationColumns,

    /// Project name or ID (needed by check-classes and add-tiff-frame).
    #[arg(long, short = 'p')]
    project: Option<String>,

    /// Localization type whose class enum check-classes compares against.
    #[arg(long, short = 'l')]
    loctype: Option<Query>,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Output CSV (default: stdout).
    #[arg(long, short = 'o')]
    outfile: Option<PathBuf>,
}

/// Run the tatorsync CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), TatorError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Lookup(args)) => run_lookup(args),
        Some(Commands::DownloadLocalizations(args)) => run_download_localizations(args),
        Some(Commands::UploadLocalizations(args)) => run_upload_localizations(args),
        Some(Commands::UploadStates(args)) => run_upload_states(args),
        Some(Commands::DownloadStates(args)) => run_download_states(args),
        Some(Commands::CsvToYolo(args)) => run_csv_to_yolo(args),
        Some(Commands::YoloToCsv(args)) => run_yolo_to_csv(args),
        Some(Commands::Transform(args)) => run_transform(args),
        None => {
            println!("tatorsync {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Move annotations between Tator, CSV files and YOLO datasets.");
            println!();
            println!("Run 'tatorsync --help' for usage information.");
            Ok(())
        }
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A subscriber may already be installed when run() is called twice.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn resolver_for(connection: &ConnectionArgs) -> Result<Resolver<TatorClient>, TatorError> {
    Ok(Resolver::new(connection.client()?))
}

/// Splits flattened `KEY VAL KEY VAL ...` values into pairs.
fn pairs(values: &[String]) -> Vec<(String, String)> {
    values
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}

/// Parses `--id`: a single ID or a file with one ID per line.
fn read_id_list(raw: &str) -> Result<Vec<u64>, TatorError> {
    if let Query::Id(id) = Query::parse(raw) {
        return Ok(vec![id]);
    }
    let path = Path::new(raw);
    if !path.is_file() {
        return Err(TatorError::InvalidArgument(format!(
            "--id must be a localization ID or a file of IDs, got '{raw}'"
        )));
    }
    std::fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<u64>().map_err(|_| {
                TatorError::InvalidArgument(format!(
                    "invalid localization ID '{line}' in {}",
                    path.display()
                ))
            })
        })
        .collect()
}

fn emit_table(table: &Table, outfile: Option<&Path>) -> Result<(), TatorError> {
    match outfile {
        Some(path) => {
            table.write_csv(path)?;
            eprintln!("Wrote {} rows to {}", table.len(), path.display());
        }
        None => print!("{}", table.to_csv_string()?),
    }
    Ok(())
}

fn run_lookup(args: LookupArgs) -> Result<(), TatorError> {
    let request = LookupRequest {
        user: args.user,
        project: args.project,
        media: args.media,
        loctype: args.loctype,
        version: args.version,
        statetype: args.statetype,
    };
    if request.is_empty() {
        return Err(TatorError::InvalidArgument(
            "nothing to look up (use --user, --project, --media, --loctype, --version or --statetype)"
                .to_string(),
        ));
    }

    let resolver = resolver_for(&args.connection)?;
    print!("{}", lookup::lookup_report(&resolver, &request)?);
    Ok(())
}

fn run_download_localizations(args: DownloadLocalizationsArgs) -> Result<(), TatorError> {
    let ids = match &args.id {
        Some(raw) => read_id_list(raw)?,
        None => Vec::new(),
    };
    let filter = LocalizationFilter {
        project: Scope::from(&args.project),
        media: args.media,
        frame: args.frame,
        loctype: args.loctype,
        version: args.version,
        attributes: pairs(&args.att),
        window: args.pagination.as_deref().map(|w| (w[0], w[1])),
        ids,
        statetype: args.statetype,
        state_attributes: pairs(&args.state_att),
    };

    let resolver = resolver_for(&args.connection)?;
    let localizations = transfer::fetch_localizations(&resolver, &filter)?;
    let table = transfer::localization_table(
        &resolver,
        &localizations,
        args.frame_download_dir.as_deref(),
    )?;
    emit_table(&table, args.outfile.as_deref())?;

    if let Some(dir) = &args.frame_download_dir {
        transfer::download_frames(resolver.api(), &localizations, dir)?;
    }
    if let Some(dir) = &args.chips_download_dir {
        transfer::download_chips(resolver.api(), &localizations, dir)?;
    }
    Ok(())
}

fn run_upload_localizations(args: UploadLocalizationsArgs) -> Result<(), TatorError> {
    let edits = ColumnEdits {
        rename: pairs(&args.col_rename),
        add: pairs(&args.col_add),
        drop: args.col_drop,
    };
    let mut table = Table::read_csv(&args.src)?;
    edits.apply(&mut table)?;

    let resolver = resolver_for(&args.connection)?;
    let project = resolver.project_id(&Scope::from(&args.project))?;
    let scope = Scope::Id(project);
    let autocreate = args
        .force_version
        .map(|description| Autocreate { description });
    let version = resolver.resolve_version(args.version, Some(&scope), autocreate.as_ref())?;
    let loctype =
        resolver.resolve_one(api::EntityKind::LocalizationType, args.loctype, Some(&scope))?;

    let specs = transfer::localization_specs(
        &resolver,
        &mut table,
        project,
        loctype.id,
        version.id,
        &edits.drop,
    )?;
    let created = transfer::upload_localizations(resolver.api(), project, &specs)?;
    println!("Created {} localizations", created.len());
    Ok(())
}

fn run_upload_states(args: UploadStatesArgs) -> Result<(), TatorError> {
    let mut table = Table::read_csv(&args.src)?;
    let resolver = resolver_for(&args.connection)?;
    let project = resolver.project_id(&Scope::from(&args.project))?;
    let scope = Scope::Id(project);

    let target = match (args.statetype, args.version) {
        (Some(statetype), Some(version)) => StateTarget::Fixed {
            type_id: resolver
                .resolve_one(api::EntityKind::StateType, statetype, Some(&scope))?
                .id,
            version_id: resolver
                .resolve_one(api::EntityKind::Version, version, Some(&scope))?
                .id,
        },
        _ => StateTarget::PerRow,
    };

    let specs = transfer::state_specs(&mut table, target)?;
    let created = transfer::upload_states(resolver.api(), project, &specs)?;
    println!("Created {} states", created.len());
    Ok(())
}

fn run_download_states(args: DownloadStatesArgs) -> Result<(), TatorError> {
    let filter = StateFilter {
        project: Scope::from(&args.project),
        statetype: args.statetype,
        version: args.version,
        media: args.media,
        attributes: pairs(&args.state_att),
    };
    let resolver = resolver_for(&args.connection)?;
    let table = transfer::download_states(&resolver, &filter)?;
    emit_table(&table, args.outfile.as_deref())
}

fn run_csv_to_yolo(args: CsvToYoloArgs) -> Result<(), TatorError> {
    let table = Table::read_csv(&args.src)?;
    let opts = ExportOptions {
        outdir: args.outdir,
        classes: ClassSource::parse(&args.classes)?,
        training_split: args.training_split,
        clobber: args.clobber,
        io_mode: args.imgiomode,
        columns: args.columns,
        yaml_file: args.yamlfile,
        train_list: args.imglistfile_train,
        val_list: args.imglistfile_val,
        seed: args.seed,
    };

    let summary = yolo::export::export_training_dir(&table, &opts)?;
    println!("{}", summary.report);
    println!(
        "Wrote {} localizations for {} classes; dataset file: {}",
        summary.localizations,
        summary.classes.len(),
        summary.dataset_yaml.display()
    );
    Ok(())
}

fn run_yolo_to_csv(args: YoloToCsvArgs) -> Result<(), TatorError> {
    let classes = yolo::read_class_file(&args.classfile)?;
    let table = yolo::import::read_label_dir(&args.src, &classes)?;
    table.write_csv(&args.outfile)?;
    println!(
        "Wrote {} localizations to {}",
        table.len(),
        args.outfile.display()
    );
    Ok(())
}

fn run_transform(args: TransformArgs) -> Result<(), TatorError> {
    let mut table = Table::read_csv(&args.src)?;

    let renames = pairs(&args.rename_class);
    if !renames.is_empty() {
        let changed = transform::rename_classes(&mut table, &args.columns.class, &renames)?;
        eprintln!("Renamed {changed} class labels");
    }

    let remote = if args.action.iter().any(|action| action.needs_remote()) {
        let project = args.project.as_deref().ok_or_else(|| {
            TatorError::InvalidArgument(
                "--project is required for check-classes and add-tiff-frame".to_string(),
            )
        })?;
        let resolver = resolver_for(&args.connection)?;
        let scope = Scope::Id(resolver.project_id(&Scope::from(project))?);
        Some((resolver, scope))
    } else {
        None
    };

    for action in &args.action {
        match (action, &remote) {
            (TransformAction::CheckClasses, Some((resolver, scope))) => {
                let check = transform::check_classes(
                    resolver,
                    &table,
                    scope,
                    &args.columns.class,
                    args.loctype.as_ref(),
                )?;
                eprintln!("{check}");
                check.ensure_known()?;
            }
            (TransformAction::AddTiffFrame, Some((resolver, scope))) => {
                transform::add_tiff_frame(resolver, &mut table, scope, &args.columns)?;
            }
            (TransformAction::CornerToCenter | TransformAction::CenterToCorner, _) => {
                transform::shift_boxes(&mut table, &args.columns, *action)?;
            }
            (TransformAction::CheckClasses | TransformAction::AddTiffFrame, None) => {
                return Err(TatorError::InvalidArgument(format!(
                    "{action:?} needs a server connection"
                )));
            }
        }
    }

    emit_table(&table, args.outfile.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn pairs_split_flattened_values() {
        let values: Vec<String> = ["Class", "diatom", "Verified", "true"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            pairs(&values),
            vec![
                ("Class".to_string(), "diatom".to_string()),
                ("Verified".to_string(), "true".to_string())
            ]
        );
    }

    #[test]
    fn id_list_from_value_or_file() {
        assert_eq!(read_id_list("17").expect("single id"), vec![17]);

        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("ids.txt");
        std::fs::write(&path, "3\n4\n\n5\n").expect("write ids");
        assert_eq!(
            read_id_list(path.to_str().expect("utf-8 path")).expect("id file"),
            vec![3, 4, 5]
        );

        assert!(read_id_list("not-a-file").is_err());
    }

    #[test]
    fn force_version_flag_parses_optional_description() {
        let parse = |extra: &[&str]| {
            let mut argv = vec![
                "tatorsync",
                "upload-localizations",
                "locs.csv",
                "--project",
                "1",
                "--loctype",
                "Box",
                "--version",
                "Model A",
            ];
            argv.extend_from_slice(extra);
            match Cli::try_parse_from(argv).expect("parse").command {
                Some(Commands::UploadLocalizations(args)) => args.force_version,
                _ => panic!("wrong subcommand"),
            }
        };

        assert_eq!(parse(&[]), None);
        assert_eq!(parse(&["--force-version"]), Some(None));
        assert_eq!(
            parse(&["--force-version", "first run"]),
            Some(Some("first run".to_string()))
        );
    }
}
