//! Shuck CLI - streaming archive extraction.
//!
//! Lists and extracts tar, cpio and ar archives, transparently
//! unwrapping gzip, bzip2, xz, zstd, raw lzma and Unix compress.

mod utils;

use clap::{Parser, Subcommand, ValueEnum};
use shuck_archive::{
    ArchiveFormat, CommandAction, Compression, CompressionFormat, ExtractAction, ListAction,
    Policy, Report, Selector, Session, WriteAction, probe_file,
};
use shuck_core::source::Monitor;
use std::path::{Path, PathBuf};
use utils::{JsonListAction, create_progress_bar};

#[derive(Parser)]
#[command(name = "shuck")]
#[command(author, version, about = "Streaming archive extraction")]
#[command(long_about = "
Shuck reads tar, cpio and ar archives, wrapped in gzip, bzip2, xz,
zstd, lzma or Unix compress, and lists or extracts their entries in a
single streaming pass.

Examples:
  shuck list bundle.tar.gz
  shuck list -v --json firmware.cpio.xz
  shuck extract -C /tmp/out bundle.tar.zst
  shuck extract package.deb data.tar.xz
  shuck extract --to-stdout logs.tar.bz2 var/log/messages
  shuck cat bundle.tar etc/hostname
  shuck detect mystery.bin
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List contents of an archive
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Show mode, owner and size columns
        #[arg(short, long)]
        verbose: bool,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,

        /// Include only entries matching pattern (glob syntax)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude entries matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,

        /// Compression format override (needed for raw lzma)
        #[arg(long, value_enum)]
        compression: Option<CompressionArg>,

        /// Container format override
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Extract entries from an archive
    #[command(alias = "x")]
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Entries to extract (all if empty; scan stops once found)
        names: Vec<String>,

        /// Output directory
        #[arg(short = 'C', long, default_value = ".")]
        directory: PathBuf,

        /// Include only entries matching pattern (glob syntax)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude entries matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,

        /// Write entry data to stdout instead of the filesystem
        #[arg(long, conflicts_with = "to_command")]
        to_stdout: bool,

        /// Pipe entry data to a command's stdin
        #[arg(long, value_name = "CMD", num_args = 1.., allow_hyphen_values = true)]
        to_command: Option<Vec<String>>,

        /// Restore permission bits exactly as stored
        #[arg(short = 'p', long)]
        preserve_permissions: bool,

        /// Restore uid/gid (requires privileges)
        #[arg(long)]
        same_owner: bool,

        /// Use stored numeric ids, never symbolic names
        #[arg(long)]
        numeric_owner: bool,

        /// Do not restore modification times
        #[arg(short = 'm', long)]
        touch: bool,

        /// Replace files older than the archived copy only
        #[arg(long)]
        keep_newer_files: bool,

        /// Remove existing files before writing replacements
        #[arg(long)]
        overwrite: bool,

        /// Truncate existing files in place instead of unlinking
        #[arg(long)]
        truncate: bool,

        /// Show progress bar
        #[arg(short = 'P', long)]
        progress: bool,

        /// Compression format override (needed for raw lzma)
        #[arg(long, value_enum)]
        compression: Option<CompressionArg>,

        /// Container format override
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Write one entry's data to stdout
    Cat {
        /// Archive file to read
        archive: PathBuf,

        /// Entry name
        name: String,

        /// Compression format override (needed for raw lzma)
        #[arg(long, value_enum)]
        compression: Option<CompressionArg>,

        /// Container format override
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Detect compression and container format
    Detect {
        /// File to detect
        file: PathBuf,
    },
}

/// Compression wrapper selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CompressionArg {
    /// No wrapper
    None,
    /// gzip (RFC 1952)
    Gzip,
    /// bzip2
    Bzip2,
    /// xz container
    Xz,
    /// Raw lzma stream (no signature)
    Lzma,
    /// Zstandard
    Zstd,
    /// Unix compress (.Z)
    Lzw,
}

impl CompressionArg {
    fn to_session(self) -> Compression {
        let format = match self {
            CompressionArg::None => CompressionFormat::None,
            CompressionArg::Gzip => CompressionFormat::Gzip,
            CompressionArg::Bzip2 => CompressionFormat::Bzip2,
            CompressionArg::Xz => CompressionFormat::Xz,
            CompressionArg::Lzma => CompressionFormat::Lzma,
            CompressionArg::Zstd => CompressionFormat::Zstd,
            CompressionArg::Lzw => CompressionFormat::Lzw,
        };
        Compression::Explicit(format)
    }
}

/// Container format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// POSIX tar
    Tar,
    /// POSIX tar requiring both end-of-archive blocks
    TarStrict,
    /// cpio, newc or odc
    Cpio,
    /// Unix ar
    Ar,
}

impl FormatArg {
    fn to_session(self) -> ArchiveFormat {
        match self {
            FormatArg::Tar => ArchiveFormat::Tar,
            FormatArg::TarStrict => ArchiveFormat::TarStrict,
            FormatArg::Cpio => ArchiveFormat::Cpio,
            FormatArg::Ar => ArchiveFormat::Ar,
        }
    }
}

fn compression_of(arg: Option<CompressionArg>) -> Compression {
    arg.map_or(Compression::Auto, CompressionArg::to_session)
}

fn format_of(arg: Option<FormatArg>) -> ArchiveFormat {
    arg.map_or(ArchiveFormat::Auto, FormatArg::to_session)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::List {
            archive,
            verbose,
            json,
            include,
            exclude,
            compression,
            format,
        } => cmd_list(
            &archive,
            verbose,
            json,
            &include,
            &exclude,
            compression_of(compression),
            format_of(format),
        ),
        Commands::Extract {
            archive,
            names,
            directory,
            include,
            exclude,
            to_stdout,
            to_command,
            preserve_permissions,
            same_owner,
            numeric_owner,
            touch,
            keep_newer_files,
            overwrite,
            truncate,
            progress,
            compression,
            format,
        } => {
            let policy = Policy::new()
                .restore_perm(preserve_permissions)
                .restore_owner(same_owner)
                .numeric_owner(numeric_owner)
                .restore_mtime(!touch)
                .only_if_newer(keep_newer_files)
                .unlink_old(overwrite)
                .truncate(truncate);
            cmd_extract(ExtractArgs {
                archive,
                names,
                directory,
                include,
                exclude,
                to_stdout,
                to_command,
                policy,
                progress,
                compression: compression_of(compression),
                format: format_of(format),
            })
        }
        Commands::Cat {
            archive,
            name,
            compression,
            format,
        } => cmd_cat(
            &archive,
            &name,
            compression_of(compression),
            format_of(format),
        ),
        Commands::Detect { file } => cmd_detect(&file),
    };

    match result {
        Ok(clean) => {
            if !clean {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn make_selector(
    names: &[String],
    include: &[String],
    exclude: &[String],
) -> shuck_core::error::Result<Selector> {
    if !names.is_empty() {
        Selector::consume(names)
    } else if include.is_empty() && exclude.is_empty() {
        Ok(Selector::accept_all())
    } else {
        Selector::accept_reject(include, exclude)
    }
}

/// Print warnings for everything a report flags; returns whether the
/// run was clean.
fn summarize(report: &Report) -> bool {
    for (name, err) in &report.failures {
        eprintln!("shuck: {}: {}", name, err);
    }
    for link in &report.broken_links {
        eprintln!(
            "shuck: {}: link target {} missing",
            link.link_name.display(),
            link.target
        );
    }
    for name in &report.unmatched {
        eprintln!("shuck: {}: not found in archive", name);
    }
    report.is_clean()
}

fn cmd_list(
    archive: &Path,
    verbose: bool,
    json: bool,
    include: &[String],
    exclude: &[String],
    compression: Compression,
    format: ArchiveFormat,
) -> shuck_core::error::Result<bool> {
    let selector = make_selector(&[], include, exclude)?;
    let mut session = Session::from_file(archive, compression, format, selector, Monitor::new())?;

    let report = if json {
        let mut action = JsonListAction::default();
        let report = session.run(&mut action)?;
        let text = serde_json::to_string_pretty(&action.entries).map_err(std::io::Error::other)?;
        println!("{}", text);
        report
    } else {
        let stdout = std::io::stdout();
        let mut action = ListAction::new(stdout.lock(), verbose);
        session.run(&mut action)?
    };

    Ok(summarize(&report))
}

struct ExtractArgs {
    archive: PathBuf,
    names: Vec<String>,
    directory: PathBuf,
    include: Vec<String>,
    exclude: Vec<String>,
    to_stdout: bool,
    to_command: Option<Vec<String>>,
    policy: Policy,
    progress: bool,
    compression: Compression,
    format: ArchiveFormat,
}

fn cmd_extract(args: ExtractArgs) -> shuck_core::error::Result<bool> {
    let selector = make_selector(&args.names, &args.include, &args.exclude)?;

    let len = std::fs::metadata(&args.archive).map(|m| m.len()).unwrap_or(0);
    let pb = create_progress_bar(len, args.progress);
    let pb_for_monitor = pb.clone();
    let monitor = Monitor::with_progress(move |n| pb_for_monitor.set_position(n));

    let mut session = Session::from_file(
        &args.archive,
        args.compression,
        args.format,
        selector,
        monitor,
    )?;

    let report = if args.to_stdout {
        let stdout = std::io::stdout();
        let mut action = WriteAction::new(stdout.lock());
        session.run(&mut action)?
    } else if let Some(argv) = args.to_command {
        let mut action = CommandAction::spawn(&argv)?;
        let report = session.run(&mut action)?;
        action.wait()?;
        report
    } else {
        let mut action = ExtractAction::new(&args.directory, args.policy);
        session.run(&mut action)?
    };
    pb.finish_and_clear();

    log::info!(
        "{} entries, {} extracted, {} skipped, {} bytes",
        report.entries,
        report.acted,
        report.skipped,
        report.bytes_read
    );
    Ok(summarize(&report))
}

fn cmd_cat(
    archive: &Path,
    name: &str,
    compression: Compression,
    format: ArchiveFormat,
) -> shuck_core::error::Result<bool> {
    let selector = Selector::consume(&[name.to_string()])?;
    let mut session = Session::from_file(archive, compression, format, selector, Monitor::new())?;
    let stdout = std::io::stdout();
    let mut action = WriteAction::new(stdout.lock());
    let report = session.run(&mut action)?;
    Ok(summarize(&report))
}

fn cmd_detect(file: &Path) -> shuck_core::error::Result<bool> {
    let (compression, container) = probe_file(file)?;
    let container = match container {
        ArchiveFormat::Cpio => "cpio",
        ArchiveFormat::Ar => "ar",
        _ => "tar (assumed)",
    };
    println!("{}: {} / {}", file.display(), compression, container);
    Ok(true)
}
