//! exportdata - Inspect, dump and re-encode compiler export data
//!
//! This tool finds the container file for an import path, reports what kind
//! of export data a file carries, lists the declarations it holds and writes
//! it back out in the current format.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use exportdata_core::codec::{self, detect};
use exportdata_core::section::{write_archive, write_object};
use exportdata_core::{
    Error, FormatVersion, Importer, PrinterConfig, SearchPath, SectionConfig, SectionKind,
    SectionLocator, StatsVisitor, UnitPrinter,
};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Inspect, dump and re-encode compiler export data
#[derive(Parser, Debug)]
#[command(name = "exportdata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    search: SearchArgs,

    /// Maximum header bytes scanned for the export data marker
    #[arg(long, global = true, default_value = "65536")]
    scan_window: u64,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Search root holding `<import path>.a` files (repeatable)
    #[arg(
        short,
        long = "root",
        global = true,
        env = "EXPORTDATA_ROOTS",
        value_delimiter = ':'
    )]
    roots: Vec<PathBuf>,

    /// Import path rewrite rule, `FROM=TO` (repeatable)
    #[arg(long = "alias", global = true, value_parser = parse_alias)]
    aliases: Vec<(String, String)>,
}

impl SearchArgs {
    fn search_path(&self) -> SearchPath {
        let search = self
            .roots
            .iter()
            .fold(SearchPath::new(), |search, root| search.with_root(root));
        self.aliases
            .iter()
            .fold(search, |search, (from, to)| search.with_alias(from, to))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find the container file for an import path
    Find {
        /// Import path to resolve
        import_path: String,

        /// Directory the import appears in (for vendoring and local imports)
        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Report container form, section bounds and format version of a file
    Inspect {
        /// Container file
        file: PathBuf,
    },

    /// List the declarations of a unit
    Dump {
        #[command(flatten)]
        source: UnitSource,

        /// Print member counts instead of declarations
        #[arg(long)]
        stats: bool,

        /// Append declaration positions
        #[arg(long)]
        positions: bool,
    },

    /// Decode a unit and write it back with the current format version
    Encode {
        #[command(flatten)]
        source: UnitSource,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Container framing for the output
        #[arg(long, value_enum, default_value = "archive")]
        container: Container,

        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
    },

    /// Report the format version of every artifact under a directory
    Scan {
        /// Directory to walk
        directory: PathBuf,
    },
}

/// Where a unit comes from: a file, or an import path on the search roots
#[derive(Args, Debug)]
struct UnitSource {
    /// Container file to decode (requires --path)
    #[arg(
        requires = "path",
        conflicts_with = "import",
        required_unless_present = "import"
    )]
    file: Option<PathBuf>,

    /// Import path to resolve on the search roots
    #[arg(long)]
    import: Option<String>,

    /// Import path the file's unit is recorded under
    #[arg(long, requires = "file")]
    path: Option<String>,

    /// Directory the import appears in
    #[arg(long, requires = "import")]
    from: Option<PathBuf>,
}

/// Output framing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Container {
    /// The bare section
    Raw,
    /// Object file with a header line
    Object,
    /// Archive with a single export data member
    Archive,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    let section_config = SectionConfig::new().scan_window(cli.scan_window);

    match &cli.command {
        Command::Find { import_path, from } => {
            match cli.search.search_path().find(import_path, from.as_deref()) {
                Some(found) => println!("{}\t{}", found.file.display(), found.canonical_path),
                None => println!("{import_path}: not found"),
            }
            Ok(())
        }
        Command::Inspect { file } => {
            let report = inspect_file(file, &section_config)?;
            print!("{report}");
            Ok(())
        }
        Command::Dump {
            source,
            stats,
            positions,
        } => {
            let mut importer =
                Importer::new(cli.search.search_path()).with_section_config(section_config);
            let path = load_unit(&mut importer, source)?;
            dump_unit(&importer, &path, *stats, *positions)
        }
        Command::Encode {
            source,
            output,
            container,
            force,
        } => {
            let mut importer =
                Importer::new(cli.search.search_path()).with_section_config(section_config);
            let path = load_unit(&mut importer, source)?;
            let digest = encode_unit(&importer, &path, output, *container, *force)?;
            println!("Wrote {} ({})", output.display(), digest);
            Ok(())
        }
        Command::Scan { directory } => {
            let summary = scan_directory(directory, &section_config)?;
            for (version, count) in &summary.versions {
                println!("{version}: {count}");
            }
            info!(
                "Summary: {} artifacts, {} unreadable",
                summary.total, summary.failed
            );
            Ok(())
        }
    }
}

fn parse_alias(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((from, to)) if !from.is_empty() && !to.is_empty() => {
            Ok((from.to_string(), to.to_string()))
        }
        _ => Err(format!("expected FROM=TO, got '{s}'")),
    }
}

/// Decodes the requested unit and returns its import path
fn load_unit(importer: &mut Importer, source: &UnitSource) -> Result<String> {
    if let Some(import) = &source.import {
        let unit = importer
            .import(import, source.from.as_deref())
            .map_err(|e| match e {
                Error::NotFound { .. } => anyhow::anyhow!(
                    "{import}: not found on the search roots (use --root or EXPORTDATA_ROOTS)"
                ),
                other => anyhow::Error::new(other).context(format!("Failed to import {import}")),
            })?;
        return Ok(unit.path().to_string());
    }

    let (Some(file), Some(path)) = (&source.file, &source.path) else {
        bail!("Either a file with --path or --import must be specified");
    };
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }
    let unit = importer
        .import_file(file, path)
        .with_context(|| format!("Failed to decode {}", file.display()))?;
    Ok(unit.path().to_string())
}

fn dump_unit(importer: &Importer, path: &str, stats: bool, positions: bool) -> Result<()> {
    let namespace = importer.namespace();
    let unit = namespace
        .unit(path)
        .with_context(|| format!("{path} missing after decode"))?;

    if stats {
        let mut visitor = StatsVisitor::default();
        exportdata_core::describe::walk_unit(namespace, unit, &mut visitor)?;
        println!("members:  {}", visitor.member_count());
        println!("exported: {}", visitor.exported_count);
        println!("consts:   {}", visitor.const_count);
        println!("funcs:    {}", visitor.func_count);
        println!("types:    {}", visitor.type_count);
        println!("methods:  {}", visitor.method_count);
        println!("aliases:  {}", visitor.alias_count);
        println!("vars:     {}", visitor.var_count);
        return Ok(());
    }

    let config = PrinterConfig::new().show_positions(positions);
    print!(
        "{}",
        UnitPrinter::with_config(config).render(namespace, importer.positions(), unit)
    );
    Ok(())
}

/// Re-encodes `path` into `output`; returns the blake3 digest of the section
fn encode_unit(
    importer: &Importer,
    path: &str,
    output: &Path,
    container: Container,
    force: bool,
) -> Result<String> {
    if output.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output.display()
        );
    }

    let section = codec::encode(importer.namespace(), path, importer.positions())
        .with_context(|| format!("Failed to encode {path}"))?;
    let digest = blake3::hash(&section).to_hex().to_string();
    debug!("encoded {} bytes, digest {}", section.len(), digest);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut file = fs::File::create(output)
        .with_context(|| format!("Failed to create file: {}", output.display()))?;

    let header = object_header();
    match container {
        Container::Raw => file
            .write_all(&section)
            .with_context(|| format!("Failed to write file: {}", output.display()))?,
        Container::Object => write_object(file, &header, &section)?,
        Container::Archive => write_archive(file, &header, &section)?,
    }
    Ok(digest)
}

fn object_header() -> String {
    format!(
        "{} {} exportdata {}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        exportdata_core::VERSION
    )
}

/// What `inspect` reports about a container file
#[derive(Debug)]
struct Inspection {
    kind: SectionKind,
    offset: u64,
    version: std::result::Result<FormatVersion, String>,
}

impl std::fmt::Display for Inspection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            SectionKind::Bounded { len } => {
                writeln!(f, "container: archive")?;
                writeln!(f, "section:   offset {}, {} bytes", self.offset, len)?;
            }
            SectionKind::Open => {
                writeln!(f, "container: object")?;
                writeln!(f, "section:   offset {}, open", self.offset)?;
            }
        }
        match &self.version {
            Ok(version) => writeln!(f, "format:    {version}"),
            Err(reason) => writeln!(f, "format:    {reason}"),
        }
    }
}

/// Longest possible version tag: tag byte plus a ten byte uvarint
const VERSION_PREFIX_LEN: u64 = 11;

fn inspect_file(file: &Path, config: &SectionConfig) -> Result<Inspection> {
    trace!("Inspecting {}", file.display());
    let reader = fs::File::open(file)
        .with_context(|| format!("Failed to read input file: {}", file.display()))?;
    let section = SectionLocator::with_config(config.clone())
        .locate(BufReader::new(reader))
        .with_context(|| format!("No export data in {}", file.display()))?;

    let kind = section.kind();
    let offset = section.offset();
    let mut prefix = Vec::new();
    section.take(VERSION_PREFIX_LEN).read_to_end(&mut prefix)?;

    let version = detect(&prefix).map(|(v, _)| v).map_err(|e| e.to_string());
    Ok(Inspection {
        kind,
        offset,
        version,
    })
}

/// Per-version artifact counts from `scan`
#[derive(Debug, Default)]
struct ScanSummary {
    versions: BTreeMap<String, usize>,
    total: usize,
    failed: usize,
}

fn scan_directory(directory: &Path, config: &SectionConfig) -> Result<ScanSummary> {
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }
    info!("Scanning directory: {}", directory.display());

    let mut summary = ScanSummary::default();
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || !is_artifact(path) {
            continue;
        }

        summary.total += 1;
        let label = match inspect_file(path, config) {
            Ok(inspection) => match inspection.version {
                Ok(version) => version.to_string(),
                Err(_) => "unsupported".to_string(),
            },
            Err(e) => {
                warn!("Error processing {}: {:#}", path.display(), e);
                summary.failed += 1;
                "unreadable".to_string()
            }
        };
        println!("{}\t{}", path.display(), label);
        *summary.versions.entry(label).or_default() += 1;
    }
    Ok(summary)
}

fn is_artifact(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| exportdata_core::locator::ARTIFACT_EXTENSIONS.contains(&e))
}
