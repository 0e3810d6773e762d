//! unproto - Recover Protocol Buffer definitions from generated code
//!
//! This tool reads the output of protobuf code generators (C#, Java, Go,
//! Python, Ruby, PHP, C++, prost, betterproto, protobuf-net, zig-protobuf)
//! and reconstructs the `.proto` source files they were generated from.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use unproto_core::{Dialect, ProtoReconstructor, Reconstruction, ReconstructorConfig};
use walkdir::WalkDir;

/// Recover Protocol Buffer definitions from generated code
#[derive(Parser, Debug)]
#[command(name = "unproto")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Generator dialect of the input
    #[arg(short, long, value_enum)]
    lang: Lang,

    /// Output directory for recovered .proto files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Dry run - don't write files, just show what would be written
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files
    #[arg(long)]
    force: bool,

    /// Only list recovered files and their declaration counts
    #[arg(long)]
    list_only: bool,

    /// Reject code points that do not fit single-byte literals instead of
    /// truncating them
    #[arg(long)]
    strict_code_points: bool,

    /// Conflict resolution strategy for same-name different-content protos
    #[arg(long, value_enum, default_value = "hash-suffix")]
    conflict_strategy: ConflictStrategy,

    /// Number of worker threads (default: available cores)
    #[arg(short, long, env = "UNPROTO_JOBS")]
    jobs: Option<usize>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single generated source file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of generated sources to process recursively
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Generator dialects accepted by `--lang`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Lang {
    /// Google.Protobuf C#
    #[value(name = "csharp")]
    CSharp,
    /// protoc Java
    Java,
    /// protoc-gen-go
    Go,
    /// protoc Python
    Python,
    /// protoc Ruby
    Ruby,
    /// protoc PHP
    Php,
    /// protoc C++
    Cpp,
    /// prost-build Rust
    Prost,
    /// betterproto Python
    Betterproto,
    /// protobuf-net protogen C#
    ProtobufNet,
    /// zig-protobuf
    Zig,
}

impl From<Lang> for Dialect {
    fn from(lang: Lang) -> Self {
        match lang {
            Lang::CSharp => Dialect::CSharp,
            Lang::Java => Dialect::Java,
            Lang::Go => Dialect::Go,
            Lang::Python => Dialect::Python,
            Lang::Ruby => Dialect::Ruby,
            Lang::Php => Dialect::Php,
            Lang::Cpp => Dialect::Cpp,
            Lang::Prost => Dialect::Prost,
            Lang::Betterproto => Dialect::Betterproto,
            Lang::ProtobufNet => Dialect::ProtobufNet,
            Lang::Zig => Dialect::Zig,
        }
    }
}

/// Strategy for resolving naming conflicts
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConflictStrategy {
    /// Append a short content hash: file~a1b2c3d4.proto
    HashSuffix,
    /// Append the input file's name: file~from-UserReflection.proto
    SourceSuffix,
    /// Skip conflicting files (keep first occurrence only)
    SkipConflicts,
}

/// Where a recovered file goes, relative to the output directory
#[derive(Debug, PartialEq, Eq)]
enum Claim {
    /// First file with this name
    Fresh(PathBuf),
    /// Same name, different content, renamed by the conflict strategy
    Renamed(PathBuf),
    /// Identical content was already claimed
    Duplicate,
    /// Conflicting content dropped by `skip-conflicts`
    Skipped,
}

/// Tracks claimed output names for deduplication
#[derive(Default)]
struct ProtoRegistry {
    /// Output name -> content hashes claimed under it
    seen: HashMap<PathBuf, Vec<String>>,
    stats: RegistryStats,
}

#[derive(Default)]
struct RegistryStats {
    total_found: usize,
    duplicates_skipped: usize,
    conflicts_renamed: usize,
    written: usize,
    failed_inputs: usize,
    crashed_inputs: usize,
}

impl ProtoRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Short content hash (first 8 hex chars of blake3)
    fn content_hash(content: &str) -> String {
        let hash = blake3::hash(content.as_bytes());
        hash.to_hex()[..8].to_string()
    }

    /// Claims `name` for `content` recovered from `source`
    fn claim(
        &mut self,
        name: &Path,
        content: &str,
        source: &Path,
        strategy: ConflictStrategy,
    ) -> Claim {
        self.stats.total_found += 1;
        let hash = Self::content_hash(content);
        let variants = self.seen.entry(name.to_path_buf()).or_default();

        if variants.contains(&hash) {
            debug!("Skipping duplicate: {} (hash: {})", name.display(), hash);
            self.stats.duplicates_skipped += 1;
            return Claim::Duplicate;
        }
        if variants.is_empty() {
            variants.push(hash);
            return Claim::Fresh(name.to_path_buf());
        }

        let suffix = match strategy {
            ConflictStrategy::SkipConflicts => {
                debug!(
                    "Skipping conflict: {} (different content, hash: {})",
                    name.display(),
                    hash
                );
                self.stats.duplicates_skipped += 1;
                return Claim::Skipped;
            }
            ConflictStrategy::HashSuffix => format!("~{}", hash),
            ConflictStrategy::SourceSuffix => {
                let source_name = source
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("unknown");
                format!("~from-{}", source_name)
            }
        };
        variants.push(hash);

        let renamed = add_suffix(name, &suffix);
        info!(
            "Conflict resolved: {} -> {} (content differs)",
            name.display(),
            renamed.display()
        );
        self.stats.conflicts_renamed += 1;
        Claim::Renamed(renamed)
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} recovered, {} duplicates skipped, {} conflicts renamed, {} written, {} inputs failed, {} crashed",
            self.stats.total_found,
            self.stats.duplicates_skipped,
            self.stats.conflicts_renamed,
            self.stats.written,
            self.stats.failed_inputs,
            self.stats.crashed_inputs
        );
    }
}

/// Add a suffix before the .proto extension
fn add_suffix(name: &Path, suffix: &str) -> PathBuf {
    let text = name.to_string_lossy();
    match text.strip_suffix(".proto") {
        Some(stem) => PathBuf::from(format!("{}{}.proto", stem, suffix)),
        None => PathBuf::from(format!("{}{}", text, suffix)),
    }
}

fn main() -> ExitCode {
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
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(0) => {
            warn!("No .proto files were produced");
            ExitCode::from(2)
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Dispatches on the input mode; returns the number of files produced
fn run(cli: &Cli) -> Result<usize> {
    let config = ReconstructorConfig::new().lenient_code_points(!cli.strict_code_points);
    let reconstructor = ProtoReconstructor::new().with_config(config);
    let mut registry = ProtoRegistry::new();

    let produced = if let Some(ref file) = cli.input.file {
        process_single_file(cli, &reconstructor, file, &mut registry)?
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(cli, &reconstructor, directory, &mut registry)?
    } else {
        bail!("Either --file or --directory must be specified")
    };

    if !cli.list_only && !cli.dry_run {
        registry.print_summary();
    }
    if registry.stats.crashed_inputs > 0 {
        bail!(
            "{} input(s) crashed during reconstruction; {} file(s) were still produced",
            registry.stats.crashed_inputs,
            produced
        );
    }
    Ok(produced)
}

/// Process a single generated file; every failure is fatal
fn process_single_file(
    cli: &Cli,
    reconstructor: &ProtoReconstructor,
    file: &Path,
    registry: &mut ProtoRegistry,
) -> Result<usize> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let units = reconstruct_file(reconstructor, cli.lang.into(), file)?;
    let base = file.parent().unwrap_or(Path::new(""));
    emit_units(cli, file, base, units, registry, true)
}

/// Process a directory of generated files recursively
fn process_directory(
    cli: &Cli,
    reconstructor: &ProtoReconstructor,
    directory: &Path,
    registry: &mut ProtoRegistry,
) -> Result<usize> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    let dialect: Dialect = cli.lang.into();
    info!("Scanning directory: {} ({})", directory.display(), dialect);

    let inputs = collect_inputs(directory, dialect);
    let jobs = cli.jobs.unwrap_or_else(default_jobs).max(1);
    debug!("Processing {} files on {} workers", inputs.len(), jobs);

    let results = run_pool(&inputs, jobs, |path| {
        reconstruct_file(reconstructor, dialect, path)
    });

    let mut produced = 0;
    for (path, result) in inputs.iter().zip(results) {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(message) => {
                error!("{}: reconstruction panicked: {}", path.display(), message);
                registry.stats.crashed_inputs += 1;
                continue;
            }
        };

        match outcome {
            Ok(units) => match emit_units(cli, path, directory, units, registry, false) {
                Ok(count) => produced += count,
                Err(e) => {
                    warn!("{}: {:#}", path.display(), e);
                    registry.stats.failed_inputs += 1;
                }
            },
            Err(e) => {
                let skippable = e
                    .downcast_ref::<unproto_core::Error>()
                    .map_or(false, |e| e.is_skippable());
                if skippable {
                    warn!("Skipping {}: {}", path.display(), e);
                } else {
                    warn!("{}: {:#}", path.display(), e);
                    registry.stats.failed_inputs += 1;
                }
            }
        }
    }

    info!("Processed {} files", inputs.len());
    Ok(produced)
}

/// Generated sources under `directory` matching the dialect's extensions
fn collect_inputs(directory: &Path, dialect: Dialect) -> Vec<PathBuf> {
    WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| {
            let matched = dialect.matches_path(path);
            if !matched {
                trace!("Skipping {}", path.display());
            }
            matched
        })
        .collect()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with('.'))
}

fn default_jobs() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// Runs `work` over `items` on `jobs` scoped threads, keeping input order.
///
/// A panic inside `work` is caught and becomes that item's `Err`, carrying
/// the panic message; the remaining items still run.
fn run_pool<T, R, F>(items: &[T], jobs: usize, work: F) -> Vec<Result<R, String>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let next = AtomicUsize::new(0);
    let workers = jobs.clamp(1, items.len().max(1));

    let mut results: Vec<(usize, Result<R, String>)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut done = Vec::new();
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(item) = items.get(i) else {
                            break;
                        };
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(item)))
                            .map_err(|payload| panic_message(payload.as_ref()));
                        done.push((i, outcome));
                    }
                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| panic::resume_unwind(payload))
            })
            .collect()
    });

    results.sort_by_key(|(i, _)| *i);
    results.into_iter().map(|(_, r)| r).collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Read and reconstruct one input file
fn reconstruct_file(
    reconstructor: &ProtoReconstructor,
    dialect: Dialect,
    path: &Path,
) -> Result<Vec<Reconstruction>> {
    trace!("Reading {}", path.display());
    let bytes = fs::read(path).map_err(|e| unproto_core::Error::file_read(path, e))?;
    // Generated sources may carry Latin-1 in comments; the payloads are ASCII.
    let source = String::from_utf8_lossy(&bytes);

    let units = reconstructor.reconstruct(&source, dialect)?;
    debug!("Recovered {} file(s) from {}", units.len(), path.display());
    Ok(units)
}

/// Name, deduplicate and write the files recovered from `input`.
///
/// With `fatal`, the first failure aborts; otherwise failures are logged
/// and the remaining files still go out.
fn emit_units(
    cli: &Cli,
    input: &Path,
    base: &Path,
    units: Vec<Reconstruction>,
    registry: &mut ProtoRegistry,
    fatal: bool,
) -> Result<usize> {
    let mut produced = 0;

    for unit in units {
        for warning in &unit.diagnostics {
            warn!("{}: {}", input.display(), warning);
        }

        let name = output_name(unit.name.as_deref(), input, base)
            .with_context(|| format!("Invalid output name for {}", input.display()))?;

        if cli.list_only {
            println!(
                "{}\t{} messages, {} enums, {} services, {} warnings",
                name.display(),
                unit.stats.message_count,
                unit.stats.enum_count,
                unit.stats.service_count,
                unit.diagnostics.len()
            );
            produced += 1;
            continue;
        }

        let relative = match registry.claim(&name, &unit.text, input, cli.conflict_strategy) {
            Claim::Fresh(path) | Claim::Renamed(path) => path,
            Claim::Duplicate | Claim::Skipped => continue,
        };
        let output_path = cli.output.join(&relative);

        if cli.dry_run {
            println!("Would write: {}", output_path.display());
            if cli.verbose > 0 {
                println!("---");
                println!("{}", unit.text);
                println!("---");
            }
            produced += 1;
            continue;
        }

        match write_proto_file(&output_path, &unit.text, cli.force) {
            Ok(()) => {
                println!("Wrote {}", output_path.display());
                registry.stats.written += 1;
                produced += 1;
            }
            Err(e) if fatal => return Err(e),
            Err(e) => error!("Failed to write {}: {:#}", output_path.display(), e),
        }
    }

    Ok(produced)
}

/// Output path relative to the output directory.
///
/// The recovered or hinted name is used as is; without one the input's
/// stem is used and its directory below `base` is kept.
fn output_name(name: Option<&str>, input: &Path, base: &Path) -> Result<PathBuf> {
    let relative = match name {
        Some(name) => PathBuf::from(name),
        None => {
            let stem = input
                .file_name()
                .and_then(|n| n.to_str())
                .map(generated_stem)
                .unwrap_or("unnamed");
            let dir = input
                .parent()
                .and_then(|p| p.strip_prefix(base).ok())
                .unwrap_or(Path::new(""));
            dir.join(format!("{}.proto", stem))
        }
    };

    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || relative.as_os_str().is_empty() {
        return Err(unproto_core::Error::path_traversal(relative).into());
    }
    Ok(relative)
}

/// File name minus its extension and generator suffix (`user.pb.go` -> `user`)
fn generated_stem(file_name: &str) -> &str {
    let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);
    [".pb", "_pb2", "_pb"]
        .iter()
        .find_map(|suffix| stem.strip_suffix(suffix))
        .filter(|s| !s.is_empty())
        .unwrap_or(stem)
}

/// Write a proto file to disk, creating parent directories
fn write_proto_file(output_path: &Path, content: &str, force: bool) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| unproto_core::Error::directory_create(parent, e))?;
    }

    if output_path.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    fs::write(output_path, content)
        .map_err(|e| unproto_core::Error::output_write(output_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROST_SOURCE: &str = r#"
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Pt {
    #[prost(int32, tag = "1")]
    pub x: i32,
}
"#;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("unproto").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_lang_names_match_dialects() {
        for lang in Lang::value_variants() {
            let possible = lang.to_possible_value().unwrap();
            assert_eq!(possible.get_name(), Dialect::from(*lang).name());
        }
    }

    #[test]
    fn test_input_modes_are_exclusive() {
        let args = ["unproto", "--lang", "go", "--file", "a.go", "--directory", "d"];
        assert!(Cli::try_parse_from(args).is_err());
        assert!(Cli::try_parse_from(["unproto", "--lang", "go"]).is_err());
    }

    #[test]
    fn test_registry_deduplication() {
        let mut registry = ProtoRegistry::new();
        let name = Path::new("test.proto");
        let content = "syntax = \"proto3\";\npackage test;\n";

        let first = registry.claim(name, content, Path::new("a.cs"), ConflictStrategy::HashSuffix);
        assert_eq!(first, Claim::Fresh(PathBuf::from("test.proto")));

        let second = registry.claim(name, content, Path::new("b.cs"), ConflictStrategy::HashSuffix);
        assert_eq!(second, Claim::Duplicate);
        assert_eq!(registry.stats.duplicates_skipped, 1);
    }

    #[test]
    fn test_registry_conflicts() {
        let name = Path::new("api/test.proto");
        let (one, two, three) = ("package a;", "package b;", "package c;");

        let mut registry = ProtoRegistry::new();
        registry.claim(name, one, Path::new("x.cs"), ConflictStrategy::HashSuffix);
        let renamed = registry.claim(name, two, Path::new("y.cs"), ConflictStrategy::HashSuffix);
        let expected = format!("api/test~{}.proto", ProtoRegistry::content_hash(two));
        assert_eq!(renamed, Claim::Renamed(PathBuf::from(expected)));
        assert_eq!(registry.stats.conflicts_renamed, 1);

        let by_source =
            registry.claim(name, three, Path::new("gen/UserReflection.cs"), ConflictStrategy::SourceSuffix);
        assert_eq!(
            by_source,
            Claim::Renamed(PathBuf::from("api/test~from-UserReflection.proto"))
        );

        let mut registry = ProtoRegistry::new();
        registry.claim(name, one, Path::new("x.cs"), ConflictStrategy::SkipConflicts);
        assert_eq!(
            registry.claim(name, two, Path::new("y.cs"), ConflictStrategy::SkipConflicts),
            Claim::Skipped
        );
    }

    #[test]
    fn test_add_suffix() {
        assert_eq!(
            add_suffix(Path::new("test.proto"), "~abc123"),
            PathBuf::from("test~abc123.proto")
        );
        assert_eq!(
            add_suffix(Path::new("path/to/test.proto"), "~abc123"),
            PathBuf::from("path/to/test~abc123.proto")
        );
    }

    #[test]
    fn test_content_hash() {
        let hash1 = ProtoRegistry::content_hash("hello");
        let hash2 = ProtoRegistry::content_hash("hello");
        let hash3 = ProtoRegistry::content_hash("world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 8);
    }

    #[test]
    fn test_output_name() {
        let base = Path::new("/src");
        assert_eq!(
            output_name(Some("api/v1/user.proto"), Path::new("/src/x/User.cs"), base).unwrap(),
            PathBuf::from("api/v1/user.proto")
        );
        assert_eq!(
            output_name(None, Path::new("/src/shop/cart.pb.go"), base).unwrap(),
            PathBuf::from("shop/cart.proto")
        );
        assert_eq!(
            output_name(None, Path::new("/src/cart_pb2.py"), base).unwrap(),
            PathBuf::from("cart.proto")
        );
    }

    #[test]
    fn test_output_name_rejects_traversal() {
        let base = Path::new("/src");
        for name in ["../evil.proto", "/etc/evil.proto", "a/../../evil.proto"] {
            assert!(
                output_name(Some(name), Path::new("/src/a.cs"), base).is_err(),
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_run_pool_keeps_order() {
        let items: Vec<usize> = (0..100).collect();
        let doubled = run_pool(&items, 4, |n| n * 2);
        assert_eq!(doubled, (0..100).map(|n| Ok(n * 2)).collect::<Vec<_>>());
        assert!(run_pool(&[] as &[usize], 4, |n| *n).is_empty());
    }

    #[test]
    fn test_run_pool_contains_panics() {
        let items: Vec<usize> = (0..20).collect();
        let results = run_pool(&items, 3, |n| {
            if *n == 7 {
                panic!("unit {} exploded", n);
            }
            n + 1
        });

        assert_eq!(results.len(), 20);
        assert_eq!(results[7], Err("unit 7 exploded".to_string()));
        for (i, result) in results.iter().enumerate().filter(|(i, _)| *i != 7) {
            assert_eq!(result, &Ok(i + 1));
        }
    }

    #[test]
    fn test_malformed_unit_does_not_stop_siblings() {
        use unproto_core::{literal, Embedding};

        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        // FileDescriptorProto { name: "a.proto", message_type: [{ name: "A" }] }
        let good = [
            &[0x0A, 0x07][..],
            b"a.proto",
            &[0x22, 0x03, 0x0A, 0x01, b'A'][..],
        ]
        .concat();
        // package field claims five bytes but only one follows
        let bad = [0x12, 0x05, b'a'];
        fs::write(input.path().join("a.pb.go"), literal::encode(&good, Embedding::Go)).unwrap();
        fs::write(input.path().join("b.pb.go"), literal::encode(&bad, Embedding::Go)).unwrap();

        let cli = cli(&[
            "--lang",
            "go",
            "--directory",
            input.path().to_str().unwrap(),
            "--output",
            output.path().to_str().unwrap(),
        ]);
        assert_eq!(run(&cli).unwrap(), 1);

        let written = fs::read_to_string(output.path().join("a.proto")).unwrap();
        assert!(written.contains("message A {"));
        assert!(!output.path().join("b.proto").exists());
    }

    #[test]
    fn test_directory_mode_isolates_failures() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        fs::create_dir(input.path().join("geo")).unwrap();
        fs::write(input.path().join("geo/pt.rs"), PROST_SOURCE).unwrap();
        fs::write(input.path().join("empty.rs"), "fn main() {}\n").unwrap();
        fs::write(input.path().join(".hidden.rs"), PROST_SOURCE).unwrap();
        fs::write(input.path().join("notes.txt"), PROST_SOURCE).unwrap();

        let cli = cli(&[
            "--lang",
            "prost",
            "--directory",
            input.path().to_str().unwrap(),
            "--output",
            output.path().to_str().unwrap(),
            "--jobs",
            "2",
        ]);
        let produced = run(&cli).unwrap();
        assert_eq!(produced, 1);

        let written = fs::read_to_string(output.path().join("geo/pt.proto")).unwrap();
        assert_eq!(written, "syntax = \"proto3\";\n\nmessage Pt {\n    int32 x = 1;\n}\n");
    }

    #[test]
    fn test_single_file_failure_is_fatal() {
        let input = TempDir::new().unwrap();
        let path = input.path().join("empty.rs");
        fs::write(&path, "fn main() {}\n").unwrap();

        let cli = cli(&["--lang", "prost", "--file", path.to_str().unwrap(), "--dry-run"]);
        assert!(run(&cli).is_err());
    }

    #[test]
    fn test_existing_file_needs_force() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let path = input.path().join("pt.rs");
        fs::write(&path, PROST_SOURCE).unwrap();
        fs::write(output.path().join("pt.proto"), "old").unwrap();

        let args = |force: bool| {
            let mut args = vec![
                "--lang",
                "prost",
                "--file",
                path.to_str().unwrap(),
                "--output",
                output.path().to_str().unwrap(),
            ];
            if force {
                args.push("--force");
            }
            cli(&args)
        };

        assert!(run(&args(false)).is_err());
        assert_eq!(run(&args(true)).unwrap(), 1);
        assert!(fs::read_to_string(output.path().join("pt.proto"))
            .unwrap()
            .contains("message Pt"));
    }
}
