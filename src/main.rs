//! Main entry point for the zipstream CLI application.
//!
//! This binary lists, extracts and creates ZIP archives. Archives are always
//! read front to back, so a local file, stdin and an HTTP response body are
//! handled the same way.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Local, Timelike};
use clap::Parser;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::Ordering;
use walkdir::WalkDir;

use zipstream::{open_source, Cli, CompressionMethod, ZipEntry, ZipReader, ZipWriter};

/// Application entry point.
///
/// Parses command-line arguments and dispatches to create mode or to
/// listing/extraction over a streamed source.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if cli.create {
        return create_archive(&cli);
    }

    let source = open_source(&cli.file)?;
    let transferred = source.transferred_bytes.clone();

    process_zip(source.reader, &cli)?;

    // Display network transfer statistics for HTTP sources
    if let Some(counter) = transferred
        && !cli.is_quiet()
    {
        eprintln!(
            "\nTotal bytes transferred: {}",
            format_size(counter.load(Ordering::Relaxed))
        );
    }

    Ok(())
}

/// Minimal stderr backend for the `log` facade.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Warnings always reach stderr; `--debug` adds the codec's debug and trace output.
fn init_logging(debug: bool) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(if debug {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Warn
        });
    }
}

/// Process a ZIP archive based on CLI options.
///
/// This function handles both listing and extraction modes:
/// - List mode (`-l` or `-v`): Display archive contents
/// - Extract mode: Extract entries matching the specified filters
///
/// Entries are handled in archive order as they arrive; unselected ones are
/// skipped by moving on to the next entry.
fn process_zip(source: Box<dyn Read>, cli: &Cli) -> Result<()> {
    let mut reader = ZipReader::new(source);

    // List mode: display archive contents and exit
    if cli.list || cli.verbose {
        list_entries(&mut reader, cli.verbose)?;
        reader.close();
        return Ok(());
    }

    // Pipe output gets separators unless a single literal name was asked for
    let show_filename = cli.pipe && !(cli.files.len() == 1 && !has_glob_chars(&cli.files[0]));

    let mut extracted = 0usize;
    while let Some(entry) = reader.next_entry()? {
        if !is_selected(&entry.name, cli) {
            continue;
        }

        if entry.is_directory() {
            create_directory(&entry, cli)?;
            continue;
        }

        if extract_entry(&mut reader, &entry, cli, show_filename)? {
            extracted += 1;
        }
    }
    reader.close();

    if extracted == 0 && !cli.files.is_empty() && !cli.is_very_quiet() {
        eprintln!("caution: filename not matched: {}", cli.files.join(" "));
    }

    Ok(())
}

/// Apply the positional file filters and the `-x` exclusions to an entry name.
fn is_selected(name: &str, cli: &Cli) -> bool {
    // If specific files are requested via positional arguments,
    // only include entries that match
    if !cli.files.is_empty() {
        let matches = cli.files.iter().any(|f| {
            if has_glob_chars(f) {
                // Pattern contains wildcards: use glob matching
                glob_match(f, name)
            } else {
                // No wildcards: exact match on filename or full path
                let basename = Path::new(name)
                    .file_name()
                    .map(|s| s.to_string_lossy())
                    .unwrap_or_default();
                name == f.as_str() || basename == *f
            }
        });
        if !matches {
            return false;
        }
    }

    // Exclude files matching the -x patterns
    !cli
        .exclude
        .iter()
        .any(|x| name.contains(x.as_str()) || glob_match(x, name))
}

/// List entries of the archive.
///
/// Supports two output formats:
/// - Simple format (`-l`): Just entry names, one per line
/// - Verbose format (`-v`): Detailed table with size, compression ratio, and timestamps
///
/// Sizes are taken after each entry has been skipped, so entries whose sizes
/// only appear in a data descriptor are reported correctly.
fn list_entries<R: Read>(reader: &mut ZipReader<R>, verbose: bool) -> Result<()> {
    if verbose {
        // Print table header for verbose output
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  {:>8}  Name",
            "Length", "Size", "Cmpr", "Date", "Time", "CRC-32"
        );
        println!("{}", "-".repeat(80));
    }

    // Track totals for summary line
    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    while reader.next_entry()?.is_some() {
        if !verbose {
            if let Some(entry) = reader.entry() {
                println!("{}", entry.name);
            }
            continue;
        }

        reader.close_entry()?;
        let Some(entry) = reader.entry() else {
            continue;
        };

        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();
        let size = entry.size.unwrap_or_default();
        let compressed = entry.compressed_size.unwrap_or_default();

        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {:08x}  {}",
            size,
            compressed,
            ratio(compressed, size),
            year,
            month,
            day,
            hour,
            minute,
            entry.crc.unwrap_or_default(),
            entry.name
        );

        // Accumulate totals (excluding directories)
        if !entry.is_directory() {
            total_uncompressed += size;
            total_compressed += compressed;
            file_count += 1;
        }
    }

    // Print summary line in verbose mode
    if verbose {
        println!("{}", "-".repeat(80));
        println!(
            "{:>10}  {:>10}  {}  {:>31}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
    }

    Ok(())
}

/// Compression ratio as percentage saved.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Map an entry name to a path below `base`.
///
/// Returns `None` for names that would escape it (absolute paths, `..`).
fn output_path(name: &str, base: &Path, junk_paths: bool) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if junk_paths {
        relative = PathBuf::from(relative.file_name()?);
    }
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(base.join(relative))
}

fn base_dir(cli: &Cli) -> PathBuf {
    cli.extract_dir
        .as_deref()
        .map_or_else(PathBuf::new, PathBuf::from)
}

/// Directory entries only matter when the tree is recreated on disk.
fn create_directory(entry: &ZipEntry, cli: &Cli) -> Result<()> {
    if cli.pipe || cli.junk_paths {
        return Ok(());
    }
    let Some(path) = output_path(&entry.name, &base_dir(cli), false) else {
        if !cli.is_very_quiet() {
            eprintln!("warning: skipped \"{}\" (unsafe path)", entry.name);
        }
        return Ok(());
    };
    if !cli.is_quiet() {
        println!("   creating: {}", entry.name);
    }
    fs::create_dir_all(&path).with_context(|| format!("cannot create {}", path.display()))
}

/// Extract the current entry from the reader.
///
/// Handles various extraction options:
/// - Pipe mode (`-p`): Write to stdout instead of file
/// - Custom output directory (`-d`): Extract to specified directory
/// - Junk paths (`-j`): Ignore directory structure in archive
/// - Overwrite control (`-n`, `-o`): Handle existing files
///
/// Returns `true` when the entry was written somewhere.
fn extract_entry<R: Read>(
    reader: &mut ZipReader<R>,
    entry: &ZipEntry,
    cli: &Cli,
    show_filename: bool,
) -> Result<bool> {
    // Pipe mode: write entry contents directly to stdout
    if cli.pipe {
        let mut stdout = io::stdout().lock();
        if show_filename {
            stdout.write_all(format!("--- {} ---\n", entry.name).as_bytes())?;
        }
        io::copy(reader, &mut stdout)
            .with_context(|| format!("failed to extract {}", entry.name))?;
        stdout.flush()?;
        return Ok(true);
    }

    let Some(path) = output_path(&entry.name, &base_dir(cli), cli.junk_paths) else {
        if !cli.is_very_quiet() {
            eprintln!("warning: skipped \"{}\" (unsafe path)", entry.name);
        }
        return Ok(false);
    };

    // Handle existing files based on overwrite options
    if path.exists() {
        if cli.never_overwrite {
            // -n flag: never overwrite, skip silently (unless quiet)
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.name);
            }
            return Ok(false);
        }

        if !cli.overwrite {
            // Default behavior: skip with suggestion to use -o
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.name);
            }
            return Ok(false);
        }
        // -o flag: overwrite without prompting (fall through to extraction)
    }

    // Display extraction progress
    if !cli.is_quiet() {
        let verb = match entry.method {
            Some(CompressionMethod::Stored) => "extracting",
            _ => "  inflating",
        };
        println!("  {}: {}", verb, entry.name);
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }

    let file = File::create(&path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    io::copy(reader, &mut out).with_context(|| format!("failed to extract {}", entry.name))?;
    out.flush()?;

    Ok(true)
}

/// Create an archive from the files and directories given after it.
///
/// Directories are walked recursively. `-` writes the archive to stdout.
fn create_archive(cli: &Cli) -> Result<()> {
    if cli.files.is_empty() {
        bail!("nothing to add: name files or directories after the archive");
    }

    let archive_path = (cli.file != "-").then(|| PathBuf::from(&cli.file));
    let sink: Box<dyn Write> = match &archive_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    };
    let archive_path = archive_path.and_then(|p| fs::canonicalize(p).ok());
    // Messages go to stderr when the archive itself is on stdout
    let quiet = cli.is_quiet() || archive_path.is_none();

    let mut writer = ZipWriter::new(sink);
    writer.set_method(if cli.store {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    })?;
    writer.set_level(cli.level)?;
    if let Some(comment) = &cli.comment {
        writer.set_comment(comment.as_str())?;
    }

    let mut added = 0usize;
    for root in &cli.files {
        if !Path::new(root).exists() {
            bail!("{}: no such file or directory", root);
        }
        for dir_entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = dir_entry.path();
            if archive_path.is_some() && fs::canonicalize(path).ok() == archive_path {
                continue;
            }
            if add_path(&mut writer, path, dir_entry.file_type().is_dir(), cli.store, quiet)? {
                added += 1;
            }
        }
    }

    writer.close()?;

    if !quiet {
        println!("{} entries written to {}", added, cli.file);
    } else if archive_path.is_none() && !cli.is_very_quiet() {
        eprintln!("{} entries written", added);
    }

    Ok(())
}

/// Forward-slash archive name for a path on disk, `None` for nothing usable.
fn archive_name(path: &Path, is_dir: bool) -> Option<String> {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    let mut name = parts.join("/");
    if is_dir {
        name.push('/');
    }
    Some(name)
}

fn add_path<W: Write>(
    writer: &mut ZipWriter<W>,
    path: &Path,
    is_dir: bool,
    store: bool,
    quiet: bool,
) -> Result<bool> {
    let Some(name) = archive_name(path, is_dir) else {
        return Ok(false);
    };
    let metadata = fs::metadata(path).with_context(|| format!("cannot stat {}", path.display()))?;

    // STORED entries declare size and CRC up front, so their data is read
    // once here and written from this buffer.
    let stored_data = if store && !is_dir {
        Some(fs::read(path).with_context(|| format!("cannot read {}", path.display()))?)
    } else {
        None
    };
    let mut entry = match (&stored_data, is_dir) {
        (Some(data), _) => ZipEntry::stored(name, data),
        (None, true) => ZipEntry::stored(name, &[]),
        (None, false) => ZipEntry::new(name),
    };

    if let Ok(modified) = metadata.modified() {
        let local: DateTime<Local> = modified.into();
        entry.set_mod_datetime(
            local.year().clamp(1980, 2107) as u16,
            local.month() as u8,
            local.day() as u8,
            local.hour() as u8,
            local.minute() as u8,
            local.second() as u8,
        );
    }

    if !quiet {
        let how = match (is_dir, store) {
            (true, _) => "stored 0%",
            (false, true) => "stored",
            (false, false) => "deflated",
        };
        println!("  adding: {} ({})", entry.name, how);
    }

    let name = entry.name.clone();
    writer.put_next_entry(entry)?;
    if let Some(data) = &stored_data {
        writer
            .write_data(data)
            .with_context(|| format!("failed to add {}", name))?;
    } else if !is_dir {
        let mut file = File::open(path).with_context(|| format!("cannot read {}", path.display()))?;
        io::copy(&mut file, writer).with_context(|| format!("failed to add {}", name))?;
    }
    writer.close_entry()?;

    Ok(true)
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
///
/// # Examples
///
/// ```ignore
/// assert!(glob_match("*.txt", "readme.txt"));
/// assert!(glob_match("file?.dat", "file1.dat"));
/// assert!(!glob_match("*.txt", "readme.md"));
/// ```
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // Star matches zero characters, or one and stays
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
