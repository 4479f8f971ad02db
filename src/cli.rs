use clap::Parser;

use crate::io::is_http_url;

#[derive(Parser, Debug)]
#[command(name = "zipstream")]
#[command(version)]
#[command(about = "Streaming unzip/zip utility, reads from files, pipes and HTTP URLs", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipstream data1.zip -x joe        extract all files except joe from data1.zip\n  \
  zipstream -p foo.zip | more       send contents of foo.zip via pipe into more\n  \
  curl -s URL | zipstream -l -     list files of an archive read from stdin\n  \
  zipstream -c out.zip src README   create out.zip from a directory and a file")]
pub struct Cli {
    /// ZIP file path, `-` for stdin, or HTTP URL (the archive to write with -c)
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all), or files and directories to add with -c
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Create FILE from FILES instead of extracting
    #[arg(short = 'c', conflicts_with_all = ["list", "verbose", "pipe", "extract_dir"])]
    pub create: bool,

    /// Store only, do not compress (with -c)
    #[arg(short = '0', requires = "create")]
    pub store: bool,

    /// Compression level, -1 for the default (with -c)
    #[arg(short = 'L', long = "level", value_name = "N", default_value_t = -1,
          allow_negative_numbers = true, value_parser = clap::value_parser!(i32).range(-1..=9))]
    pub level: i32,

    /// Archive comment (with -c)
    #[arg(short = 'z', long = "comment", value_name = "TEXT", requires = "create")]
    pub comment: Option<String>,

    /// Print debug log messages to stderr
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        is_http_url(&self.file)
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }
}
