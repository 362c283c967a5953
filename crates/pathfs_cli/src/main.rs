/* 📖 # What does the pathfs CLI do?

Each subcommand maps onto one `FileSystem` operation. Paths and URIs given on the command
line are parsed into locators once, up front.

The file system comes from `--config <path>`, or from `pathfs.toml` in the current
directory when that exists, or else the defaults (a writable `file:` provider).

Exit codes:
- 0: Success
- 1: Error, or `exists` on an absent path
*/

use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use pathfs_base::tracing::init_tracing;
use pathfs_base::{FileType, PathfsError, PathfsResult, ResultExt};
use pathfs_fs::{
    Config, CopyOptions, DeleteOptions, FileContent, FileStat, FileSystem, Locator, ReadOptions,
    WatchOptions, load_config,
};

const DEFAULT_CONFIG: &str = "pathfs.toml";

/// pathfs - read, write and watch files across local and mounted file systems
#[derive(Parser, Debug)]
#[command(name = "pathfs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./pathfs.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show metadata of an entry
    Stat { target: String },
    /// List the children of a directory
    Ls { target: String },
    /// Create a directory and its missing parents
    Mkdir { target: String },
    /// Print a file as text
    Cat {
        target: String,
        /// WHATWG encoding label
        #[arg(long)]
        encoding: Option<String>,
        /// Fail on malformed input instead of printing U+FFFD
        #[arg(long)]
        fatal: bool,
        /// Keep a leading byte order mark
        #[arg(long)]
        keep_bom: bool,
    },
    /// Replace the content of a file (stdin when no content is given)
    Write {
        target: String,
        content: Option<String>,
    },
    /// Append to a file (stdin when no content is given)
    Append {
        target: String,
        content: Option<String>,
    },
    /// Delete an entry
    Rm {
        target: String,
        #[arg(long, short)]
        recursive: bool,
        /// Delete permanently even when a trash is configured
        #[arg(long)]
        no_trash: bool,
    },
    /// Move an entry
    Mv(TransferArgs),
    /// Copy an entry recursively
    Cp(TransferArgs),
    /// Keep only the first LENGTH characters of a file
    Truncate {
        target: String,
        #[arg(default_value_t = 0)]
        length: usize,
    },
    /// Check whether an entry exists
    Exists { target: String },
    /// Show the access level of the provider behind a path
    Access { target: String },
    /// Show whether a scheme is writable
    Writable { scheme: String },
    /// Print changes matching a glob pattern until interrupted
    Watch {
        pattern: String,
        #[arg(long)]
        ignore_create: bool,
        #[arg(long)]
        ignore_change: bool,
        #[arg(long)]
        ignore_delete: bool,
    },
}

#[derive(Args, Debug)]
struct TransferArgs {
    source: String,
    target: String,
    /// Replace an existing target
    #[arg(long)]
    overwrite: bool,
}

impl TransferArgs {
    fn options(&self) -> CopyOptions {
        CopyOptions {
            overwrite: self.overwrite,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_tracing() {
        eprintln!("Warning: {}", e);
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

async fn open_file_system(config_path: Option<&Path>) -> PathfsResult<FileSystem> {
    let config = match config_path {
        Some(path) => load_config(path).await?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            debug!("using {}", DEFAULT_CONFIG);
            load_config(Path::new(DEFAULT_CONFIG)).await?
        }
        None => Config::default(),
    };
    FileSystem::from_config(&config)
}

fn parse_locator(input: &str) -> PathfsResult<Locator> {
    let path = Path::new(input);
    if path.is_relative() && !input.contains(':') {
        let current_dir = std::env::current_dir()
            .map_err(|e| Box::new(PathfsError::from_io(".", e)))
            .context("Failed to resolve the current directory")?;
        return Locator::from_file_path(&current_dir.join(path));
    }
    Locator::parse(input)
}

async fn content_or_stdin(content: Option<String>) -> PathfsResult<FileContent> {
    match content {
        Some(text) => Ok(FileContent::Text(text)),
        None => {
            let mut bytes = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut bytes)
                .await
                .map_err(|e| Box::new(PathfsError::from_io("<stdin>", e)))?;
            Ok(FileContent::Bytes(bytes))
        }
    }
}

/// Runs one command and returns the process exit code.
async fn run(cli: Cli) -> PathfsResult<i32> {
    let fs = open_file_system(cli.config.as_deref()).await?;

    match cli.command {
        Command::Stat { target } => {
            let stat = fs.stat(&parse_locator(&target)?).await?;
            print!("{}", format_stat(&stat));
        }
        Command::Ls { target } => {
            for (name, file_type) in fs.read_directory(&parse_locator(&target)?).await? {
                println!("{}\t{}", file_type_label(file_type), name);
            }
        }
        Command::Mkdir { target } => {
            fs.create_directory(&parse_locator(&target)?).await?;
        }
        Command::Cat {
            target,
            encoding,
            fatal,
            keep_bom,
        } => {
            let options = ReadOptions {
                encoding,
                fatal,
                ignore_bom: keep_bom,
            };
            let text = fs.read_file(&parse_locator(&target)?, &options).await?;
            let mut stdout = tokio::io::stdout();
            let written = match stdout.write_all(text.as_bytes()).await {
                Ok(()) => stdout.flush().await,
                Err(e) => Err(e),
            };
            written.map_err(|e| Box::new(PathfsError::from_io("<stdout>", e)))?;
        }
        Command::Write { target, content } => {
            let locator = parse_locator(&target)?;
            fs.write_file(&locator, content_or_stdin(content).await?)
                .await?;
        }
        Command::Append { target, content } => {
            let locator = parse_locator(&target)?;
            fs.append_file(&locator, content_or_stdin(content).await?)
                .await?;
        }
        Command::Rm {
            target,
            recursive,
            no_trash,
        } => {
            let options = DeleteOptions::default()
                .with_recursive(recursive)
                .with_trash(!no_trash);
            fs.delete(&parse_locator(&target)?, options).await?;
        }
        Command::Mv(args) => {
            let (source, target) = (parse_locator(&args.source)?, parse_locator(&args.target)?);
            fs.rename(&source, &target, args.options()).await?;
        }
        Command::Cp(args) => {
            let (source, target) = (parse_locator(&args.source)?, parse_locator(&args.target)?);
            fs.copy(&source, &target, args.options()).await?;
        }
        Command::Truncate { target, length } => {
            fs.truncate(&parse_locator(&target)?, length).await?;
        }
        Command::Exists { target } => {
            let exists = fs.exists(&parse_locator(&target)?).await;
            println!("{}", exists);
            if !exists {
                return Ok(1);
            }
        }
        Command::Access { target } => {
            println!("{}", fs.access(&parse_locator(&target)?));
        }
        Command::Writable { scheme } => {
            let answer = match fs.is_writable_file_system(&scheme) {
                Some(true) => "writable",
                Some(false) => "readonly",
                None => "unknown",
            };
            println!("{}", answer);
        }
        Command::Watch {
            pattern,
            ignore_create,
            ignore_change,
            ignore_delete,
        } => {
            let options = WatchOptions {
                ignore_create,
                ignore_change,
                ignore_delete,
            };
            watch(&fs, &pattern, options).await?;
        }
    }
    Ok(0)
}

async fn watch(fs: &FileSystem, pattern: &str, options: WatchOptions) -> PathfsResult<()> {
    let pattern = absolute_pattern(pattern)?;
    let mut watcher = fs.watch(&pattern, options)?;
    info!(pattern = %watcher.pattern(), "watching, press Ctrl-C to stop");

    loop {
        tokio::select! {
            change = watcher.recv() => match change {
                Some(change) => println!("{:?}\t{}", change.kind, change.locator),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
        }
    }
    watcher.dispose();
    Ok(())
}

/// Makes a relative glob pattern absolute against the current directory.
fn absolute_pattern(pattern: &str) -> PathfsResult<String> {
    if pattern.contains(':') || Path::new(pattern).is_absolute() {
        return Ok(pattern.to_string());
    }
    let current_dir = std::env::current_dir()
        .map_err(|e| Box::new(PathfsError::from_io(".", e)))
        .context("Failed to resolve the current directory")?;
    Ok(format!(
        "{}/{}",
        current_dir.display().to_string().trim_end_matches('/'),
        pattern
    ))
}

fn file_type_label(file_type: FileType) -> &'static str {
    match file_type {
        FileType::File => "file",
        FileType::Directory => "dir",
        FileType::SymbolicLink => "link",
        FileType::Unknown => "unknown",
    }
}

fn epoch_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

fn format_stat(stat: &FileStat) -> String {
    format!(
        "type: {}\nsize: {}\nctime: {}\nmtime: {}\nreadonly: {}\n",
        file_type_label(stat.file_type),
        stat.size,
        epoch_seconds(stat.ctime),
        epoch_seconds(stat.mtime),
        stat.readonly
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use std::time::Duration;

    #[test]
    fn test_parse_cat_flags() {
        let cli = Cli::try_parse_from([
            "pathfs",
            "--config",
            "custom.toml",
            "cat",
            "/tmp/x.txt",
            "--encoding",
            "latin1",
            "--keep-bom",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Command::Cat {
                target,
                encoding,
                fatal,
                keep_bom,
            } => {
                assert_eq!(target, "/tmp/x.txt");
                assert_eq!(encoding.as_deref(), Some("latin1"));
                assert!(!fatal);
                assert!(keep_bom);
            }
            other => panic!("Expected cat, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_truncate_default_length() {
        let cli = Cli::try_parse_from(["pathfs", "truncate", "/tmp/x.txt"]).unwrap();
        assert!(matches!(cli.command, Command::Truncate { length: 0, .. }));
    }

    #[test]
    fn test_parse_cp_overwrite() {
        let cli = Cli::try_parse_from(["pathfs", "cp", "/a", "mem:/b", "--overwrite"]).unwrap();
        match cli.command {
            Command::Cp(args) => assert!(args.options().overwrite),
            other => panic!("Expected cp, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_locator_resolves_relative_paths() {
        let locator = parse_locator("notes/today.md").unwrap();
        assert_eq!(locator.scheme(), "file");
        assert!(locator.path().ends_with("/notes/today.md"));

        let uri = parse_locator("mem:/a").unwrap();
        assert_eq!(uri.scheme(), "mem");
    }

    #[test]
    fn test_absolute_pattern() {
        assert_eq!(absolute_pattern("mem:/logs/*.log").unwrap(), "mem:/logs/*.log");
        assert_eq!(absolute_pattern("/var/log/*.log").unwrap(), "/var/log/*.log");
        assert!(absolute_pattern("logs/*.log").unwrap().ends_with("/logs/*.log"));
    }

    #[test]
    fn test_format_stat() {
        let stat = FileStat {
            file_type: FileType::File,
            size: 42,
            ctime: UNIX_EPOCH + Duration::from_secs(10),
            mtime: UNIX_EPOCH + Duration::from_secs(20),
            readonly: false,
        };
        expect![[r#"
            type: file
            size: 42
            ctime: 10
            mtime: 20
            readonly: false
        "#]]
        .assert_eq(&format_stat(&stat));
    }

    #[tokio::test]
    async fn test_run_with_config_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("pathfs.toml");
        std::fs::write(&config_path, "[[mount]]\nscheme = \"mem\"\nkind = \"memory\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "pathfs",
            "--config",
            config_path.to_str().unwrap(),
            "exists",
            "mem:/nothing",
        ])
        .unwrap();
        assert_eq!(run(cli).await.unwrap(), 1);

        let cli = Cli::try_parse_from([
            "pathfs",
            "--config",
            config_path.to_str().unwrap(),
            "writable",
            "mem",
        ])
        .unwrap();
        assert_eq!(run(cli).await.unwrap(), 0);
    }
}
