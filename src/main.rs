use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use argh::FromArgs;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use bsdelta::{apply, generate_with, DiffOptions, SuffixArray, TieBreak};

#[derive(FromArgs)]
/// Create and apply bsdiff-compatible binary patches.
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Diff(DiffArgs),
    Patch(PatchArgs),
}

#[derive(FromArgs)]
/// Write a patch that turns OLD into NEW.
#[argh(subcommand, name = "diff")]
struct DiffArgs {
    /// the file the patch starts from
    #[argh(positional)]
    old: PathBuf,
    /// the file the patch should produce
    #[argh(positional)]
    new: PathBuf,
    /// where to write the patch
    #[argh(positional)]
    patch: PathBuf,
    /// bzip2 level of the patch blocks, 1 to 9
    #[argh(option, default = "9")]
    level: u32,
    /// break match ties like bsdiff does, for byte-identical patches
    #[argh(switch)]
    reference_tie_break: bool,
    /// do not show a progress bar
    #[argh(switch, short = 'q')]
    quiet: bool,
}

#[derive(FromArgs)]
/// Apply PATCH to OLD and write the result to NEW.
#[argh(subcommand, name = "patch")]
struct PatchArgs {
    /// the file to patch
    #[argh(positional)]
    old: PathBuf,
    /// where to write the patched file
    #[argh(positional)]
    new: PathBuf,
    /// the patch to apply
    #[argh(positional)]
    patch: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args: Args = argh::from_env();
    match args.command {
        Command::Diff(args) => diff(args),
        Command::Patch(args) => patch(args),
    }
}

fn diff(args: DiffArgs) -> Result<()> {
    let now = Instant::now();
    let old = fs::read(&args.old)
        .with_context(|| format!("Failed to read old file {}", args.old.display()))?;
    let new = fs::read(&args.new)
        .with_context(|| format!("Failed to read new file {}", args.new.display()))?;

    let bar = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(new.len() as u64)
    };
    bar.set_style(
        ProgressStyle::default_bar().template("{msg:>8} [{bar:40}] {bytes}/{total_bytes} ({eta})"),
    );
    bar.set_message("Sorting");
    let suffixes = SuffixArray::new(&old);
    bar.set_message("Diffing");

    let options = DiffOptions {
        tie_break: if args.reference_tie_break {
            TieBreak::HigherRank
        } else {
            TieBreak::LowestOffset
        },
        compression: args.level,
    };
    write_atomically(&args.patch, |patch| {
        generate_with(&suffixes, &new, patch, &options, |done| bar.set_position(done))
            .context("Failed to generate patch")
    })?;
    bar.finish_and_clear();

    info!(
        "wrote {} ({} -> {} bytes) in {:?}",
        args.patch.display(),
        old.len(),
        new.len(),
        now.elapsed()
    );
    Ok(())
}

fn patch(args: PatchArgs) -> Result<()> {
    let now = Instant::now();
    let old = fs::read(&args.old)
        .with_context(|| format!("Failed to read old file {}", args.old.display()))?;
    let mut patch = BufReader::new(
        File::open(&args.patch)
            .with_context(|| format!("Failed to open patch file {}", args.patch.display()))?,
    );
    write_atomically(&args.new, |new| {
        apply(&old, new, &mut patch).context("Failed to apply patch")
    })?;
    info!("wrote {} in {:?}", args.new.display(), now.elapsed());
    Ok(())
}

/// Runs `write` against a temporary file next to `path` and moves it into
/// place only if everything succeeded.
fn write_atomically(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<()>,
) -> Result<()> {
    let mut tmp_name = OsString::from(path.as_os_str());
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let result = File::create(&tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))
        .and_then(|file| {
            let mut out = BufWriter::new(file);
            write(&mut out)?;
            out.flush().context("Failed to flush output")?;
            let file = out.into_inner().context("Failed to flush output")?;
            file.sync_all().context("Failed to sync output")
        })
        .and_then(|_| {
            fs::rename(&tmp, path).with_context(|| {
                format!("Failed to move {} to {}", tmp.display(), path.display())
            })
        });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
