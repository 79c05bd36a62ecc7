//! Command-line front end for the fb bootable-USB disk engine (spec §6).
//!
//! This binary owns everything spec.md explicitly calls external to the engine: argument
//! parsing, `--help`/`--version` text, the `k/K/m/M/g/G` sector-suffix grammar, opening
//! the target file/device, and formatting errors and `--verbose` diagnostics to stderr.

use std::fs::OpenOptions;
use std::io::{Read as _, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};

use fb_disk::boot_blob;
use fb_disk::disk::{BpbMode, Disk, FormatOptions, InfoLine, SyncOptions};
use fb_disk::{FileBackend, UtcTime};

const PROGNAME: &str = "fb";

#[derive(Debug, Parser)]
#[command(name = PROGNAME, version, about = "fb bootable-USB disk container engine")]
struct Args {
    /// Enumerate disks and exit (device discovery itself is outside this crate's scope).
    #[arg(short = 'l', long)]
    list: bool,

    /// Print `<progname>: info:` diagnostics to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the debug boot blob instead of the release one.
    #[arg(short, long, global = true)]
    debug: bool,

    /// The device or image file to operate on.
    #[arg(required_unless_present = "list")]
    target: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Lay down the MBR ladder, data header, catalog and FAT filesystem.
    Format {
        /// Skip the fb layout entirely and format a single raw FAT partition.
        #[arg(short, long)]
        raw: bool,
        #[arg(short, long)]
        force: bool,
        #[arg(short, long)]
        zip: bool,
        #[arg(long)]
        fat16: bool,
        #[arg(long)]
        fat32: bool,
        #[arg(short, long)]
        align: bool,
        #[arg(short = 'n', long = "nalign")]
        nalign: Option<String>,
        #[arg(short, long = "unit-size")]
        unit_size: Option<u8>,
        #[arg(short, long)]
        base: Option<String>,
        #[arg(short, long = "size")]
        size: Option<String>,
        #[arg(short, long = "primary")]
        primary: Option<String>,
        #[arg(short, long = "extended")]
        extended: Option<String>,
        #[arg(short = 'L', long = "list-size")]
        list_size: Option<String>,
        #[arg(long = "max-sectors", value_parser = clap::value_parser!(u8).range(0..=127))]
        max_sectors: Option<u8>,
        #[arg(long)]
        chs: bool,
        /// Seed the fresh disk from a saved archive's size hints, catalog and payloads.
        #[arg(long)]
        archive: Option<PathBuf>,
    },
    /// Rebuild sector 0 from a surviving ladder copy.
    Restore,
    /// Rewrite the boot code of every ladder copy from the boot blob.
    Update,
    /// Resync the data partition's BPB copy embedded in the ladder.
    Sync {
        #[arg(long = "copy-bpb")]
        copy_bpb: bool,
        #[arg(long = "reset-bpb")]
        reset_bpb: bool,
        #[arg(long = "clear-bpb")]
        clear_bpb: bool,
        #[arg(long = "bpb-size")]
        bpb_size: Option<String>,
        #[arg(long = "max-sectors", value_parser = clap::value_parser!(u8).range(0..=127))]
        max_sectors: Option<u8>,
        #[arg(long)]
        chs: bool,
        #[arg(short, long)]
        zip: bool,
    },
    /// Print header, geometry and catalog information.
    Info,
    /// Empty the catalog.
    Clear,
    /// Add a file (reads stdin when FILE is omitted).
    Add {
        #[arg(short, long)]
        extended: bool,
        #[arg(short, long)]
        syslinux: bool,
        name: String,
        file: Option<PathBuf>,
    },
    /// Compile a menu script and store it as a file.
    AddMenu {
        name: String,
        file: PathBuf,
    },
    /// Grow or shrink a file's size in place, relocating if necessary.
    Resize {
        #[arg(short, long)]
        extended: bool,
        #[arg(short, long = "fill")]
        fill: Option<u8>,
        name: String,
        size: String,
    },
    /// Duplicate a file under a new name.
    Copy { old: String, new: String },
    /// Rename a file in place.
    #[command(name = "move")]
    Move { old: String, new: String },
    /// Read a file's data out (writes stdout when FILE is omitted).
    Export { name: String, file: Option<PathBuf> },
    /// Delete a file's catalog entry.
    Remove { name: String },
    /// Print a file's raw bytes.
    Cat { name: String },
    /// Decode a menu file and print its script form.
    CatMenu { name: String },
    /// Defragment file payloads.
    Pack,
    /// Verify the watermark law across every primary sector.
    Check,
    /// Save the live catalog and payloads into an archive file.
    Save {
        #[arg(short = 'L', long = "list-size")]
        list_size: Option<String>,
        file: PathBuf,
    },
    /// Load an archive's catalog and payloads onto this disk.
    Load { file: PathBuf },
    /// Create a fresh, empty archive file.
    Create {
        #[arg(short, long = "primary")]
        primary: Option<String>,
        #[arg(short, long = "extended")]
        extended: Option<String>,
        #[arg(short = 'L', long = "list-size")]
        list_size: Option<String>,
    },
}

/// Parses the `k/K`×2, `m/M`×2048, `g/G`×2097152 sector-count suffix grammar (spec §6).
fn parse_sectors(s: &str) -> Result<u32> {
    let (digits, mult) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 2),
        Some('m') | Some('M') => (&s[..s.len() - 1], 2048),
        Some('g') | Some('G') => (&s[..s.len() - 1], 2097152),
        _ => (s, 1),
    };
    let n: u32 = digits.parse().with_context(|| format!("invalid sector count: {s:?}"))?;
    n.checked_mul(mult).ok_or_else(|| anyhow!("sector count overflows: {s:?}"))
}

fn parse_sectors_opt(s: &Option<String>) -> Result<u32> {
    match s {
        Some(s) => parse_sectors(s),
        None => Ok(0),
    }
}

fn verbose_log(verbose: bool, message: &str) {
    if verbose {
        eprintln!("{PROGNAME}: info: {message}");
    }
}

fn now() -> UtcTime {
    chrono::Utc::now()
}

fn open_rw(path: &PathBuf) -> Result<FileBackend> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    FileBackend::new(file).with_context(|| format!("reading size of {}", path.display()))
}

fn open_or_create_rw(path: &PathBuf) -> Result<FileBackend> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    FileBackend::new(file).with_context(|| format!("reading size of {}", path.display()))
}

fn read_file_or_stdin(file: &Option<PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) => std::fs::read(path).with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf).context("reading stdin")?;
            Ok(buf)
        }
    }
}

fn write_file_or_stdout(file: &Option<PathBuf>, data: &[u8]) -> Result<()> {
    match file {
        Some(path) => std::fs::write(path, data).with_context(|| format!("writing {}", path.display())),
        None => std::io::stdout().write_all(data).context("writing stdout"),
    }
}

fn run(args: &Args) -> Result<()> {
    if args.list {
        // Device enumeration is out of scope (spec §1); nothing to list from a plain
        // image/file front end.
        return Ok(());
    }

    let target = args.target.as_ref().expect("clap enforces target unless --list");
    let boot_blob = if args.debug { boot_blob::DEBUG } else { boot_blob::RELEASE };

    let command = args.command.as_ref().ok_or_else(|| anyhow!("a command is required"))?;

    match command {
        Command::Format {
            raw,
            force,
            zip,
            fat16,
            fat32,
            align,
            nalign,
            unit_size,
            base,
            size,
            primary,
            extended,
            list_size,
            max_sectors,
            chs,
            archive,
        } => {
            let opts = FormatOptions {
                force: *force,
                zip: *zip,
                part_size: parse_sectors_opt(size)?,
                fat32: match (fat16, fat32) {
                    (true, true) => bail!("--fat16 and --fat32 are mutually exclusive"),
                    (true, false) => Some(false),
                    (false, true) => Some(true),
                    (false, false) => None,
                },
                align: *align,
                nand_align: match nalign {
                    Some(s) => {
                        let n = parse_sectors(s)?;
                        let nand_align = n.checked_sub(1).ok_or_else(|| anyhow!("invalid alignment value"))?;
                        if nand_align < fb_disk::disk::MIN_NAND_ALIGN || (nand_align + 1) & nand_align != 0 {
                            bail!("invalid alignment value");
                        }
                        nand_align
                    }
                    None => fb_disk::disk::MIN_NAND_ALIGN,
                },
                unit_size: unit_size.unwrap_or(0),
                base: match base {
                    Some(s) => parse_sectors(s)?,
                    None => fb_disk::disk::DEF_BASE_SIZE,
                },
                pri_size: parse_sectors_opt(primary)?,
                ext_size: parse_sectors_opt(extended)?,
                list_size: parse_sectors_opt(list_size)?,
                max_sectors: max_sectors.unwrap_or(0),
                chs_mode: *chs,
            };
            let io = open_rw(target)?;
            verbose_log(args.verbose, "formatting disk");
            if *raw {
                if archive.is_some() {
                    bail!("--raw and --archive are mutually exclusive");
                }
                Disk::format_raw(io, &opts)?;
            } else if let Some(archive_path) = archive {
                let mut archive_io = open_rw(archive_path)?;
                Disk::format_from_archive(io, &opts, boot_blob, &mut archive_io)?;
            } else {
                Disk::format(io, &opts, boot_blob)?;
            }
        }

        Command::Restore => {
            let io = open_rw(target)?;
            verbose_log(args.verbose, "scanning ladder copies for a surviving sector 0");
            Disk::restore(io)?;
        }

        Command::Update => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, false)?;
            disk.update(boot_blob)?;
            disk.write_header()?;
        }

        Command::Sync { copy_bpb, reset_bpb, clear_bpb, bpb_size, max_sectors, chs, zip } => {
            let mode = match (copy_bpb, reset_bpb, clear_bpb) {
                (true, false, false) => Some(BpbMode::Copy),
                (false, true, false) => Some(BpbMode::Reset),
                (false, false, true) => Some(BpbMode::Clear),
                (false, false, false) => None,
                _ => bail!("--copy-bpb, --reset-bpb and --clear-bpb are mutually exclusive"),
            };
            let opts = SyncOptions {
                copy_bpb: mode,
                bpb_size: parse_sectors_opt(bpb_size)?,
                zip: *zip,
                max_sectors: max_sectors.unwrap_or(0),
                chs_mode: *chs,
            };
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, false)?;
            disk.sync(&opts)?;
            disk.write_header()?;
        }

        Command::Info => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, true)?;
            print_info(&disk.info()?);
        }

        Command::Clear => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, false)?;
            disk.clear();
            disk.write_header()?;
        }

        Command::Add { extended, syslinux, name, file } => {
            let data = read_file_or_stdin(file)?;
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, false)?;
            disk.add(name, &data, *extended, *syslinux, now())?;
            disk.write_header()?;
        }

        Command::AddMenu { name, file } => {
            let source = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, false)?;
            disk.add_menu(name, &source, now())?;
            disk.write_header()?;
        }

        Command::Resize { extended, fill, name, size } => {
            let size = parse_sectors(size)?;
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, false)?;
            disk.resize(name, size, *extended, fill.unwrap_or(0), now())?;
            disk.write_header()?;
        }

        Command::Copy { old, new } => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, false)?;
            disk.copy(old, new, now())?;
            disk.write_header()?;
        }

        Command::Move { old, new } => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, false)?;
            disk.move_file(old, new)?;
            disk.write_header()?;
        }

        Command::Export { name, file } => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, true)?;
            let data = disk.export(name)?;
            write_file_or_stdout(file, &data)?;
        }

        Command::Remove { name } => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, false)?;
            disk.remove(name)?;
            disk.write_header()?;
        }

        Command::Cat { name } => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, true)?;
            let data = disk.export(name)?;
            std::io::stdout().write_all(&data).context("writing stdout")?;
        }

        Command::CatMenu { name } => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, true)?;
            for line in disk.cat_menu(name)? {
                println!("{line}");
            }
        }

        Command::Pack => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, false)?;
            disk.pack()?;
            disk.write_header()?;
        }

        Command::Check => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, true)?;
            disk.check()?;
            verbose_log(args.verbose, "watermark check passed");
        }

        Command::Save { list_size, file } => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, false)?;
            let mut dst = open_or_create_rw(file)?;
            disk.save(&mut dst, parse_sectors_opt(list_size)?)?;
        }

        Command::Load { file } => {
            let io = open_rw(target)?;
            let mut disk = Disk::read_header(io, false)?;
            let mut src = open_rw(file)?;
            disk.load(&mut src)?;
            disk.write_header()?;
        }

        Command::Create { primary, extended, list_size } => {
            let io = open_or_create_rw(target)?;
            let mut disk = Disk::create(
                io,
                parse_sectors_opt(primary)?,
                parse_sectors_opt(extended)?,
                parse_sectors_opt(list_size)?,
            )?;
            disk.write_header()?;
        }
    }

    Ok(())
}

fn print_info(info: &fb_disk::disk::DiskInfo) {
    println!("version: {}.{}", info.ver_major, info.ver_minor);
    if info.archive_mode {
        println!("mode: archive");
    } else {
        println!("mode: disk");
        println!("boot base: {}", info.boot_base.unwrap_or(0));
        if let Some(max_sectors) = info.max_sectors {
            println!("max sectors: {max_sectors}");
        }
        println!("chs mode: {}", info.chs_mode);
        println!("zip: {}", info.zip);
    }
    println!("primary size: {} sectors", info.pri_size);
    println!("extended size: {} sectors", info.ext_size);
    println!("list size: {} sectors ({} used)", info.list_size, info.list_used);
    println!("primary free: {} bytes", info.primary_free_bytes);
    println!("extended free: {} bytes", info.extended_free_bytes);
    println!();
    for line in &info.lines {
        match line {
            InfoLine::Gap { extended, start, len } => {
                println!("  <gap {} sectors {}..{}>", if *extended { "ext" } else { "pri" }, start, start + len);
            }
            InfoLine::File(record) => {
                println!("  {:<32} {:>10} bytes @ {}", record.name, record.data_size, record.data_start);
            }
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.command.is_none() && !args.list {
        eprintln!("{PROGNAME}: error: a command is required");
        return ExitCode::FAILURE;
    }

    if args.verbose && tracing_subscriber::fmt::try_init().is_err() {
        // A subscriber may already be installed in test harnesses; not fatal.
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{PROGNAME}: error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
