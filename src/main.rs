use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use loki_patcher::bootimg::ImageKind;
use loki_patcher::ops;
use loki_patcher::report::Reporter;
use loki_patcher::target::TargetCatalog;

const DEFAULT_ABOOT: &str = "/dev/block/platform/msm_sdcc.1/by-name/aboot";
const DEFAULT_BOOT: &str = "/dev/block/platform/msm_sdcc.1/by-name/boot";
const DEFAULT_RECOVERY: &str = "/dev/block/platform/msm_sdcc.1/by-name/recovery";

#[derive(Parser)]
#[command(name = "loki", version, about = "Patch and flash Loki'd boot/recovery images")]
struct Cli {
    /// aboot partition or dump used to fingerprint the device
    #[arg(long, global = true, default_value = DEFAULT_ABOOT)]
    aboot: PathBuf,

    /// TOML target catalog; defaults to the builtin device table
    #[arg(long, global = true)]
    targets: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Patch a boot or recovery image into a flashable Loki image
    Patch {
        /// "boot" or "recovery"
        kind: ImageKind,
        /// Source image file or partition
        image: PathBuf,
        /// Output path for the patched image
        out: PathBuf,
    },
    /// Validate a Loki image against this device and flash it
    Flash {
        /// "boot" or "recovery"
        kind: ImageKind,
        /// Previously patched image
        image: PathBuf,
        /// Destination partition
        dest: PathBuf,
    },
    /// Report whether a partition is patched, patchable, or blank
    Check { partition: PathBuf },
    /// Patch and flash whichever of boot/recovery needs it
    Auto {
        #[arg(long, default_value = DEFAULT_BOOT)]
        boot: PathBuf,
        #[arg(long, default_value = DEFAULT_RECOVERY)]
        recovery: PathBuf,
        /// Where the intermediate patched image is written
        #[arg(long, default_value = "/data/local/tmp/loki.img")]
        artifact: PathBuf,
    },
}

struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn status(&mut self, msg: &str) {
        println!("{msg}");
    }
}

fn main() -> anyhow::Result<()> {
    match EnvFilter::builder().with_env_var("LOKI_LOG").try_from_env() {
        Ok(filter) => tracing_subscriber::fmt().with_env_filter(filter).init(),
        Err(_) => tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .init(),
    }

    let cli = Cli::parse();
    let catalog = match &cli.targets {
        Some(path) => TargetCatalog::load(path)?,
        None => TargetCatalog::builtin(),
    };
    let mut reporter = ConsoleReporter;

    match cli.command {
        Command::Patch { kind, image, out } => {
            ops::patch_partition(&image, &cli.aboot, &out, kind, &catalog, &mut reporter)?;
        }
        Command::Flash { kind, image, dest } => {
            ops::flash_partition(&image, &cli.aboot, &dest, kind, &mut reporter)?;
        }
        Command::Check { partition } => {
            let status = ops::check_partition(&partition)?;
            println!("{}: {}", partition.display(), status);
        }
        Command::Auto {
            boot,
            recovery,
            artifact,
        } => {
            ops::auto(&boot, &recovery, &cli.aboot, &artifact, &catalog, &mut reporter)?;
        }
    }

    Ok(())
}
