//! Read-only policy values consulted while building and generating code.

use crate::error::usage_error;
use anyhow::Result;
use clap::Args;
use clap::ValueEnum;
use std::fmt::Display;
use std::fmt::Formatter;
use std::path::PathBuf;
use std::str::FromStr;

pub const SUPPORTED_APIS: &[&str] = &["dynamo0.3", "gocean1.0", "nemo"];
pub const DEFAULT_API: &str = "dynamo0.3";
pub const DEFAULT_REPROD_PAD_SIZE: usize = 8;

/// How transformed kernels are named when they are written out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum KernelNaming {
    /// Every transformed kernel gets a fresh file.
    #[default]
    Multiple,
    /// All transformed instances of a kernel share one file, which therefore
    /// must have identical contents.
    Single,
}

impl Display for KernelNaming {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelNaming::Multiple => write!(f, "multiple"),
            KernelNaming::Single => write!(f, "single"),
        }
    }
}

impl FromStr for KernelNaming {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "multiple" => Ok(KernelNaming::Multiple),
            "single" => Ok(KernelNaming::Single),
            _ => Err(usage_error!(
                "Invalid kernel-renaming scheme '{s}'. Must be one of ['multiple', 'single']."
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    api: String,
    pub distributed_memory: bool,
    pub reproducible_reductions: bool,
    pub reprod_pad_size: usize,
    pub kernel_output_dir: PathBuf,
    pub kernel_naming: KernelNaming,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api: DEFAULT_API.to_string(),
            distributed_memory: true,
            reproducible_reductions: false,
            reprod_pad_size: DEFAULT_REPROD_PAD_SIZE,
            kernel_output_dir: PathBuf::from("."),
            kernel_naming: KernelNaming::default(),
        }
    }
}

impl Config {
    pub fn api(&self) -> &str {
        &self.api
    }
    pub fn set_api(&mut self, api: &str) -> Result<()> {
        self.api = get_api(api)?;
        Ok(())
    }
    pub fn with_distributed_memory(mut self, distributed_memory: bool) -> Self {
        self.distributed_memory = distributed_memory;
        self
    }
    pub fn with_reproducible_reductions(mut self, reprod: bool) -> Self {
        self.reproducible_reductions = reprod;
        self
    }
    pub fn with_reprod_pad_size(mut self, size: usize) -> Self {
        self.reprod_pad_size = size;
        self
    }
    pub fn with_kernel_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.kernel_output_dir = dir.into();
        self
    }
    pub fn with_kernel_naming(mut self, naming: KernelNaming) -> Self {
        self.kernel_naming = naming;
        self
    }
}

/// Check the API name and return it normalised.
///
/// An empty name selects the default API.
pub fn get_api(api: &str) -> Result<String> {
    if api.is_empty() {
        return Ok(DEFAULT_API.to_string());
    }
    let api = api.to_lowercase();
    if !SUPPORTED_APIS.contains(&api.as_str()) {
        return Err(usage_error!(
            "get_api: Unsupported API '{api}' specified. Supported types are {SUPPORTED_APIS:?}."
        ));
    }
    Ok(api)
}

/// Command line options that map onto [Config].
///
/// Downstream binaries can add these to their own command via
/// `ConfigArgs::augment_args`.
#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    /// The API of the algorithm and kernel layers.
    #[arg(long, default_value = DEFAULT_API)]
    pub api: String,
    /// Do not generate distributed-memory halo exchanges and global sums.
    #[arg(long = "no-dist-mem")]
    pub no_dist_mem: bool,
    /// Generate bit-reproducible reductions.
    #[arg(long)]
    pub reprod: bool,
    /// Padding of the per-thread reduction buffers.
    #[arg(long = "reprod-pad-size", default_value_t = DEFAULT_REPROD_PAD_SIZE)]
    pub reprod_pad_size: usize,
    /// Directory in which transformed kernels are written.
    #[arg(long = "kernel-outdir", default_value = ".")]
    pub kernel_outdir: PathBuf,
    /// Naming scheme for transformed kernels.
    #[arg(long = "kernel-renaming", value_enum, default_value_t = KernelNaming::Multiple)]
    pub kernel_renaming: KernelNaming,
}

impl TryFrom<ConfigArgs> for Config {
    type Error = anyhow::Error;

    fn try_from(args: ConfigArgs) -> Result<Self> {
        let mut config = Config::default()
            .with_distributed_memory(!args.no_dist_mem)
            .with_reproducible_reductions(args.reprod)
            .with_reprod_pad_size(args.reprod_pad_size)
            .with_kernel_output_dir(args.kernel_outdir)
            .with_kernel_naming(args.kernel_renaming);
        config.set_api(&args.api)?;
        Ok(config)
    }
}
