use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "tocbuild",
    version,
    about = "Outline (table-of-contents) extraction over document collections"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Build(BuildArgs),
    Inventory(InventoryArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Root directory to enumerate documents from. Immediate subdirectories
    /// become collection groups.
    #[arg(long)]
    pub input_root: PathBuf,

    #[arg(long, default_value = "outline_collection.json")]
    pub output: PathBuf,

    #[arg(long)]
    pub inventory_manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub run_manifest_path: Option<PathBuf>,

    /// Worker pool size. Bounded low because the vision collaborator is the
    /// dominant latency and memory consumer.
    #[arg(long, default_value_t = 2)]
    pub jobs: usize,

    /// Pages sampled from the front of each document for classification and
    /// outline-page location.
    #[arg(long, default_value_t = crate::config::CLASSIFY_SAMPLE_PAGES)]
    pub sample_pages: u32,

    /// External command invoked as `<command> <document> <first-page>
    /// <last-page>`; its stdout feeds the vision tier. Without it the vision
    /// tier is reported unavailable.
    #[arg(long)]
    pub vision_command: Option<String>,

    #[arg(long, default_value_t = crate::config::DEFAULT_VISION_TIMEOUT_SECS)]
    pub vision_timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long)]
    pub input_root: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "outline_collection.json")]
    pub collection_path: PathBuf,
}
