use clap::{
    Parser,
    Subcommand,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect, align and gap fill features across a batch of samples.
    Run(RunArgs),
    /// Write template configuration files.
    WriteTemplate(WriteTemplateArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// The path to the json file with the pipeline parameters. Defaults are
    /// used for anything not in the file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// The directory for the output files.
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Worker threads, overrides the config file.
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Also write one feature report per sample.
    #[arg(long, default_value_t = false)]
    pub sample_reports: bool,

    /// The path to a json list of targets to look up in the final table.
    #[arg(long)]
    pub targets: Option<PathBuf>,

    /// Scan files (json), one per sample.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct WriteTemplateArgs {
    /// The path to the output files.
    #[arg(short, long)]
    pub output_path: PathBuf,
}
