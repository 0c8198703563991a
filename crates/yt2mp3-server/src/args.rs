use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "yt2mp3")]
#[command(version, about = "High-quality YouTube audio downloader with a browser front-end")]
pub struct Args {
    /// Directory to save MP3 files (enables server-save mode)
    #[arg(long, value_name = "PATH", env = "SAVE_DIRECTORY")]
    pub save_dir: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
