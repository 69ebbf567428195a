use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tabchat")]
#[command(about = "Browser-assistant chat engine with streamed tool calling", long_about = None)]
pub struct Args {
    #[arg(
        short = 's',
        long = "session",
        default_value = "default",
        help = "Session (tab) identifier whose history is used"
    )]
    pub session: String,

    #[arg(long = "title", default_value = "", help = "Title of the page being viewed")]
    pub title: String,

    #[arg(long = "url", default_value = "", help = "URL of the page being viewed")]
    pub url: String,

    #[arg(long = "image", help = "Analyze an image file instead of chatting")]
    pub image: Option<PathBuf>,

    #[arg(
        long = "video",
        conflicts_with = "image",
        help = "Analyze a video file with Gemini instead of chatting"
    )]
    pub video: Option<PathBuf>,

    #[arg(long = "clear", help = "Clear the history of every session")]
    pub clear_history: bool,

    #[arg(long = "forget", help = "Clear the history of this session")]
    pub forget: bool,

    #[arg(long = "model", help = "Model to use for chat")]
    pub model: Option<String>,

    #[arg(
        long = "api-endpoint",
        help = "Custom API base URL (e.g., http://localhost:11434/v1)"
    )]
    pub api_endpoint: Option<String>,

    #[arg(long = "json", help = "Print the final reply as JSON")]
    pub json: bool,

    #[arg(
        long = "config-init",
        help = "Write an example config file to ~/.config/tabchat/tabchat.yaml"
    )]
    pub config_init: bool,

    #[arg(short = 'v', long = "verbose", help = "Show diagnostic logging")]
    pub verbose: bool,

    #[arg(help = "Message to send")]
    pub message: Vec<String>,
}
