use crate::client::DEFAULT_API_BASE;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Root URL of the chatbot backend API.
    #[arg(long, env = "API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Optional document to upload before the chat loop starts.
    #[arg(long, env = "UPLOAD_PATH")]
    pub upload: Option<String>,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
