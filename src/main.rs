use clap::Parser;
use std::path::Path;
use std::process;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use tabchat::api::vision::{
    encode_media, mime_from_extension, video_mime_from_extension, DEFAULT_VISION_PROMPT,
};
use tabchat::api::HttpProvider;
use tabchat::cli::Args;
use tabchat::config::{Config, FileConfig};
use tabchat::history::{FilesystemStorage, HistoryStore};
use tabchat::media::{record_image_analysis, record_video_analysis};
use tabchat::tools::{BrowserActions, SystemBrowser};
use tabchat::ui::{display_error, display_notice, display_reply_json, display_tool_call, print_chunk};
use tabchat::{ChatEvent, ChatInput, ChatReply, Orchestrator, PageContext};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.config_init {
        match FileConfig::init_user_config() {
            Ok(path) => {
                println!("Config written to {}", path.display());
                return;
            }
            Err(e) => {
                display_error(&format!("{:#}", e));
                process::exit(1);
            }
        }
    }

    let config = match Config::from_env_and_args(&args) {
        Ok(config) => config,
        Err(e) => {
            display_error(&e);
            process::exit(1);
        }
    };

    init_logging(config.verbose);

    let storage = Arc::new(FilesystemStorage::new(&config.history_dir));
    let history = HistoryStore::new(storage, config.max_history_chars);

    if args.clear_history {
        match history.clear_all() {
            Ok(()) => {
                display_notice("All conversation history cleared.");
                return;
            }
            Err(e) => {
                display_error(&format!("Error clearing history: {}", e));
                process::exit(1);
            }
        }
    }

    if args.forget {
        if let Err(e) = history.remove(&args.session) {
            display_error(&format!("Error clearing session: {}", e));
            process::exit(1);
        }
        display_notice(&format!("History of session '{}' cleared.", args.session));
        if args.message.is_empty() && args.image.is_none() && args.video.is_none() {
            return;
        }
    }

    let code = match (&args.image, &args.video) {
        (Some(path), _) => run_vision(&args, &config, &history, path).await,
        (None, Some(path)) => run_video(&args, &config, &history, path).await,
        (None, None) if args.message.is_empty() => {
            display_error("Usage: tabchat [OPTIONS] <message>...");
            1
        }
        (None, None) => run_chat(&args, &config, &history).await,
    };

    process::exit(code);
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "tabchat=debug" } else { "tabchat=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_chat(args: &Args, config: &Config, history: &HistoryStore) -> i32 {
    let provider = match HttpProvider::new(config.api_key.clone(), config.api_endpoint.clone()) {
        Ok(provider) => provider.with_stream_timeout(config.stream_timeout),
        Err(e) => {
            display_error(&e.user_message());
            return 1;
        }
    };

    let browser = Arc::new(SystemBrowser::new(config.browser_opener.clone()));
    let orchestrator = Orchestrator::new(
        Arc::new(provider),
        Arc::new(BrowserActions::new(browser.clone())),
        config.engine_settings(),
    );

    let input = ChatInput {
        session_id: args.session.clone(),
        text: args.message.join(" "),
        page: PageContext {
            title: args.title.clone(),
            url: args.url.clone(),
        },
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ChatEvent::Chunk(text) => {
                    if let Err(e) = print_chunk(&text) {
                        tracing::warn!(error = %e, "stdout write failed");
                    }
                }
                ChatEvent::ToolCall { name } => display_tool_call(&name),
                ChatEvent::Done => println!(),
                ChatEvent::Error(message) => display_error(&message),
            }
        }
    });

    let result = orchestrator.run(history, &input, &tx).await;
    drop(tx);
    let _ = printer.await;

    if browser.close_requested() {
        match history.remove(&input.session_id) {
            Ok(()) => display_notice(&format!("Session '{}' closed.", input.session_id)),
            Err(e) => display_error(&format!("Error closing session: {}", e)),
        }
    }

    if args.json {
        display_reply_json(&ChatReply::from_result(&result));
    }

    if result.is_ok() {
        0
    } else {
        1
    }
}

async fn run_vision(args: &Args, config: &Config, history: &HistoryStore, path: &Path) -> i32 {
    let image = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            display_error(&format!("Could not read {}: {}", path.display(), e));
            return 1;
        }
    };
    let mime = mime_from_extension(extension_of(path));
    let prompt = if args.message.is_empty() {
        DEFAULT_VISION_PROMPT.to_string()
    } else {
        args.message.join(" ")
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let result = record_image_analysis(
        &config.vision,
        history,
        &args.session,
        &image,
        mime,
        &prompt,
        &file_name,
    )
    .await;
    finish_analysis(args, result)
}

async fn run_video(args: &Args, config: &Config, history: &HistoryStore, path: &Path) -> i32 {
    let video = match tokio::fs::read(path).await {
        Ok(bytes) => encode_media(&bytes),
        Err(e) => {
            display_error(&format!("Could not read {}: {}", path.display(), e));
            return 1;
        }
    };
    let mime = video_mime_from_extension(extension_of(path));
    let prompt = args.message.join(" ");

    let result = record_video_analysis(
        &config.vision,
        history,
        &args.session,
        &video,
        mime,
        Some(prompt.as_str()),
    )
    .await;
    finish_analysis(args, result)
}

fn extension_of(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or_default()
}

fn finish_analysis(args: &Args, result: tabchat::Result<String>) -> i32 {
    let reply = match &result {
        Ok(text) => {
            println!("{}", text);
            ChatReply::Success { success: true }
        }
        Err(e) => {
            display_error(&e.user_message());
            ChatReply::Failure {
                error: e.user_message(),
            }
        }
    };
    if args.json {
        display_reply_json(&reply);
    }

    if result.is_ok() {
        0
    } else {
        1
    }
}
