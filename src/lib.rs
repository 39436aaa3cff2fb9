pub mod cli;
pub mod client;
pub mod models;
pub mod store;

use cli::Args;
use client::ApiClient;
use log::{ error, info };
use models::chat::{ Message, Role };
use serde_json::Value;
use std::error::Error;
use std::io::{ self, BufRead, Write };
use std::path::Path;
use std::sync::Arc;
use store::ConversationStore;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("API Base: {}", args.api_base);
    if let Some(upload) = &args.upload {
        info!("Upload Document: {}", upload);
    }
    info!("-------------------------");

    let store = Arc::new(ConversationStore::new());
    let client = ApiClient::new(args.api_base.clone(), Arc::clone(&store));

    if let Some(upload) = &args.upload {
        let reply = client.upload_document_from_path(Path::new(upload)).await?;
        info!("Document uploaded: {}", reply);
    }

    store.create_new_conversation();
    chat_loop(&client, &store).await;

    Ok(())
}

/// Stand-in for the UI layer: read questions from stdin, fold both
/// sides of the exchange into the store, print the answers.
async fn chat_loop(client: &ApiClient, store: &ConversationStore) {
    let mut conversation_id: Option<String> = None;
    let stdin = io::stdin();

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        store.add_message_to_conversation(Message::new(Role::User, question));

        match client.send_message(question, conversation_id.as_deref()).await {
            Ok(reply) => {
                if let Some(id) = reply.get("conversation_id").and_then(Value::as_str) {
                    conversation_id = Some(id.to_string());
                }
                let answer = reply
                    .get("answer")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                store.add_message_to_conversation(Message::new(Role::Llm, answer.clone()));
                println!("{}", answer);
            }
            Err(e) => {
                // Already logged by the client; keep the session alive.
                println!("Request failed: {}", e);
            }
        }
    }
}
