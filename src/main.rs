use anyhow::Context;
use magus::config::{self, AppConfig};
use magus::persona;
use magus::{BackendRegistry, ChatSession, ConversationStore};
use std::future::Future;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const COMMANDS: &str = "/backends, /next, /use <name>, /personas, /persona <name>, /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("magus=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let home = config::home_dir()?;
    config::ensure_home(&home).context("creating magus home")?;
    let config = AppConfig::load_or_create(&config::config_path(&home))?;

    let registry = BackendRegistry::from_config(
        &config.backends,
        config.backends.resolve_cloud_api_key(),
    )?;
    let store = ConversationStore::open(config.memory_path(&home))
        .context("opening conversation log")?;
    let persona_text = persona::load_persona_text(&home, &config.persona_file);
    let mut session = ChatSession::new(registry, store, persona_text, config.memory.max_messages);

    tracing::info!("Home: {:?}", home);
    println!(
        "Backend: {} ({}; Ctrl-C cancels a request or exits at the prompt)",
        session.registry().current_name(),
        COMMANDS
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = next_input(&mut lines, tokio::signal::ctrl_c()).await? {
        let line = line.trim();
        match line
            .split_once(' ')
            .map_or((line, ""), |(cmd, rest)| (cmd, rest.trim()))
        {
            ("/quit", _) => break,
            ("/backends", _) => list_backends(session.registry()),
            ("/next", _) => {
                session.registry_mut().cycle();
                println!("Backend: {}", session.registry().current_name());
            }
            ("/use", name) => {
                if !session.registry_mut().select_by_name(name) {
                    println!("Unknown backend: {}", name);
                }
                println!("Backend: {}", session.registry().current_name());
            }
            ("/personas", _) => match persona::list_personas(&home) {
                Ok(personas) => {
                    for info in personas {
                        println!("{} ({})", info.display_name, info.relative_path);
                    }
                }
                Err(e) => println!("error: {}\n", e),
            },
            ("/persona", name) => switch_persona(&mut session, &home, name),
            _ => send(&session, line).await,
        }
    }

    Ok(())
}

/// Next input line, or `None` at end of input or when `interrupt` fires first.
async fn next_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => Ok(None),
    }
}

fn list_backends(registry: &BackendRegistry) {
    for (i, descriptor) in registry.descriptors().enumerate() {
        let marker = if i == registry.current_index() { "*" } else { " " };
        match &descriptor.endpoint {
            Some(endpoint) => println!("{} {} [{}]", marker, descriptor.name, endpoint),
            None => println!("{} {}", marker, descriptor.name),
        }
    }
}

fn switch_persona(session: &mut ChatSession, home: &Path, name: &str) {
    match persona::find_persona(home, name) {
        Ok(Some(info)) => {
            session.set_persona(persona::load_persona_text(home, &info.relative_path));
            println!("Persona: {}", info.display_name);
        }
        Ok(None) => println!("Unknown persona: {}", name),
        Err(e) => println!("error: {}\n", e),
    }
}

async fn send(session: &ChatSession, text: &str) {
    let cancel = CancellationToken::new();
    let request = session.send(text, &cancel);
    tokio::pin!(request);

    let result = loop {
        tokio::select! {
            result = &mut request => break result,
            _ = tokio::signal::ctrl_c() => cancel.cancel(),
        }
    };

    match result {
        Ok(Some(reply)) => println!("{}\n", reply),
        Ok(None) => {}
        Err(e) => println!("[{}] error: {}\n", session.registry().current_name(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::{pending, ready};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_next_input_reads_lines() {
        let mut lines = BufReader::new(&b"/next\nhello\n"[..]).lines();
        assert_eq!(
            next_input(&mut lines, pending::<()>()).await.unwrap().as_deref(),
            Some("/next")
        );
        assert_eq!(
            next_input(&mut lines, pending::<()>()).await.unwrap().as_deref(),
            Some("hello")
        );
        assert_eq!(next_input(&mut lines, pending::<()>()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_interrupt_at_prompt_ends_input() {
        // Nothing is ever written, so reading blocks until the interrupt wins.
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();
        assert_eq!(next_input(&mut lines, ready(())).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pending_interrupt_does_not_drop_input() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();
        writer.write_all(b"hi\n").await.unwrap();
        assert_eq!(
            next_input(&mut lines, pending::<()>()).await.unwrap().as_deref(),
            Some("hi")
        );
    }
}
