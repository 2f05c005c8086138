use emberchat::backend::memory::MemoryBackend;
use emberchat::config::Config;
use emberchat::rooms::{self, msg::EMOJIS};
use emberchat::ui::{MessagePane, Screen, StatusKind};
use emberchat::{AppResult, ChatApp};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = Config::from_env();
    tracing::info!(project = %config.project_id, "starting emberchat");

    let backend = MemoryBackend::new(&config.storage_bucket);
    let mut app = ChatApp::new(backend, config);

    println!("emberchat — type /help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                app.shutdown().await;
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.map_err(anyhow::Error::from)? else {
                    app.shutdown().await;
                    break;
                };
                if handle_line(&mut app, line.trim()).await? {
                    app.shutdown().await;
                    break;
                }
            }
            event = app.next_event() => {
                app.apply(event).await?;
            }
        }
        flush_ui(&mut app);
    }
    Ok(())
}

/// Returns true when the user asked to quit.
async fn handle_line(app: &mut ChatApp<MemoryBackend>, line: &str) -> AppResult<bool> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => {}
        Some("/quit") => return Ok(true),
        Some("/help") => print_help(),
        Some("/signup") => {
            let (email, password, username) =
                (parts.next().unwrap_or(""), parts.next().unwrap_or(""), parts.next().unwrap_or(""));
            app.signup(email, password, username).await?;
        }
        Some("/login") => {
            let (email, password, username) =
                (parts.next().unwrap_or(""), parts.next().unwrap_or(""), parts.next().unwrap_or(""));
            app.login(email, password, username).await?;
        }
        Some("/logout") => app.logout().await?,
        Some("/join") => app.switch_room(parts.next().unwrap_or(""))?,
        Some("/rooms") => {
            for room in &rooms::ROOMS {
                println!("  #{:<8} {}", room.name, room.description);
            }
        }
        Some("/search") => match parts.next() {
            Some("off") | None => app.ui.set_search(None),
            Some(term) => app.ui.set_search(Some(term)),
        },
        Some("/theme") => {
            let theme = app.ui.toggle_theme(&mut app.store);
            println!("theme: {theme:?}");
        }
        Some("/sound") => app.ui.toggle_notifications(),
        Some("/emoji") => {
            match parts.next().and_then(|n| n.parse::<usize>().ok()).and_then(|n| EMOJIS.get(n)) {
                Some(emoji) => {
                    app.composer.insert_emoji(emoji);
                    println!("composer: {}", app.composer.input);
                }
                None => println!("emoji 0..{}: {}", EMOJIS.len() - 1, EMOJIS.join(" ")),
            }
        }
        Some("/delete") => {
            let id = parts.next().unwrap_or("").to_string();
            app.delete_message(&id).await?;
        }
        Some(cmd) if cmd.starts_with('/') => println!("unknown command {cmd}; try /help"),
        Some(_) => {
            app.composer.on_input(line);
            app.submit().await?;
        }
    }
    Ok(false)
}

fn flush_ui(app: &mut ChatApp<MemoryBackend>) {
    if app.ui.take_bell() {
        print!("\x07");
    }
    for toast in app.ui.take_toasts() {
        println!("· {toast}");
    }
    if let Some((kind, message)) = app.ui.auth_status.take() {
        match kind {
            StatusKind::Error => println!("! {message}"),
            _ => println!("· {message}"),
        }
    }
    if !app.ui.dirty {
        return;
    }
    app.ui.dirty = false;

    match app.ui.screen {
        Screen::Auth => println!("— signed out: /login or /signup <email> <password> <username>"),
        Screen::Chat => {
            println!("— #{} — {}", app.ui.room_title, app.ui.room_description);
            match &app.ui.pane {
                MessagePane::Loading => println!("  Loading messages..."),
                MessagePane::Empty => println!("  No messages yet. Be the first to say something!"),
                MessagePane::Failed => println!("  Error loading messages"),
                MessagePane::Messages(blocks) => {
                    for block in blocks.iter().filter(|b| b.visible) {
                        let me = if block.mine { " (you)" } else { "" };
                        println!("  [{}] {}{}: {}", block.time, block.sender, me, block.text);
                        if let Some(url) = &block.attachment {
                            println!("        attachment: {url}");
                        }
                    }
                }
            }
            let others = app.ui.roster.entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>();
            println!(
                "  online ({}): {}{}",
                app.ui.roster.online_count,
                app.ui.username,
                if others.is_empty() { String::new() } else { format!(", {}", others.join(", ")) }
            );
        }
    }
}

fn print_help() {
    println!(
        "  /signup <email> <password> <username>   create an account\n\
         \x20 /login <email> <password> <username>    sign in\n\
         \x20 /logout                                 sign out\n\
         \x20 /rooms                                  list rooms\n\
         \x20 /join <room>                            switch room\n\
         \x20 /search <term>|off                      filter messages\n\
         \x20 /delete <message-id>                    delete an own message\n\
         \x20 /emoji [n]                              list or insert emoji\n\
         \x20 /theme                                  toggle light/dark\n\
         \x20 /sound                                  toggle the notification bell\n\
         \x20 /quit                                   leave\n\
         \x20 anything else                           send it to the room"
    );
}
