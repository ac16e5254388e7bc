use std::path::PathBuf;

use allbox_core::{
    Language, MessageKey, Theme, format_file_size, format_relative_time, translate,
    translate_with,
};
use allbox_client::realtime::{apply_change, subscribe};
use allbox_client::session::{DialogOverview, Session, SessionError};
use allbox_client::store::{DeviceStore, StoredDialog};
use allbox_client::{RemoteClient, RemoteConfig};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "allbox", about = "Password-gated ephemeral file and message sharing")]
struct Args {
    /// Backend base URL; falls back to ALLBOX_BACKEND_URL.
    #[arg(long)]
    backend_url: Option<String>,
    /// Backend API key; falls back to ALLBOX_API_KEY.
    #[arg(long)]
    api_key: Option<String>,
    /// Realtime feed websocket URL; falls back to ALLBOX_FEED_URL.
    #[arg(long)]
    feed_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new dialog and print its one-time password.
    Create {
        #[arg(long, default_value_t = 4)]
        digits: usize,
    },
    /// Enter an existing dialog by password.
    Enter { password: String },
    /// List this device's dialogs, most recent activity first.
    List,
    /// Show a dialog's files and messages.
    Open { dialog_id: String },
    /// Upload files into a dialog.
    Upload {
        dialog_id: String,
        files: Vec<PathBuf>,
    },
    /// Send a text message into a dialog.
    Send { dialog_id: String, text: String },
    /// Send a recorded voice note (an audio file) into a dialog.
    Voice { dialog_id: String, file: PathBuf },
    /// Delete an uploaded file from a dialog.
    Delete { dialog_id: String, file_id: String },
    /// Rename a dialog for every member.
    Rename { dialog_id: String, name: String },
    /// Exit a dialog to the archive (access is kept).
    Exit { dialog_id: String },
    /// Restore an archived dialog to the home list.
    Restore { dialog_id: String },
    /// Leave a dialog completely, bypassing the archive.
    Leave { dialog_id: String },
    /// Permanently delete an archived dialog entry.
    Discard { dialog_id: String },
    /// Show or set the device display name.
    DeviceName { name: Option<String> },
    /// Show or set the theme (dark|light).
    Theme { theme: Option<String> },
    /// Show or set the language (en|ru).
    Lang { language: Option<String> },
    /// Write the password reminder file for a dialog.
    Reminder {
        dialog_id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Follow a dialog's realtime changes and keep the local list fresh.
    Watch { dialog_id: String },
}

/// Output colors derived from the theme preference. Switching the theme
/// re-styles everything printed afterwards; this is the visual side effect
/// applied at the boundary, after the store has persisted the choice.
#[derive(Debug, Clone, Copy)]
struct Palette {
    accent: &'static str,
    dim: &'static str,
    reset: &'static str,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Dark => Palette {
            accent: "\x1b[96m",
            dim: "\x1b[90m",
            reset: "\x1b[0m",
        },
        Theme::Light => Palette {
            accent: "\x1b[34m",
            dim: "\x1b[37m",
            reset: "\x1b[0m",
        },
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), SessionError> {
    let backend_url = resolve(args.backend_url, "ALLBOX_BACKEND_URL", "http://127.0.0.1:54321");
    let api_key = resolve(args.api_key, "ALLBOX_API_KEY", "");
    let feed_url = resolve(
        args.feed_url,
        "ALLBOX_FEED_URL",
        "ws://127.0.0.1:54321/realtime/v1",
    );

    let store = DeviceStore::open_default();
    let remote = RemoteClient::new(RemoteConfig::new(&backend_url, &api_key)?);
    let mut session = Session::new(store, remote);
    let lang = session.language();
    let colors = palette(session.store().theme());

    match args.command {
        Command::Create { digits } => {
            let created = session.create_dialog(digits).await?;
            println!(
                "{} \"{}\" ({})",
                translate(lang, MessageKey::CreateDialog),
                created.name,
                created.dialog_id
            );
            println!(
                "{}: {}{}{}",
                translate(lang, MessageKey::DialogCode),
                colors.accent,
                created.password,
                colors.reset
            );
            println!("{}", translate(lang, MessageKey::PasswordWarning));
            println!(
                "{} {}",
                translate(lang, MessageKey::YouAre),
                created.device_label
            );
        }
        Command::Enter { password } => match session.enter_dialog(&password).await? {
            Some(entered) => {
                println!("\"{}\" ({})", entered.name, entered.dialog_id);
                println!(
                    "{} {}",
                    translate(lang, MessageKey::YouAre),
                    entered.device_label
                );
            }
            None => {
                eprintln!("{}", translate(lang, MessageKey::WrongPassword));
                std::process::exit(1);
            }
        },
        Command::List => {
            print_dialog_list(&session, lang, colors);
        }
        Command::Open { dialog_id } => {
            let overview = session.open_dialog(&dialog_id).await?;
            print_overview(&session, &overview, lang, colors);
        }
        Command::Upload { dialog_id, files } => {
            let mut uploaded = 0_usize;
            for path in &files {
                match session.upload_file(&dialog_id, path).await {
                    Ok(file) => {
                        println!("  {} ({})", file.file_name, format_file_size(file.file_size));
                        uploaded += 1;
                    }
                    Err(SessionError::AccessDenied(id)) => {
                        return Err(SessionError::AccessDenied(id));
                    }
                    Err(err) => {
                        warn!("upload failed for {}: {}", path.display(), err);
                        eprintln!(
                            "{}",
                            translate_with(
                                lang,
                                MessageKey::UploadFailed,
                                &[("name", path.display().to_string())]
                            )
                        );
                    }
                }
            }
            println!(
                "{}",
                translate_with(lang, MessageKey::UploadSuccess, &[("n", uploaded.to_string())])
            );
        }
        Command::Send { dialog_id, text } => {
            session.send_message(&dialog_id, &text).await?;
            println!("{}", translate(lang, MessageKey::MessageSent));
        }
        Command::Voice { dialog_id, file } => {
            session.send_voice_note(&dialog_id, &file).await?;
            println!("{}", translate(lang, MessageKey::MessageSent));
        }
        Command::Delete { dialog_id, file_id } => {
            let overview = session.open_dialog(&dialog_id).await?;
            match overview.files.iter().find(|f| f.id == file_id) {
                Some(file) => {
                    session.delete_file(&dialog_id, file).await?;
                    println!("{}", translate(lang, MessageKey::FileDeleted));
                }
                None => {
                    eprintln!("{}", translate(lang, MessageKey::DeleteFailed));
                    std::process::exit(1);
                }
            }
        }
        Command::Rename { dialog_id, name } => {
            session.rename_dialog(&dialog_id, &name).await?;
            println!("{}", translate(lang, MessageKey::DialogRenamed));
        }
        Command::Exit { dialog_id } => {
            session.exit_dialog(&dialog_id);
            println!("{}", translate(lang, MessageKey::DialogExited));
        }
        Command::Restore { dialog_id } => match session.restore_dialog(&dialog_id) {
            Some(_) => println!("{}", translate(lang, MessageKey::DialogRestored)),
            None => {
                eprintln!("{}", translate(lang, MessageKey::NoArchivedDialogs));
                std::process::exit(1);
            }
        },
        Command::Leave { dialog_id } => {
            session.leave_dialog(&dialog_id);
            println!("{}", translate(lang, MessageKey::DialogLeft));
        }
        Command::Discard { dialog_id } => {
            session.discard_archived(&dialog_id);
            println!("{}", translate(lang, MessageKey::DialogLeft));
        }
        Command::DeviceName { name } => match name {
            Some(name) => {
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    eprintln!("{}", translate(lang, MessageKey::DeviceNamePlaceholder));
                    std::process::exit(1);
                }
                session.store_mut().set_device_name(trimmed);
                println!("{}", translate(lang, MessageKey::DeviceNameUpdated));
            }
            None => match session.store().device_name() {
                Some(name) => println!("{name}"),
                None => println!("{}", translate(lang, MessageKey::DeviceNamePlaceholder)),
            },
        },
        Command::Theme { theme } => match theme {
            Some(value) => {
                let theme = Theme::parse(&value);
                session.store_mut().set_theme(theme);
                // Boundary side effect: restyle output with the new palette.
                let colors = palette(theme);
                let label = match theme {
                    Theme::Dark => translate(lang, MessageKey::DarkTheme),
                    Theme::Light => translate(lang, MessageKey::LightTheme),
                };
                println!("{}{}{}", colors.accent, label, colors.reset);
            }
            None => println!("{}", session.store().theme().as_str()),
        },
        Command::Lang { language } => match language {
            Some(value) => match Language::parse(&value) {
                Some(language) => {
                    session.store_mut().set_language(language);
                    println!("{}", language.as_str());
                }
                None => {
                    eprintln!("supported languages: en, ru");
                    std::process::exit(1);
                }
            },
            None => println!("{}", lang.as_str()),
        },
        Command::Reminder { dialog_id, out } => {
            let Some((file_name, contents)) = session.password_reminder(&dialog_id) else {
                eprintln!("{}", translate(lang, MessageKey::NoAccess));
                std::process::exit(1);
            };
            let path = out.unwrap_or_else(|| PathBuf::from(&file_name));
            tokio::fs::write(&path, contents).await?;
            println!(
                "{}: {}",
                translate(lang, MessageKey::DownloadPassword),
                path.display()
            );
        }
        Command::Watch { dialog_id } => {
            if !session.store().has_access(&dialog_id) {
                return Err(SessionError::AccessDenied(dialog_id));
            }
            let mut events = subscribe(&feed_url, &dialog_id)
                .await
                .map_err(|err| SessionError::Io(std::io::Error::other(err)))?;
            println!(
                "{}watching {dialog_id}{}",
                colors.dim, colors.reset
            );
            while let Some(event) = events.recv().await {
                apply_change(session.store_mut(), &event);
                println!(
                    "{}[{:?} {:?}]{} {}",
                    colors.dim,
                    event.table,
                    event.kind,
                    colors.reset,
                    event.row
                );
            }
        }
    }

    Ok(())
}

fn resolve(flag: Option<String>, env_var: &str, default: &str) -> String {
    flag.or_else(|| std::env::var(env_var).ok())
        .unwrap_or_else(|| default.to_owned())
}

fn print_dialog_list<S: allbox_client::KvStorage>(
    session: &Session<S>,
    lang: Language,
    colors: Palette,
) {
    let now = Utc::now();
    let mut active = session.store().active_dialogs();
    active.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));

    println!("{}", translate(lang, MessageKey::MyDialogs));
    if active.is_empty() {
        println!("  {}-{}", colors.dim, colors.reset);
    }
    for dialog in &active {
        print_dialog_line(dialog, now, colors);
    }

    let archived = session.store().archived_dialogs();
    println!("{}", translate(lang, MessageKey::ArchivedDialogs));
    if archived.is_empty() {
        println!("  {}{}{}", colors.dim, translate(lang, MessageKey::NoArchivedDialogs), colors.reset);
    }
    for dialog in &archived {
        print_dialog_line(dialog, now, colors);
    }
}

fn print_dialog_line(dialog: &StoredDialog, now: chrono::DateTime<Utc>, colors: Palette) {
    println!(
        "  {}{}{} {} ({}) {}{}{}",
        colors.accent,
        dialog.name.as_deref().unwrap_or("Dialog"),
        colors.reset,
        dialog.dialog_id,
        dialog.device_label,
        colors.dim,
        format_relative_time(dialog.last_activity_at, now),
        colors.reset
    );
}

fn print_overview<S: allbox_client::KvStorage>(
    session: &Session<S>,
    overview: &DialogOverview,
    lang: Language,
    colors: Palette,
) {
    let now = Utc::now();
    println!(
        "{}{}{} ({})",
        colors.accent,
        overview.name.as_deref().unwrap_or("Dialog"),
        colors.reset,
        overview.dialog_id
    );
    if let Some(label) = session.display_device_label(&overview.dialog_id) {
        println!("{} {}", translate(lang, MessageKey::YouAre), label);
    }
    println!(
        "{} {}",
        overview.device_count,
        translate(lang, MessageKey::Devices)
    );

    println!("{} ({})", translate(lang, MessageKey::Files), overview.files.len());
    if overview.files.is_empty() {
        println!("  {}{}{}", colors.dim, translate(lang, MessageKey::NoFiles), colors.reset);
    }
    for file in &overview.files {
        println!(
            "  {} ({}) {} {}{}{}",
            file.file_name,
            format_file_size(file.file_size),
            file.device_label,
            colors.dim,
            format_relative_time(file.uploaded_at, now),
            colors.reset
        );
    }

    for message in &overview.messages {
        let body = message.content.as_deref().unwrap_or("[voice note]");
        println!(
            "  {}: {} {}{}{}",
            message.device_label,
            body,
            colors.dim,
            format_relative_time(message.sent_at, now),
            colors.reset
        );
    }
}
