//! Interactive client front end.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::{JoinError, JoinSet};

use crate::category::Category;
use crate::client::{ClientSession, WorkerAck};
use crate::error::{Error, Result};

const HELP: &str = "\
Commands:
  CONNECT                  log in to the coordinator
  LOGOUT                   log out
  DISTORT <file> <factor>  distort a file from the client folder
  LIST TEXT | LIST MEDIA   list local files of a category
  HELP                     show this text
  EXIT                     log out and quit";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Logout,
    Distort { file: String, factor: String },
    List(Category),
    Help,
    Exit,
}

impl Command {
    /// Parse one line. Keywords are case-insensitive; a blank line is `None`.
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((keyword, args)) = words.split_first() else {
            return Ok(None);
        };

        let command = match (keyword.to_ascii_uppercase().as_str(), args) {
            ("CONNECT", []) => Command::Connect,
            ("LOGOUT", []) => Command::Logout,
            ("HELP", []) => Command::Help,
            ("EXIT", []) => Command::Exit,
            ("DISTORT", [file, factor]) => Command::Distort {
                file: file.to_string(),
                factor: factor.to_string(),
            },
            ("DISTORT", _) => return Err(Error::Usage("DISTORT <file> <factor>".into())),
            ("LIST", [category]) => match category.parse() {
                Ok(category) => Command::List(category),
                Err(_) => return Err(Error::Usage("LIST TEXT | LIST MEDIA".into())),
            },
            ("LIST", _) => return Err(Error::Usage("LIST TEXT | LIST MEDIA".into())),
            _ => return Err(Error::Usage("Unknown command.".into())),
        };
        Ok(Some(command))
    }
}

/// Regular files in `folder` whose extension belongs to `category`, sorted.
pub fn list_files(folder: &Path, category: Category) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if Category::from_file_name(&name) == Some(category) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

type Outcome = (String, Result<WorkerAck>);

/// Read commands from `input` until `EXIT` or end of input, writing status
/// lines to `output`.
///
/// Worker exchanges run concurrently with further commands; each outcome is
/// reported as it arrives, and any still pending at exit are awaited first.
pub async fn run_interactive<R, W>(
    mut session: ClientSession,
    input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut exchanges: JoinSet<Outcome> = JoinSet::new();
    say(&mut output, HELP).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = match Command::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(Error::Usage(msg)) => {
                        say(&mut output, &msg).await?;
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if command == Command::Exit {
                    break;
                }
                let status = execute(&mut session, command, &mut exchanges).await;
                say(&mut output, &status).await?;
            }
            Some(done) = exchanges.join_next(), if !exchanges.is_empty() => {
                report(&mut output, done).await?;
            }
        }
    }

    while let Some(done) = exchanges.join_next().await {
        report(&mut output, done).await?;
    }
    if session.is_connected() {
        match session.logout().await {
            Ok(()) => say(&mut output, "Logged out.").await?,
            Err(e) => log::warn!("[client] logout failed: {e}"),
        }
    }
    Ok(())
}

/// Run one command and return its status text.
async fn execute(
    session: &mut ClientSession,
    command: Command,
    exchanges: &mut JoinSet<Outcome>,
) -> String {
    match command {
        Command::Connect => match session.connect().await {
            Ok(()) => format!("Connected as {}.", session.config().username),
            Err(e) => format!("Connection failed: {e}"),
        },
        Command::Logout => match session.logout().await {
            Ok(()) => "Logged out.".to_string(),
            Err(e) => format!("Logout failed: {e}"),
        },
        Command::Distort { file, factor } => match session.distort(&file, &factor).await {
            Ok(exchange) => {
                let status = format!("Sending {file} to worker {}.", exchange.worker);
                exchanges.spawn(async move { (file, exchange.wait().await) });
                status
            }
            Err(e) => format!("Distort failed: {e}"),
        },
        Command::List(category) => {
            let folder: PathBuf = session.config().folder.clone();
            match list_files(&folder, category) {
                Ok(names) if names.is_empty() => format!("No {category} files."),
                Ok(names) => names.join("\n"),
                Err(e) => format!("Cannot list {}: {e}", folder.display()),
            }
        }
        Command::Help => HELP.to_string(),
        Command::Exit => String::new(),
    }
}

async fn report<W>(output: &mut W, done: std::result::Result<Outcome, JoinError>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = match done {
        Ok((file, Ok(WorkerAck::Accepted))) => format!("Worker accepted {file}."),
        Ok((file, Ok(WorkerAck::Rejected(reason)))) => format!("Worker rejected {file}: {reason}"),
        Ok((file, Err(e))) => format!("Worker exchange for {file} failed: {e}"),
        Err(e) => format!("Worker exchange failed: {e}"),
    };
    say(output, &line).await
}

async fn say<W>(output: &mut W, text: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(Command::parse("connect").unwrap(), Some(Command::Connect));
        assert_eq!(Command::parse("  LoGoUt ").unwrap(), Some(Command::Logout));
        assert_eq!(
            Command::parse("distort notes.txt 3").unwrap(),
            Some(Command::Distort {
                file: "notes.txt".into(),
                factor: "3".into()
            })
        );
        assert_eq!(
            Command::parse("list media").unwrap(),
            Some(Command::List(Category::Media))
        );
    }

    #[test]
    fn blank_line_is_ignored() {
        assert_eq!(Command::parse("").unwrap(), None);
        assert_eq!(Command::parse("   \t").unwrap(), None);
    }

    #[test]
    fn unknown_input_is_usage_error() {
        let err = Command::parse("fly away").unwrap_err();
        assert!(matches!(err, Error::Usage(msg) if msg == "Unknown command."));
        assert!(matches!(Command::parse("DISTORT a.txt"), Err(Error::Usage(_))));
        assert!(matches!(Command::parse("LIST VIDEO"), Err(Error::Usage(_))));
        assert!(matches!(Command::parse("CONNECT now"), Err(Error::Usage(_))));
    }

    #[test]
    fn lists_only_matching_regular_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "song.mp3", "pic.PNG", "readme.md"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("folder.txt")).unwrap();

        assert_eq!(list_files(dir.path(), Category::Text).unwrap(), ["a.txt", "b.txt"]);
        assert_eq!(
            list_files(dir.path(), Category::Media).unwrap(),
            ["pic.PNG", "song.mp3"]
        );
    }

    #[test]
    fn listing_missing_folder_fails() {
        assert!(list_files(Path::new("/definitely/not/here"), Category::Text).is_err());
    }
}
