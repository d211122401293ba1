use std::fmt::Write as _;
use std::io::{self, Read};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::app::App;
use crate::journaling::CommitEvent;
use crate::model::{Note, NoteField, NoteId};
use crate::store::NoteStore;

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Title for the note
    #[arg()]
    pub title: String,
    /// Provide the content inline. If omitted, reads from stdin when piped.
    #[arg(long)]
    pub content: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Note identifier
    pub id: i64,
    /// Field to replace (title or content)
    pub field: NoteField,
    /// New value for the field
    pub value: String,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Note identifier
    pub id: i64,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Stop after this many external changes (runs until interrupted if omitted)
    #[arg(long)]
    pub count: Option<usize>,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn list_notes(mut store: NoteStore) -> Result<()> {
    print!("{}", format_notes(store.notes()));
    store.shutdown();
    Ok(())
}

pub fn new_note(mut store: NoteStore, args: NewArgs) -> Result<()> {
    let title = args.title.trim().to_owned();
    if title.is_empty() {
        bail!("note title cannot be empty");
    }
    let content = match args.content {
        Some(content) => content,
        None => read_stdin()?.unwrap_or_default(),
    };

    store.start_new_draft();
    store.edit_field(NoteField::Title, title);
    if !content.is_empty() {
        store.edit_field(NoteField::Content, content);
    }
    let id = store
        .draft()
        .and_then(|draft| draft.id)
        .context("new note did not receive an identifier")?;
    commit_and_close(store)?;
    println!("Created note #{id}");
    Ok(())
}

pub fn edit_note(mut store: NoteStore, args: EditArgs) -> Result<()> {
    let id = NoteId(args.id);
    let Some(note) = store.note(id).cloned() else {
        bail!("note {id} not found");
    };
    store.open_draft(&note);
    store.edit_field(args.field, args.value);
    commit_and_close(store)?;
    println!("Updated {} of note #{id}", args.field);
    Ok(())
}

pub fn delete_note(mut store: NoteStore, args: DeleteArgs) -> Result<()> {
    let id = NoteId(args.id);
    let Some(note) = store.note(id).cloned() else {
        bail!("note {id} not found");
    };
    store.request_delete(&note);
    store.confirm_delete();
    commit_and_close(store)?;
    println!("Deleted note #{id}");
    Ok(())
}

pub fn watch(mut store: NoteStore, tick_rate: Duration, args: WatchArgs) -> Result<()> {
    print!("{}", format_notes(store.notes()));
    let mut seen = 0usize;
    while args.count.map_or(true, |limit| seen < limit) {
        if store.tick().external_applied {
            seen += 1;
            println!("-- changed in another window --");
            print!("{}", format_notes(store.notes()));
        }
        thread::sleep(tick_rate);
    }
    store.shutdown();
    Ok(())
}

fn commit_and_close(mut store: NoteStore) -> Result<()> {
    let outcome = store.flush();
    store.shutdown();
    match outcome {
        Some(CommitEvent::Error { message }) => bail!("saving notes failed: {message}"),
        _ => Ok(()),
    }
}

fn format_notes(notes: &[Note]) -> String {
    if notes.is_empty() {
        return "No notes.\n".to_string();
    }
    let mut out = String::new();
    for note in notes {
        let title = if note.title.trim().is_empty() {
            "(untitled)"
        } else {
            note.title.as_str()
        };
        let _ = writeln!(&mut out, "#{}  {}", note.id, title);
        for line in note.content.lines().take(3) {
            let _ = writeln!(&mut out, "    {line}");
        }
    }
    out
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading note content from stdin")?;
    if buf.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, StorageOptions};
    use tempfile::TempDir;

    fn config(temp: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.storage = StorageOptions::at(temp.path().join("notes.db"));
        config
    }

    #[test]
    fn formats_titles_and_content_preview() {
        let notes = vec![
            Note::new(NoteId(1), "Groceries", "milk\neggs\nbread\ncoffee"),
            Note::new(NoteId(2), "", ""),
        ];
        assert_eq!(
            format_notes(&notes),
            "#1  Groceries\n    milk\n    eggs\n    bread\n#2  (untitled)\n"
        );
        assert_eq!(format_notes(&[]), "No notes.\n");
    }

    #[test]
    fn new_edit_and_delete_persist_immediately() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let config = config(&temp);

        new_note(
            NoteStore::open(&config)?,
            NewArgs {
                title: "  Plan ".into(),
                content: Some("draft".into()),
            },
        )?;
        let store = NoteStore::open(&config)?;
        let note = store.notes()[0].clone();
        assert_eq!(note.title, "Plan");
        assert_eq!(note.content, "draft");

        edit_note(
            store,
            EditArgs {
                id: note.id.get(),
                field: NoteField::Content,
                value: "final".into(),
            },
        )?;
        assert_eq!(NoteStore::open(&config)?.notes()[0].content, "final");

        delete_note(NoteStore::open(&config)?, DeleteArgs { id: note.id.get() })?;
        assert!(NoteStore::open(&config)?.notes().is_empty());
        Ok(())
    }

    #[test]
    fn editing_unknown_note_fails() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let err = edit_note(
            NoteStore::open(&config(&temp))?,
            EditArgs {
                id: 42,
                field: NoteField::Title,
                value: "x".into(),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("note 42 not found"));
        Ok(())
    }
}
