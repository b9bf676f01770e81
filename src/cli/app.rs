//! Command handlers for the blipnote CLI.
use std::{
    io::{stdin, stdout, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use log::{debug, info};

use crate::{
    format_instant, format_time_left, sort_notes, Clock, Commands, Config, DurationUnit,
    MemoError, MemoSession, Note, NoteId, NotePatch, Notice, Result, SortPolicy,
};

/// CLI Application handler - processes CLI commands against a memo session
pub struct App {
    /// The running session
    session: MemoSession,

    /// Time source shared with the session
    clock: Arc<dyn Clock>,

    /// Application configuration
    config: Config,

    /// Where `config` was loaded from, if given on the command line
    config_path: Option<PathBuf>,

    /// Whether to display verbose output
    verbose: bool,
}

impl App {
    /// Create a new CLI application around an opened session
    pub fn new(
        session: MemoSession,
        clock: Arc<dyn Clock>,
        config: Config,
        config_path: Option<PathBuf>,
        verbose: bool,
    ) -> Self {
        Self {
            session,
            clock,
            config,
            config_path,
            verbose,
        }
    }

    /// Run the CLI application with the given command, then shut the session down
    pub async fn run(mut self, command: Commands) -> Result<()> {
        // Every invocation observes the collection first, like a sweep tick
        // on app start, so expired notes never show up.
        let report = self.session.sweep_now().await;
        if !report.evicted.is_empty() {
            info!("{} expired note(s) removed", report.evicted.len());
        }

        let result = match command {
            Commands::New { text } => self.handle_new(text).await,
            Commands::List { sort, json } => self.handle_list(sort, json).await,
            Commands::Edit { id, text } => self.handle_update(id, NotePatch::text(text)).await,
            Commands::Arm {
                id,
                magnitude,
                unit,
            } => {
                let patch = match unit {
                    Some(unit) => NotePatch::arm_with_unit(magnitude, unit),
                    None => NotePatch::arm(magnitude),
                };
                self.handle_update(id, patch).await
            }
            Commands::Disarm { id } => self.handle_update(id, NotePatch::disarm()).await,
            Commands::Unit { id, unit } => self.handle_unit(id, unit).await,
            Commands::Delete { id, force } => self.handle_delete(id, force).await,
            Commands::Watch { seconds, sort } => self.handle_watch(seconds, sort).await,
            Commands::Config { show, reset } => self.handle_config(show, reset),
        };

        self.print_notices().await;
        self.session.shutdown().await?;
        self.print_notices().await;
        result
    }

    async fn handle_new(&self, text: Option<String>) -> Result<()> {
        let store = self.session.store();
        let mut store = store.lock().await;
        let id = store.create();
        if let Some(text) = text {
            store.update(id, NotePatch::text(text))?;
        }
        println!("Note created with ID: {}", id);
        Ok(())
    }

    async fn handle_update(&self, id: NoteId, patch: NotePatch) -> Result<()> {
        let store = self.session.store();
        let mut store = store.lock().await;
        if !store.update(id, patch)? {
            return Err(MemoError::NoteNotFound { id });
        }
        if let Some(note) = store.get(id) {
            self.print_note(note, self.clock.now_millis());
        }
        Ok(())
    }

    async fn handle_unit(&self, id: NoteId, unit: DurationUnit) -> Result<()> {
        let had_countdown = {
            let store = self.session.store();
            let store = store.lock().await;
            store
                .get(id)
                .ok_or(MemoError::NoteNotFound { id })?
                .has_duration()
        };
        self.handle_update(id, NotePatch::unit(unit)).await?;
        if had_countdown {
            println!(
                "{}",
                console::style("Countdown cleared, arm the note again in the new unit.").yellow()
            );
        }
        Ok(())
    }

    /// List notes in the requested order
    async fn handle_list(&self, sort: SortPolicy, json: bool) -> Result<()> {
        let now = self.clock.now_millis();
        let notes = {
            let store = self.session.store();
            let store = store.lock().await;
            sort_notes(store.list(), sort, now)
        };

        if json {
            self.display_notes_json(&notes, now)
        } else {
            self.display_notes_text(&notes, now);
            Ok(())
        }
    }

    async fn handle_delete(&self, id: NoteId, force: bool) -> Result<()> {
        let store = self.session.store();

        // Step 1: Fetch the note to be deleted (to verify it exists and show details in the prompt)
        let note = match store.lock().await.get(id) {
            Some(note) => note.clone(),
            None => return Err(MemoError::NoteNotFound { id }),
        };

        // Step 2: Prompt for confirmation unless forced
        if !force {
            println!("You are about to delete the following note:");
            self.print_note(&note, self.clock.now_millis());

            print!("\nAre you sure you want to delete this note? [y/N]: ");
            stdout().flush().map_err(MemoError::Io)?;

            let mut input = String::new();
            stdin().read_line(&mut input).map_err(MemoError::Io)?;

            let input = input.trim().to_lowercase();
            if input != "y" && input != "yes" {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        // Step 3: Delete the note
        store.lock().await.delete(id);
        println!("Note {} has been deleted.", id);
        Ok(())
    }

    /// Run the background tasks until Ctrl-C or the timeout
    async fn handle_watch(&mut self, seconds: Option<u64>, sort: SortPolicy) -> Result<()> {
        self.session.start()?;
        println!("Watching notes, press Ctrl-C to stop.");

        let deadline = seconds.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));
        let timeout = sleep_until(deadline);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(timeout, ctrl_c);

        let mut refresh = tokio::time::interval(Duration::from_millis(self.config.sweep_interval_ms));
        let mut last_snapshot: Option<Vec<Note>> = None;

        loop {
            tokio::select! {
                _ = refresh.tick() => {}
                _ = &mut ctrl_c => {
                    println!();
                    info!("Interrupted, stopping watch");
                    break;
                }
                _ = &mut timeout => {
                    debug!("Watch timeout reached");
                    break;
                }
            }

            let now = self.clock.now_millis();
            let notes = {
                let store = self.session.store();
                let store = store.lock().await;
                sort_notes(store.list(), sort, now)
            };

            if last_snapshot.as_ref() != Some(&notes) {
                self.display_notes_text(&notes, now);
                last_snapshot = Some(notes);
            }
            self.print_notices().await;
        }

        if self.verbose {
            let status = self.session.sweeper().status();
            println!(
                "Sweeps: {}, expired: {}, warnings: {}",
                status.ticks, status.total_evicted, status.total_warnings
            );
        }
        Ok(())
    }

    fn handle_config(&self, show: bool, reset: bool) -> Result<()> {
        if reset {
            let path = Config::default().save(self.config_path.as_deref())?;
            println!("Configuration reset: {}", path.display());
        }
        if show || !reset {
            println!("{}", serde_json::to_string_pretty(&self.config)?);
        }
        Ok(())
    }

    async fn print_notices(&self) {
        let notices = {
            let store = self.session.store();
            let mut store = store.lock().await;
            store.take_notices()
        };
        for notice in notices {
            let line = notice.to_string();
            match notice {
                Notice::StorageFull => eprintln!("{}", console::style(line).red().bold()),
                Notice::InvalidDuration { .. } => eprintln!("{}", console::style(line).yellow()),
            }
        }
    }

    /// Display notes in JSON format
    fn display_notes_json(&self, notes: &[Note], now: i64) -> Result<()> {
        let values: Vec<serde_json::Value> = notes
            .iter()
            .map(|note| {
                serde_json::json!({
                    "id": note.id,
                    "text": note.text,
                    "durationMagnitude": note.duration_magnitude,
                    "durationUnit": note.duration_unit,
                    "lastArmedAt": note.last_armed_at,
                    "expiresAt": note.expiration_instant(),
                    "timeLeftMs": note.time_left(now),
                })
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&values)?);
        Ok(())
    }

    /// Display notes in text format
    fn display_notes_text(&self, notes: &[Note], now: i64) {
        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);

        for (i, note) in notes.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(term_width.min(50)));
            }
            self.print_note(note, now);
        }

        println!(
            "\n{} note{}",
            notes.len(),
            if notes.len() == 1 { "" } else { "s" }
        );
    }

    fn print_note(&self, note: &Note, now: i64) {
        println!("ID: {} | Created: {}", note.id, format_instant(note.id));

        match (note.expiration_instant(), note.has_duration()) {
            (Some(expires), _) => println!(
                "Deletes in {} ({} {}, at {})",
                console::style(format_time_left(expires - now)).red().bold(),
                note.duration_magnitude,
                note.duration_unit,
                format_instant(expires)
            ),
            (None, true) => println!(
                "Countdown of {} {} not started",
                note.duration_magnitude, note.duration_unit
            ),
            (None, false) => println!("{}", console::style("No countdown").dim()),
        }

        if note.text.is_empty() {
            println!("{}", console::style("(empty)").dim());
        } else {
            println!("{}", note.text);
        }
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
