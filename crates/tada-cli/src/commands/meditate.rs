use std::io::Write;

use clap::Args;
use serde_json::json;
use tada_core::storage::AudioConfig;
use tada_core::{
    save_session, BellPlayer, Command, Config, Event, HttpPersister, InhibitorLock, IntervalSpec,
    Phase, RunnerHandle, SaveRequest, Schedule, SessionRunner, SilentPlayer, TerminalBell,
    TimerEngine, TimerMode, TimerSettings, TimerSnapshot,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::clock_face;

#[derive(Args)]
pub struct MeditateArgs {
    /// Interval as MINUTESxREPEATS[:SOUND]; repeat for several, 0 repeats = forever
    #[arg(short, long = "interval", value_name = "MINxREP[:SOUND]")]
    intervals: Vec<IntervalSpec>,
    /// Warm-up countdown in seconds (default from timer settings)
    #[arg(long, value_name = "SECS")]
    warm_up: Option<u64>,
    /// Count time past the final bell when saving
    #[arg(long, overrides_with = "no_overtime")]
    include_overtime: bool,
    /// Save only the scheduled time, never overtime
    #[arg(long)]
    no_overtime: bool,
    /// Mood from 1 (low) to 5 (high) to attach to the saved session
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    mood: Option<u8>,
    /// Reflection note to attach to the saved session
    #[arg(long)]
    reflection: Option<String>,
    /// Do not submit the session when it ends
    #[arg(long)]
    no_save: bool,
    /// Print events as JSON lines instead of a live display
    #[arg(long)]
    json: bool,
}

impl MeditateArgs {
    fn include_overtime(&self, config: &Config) -> bool {
        if self.include_overtime {
            true
        } else if self.no_overtime {
            false
        } else {
            config.timer.include_overtime
        }
    }
}

pub fn run(args: MeditateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let settings = TimerSettings::load();
    let schedule = Schedule::new(args.intervals.clone())?;

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(meditate(args, config, settings, schedule));
    // The stdin reader may still be blocked on a read.
    runtime.shutdown_background();
    result
}

async fn meditate(
    args: MeditateArgs,
    config: Config,
    settings: TimerSettings,
    schedule: Schedule,
) -> Result<(), Box<dyn std::error::Error>> {
    let warm_up = args.warm_up.unwrap_or(settings.warm_up_seconds);
    let mut engine = TimerEngine::new(schedule, settings).with_bell_player(bell_player(&config.audio));
    if config.timer.wake_lock {
        engine = engine.with_wake_lock(InhibitorLock::new("Meditation session in progress"));
    }

    let mut display = Display { json: args.json };
    for event in engine.start(warm_up)? {
        display.event(&event, &engine.snapshot())?;
    }
    if !args.json {
        println!("Commands: p pause, r resume, t toggle, w skip warm-up, s stop and save, q discard and quit");
    }

    let (runner, mut handle) = SessionRunner::new(engine);
    let session = tokio::spawn(runner.run());

    let mut lines = spawn_stdin_reader();
    let mut interrupts = spawn_interrupt_handler(handle.commander());

    drive(&mut handle, &mut lines, &mut display).await?;
    let mut engine = session.await?;
    display.clear_status()?;

    if engine.phase() != Phase::Stopped {
        display.outcome("SessionDiscarded", "Session discarded.", None);
        return Ok(());
    }
    if args.no_save {
        display.outcome("SessionNotSaved", "Session not saved", Some("--no-save"));
        engine.reset();
        return Ok(());
    }

    let persister = HttpPersister::new(&config.api)?;
    let request = SaveRequest {
        include_overtime: args.include_overtime(&config),
        mood: args.mood,
        reflection: args.reflection.clone(),
    };
    // A Ctrl-C that stopped the session must not also abort the save.
    interrupts.borrow_and_update();
    loop {
        let saved = tokio::select! {
            saved = save_session(&mut engine, &persister, &config.entry, request.clone()) => saved,
            Ok(()) = interrupts.changed() => {
                display.outcome("SessionNotSaved", "Session not saved", Some("interrupted"));
                engine.reset();
                return Ok(());
            }
        };
        match saved {
            Ok(receipt) => {
                if args.json {
                    println!("{}", json!({"type": "SessionSaved", "id": receipt.id}));
                } else {
                    match receipt.id {
                        Some(id) => println!("Session saved ({id})."),
                        None => println!("Session saved."),
                    }
                }
                return Ok(());
            }
            Err(e) if e.is_validation() => {
                display.outcome("SessionNotSaved", "Session not saved", Some(&e.to_string()));
                engine.reset();
                return Ok(());
            }
            Err(e) => {
                eprintln!("Save failed: {e}");
                eprint!("Retry? [y/N] ");
                std::io::stderr().flush()?;
                let retry = tokio::select! {
                    answer = lines.recv() => {
                        answer.is_some_and(|answer| answer.trim().eq_ignore_ascii_case("y"))
                    }
                    Ok(()) = interrupts.changed() => false,
                };
                if !retry {
                    engine.reset();
                    return Err(e.into());
                }
            }
        }
    }
}

/// Forward stdin commands and render until the runner finishes.
async fn drive(
    handle: &mut RunnerHandle,
    lines: &mut mpsc::Receiver<String>,
    display: &mut Display,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            event = handle.events.recv() => match event {
                Some(event) => {
                    let snapshot = handle.snapshot();
                    display.event(&event, &snapshot)?;
                }
                None => return Ok(()),
            },
            Ok(()) = handle.snapshots.changed() => {
                let snapshot = handle.snapshot();
                display.status(&snapshot)?;
            }
            Some(line) = lines.recv() => match parse_command(&line) {
                Some(command) => {
                    handle.send(command).await;
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("unknown command '{}'", line.trim()),
            },
        }
    }
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "pause" => Some(Command::Pause),
        "r" | "resume" => Some(Command::Resume),
        "t" | "toggle" => Some(Command::Toggle),
        "w" | "skip" => Some(Command::SkipWarmUp),
        "s" | "stop" => Some(Command::Stop),
        "q" | "quit" | "reset" => Some(Command::Reset),
        _ => None,
    }
}

/// First Ctrl-C stops the session; every press is counted so a later one
/// can abandon a save in progress.
fn spawn_interrupt_handler(stop: mpsc::Sender<Command>) -> watch::Receiver<u32> {
    let (tx, rx) = watch::channel(0u32);
    tokio::spawn(async move {
        let mut presses = 0u32;
        while tokio::signal::ctrl_c().await.is_ok() {
            presses += 1;
            if presses == 1 {
                debug!("Interrupted, stopping session");
                let _ = stop.send(Command::Stop).await;
            } else {
                debug!("Interrupted again ({presses})");
            }
            if tx.send(presses).is_err() {
                break;
            }
        }
    });
    rx
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match stdin.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("stdin closed: {e}");
                    break;
                }
            }
        }
    });
    rx
}

fn bell_player(audio: &AudioConfig) -> Box<dyn BellPlayer> {
    if !audio.enabled {
        return Box::new(SilentPlayer);
    }
    file_player(audio).unwrap_or_else(|| Box::new(TerminalBell))
}

#[cfg(feature = "audio")]
fn file_player(audio: &AudioConfig) -> Option<Box<dyn BellPlayer>> {
    let dir = audio.sounds_dir.as_deref()?;
    Some(Box::new(tada_core::audio::FilePlayer::new(dir, audio.volume)))
}

#[cfg(not(feature = "audio"))]
fn file_player(audio: &AudioConfig) -> Option<Box<dyn BellPlayer>> {
    if audio.sounds_dir.is_some() {
        warn!("audio.sounds_dir is set but tada was built without the `audio` feature");
    }
    None
}

fn outcome_json(kind: &str, reason: Option<&str>) -> serde_json::Value {
    match reason {
        Some(reason) => json!({"type": kind, "reason": reason}),
        None => json!({"type": kind}),
    }
}

struct Display {
    json: bool,
}

impl Display {
    fn event(&mut self, event: &Event, snapshot: &TimerSnapshot) -> std::io::Result<()> {
        if self.json {
            let line = serde_json::to_string(event).map_err(std::io::Error::other)?;
            println!("{line}");
            return Ok(());
        }
        self.clear_status()?;
        match event {
            Event::TimerStarted {
                mode,
                warm_up_secs,
                at,
            } => {
                let mode = match mode {
                    TimerMode::Fixed => "fixed",
                    TimerMode::Unlimited => "unlimited",
                };
                let local = at.with_timezone(&chrono::Local).format("%H:%M");
                if *warm_up_secs > 0 {
                    println!("[{local}] Starting {mode} session after a {warm_up_secs}s warm-up.");
                } else {
                    println!("[{local}] Starting {mode} session.");
                }
            }
            Event::WarmUpCompleted { .. } => println!("Warm-up complete."),
            Event::SessionBegan { .. } => {}
            Event::BellRung {
                sound,
                coalesced,
                elapsed_secs,
                ..
            } => {
                if *coalesced > 1 {
                    println!("Bell ({sound}) at {}, {coalesced} intervals passed", clock_face(*elapsed_secs));
                } else {
                    println!("Bell ({sound}) at {}", clock_face(*elapsed_secs));
                }
            }
            Event::OvertimeStarted { final_target_secs, .. } => {
                println!("All intervals complete at {}. Counting overtime.", clock_face(*final_target_secs));
            }
            Event::TimerPaused { elapsed_secs, .. } => {
                println!("Paused at {}.", clock_face(*elapsed_secs));
            }
            Event::TimerResumed { .. } => println!("Resumed."),
            Event::TimerStopped {
                elapsed_secs,
                overtime_secs,
                rings_count,
                ..
            } => {
                print!("Stopped at {} with {rings_count} bell(s)", clock_face(*elapsed_secs));
                if *overtime_secs > 0 {
                    print!(", {} overtime", clock_face(*overtime_secs));
                }
                println!(".");
            }
            Event::TimerReset { .. } => {}
        }
        self.status(snapshot)
    }

    /// How the session ended when nothing was saved.
    fn outcome(&self, kind: &str, message: &str, reason: Option<&str>) {
        if self.json {
            println!("{}", outcome_json(kind, reason));
            return;
        }
        match reason {
            Some(reason) => println!("{message}: {reason}"),
            None => println!("{message}"),
        }
    }

    fn status(&mut self, snapshot: &TimerSnapshot) -> std::io::Result<()> {
        if self.json || !snapshot.phase.is_active() {
            return Ok(());
        }
        let line = match snapshot.phase {
            Phase::WarmingUp => format!("warm-up {}", clock_face(snapshot.warm_up_remaining_secs)),
            Phase::Overtime => format!(
                "{}  overtime +{}",
                clock_face(snapshot.elapsed_secs),
                clock_face(snapshot.elapsed_secs.saturating_sub(snapshot.final_target_secs.unwrap_or(0)))
            ),
            phase => {
                let next = snapshot
                    .next_bell_at_secs
                    .map(|at| format!("  next bell {}", clock_face(at)))
                    .unwrap_or_default();
                format!("{}  {phase}{next}", clock_face(snapshot.elapsed_secs))
            }
        };
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "\r\x1b[2K{line}")?;
        stdout.flush()
    }

    fn clear_status(&mut self) -> std::io::Result<()> {
        if self.json {
            return Ok(());
        }
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "\r\x1b[2K")?;
        stdout.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_letter_commands() {
        assert_eq!(parse_command("p\n"), Some(Command::Pause));
        assert_eq!(parse_command(" R "), Some(Command::Resume));
        assert_eq!(parse_command("s"), Some(Command::Stop));
        assert_eq!(parse_command("q"), Some(Command::Reset));
        assert_eq!(parse_command("w"), Some(Command::SkipWarmUp));
        assert_eq!(parse_command("x"), None);
    }

    #[test]
    fn outcomes_are_tagged_json() {
        assert_eq!(
            outcome_json("SessionNotSaved", Some("--no-save")),
            json!({"type": "SessionNotSaved", "reason": "--no-save"})
        );
        assert_eq!(
            outcome_json("SessionDiscarded", None).to_string(),
            r#"{"type":"SessionDiscarded"}"#
        );
    }

    #[test]
    fn overtime_flags_override_config() {
        let mut config = Config::default();
        config.timer.include_overtime = true;
        let args = MeditateArgs {
            intervals: Vec::new(),
            warm_up: None,
            include_overtime: false,
            no_overtime: true,
            mood: None,
            reflection: None,
            no_save: false,
            json: false,
        };
        assert!(!args.include_overtime(&config));

        config.timer.include_overtime = false;
        let args = MeditateArgs {
            include_overtime: true,
            no_overtime: false,
            ..args
        };
        assert!(args.include_overtime(&config));
    }
}
