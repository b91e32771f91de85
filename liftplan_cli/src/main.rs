use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use liftplan_core::orchestrator::{BlockCompletion, MultipleActiveBlocksWarning};
use liftplan_core::rest_timer::Tone;
use liftplan_core::tree::{exercise_from_catalog, SetEdit};
use liftplan_core::*;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "liftplan")]
#[command(about = "Workout session runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override athlete id
    #[arg(long, global = true)]
    athlete: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a custom session
    New {
        /// Session date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long, default_value = "Workout")]
        title: String,

        /// Block as "Name:exercise1,exercise2" (repeatable)
        #[arg(long = "block", required = true, value_parser = parse_block_arg)]
        blocks: Vec<BlockArg>,

        /// Sets per exercise
        #[arg(long, default_value_t = 3)]
        sets: u32,

        /// Target reps per set
        #[arg(long)]
        reps: Option<u32>,

        /// Target weight per set
        #[arg(long)]
        weight: Option<f64>,

        /// Rest after each set in seconds, instead of the configured default
        #[arg(long)]
        rest: Option<u32>,
    },

    /// List sessions starting at a date
    Show {
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Number of days to list
        #[arg(long, default_value_t = 1)]
        days: u32,
    },

    /// Run the session scheduled on a date
    Run {
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Auto-complete (for testing) - complete every set and block
        #[arg(long)]
        auto_complete: bool,

        /// Simulated seconds per set in auto-complete mode
        #[arg(long, default_value_t = 30)]
        seconds_per_set: u32,
    },

    /// Remove a custom session or clear a plan session's progress
    Reset {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Roll up workout log WAL to CSV
    Rollup {
        /// Clean up processed WAL files after rollup
        #[arg(long)]
        cleanup: bool,
    },
}

#[derive(Clone, Debug)]
struct BlockArg {
    name: String,
    exercises: Vec<String>,
}

fn parse_block_arg(s: &str) -> std::result::Result<BlockArg, String> {
    let (name, exercises) = s
        .split_once(':')
        .ok_or_else(|| format!("expected Name:exercise[,exercise], got {:?}", s))?;
    let exercises: Vec<String> = exercises
        .split(',')
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();
    if name.trim().is_empty() || exercises.is_empty() {
        return Err(format!("block {:?} needs a name and at least one exercise", s));
    }
    Ok(BlockArg {
        name: name.trim().to_string(),
        exercises,
    })
}

/// File layout under the data directory
struct DataPaths {
    wal_dir: PathBuf,
    schedule: PathBuf,
    plans: PathBuf,
    wal: PathBuf,
    csv: PathBuf,
    goals: PathBuf,
}

impl DataPaths {
    fn new(data_dir: PathBuf) -> Self {
        let wal_dir = data_dir.join("wal");
        Self {
            schedule: data_dir.join("schedule.json"),
            plans: data_dir.join("plans.json"),
            wal: wal_dir.join("workout_logs.wal"),
            csv: data_dir.join("workout_logs.csv"),
            goals: wal_dir.join("goals.json"),
            wal_dir,
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    liftplan_core::logging::init();

    let cli = Cli::parse();

    let config = Config::load()?;
    let paths = DataPaths::new(
        cli.data_dir
            .unwrap_or_else(|| config.data.data_dir.clone()),
    );
    let athlete = cli.athlete.unwrap_or_else(|| config.athlete.id.clone());
    let today = Local::now().date_naive();

    match cli.command {
        Commands::New {
            date,
            title,
            blocks,
            sets,
            reps,
            weight,
            rest,
        } => cmd_new(
            &paths,
            &athlete,
            date.unwrap_or(today),
            &title,
            &blocks,
            sets,
            SetValues {
                reps,
                weight,
                ..Default::default()
            },
            rest,
        ),
        Commands::Show { date, days } => cmd_show(&paths, &athlete, date.unwrap_or(today), days),
        Commands::Run {
            date,
            auto_complete,
            seconds_per_set,
        } => cmd_run(
            &paths,
            &athlete,
            date.unwrap_or(today),
            auto_complete,
            seconds_per_set,
            &config,
        ),
        Commands::Reset { date } => cmd_reset(&paths, &athlete, date.unwrap_or(today)),
        Commands::Rollup { cleanup } => cmd_rollup(&paths, cleanup),
    }
}

fn cmd_new(
    paths: &DataPaths,
    athlete: &str,
    date: NaiveDate,
    title: &str,
    block_args: &[BlockArg],
    sets: u32,
    target: SetValues,
    rest: Option<u32>,
) -> Result<()> {
    let catalog = get_default_catalog();
    let errors = catalog.validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::CatalogValidation("Invalid catalog".into()));
    }

    let mut blocks = Vec::with_capacity(block_args.len());
    for arg in block_args {
        let mut block = Block::new(arg.name.clone(), BlockMode::Sequential);
        for exercise_id in &arg.exercises {
            let entry = catalog.get(exercise_id).ok_or_else(|| {
                Error::NotFound(format!("exercise {} is not in the catalog", exercise_id))
            })?;
            let mut exercise = exercise_from_catalog(entry, sets, target.clone());
            for set in &mut exercise.sets {
                set.rest_seconds = rest;
            }
            block.exercises.push(exercise);
        }
        blocks.push(block);
    }

    let mut store = JsonScheduleStore::new(&paths.schedule);
    let session =
        liftplan_core::reconciler::create_custom_session(&mut store, athlete, date, title, blocks)?;

    println!("✓ Created session \"{}\" on {}", session.title, session.date);
    display_session(&session, None);
    Ok(())
}

fn load_sessions(
    paths: &DataPaths,
    athlete: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Session>> {
    let store = JsonScheduleStore::new(&paths.schedule);
    let plans = FilePlanStore::new(&paths.plans);
    liftplan_core::reconciler::load_range(&store, &plans, athlete, from, to)
}

fn cmd_show(paths: &DataPaths, athlete: &str, from: NaiveDate, days: u32) -> Result<()> {
    let to = from + chrono::Duration::days(i64::from(days.max(1)) - 1);
    let sessions = load_sessions(paths, athlete, from, to)?;

    if sessions.is_empty() {
        println!("No sessions between {} and {}.", from, to);
        return Ok(());
    }

    for session in &sessions {
        display_session(session, None);
    }
    Ok(())
}

fn cmd_reset(paths: &DataPaths, athlete: &str, date: NaiveDate) -> Result<()> {
    let sessions = load_sessions(paths, athlete, date, date)?;
    let Some(session) = sessions.first() else {
        println!("No session on {}.", date);
        return Ok(());
    };

    let mut store = JsonScheduleStore::new(&paths.schedule);
    liftplan_core::reconciler::remove_session(&mut store, athlete, session)?;

    if session.is_plan_derived() {
        println!("✓ Cleared progress for \"{}\" on {}", session.title, date);
    } else {
        println!("✓ Removed session \"{}\" on {}", session.title, date);
    }
    Ok(())
}

fn cmd_rollup(paths: &DataPaths, cleanup: bool) -> Result<()> {
    if !paths.wal.exists() {
        println!("No WAL file found - nothing to roll up.");
        return Ok(());
    }

    let count = liftplan_core::csv_rollup::wal_to_csv_and_archive(&paths.wal, &paths.csv)?;

    println!("✓ Rolled up {} log entries to CSV", count);
    println!("  CSV: {}", paths.csv.display());

    if cleanup {
        let cleaned = liftplan_core::csv_rollup::cleanup_processed_wals(&paths.wal_dir)?;
        if cleaned > 0 {
            println!("✓ Cleaned up {} processed WAL files", cleaned);
        }
    }

    Ok(())
}

// ============================================================================
// Running a session
// ============================================================================

/// Stores the orchestrator flushes into
struct Stores {
    schedule: JsonScheduleStore,
    history: FileHistory,
    goals: GoalLedger,
}

impl Stores {
    fn open(paths: &DataPaths) -> Self {
        Self {
            schedule: JsonScheduleStore::new(&paths.schedule),
            history: FileHistory::new(&paths.wal, &paths.csv),
            goals: GoalLedger::new(&paths.goals),
        }
    }

    fn flush(&mut self, orch: &mut SessionOrchestrator) {
        let report = orch.flush(&mut Backends {
            schedule: &mut self.schedule,
            history: &mut self.history,
            goals: &mut self.goals,
        });
        for failure in &report.failures {
            println!("⚠ {} failed: {}", failure.command, failure.error);
        }
    }
}

/// Terminal bell in place of vibration and chime
struct TerminalAlerts;

impl AlertSink for TerminalAlerts {
    fn vibrate(&mut self, _pattern_ms: &[u32]) {
        print!("\x07");
    }

    fn play_tones(&mut self, tones: &[Tone]) {
        tracing::debug!("Rest chime with {} tones", tones.len());
        println!("\n⏰ Rest over!");
    }
}

fn cmd_run(
    paths: &DataPaths,
    athlete: &str,
    date: NaiveDate,
    auto_complete: bool,
    seconds_per_set: u32,
    config: &Config,
) -> Result<()> {
    std::fs::create_dir_all(&paths.wal_dir)?;

    let session = load_sessions(paths, athlete, date, date)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(format!("no session on {}", date)))?;

    let mut orch = SessionOrchestrator::from_config(athlete, session, config);
    let mut stores = Stores::open(paths);

    display_session(orch.session(), Some(&orch));

    if auto_complete {
        run_auto(&mut orch, &mut stores, seconds_per_set)?;
    } else {
        run_interactive(&mut orch, &mut stores)?;
    }

    display_summary(&orch);
    Ok(())
}

fn run_auto(
    orch: &mut SessionOrchestrator,
    stores: &mut Stores,
    seconds_per_set: u32,
) -> Result<()> {
    let mut alerts = LogAlertSink;
    let block_ids: Vec<String> = orch.session().blocks.iter().map(|b| b.id.clone()).collect();

    for block_id in &block_ids {
        match orch.block_state(block_id) {
            Some(BlockState::Completed) | None => continue,
            Some(BlockState::Inactive) => {
                orch.activate_block(block_id, Consent::Proceed)?;
            }
            Some(BlockState::Active) => {}
        }
        stores.flush(orch);
        display_history(orch, block_id);

        let pending: Vec<(String, String)> = orch
            .session()
            .block(block_id)
            .map(|b| {
                b.exercises
                    .iter()
                    .flat_map(|e| {
                        e.sets
                            .iter()
                            .filter(|s| !s.is_completed)
                            .map(move |s| (e.id.clone(), s.id.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        for (exercise_id, set_id) in pending {
            for _ in 0..seconds_per_set {
                orch.tick(&mut alerts);
            }
            orch.complete_set(block_id, &exercise_id, &set_id)?;
        }

        let done = orch.complete_block(block_id)?;
        print_completion(orch, &done);
        stores.flush(orch);
    }

    Ok(())
}

/// Stdin lines arrive from a reader thread so a pending read never holds up the clock
struct Console {
    lines: mpsc::Receiver<String>,
    last_tick: Instant,
    alerts: TerminalAlerts,
}

impl Console {
    fn spawn() -> Self {
        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            lines,
            last_tick: Instant::now(),
            alerts: TerminalAlerts,
        }
    }

    /// Apply one tick per whole wall-clock second since the last one
    fn catch_up(&mut self, orch: &mut SessionOrchestrator) {
        while self.last_tick.elapsed() >= TICK {
            if let RestTick::Expired { .. } = orch.tick(&mut self.alerts) {
                let _ = io::stdout().flush();
            }
            self.last_tick += TICK;
        }
    }

    /// Next input line, ticking every second while waiting; `None` at end of input
    fn next_line(&mut self, orch: &mut SessionOrchestrator) -> Option<String> {
        loop {
            let wait = TICK.saturating_sub(self.last_tick.elapsed());
            let received = self.lines.recv_timeout(wait);
            self.catch_up(orch);
            match received {
                Ok(line) => return Some(line),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

const TICK: Duration = Duration::from_secs(1);

fn run_interactive(orch: &mut SessionOrchestrator, stores: &mut Stores) -> Result<()> {
    let mut console = Console::spawn();

    print_help();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(input) = console.next_line(orch) else {
            orch.checkpoint();
            stores.flush(orch);
            return Ok(());
        };

        let words: Vec<&str> = input.split_whitespace().collect();
        let outcome = match words.as_slice() {
            [] => {
                display_session(orch.session(), Some(&*orch));
                Ok(())
            }
            ["q"] => {
                orch.checkpoint();
                stores.flush(orch);
                println!("Progress saved.");
                return Ok(());
            }
            ["h"] => {
                print_help();
                Ok(())
            }
            ["a", b] => activate_interactive(orch, stores, &mut console, b),
            ["s", b, e, s] => toggle_interactive(orch, b, e, s),
            ["v", b, e, s, value] => log_value_interactive(orch, b, e, s, value),
            ["c", b] => complete_interactive(orch, stores, b),
            ["x"] => {
                if orch.stop_rest() {
                    println!("Rest stopped.");
                }
                Ok(())
            }
            _ => {
                println!("Unknown command, 'h' for help.");
                Ok(())
            }
        };

        if let Err(e) = outcome {
            println!("✗ {}", e);
        }
        if orch.session().completed && orch.active_blocks().is_empty() {
            return Ok(());
        }
    }
}

fn print_help() {
    println!("─────────────────────────────────────────");
    println!("  a <block>                 activate block");
    println!("  s <block> <ex> <set>      toggle set done");
    println!("  v <block> <ex> <set> k=v  log value (reps, weight, rpe, time)");
    println!("  c <block>                 complete block");
    println!("  x                         stop rest");
    println!("  Enter                     show session");
    println!("  q                         save and quit");
    println!("Numbers are 1-based positions.");
}

fn block_at(orch: &SessionOrchestrator, block: &str) -> Result<String> {
    let index = parse_position(block)?;
    orch.session()
        .blocks
        .get(index)
        .map(|b| b.id.clone())
        .ok_or_else(|| Error::NotFound(format!("block {}", block)))
}

fn set_path_at(orch: &SessionOrchestrator, block: &str, exercise: &str, set: &str) -> Result<SetPath> {
    let block_id = block_at(orch, block)?;
    let (ei, si) = (parse_position(exercise)?, parse_position(set)?);
    let exercise = orch
        .session()
        .block(&block_id)
        .and_then(|b| b.exercises.get(ei))
        .ok_or_else(|| Error::NotFound(format!("exercise {}", exercise)))?;
    let set = exercise
        .sets
        .get(si)
        .ok_or_else(|| Error::NotFound(format!("set {}", set)))?;
    Ok(SetPath::new(block_id, &exercise.id, &set.id))
}

fn parse_position(s: &str) -> Result<usize> {
    match s.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(Error::InvalidEdit(format!("{:?} is not a position", s))),
    }
}

fn activate_interactive(
    orch: &mut SessionOrchestrator,
    stores: &mut Stores,
    console: &mut Console,
    block: &str,
) -> Result<()> {
    let block_id = block_at(orch, block)?;
    let activation = match orch.activate_block(&block_id, Consent::Ask)? {
        Activation::NeedsConfirmation(warning) => {
            if !confirm_multiple(orch, console, &warning)? {
                return Ok(());
            }
            orch.activate_block(&block_id, Consent::Proceed)?
        }
        other => other,
    };

    match activation {
        Activation::Started { reactivated, .. } => {
            let verb = if reactivated { "Restarted" } else { "Started" };
            println!("▶ {} {}", verb, block_name(orch, &block_id));
            stores.flush(orch);
            display_history(orch, &block_id);
        }
        Activation::AlreadyActive => println!("Block already active."),
        Activation::NeedsConfirmation(_) => {}
    }
    Ok(())
}

fn confirm_multiple(
    orch: &mut SessionOrchestrator,
    console: &mut Console,
    warning: &MultipleActiveBlocksWarning,
) -> Result<bool> {
    let names: Vec<&str> = warning
        .active
        .iter()
        .map(|id| block_name(orch, id))
        .collect();
    print!("{} already running. Start another block? [y/N] ", names.join(", "));
    io::stdout().flush()?;

    let answer = console.next_line(orch).unwrap_or_default();
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn toggle_interactive(orch: &mut SessionOrchestrator, block: &str, exercise: &str, set: &str) -> Result<()> {
    let path = set_path_at(orch, block, exercise, set)?;
    let toggle = orch.complete_set(&path.block_id, &path.exercise_id, &path.set_id)?;
    match toggle.rest {
        Some(rest) => println!("✓ Set done. Rest {}s", rest.seconds_remaining),
        None => println!("Set marked not done."),
    }
    Ok(())
}

fn log_value_interactive(
    orch: &mut SessionOrchestrator,
    block: &str,
    exercise: &str,
    set: &str,
    value: &str,
) -> Result<()> {
    let path = set_path_at(orch, block, exercise, set)?;
    let (key, raw) = value
        .split_once('=')
        .ok_or_else(|| Error::InvalidEdit(format!("expected key=value, got {}", value)))?;
    let metric_value = match key {
        "reps" => MetricValue::Reps(parse_number(key, raw)?),
        "weight" => MetricValue::Weight(parse_number(key, raw)?),
        "rpe" => MetricValue::Rpe(parse_number(key, raw)?),
        "time" => MetricValue::Time(parse_number(key, raw)?),
        other => return Err(Error::InvalidEdit(format!("unknown metric {}", other))),
    };
    orch.log_set_value(&path, SetEdit::Put(metric_value))?;
    println!("✓ Logged {}", value);
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::InvalidEdit(format!("bad value for {}: {}", key, raw)))
}

fn complete_interactive(orch: &mut SessionOrchestrator, stores: &mut Stores, block: &str) -> Result<()> {
    let block_id = block_at(orch, block)?;
    let done = orch.complete_block(&block_id)?;
    print_completion(orch, &done);
    stores.flush(orch);
    if let Some(next) = &done.auto_activated {
        display_history(orch, next);
    }
    Ok(())
}

// ============================================================================
// Display
// ============================================================================

fn block_name<'a>(orch: &'a SessionOrchestrator, block_id: &str) -> &'a str {
    orch.session()
        .block(block_id)
        .map(|b| b.name.as_str())
        .unwrap_or("?")
}

fn print_completion(orch: &SessionOrchestrator, done: &BlockCompletion) {
    println!(
        "✓ Block {} completed in {}s",
        block_name(orch, &done.block_id),
        done.elapsed_seconds
    );
    if let Some(next) = &done.auto_activated {
        println!("▶ Started {}", block_name(orch, next));
    }
}

fn display_session(session: &Session, orch: Option<&SessionOrchestrator>) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}  {}", session.date, session.title);
    println!("╰─────────────────────────────────────────╯");
    if let SessionOrigin::PlanDerived { plan_name, .. } = &session.origin {
        println!("  Plan: {}", plan_name);
    }

    for (bi, block) in session.blocks.iter().enumerate() {
        let state = match orch.and_then(|o| o.block_state(&block.id)) {
            Some(BlockState::Active) => "active",
            _ if block.completed => "done",
            _ => "pending",
        };
        let elapsed = orch
            .and_then(|o| o.elapsed(&block.id))
            .map(|s| format!(" {}s", s))
            .unwrap_or_default();
        println!("  {}. {} [{}{}]", bi + 1, block.name, state, elapsed);

        for (ei, exercise) in block.exercises.iter().enumerate() {
            println!("     {}. {}", ei + 1, exercise.name);
            for (si, set) in exercise.sets.iter().enumerate() {
                let mark = if set.is_completed { "✓" } else { " " };
                println!(
                    "        [{}] {}  {}",
                    mark,
                    si + 1,
                    format_values(&set.actual.or(&set.target))
                );
            }
        }
    }

    if session.completed {
        println!("  ✓ Completed ({}s)", session.duration_seconds);
    }
    println!();
}

fn format_values(values: &SetValues) -> String {
    let mut parts = Vec::new();
    if let Some(reps) = values.reps {
        parts.push(format!("{} reps", reps));
    }
    if let Some(weight) = values.weight {
        parts.push(format!("@ {}", weight));
    }
    if let Some(rpe) = values.rpe {
        parts.push(format!("RPE {}", rpe));
    }
    if let Some(seconds) = values.time_seconds {
        parts.push(format!("{}s", seconds));
    }
    parts.join(" ")
}

fn display_history(orch: &SessionOrchestrator, block_id: &str) {
    let Some(block) = orch.session().block(block_id) else {
        return;
    };
    for exercise in &block.exercises {
        let Some(history) = orch.history_for(&exercise.exercise_ref) else {
            continue;
        };
        if let Some(last) = history.last_performed {
            println!("  {}: last on {}", exercise.name, last);
        }
        if let Some(pb) = &history.personal_best {
            println!("  {}: PB {} x {} ({})", exercise.name, pb.weight, pb.reps, pb.date);
        }
    }
}

fn display_summary(orch: &SessionOrchestrator) {
    let session = orch.session();
    let done = session.blocks.iter().filter(|b| b.completed).count();
    println!("─────────────────────────────────────────");
    if session.completed {
        println!("✓ Session complete!");
    }
    println!(
        "  Blocks: {}/{}  Time: {}s",
        done,
        session.blocks.len(),
        orch.total_elapsed()
    );
}
