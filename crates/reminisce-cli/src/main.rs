//! `reminisce-cli` – Reminisce Command Line Interface
//!
//! This binary is the entry point for the Reminisce memory companion. It:
//!
//! 1. Checks for `~/.reminisce/config.toml`; runs a **First-Run Wizard** when
//!    the file is absent.
//! 2. Probes the configured language model server and reports its models.
//! 3. Wires the session core (orchestrator, presence loop, reminder
//!    scheduler) to a simulated camera and console speech input.
//! 4. Drops the operator into an **interactive REPL** (`/see`, `/say`,
//!    `/yes`, `/enroll`, `/set`, `/help`, ...).
//! 5. Intercepts **Ctrl-C** to flush the current session and wait for
//!    pending memories before exiting.

mod config;
mod display;
mod probe;
mod repl;

use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

use reminisce_hal::Recognizer;
use reminisce_hal::sim::{SimCamera, SimFaceEncoder, SimScene};
use reminisce_hal::FaceMatcher;
use reminisce_kernel::ReminderScheduler;
use reminisce_memory::IdentityStore;
use reminisce_middleware::EventBus;
use reminisce_runtime::{
    ConsoleAudioSink, ConsoleSpeechToText, HttpSpeechSynthesizer, LanguageModel, LlmDriver, PresenceLoop,
    SessionDeps, SessionOrchestrator, SettingsHandle, SpeechSynthesizer, TextOnlySynthesizer,
};

fn main() {
    // RUST_LOG filters (default "info"); REMINISCE_LOG_FORMAT=json switches to
    // JSON lines; OTEL_EXPORTER_OTLP_ENDPOINT enables span export. The REPL
    // itself still prints with println! for UX consistency.
    let _telemetry = reminisce_runtime::init_tracing("reminisce");

    print_banner();

    // ── First-Run Wizard ──────────────────────────────────────────────────
    match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(_)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
        }
    }
    let cfg = config::load().ok().flatten().unwrap_or_default();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    // ── Language model discovery ──────────────────────────────────────────
    print!("\n  Probing language model at {} … ", cfg.llm_url.dimmed());
    match runtime.block_on(probe::fetch_models(&cfg.llm_url, &cfg.llm_api_key)) {
        Ok(models) => {
            println!("{} ({} model(s) available)", "online".green(), models.len());
            for m in &models {
                let marker = if m.id == cfg.llm_model { "▶" } else { " " };
                println!("    {} {}", marker.green(), m.id.bold());
            }
        }
        Err(_) => {
            println!("{}", "offline".yellow());
            println!(
                "  {}  Greetings will use the fallback phrase and no memories will be saved.",
                "No language model detected.".dimmed()
            );
        }
    }
    if !cfg.has_voice() {
        println!("  {}", "No text-to-speech key configured; greetings are shown, not spoken.".dimmed());
    }

    // ── Identity store ────────────────────────────────────────────────────
    if let Some(parent) = Path::new(&cfg.db_path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let store = match IdentityStore::open(&cfg.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("{} {}: {}", "Failed to open".red(), cfg.db_path, e);
            std::process::exit(1);
        }
    };

    // ── Session core ──────────────────────────────────────────────────────
    let bus = EventBus::default();
    let settings = SettingsHandle::new(cfg.settings.clone());
    let scene = SimScene::new();
    let speech = Arc::new(ConsoleSpeechToText::new());
    let recognizer: Arc<dyn Recognizer> = Arc::new(FaceMatcher::new(SimFaceEncoder, store.clone()));

    let mut driver = LlmDriver::new(cfg.llm_url.clone(), cfg.llm_model.clone());
    if !cfg.llm_api_key.is_empty() {
        driver = driver.with_api_key(cfg.llm_api_key.clone());
    }
    let model: Arc<dyn LanguageModel> = Arc::new(driver);
    let synthesizer: Arc<dyn SpeechSynthesizer> = if cfg.has_voice() {
        Arc::new(HttpSpeechSynthesizer::new(
            cfg.tts_url.clone(),
            cfg.tts_voice_id.clone(),
            cfg.tts_api_key.clone(),
        ))
    } else {
        Arc::new(TextOnlySynthesizer)
    };

    let orchestrator = SessionOrchestrator::new(SessionDeps {
        recognizer: recognizer.clone(),
        store: store.clone(),
        model,
        speech_to_text: speech.clone(),
        synthesizer,
        sink: Arc::new(ConsoleAudioSink),
        bus: bus.clone(),
        settings: settings.subscribe(),
    });
    let session = orchestrator.handle();
    let camera_state = orchestrator.camera_state();
    let presence = PresenceLoop::new(
        Box::new(SimCamera::new("sim-camera", scene.clone())),
        recognizer.clone(),
        settings.subscribe(),
        camera_state.clone(),
        session.clone(),
    );

    runtime.spawn(display::print_events(bus.subscribe_all()));
    runtime.spawn(ReminderScheduler::new(bus.clone(), settings.subscribe()).run());
    runtime.spawn(presence.run());
    let orchestrator_task = runtime.spawn(orchestrator.run());

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let session_ctrlc = session.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – saving the current conversation …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
        let _ = session_ctrlc.shutdown();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    if let Err(e) = session.activate() {
        warn!(error = %e, "could not activate the camera view");
    }
    println!();
    println!("  Camera view is {}. Type {} for a list of commands.\n", "on".green(), "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    let console = repl::Console {
        session,
        camera_state,
        camera: SimCamera::new("console-camera", scene.clone()),
        scene,
        recognizer,
        runtime: runtime.handle().clone(),
        speech,
        store,
        settings,
        config: cfg,
    };
    std::thread::spawn(move || repl::run(console, shutdown));

    if let Err(e) = runtime.block_on(orchestrator_task) {
        warn!(error = %e, "session orchestrator ended abnormally");
    }
    println!("{}", "  ✓ Memories saved. Exiting Reminisce.".green());
    runtime.shutdown_timeout(Duration::from_secs(1));
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║     Reminisce First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Reminisce.\n");

    let mut cfg = config::Config::default();

    cfg.llm_url = prompt_line(
        &format!("  Language model server (OpenAI-compatible) [{}]: ", cfg.llm_url),
        &cfg.llm_url,
    );
    cfg.llm_model = prompt_line(&format!("  Model (should accept images) [{}]: ", cfg.llm_model), &cfg.llm_model);
    cfg.llm_api_key = prompt_line("  Language model API key (Enter for none): ", "");

    println!();
    println!("  Spoken greetings need an ElevenLabs-compatible voice.");
    cfg.tts_voice_id = prompt_line("  Voice id (Enter to skip): ", "");
    if !cfg.tts_voice_id.is_empty() {
        cfg.tts_api_key = prompt_line("  Text-to-speech API key: ", "");
    }

    cfg.db_path = prompt_line(&format!("  Memory database [{}]: ", cfg.db_path), &cfg.db_path);

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___               _       _          "#.bold().cyan());
    println!("{}", r#"  / _ \___ __ _  (_)__  (_)__ _______ "#.bold().cyan());
    println!("{}", r#" / , _/ -_)  ' \/ / _ \/ (_-</ __/ -_)"#.bold().cyan());
    println!("{}", r#"/_/|_|\__/_/_/_/_/_//_/_/___/\__/\__/ "#.bold().cyan());
    println!();
    println!("  {} {}", "Reminisce".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Presence-triggered memory companion");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
