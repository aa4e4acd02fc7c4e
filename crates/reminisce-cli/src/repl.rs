//! REPL – Read-Eval-Print Loop for the operator console.
//!
//! The console stands in for the camera, the microphone and the caregiver's
//! touch screen:
//!   /start, /stop       – activate or deactivate the camera view
//!   /see [label]        – put a face in front of the camera (none clears it)
//!   /say <text>         – speak into the open capture
//!   /yes <name>, /no    – answer the consent prompt
//!   /enroll <name> <bio> [| contact]
//!                       – enroll whoever the camera sees right now
//!   /people             – list enrolled people
//!   /forget <name>      – delete a person
//!   /contact <name> <v> – set (or with `none`, clear) a contact
//!   /set <key> <value>  – change a live setting
//!   /settings           – show live settings
//!   /help, /quit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reminisce_hal::sim::{SimCamera, SimScene};
use reminisce_hal::{Camera, Recognizer};
use reminisce_memory::IdentityStore;
use reminisce_runtime::{ConsoleSpeechToText, SessionHandle, SettingsHandle, enroll_from_frame};
use reminisce_types::{Identity, ReminisceError};
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::config::{self, Config};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Start,
    Stop,
    See(Option<String>),
    Say(String),
    Yes(String),
    No,
    Enroll(EnrollRequest),
    People,
    Forget(String),
    Contact { name: String, value: Option<String> },
    Set { key: String, value: String },
    Settings,
    Quit,
}

/// Caregiver enrollment from the live camera frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollRequest {
    pub name: String,
    pub bio: String,
    pub contact: Option<String>,
}

fn parse_enroll(rest: &str) -> Result<EnrollRequest, String> {
    let (details, contact) = match rest.split_once('|') {
        Some((details, contact)) => (details.trim(), Some(contact.trim())),
        None => (rest, None),
    };
    let (name, bio) = details
        .split_once(char::is_whitespace)
        .map(|(name, bio)| (name, bio.trim()))
        .filter(|(_, bio)| !bio.is_empty())
        .ok_or_else(|| "/enroll needs a name and a bio".to_string())?;
    Ok(EnrollRequest {
        name: name.to_string(),
        bio: bio.to_string(),
        contact: contact.filter(|c| !c.is_empty()).map(str::to_string),
    })
}

/// Parse one console line.
pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let required = |what: &str| -> Result<String, String> {
        if rest.is_empty() {
            Err(format!("{head} needs {what}"))
        } else {
            Ok(rest.to_string())
        }
    };
    let cmd = match head {
        "/help" => Command::Help,
        "/start" => Command::Start,
        "/stop" => Command::Stop,
        "/see" => Command::See((!rest.is_empty()).then(|| rest.to_string())),
        "/say" => Command::Say(required("some text")?),
        "/yes" => Command::Yes(required("a name")?),
        "/no" => Command::No,
        "/enroll" => Command::Enroll(parse_enroll(rest)?),
        "/people" => Command::People,
        "/forget" => Command::Forget(required("a name")?),
        "/contact" => {
            let (name, value) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "/contact needs a name and a value".to_string())?;
            let value = value.trim();
            Command::Contact {
                name: name.to_string(),
                value: (value != "none").then(|| value.to_string()),
            }
        }
        "/set" => {
            let (key, value) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "/set needs a key and a value".to_string())?;
            Command::Set {
                key: key.to_string(),
                value: value.trim().to_string(),
            }
        }
        "/settings" => Command::Settings,
        "/quit" | "/exit" => Command::Quit,
        other => return Err(format!("Unknown command: '{other}'")),
    };
    Ok(cmd)
}

/// Everything the console can poke at.
pub struct Console {
    pub session: SessionHandle,
    pub camera_state: watch::Receiver<bool>,
    pub scene: SimScene,
    /// Second view onto the scene, used for caregiver enrollment.
    pub camera: SimCamera,
    pub recognizer: Arc<dyn Recognizer>,
    pub runtime: Handle,
    pub speech: Arc<ConsoleSpeechToText>,
    pub store: Arc<IdentityStore>,
    pub settings: SettingsHandle,
    pub config: Config,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits. Leaving the
/// REPL for any reason asks the orchestrator to shut down.
pub fn run(mut console: Console, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "reminisce>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        if line.trim().is_empty() {
            continue;
        }

        match parse(&line) {
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                break;
            }
            Ok(cmd) => console.execute(cmd),
            Err(e) => println!("{} Type {} for available commands.", e.red(), "/help".bold()),
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    let _ = console.session.shutdown();
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

impl Console {
    pub fn execute(&mut self, cmd: Command) {
        match cmd {
            Command::Help => cmd_help(),
            Command::Start => self.send(self.session.activate(), "camera on"),
            Command::Stop => self.send(self.session.deactivate(), "camera off"),
            Command::See(label) => self.cmd_see(label),
            Command::Say(text) => self.cmd_say(&text),
            Command::Yes(name) => self.send(self.session.approve_consent(name), "answer sent"),
            Command::No => self.send(self.session.deny_consent(), "answer sent"),
            Command::Enroll(request) => self.cmd_enroll(&request),
            Command::People => self.cmd_people(),
            Command::Forget(name) => match self.store.delete(&name) {
                Ok(()) => println!("{} forgot {}", "✓".green(), name.bold()),
                Err(e) => println!("{}: {}", "Error".red(), e),
            },
            Command::Contact { name, value } => match self.store.update_contact(&name, value.as_deref()) {
                Ok(()) => println!("{} contact updated for {}", "✓".green(), name.bold()),
                Err(e) => println!("{}: {}", "Error".red(), e),
            },
            Command::Set { key, value } => self.cmd_set(&key, &value),
            Command::Settings => self.cmd_settings(),
            Command::Quit => {}
        }
    }

    fn send(&self, result: Result<(), reminisce_types::ReminisceError>, ok: &str) {
        match result {
            Ok(()) => println!("  {}", ok.dimmed()),
            Err(e) => println!("{}: {}", "Error".red(), e),
        }
    }

    fn cmd_see(&self, label: Option<String>) {
        if !*self.camera_state.borrow() {
            println!("  {} the camera is off; {} to turn it on", "note:".yellow(), "/start".bold());
        }
        match label {
            Some(label) => {
                println!("  camera now sees {}", label.bold());
                self.scene.show(label);
            }
            None => {
                println!("  camera now sees nobody");
                self.scene.clear();
            }
        }
    }

    fn cmd_say(&self, text: &str) {
        if !self.speech.feed(text) {
            println!("  {}", "nobody is listening right now".dimmed());
        }
    }

    fn cmd_enroll(&mut self, request: &EnrollRequest) {
        match enroll_current(
            &self.runtime,
            &mut self.camera,
            self.recognizer.as_ref(),
            &self.store,
            request,
        ) {
            Ok(identity) => println!("{} enrolled {} ({})", "✓".green(), identity.name.bold(), identity.bio),
            Err(e) => println!("{}: {}", "Error".red(), e),
        }
    }

    fn cmd_people(&self) {
        let people = match self.store.list() {
            Ok(people) => people,
            Err(e) => {
                println!("{}: {}", "Error".red(), e);
                return;
            }
        };
        println!("{}", "Enrolled People".bold().underline());
        if people.is_empty() {
            println!("  {}", "nobody yet".dimmed());
        }
        for p in people {
            println!(
                "  {} · {} · mood {} · {} memories",
                p.name.bold(),
                p.bio,
                p.last_emotion(),
                p.history.len()
            );
            if let Some(contact) = &p.contact {
                println!("      contact: {}", contact);
            }
            if !p.tags.is_empty() {
                println!("      tags: {}", p.tags.join(", ").dimmed());
            }
        }
    }

    fn cmd_set(&mut self, key: &str, value: &str) {
        if let Err(e) = self.settings.set(key, value) {
            println!("{}: {}", "Error".red(), e);
            return;
        }
        self.config.settings = self.settings.current();
        match config::save(&self.config) {
            Ok(()) => println!("{} {} = {}", "✓".green(), key.bold(), value),
            Err(e) => println!("{}: {} (applied for this run only)", "Error saving config".red(), e),
        }
    }

    fn cmd_settings(&self) {
        println!("{}", "Live Settings".bold().underline());
        match toml::to_string_pretty(&self.settings.current()) {
            Ok(text) => println!("{}", text),
            Err(e) => println!("{}: {}", "Error".red(), e),
        }
    }
}

/// Capture one frame and enroll whoever is in it.
pub fn enroll_current(
    runtime: &Handle,
    camera: &mut dyn Camera,
    recognizer: &dyn Recognizer,
    store: &IdentityStore,
    request: &EnrollRequest,
) -> Result<Identity, ReminisceError> {
    let frame = camera.capture()?;
    runtime.block_on(enroll_from_frame(
        recognizer,
        store,
        &frame,
        &request.name,
        &request.bio,
        request.contact.as_deref(),
    ))
}

fn cmd_help() {
    println!();
    println!("{}", "Reminisce Commands".bold().underline());
    println!("  {}        – activate the camera view", "/start".bold().cyan());
    println!("  {}         – deactivate it and flush the session", "/stop".bold().cyan());
    println!("  {}  – show a face to the camera (omit to clear)", "/see [label]".bold().cyan());
    println!("  {}   – speak into the open capture", "/say <text>".bold().cyan());
    println!("  {}   – enroll the unknown person", "/yes <name>".bold().cyan());
    println!("  {}           – decline enrollment", "/no".bold().cyan());
    println!(
        "  {} – enroll whoever the camera sees",
        "/enroll <name> <bio> [| contact]".bold().cyan()
    );
    println!("  {}       – list enrolled people", "/people".bold().cyan());
    println!("  {} – delete a person", "/forget <name>".bold().cyan());
    println!("  {} – set or clear a contact", "/contact <name> <value|none>".bold().cyan());
    println!("  {} – change a live setting", "/set <key> <value>".bold().cyan());
    println!("  {}     – show live settings", "/settings".bold().cyan());
    println!("  {}  – exit", "/quit  /exit".bold().cyan());
    println!();
    println!("  Faces are labels: a label enrolled with {} is recognized when", "/yes".bold());
    println!("  shown again. Labels starting with {} are too far away to detect.", "far:".bold());
    println!();
}
